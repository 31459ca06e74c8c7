use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("Invalid domain name: {0}")]
    InvalidDomainName(String),

    #[error("Invalid DNS query: {0}")]
    InvalidDnsQuery(String),

    #[error("Invalid DNS response from {server}: {reason}")]
    InvalidDnsResponse { server: String, reason: String },

    #[error("Response from {server} does not match the outstanding query")]
    MismatchedResponse { server: String },

    #[error("I/O error: {0}")]
    IoError(String),

    #[error("Query deadline exceeded")]
    QueryTimeout,

    #[error("Query cancelled")]
    Cancelled,

    #[error("Transport timeout talking to {server}")]
    TransportTimeout { server: String },

    #[error("Transport connection refused by {server}")]
    TransportConnectionRefused { server: String },

    #[error("Transport connection reset by {server}")]
    TransportConnectionReset { server: String },

    #[error("Transport error with {server}: {reason}")]
    TransportError { server: String, reason: String },

    #[error("TLS handshake with {server} failed: {reason}")]
    TlsHandshakeFailed { server: String, reason: String },

    #[error("Connection pool for {server} exhausted")]
    PoolExhausted { server: String },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("No healthy upstream servers available")]
    TransportNoHealthyServers,

    #[error("All upstream servers failed after {attempts} attempts: {last_error}")]
    TransportAllServersUnreachable { attempts: usize, last_error: String },
}

impl DomainError {
    /// Failures raised while talking to an upstream. These count against the
    /// upstream's health and allow another attempt.
    pub fn is_transport_error(&self) -> bool {
        matches!(
            self,
            Self::TransportTimeout { .. }
                | Self::TransportConnectionRefused { .. }
                | Self::TransportConnectionReset { .. }
                | Self::TransportError { .. }
                | Self::TlsHandshakeFailed { .. }
        )
    }

    pub fn is_malformed_response(&self) -> bool {
        matches!(
            self,
            Self::InvalidDnsResponse { .. } | Self::MismatchedResponse { .. }
        )
    }

    /// Whether the forwarder may spend another attempt after this error.
    pub fn is_retryable(&self) -> bool {
        self.is_transport_error()
            || self.is_malformed_response()
            || matches!(self, Self::PoolExhausted { .. })
    }

    /// Whether this error should be reported to the upstream's health checker.
    pub fn counts_against_upstream(&self) -> bool {
        self.is_transport_error() || self.is_malformed_response()
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::TransportTimeout { .. } | Self::QueryTimeout)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_errors_are_retryable() {
        let err = DomainError::TransportTimeout {
            server: "10.0.0.1:53".into(),
        };
        assert!(err.is_transport_error());
        assert!(err.is_retryable());
        assert!(err.counts_against_upstream());
    }

    #[test]
    fn test_pool_exhaustion_does_not_count_against_upstream() {
        let err = DomainError::PoolExhausted {
            server: "10.0.0.1:53".into(),
        };
        assert!(err.is_retryable());
        assert!(!err.counts_against_upstream());
    }

    #[test]
    fn test_cancellation_is_terminal() {
        assert!(!DomainError::Cancelled.is_retryable());
        assert!(!DomainError::QueryTimeout.is_retryable());
        assert!(!DomainError::TransportNoHealthyServers.is_retryable());
    }
}
