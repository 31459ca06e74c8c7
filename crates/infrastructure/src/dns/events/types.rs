use ferrous_forward_application::ports::UpstreamStatus;
use ferrous_forward_domain::{DomainError, TransportKind};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExchangeOutcome {
    Success,
    Timeout,
    TransportError,
    Malformed,
    Cancelled,
    PoolExhausted,
}

impl ExchangeOutcome {
    pub fn from_error(error: &DomainError) -> Self {
        match error {
            DomainError::TransportTimeout { .. } | DomainError::QueryTimeout => Self::Timeout,
            DomainError::Cancelled => Self::Cancelled,
            DomainError::PoolExhausted { .. } => Self::PoolExhausted,
            e if e.is_malformed_response() => Self::Malformed,
            _ => Self::TransportError,
        }
    }

    pub fn from_result<T>(result: &Result<T, DomainError>) -> Self {
        match result {
            Ok(_) => Self::Success,
            Err(e) => Self::from_error(e),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Timeout => "timeout",
            Self::TransportError => "transport-error",
            Self::Malformed => "malformed",
            Self::Cancelled => "cancelled",
            Self::PoolExhausted => "pool-exhausted",
        }
    }
}

/// One attempt against one upstream.
#[derive(Debug, Clone)]
pub struct ExchangeEvent {
    pub zone: Arc<str>,

    pub upstream: Arc<str>,

    pub transport: TransportKind,

    pub outcome: ExchangeOutcome,

    pub latency_us: u64,

    /// Zero-based attempt number within the request.
    pub attempt: usize,
}

impl ExchangeEvent {
    pub fn latency_ms(&self) -> f64 {
        self.latency_us as f64 / 1000.0
    }

    pub fn is_success(&self) -> bool {
        self.outcome == ExchangeOutcome::Success
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthTransition {
    pub upstream: Arc<str>,
    pub from: UpstreamStatus,
    pub to: UpstreamStatus,
}

#[derive(Debug, Clone)]
pub enum ForwardEvent {
    Exchange(ExchangeEvent),
    Health(HealthTransition),
}
