use ferrous_forward_domain::{ClientTransport, DomainError};
use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Per-request deadline and cancellation, passed to every call that may block.
#[derive(Debug, Clone)]
pub struct RequestContext {
    deadline: Instant,
    cancel: CancellationToken,
    client_transport: ClientTransport,
    client_addr: Option<SocketAddr>,
}

impl RequestContext {
    pub fn new(timeout: Duration, client_transport: ClientTransport) -> Self {
        Self {
            deadline: Instant::now() + timeout,
            cancel: CancellationToken::new(),
            client_transport,
            client_addr: None,
        }
    }

    pub fn with_client_addr(mut self, addr: SocketAddr) -> Self {
        self.client_addr = Some(addr);
        self
    }

    /// Ties this request to an outer token, e.g. server shutdown.
    pub fn with_parent(mut self, parent: &CancellationToken) -> Self {
        self.cancel = parent.child_token();
        self
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.deadline
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn client_transport(&self) -> ClientTransport {
        self.client_transport
    }

    pub fn client_addr(&self) -> Option<SocketAddr> {
        self.client_addr
    }

    /// Fails fast when the request is already cancelled or past its deadline.
    pub fn check(&self) -> Result<(), DomainError> {
        if self.is_cancelled() {
            return Err(DomainError::Cancelled);
        }
        if self.is_expired() {
            return Err(DomainError::QueryTimeout);
        }
        Ok(())
    }

    /// Drives `fut` until it completes, the request is cancelled, or the
    /// deadline passes, whichever happens first.
    pub async fn run<F, T>(&self, fut: F) -> Result<T, DomainError>
    where
        F: Future<Output = Result<T, DomainError>>,
    {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(DomainError::Cancelled),
            _ = tokio::time::sleep_until(self.deadline) => Err(DomainError::QueryTimeout),
            result = fut => result,
        }
    }

    /// Like [`run`](Self::run) but additionally bounded by `limit`, reporting
    /// `on_timeout` when that inner limit fires first.
    pub async fn run_with_timeout<F, T>(
        &self,
        limit: Duration,
        on_timeout: DomainError,
        fut: F,
    ) -> Result<T, DomainError>
    where
        F: Future<Output = Result<T, DomainError>>,
    {
        let inner_deadline = Instant::now() + limit;
        if inner_deadline >= self.deadline {
            return self.run(fut).await;
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(DomainError::Cancelled),
            _ = tokio::time::sleep_until(inner_deadline) => Err(on_timeout),
            result = fut => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_returns_cancelled() {
        let ctx = RequestContext::new(Duration::from_secs(5), ClientTransport::Udp);
        ctx.cancel();
        let result: Result<(), _> = ctx.run(std::future::pending()).await;
        assert_eq!(result, Err(DomainError::Cancelled));
    }

    #[tokio::test]
    async fn test_run_hits_deadline() {
        let ctx = RequestContext::new(Duration::from_millis(50), ClientTransport::Udp);
        let result: Result<(), _> = ctx.run(std::future::pending()).await;
        assert_eq!(result, Err(DomainError::QueryTimeout));
        assert!(ctx.is_expired());
    }

    #[tokio::test]
    async fn test_inner_timeout_fires_before_deadline() {
        let ctx = RequestContext::new(Duration::from_secs(5), ClientTransport::Tcp);
        let on_timeout = DomainError::TransportTimeout {
            server: "10.0.0.1:53".into(),
        };
        let result: Result<(), _> = ctx
            .run_with_timeout(
                Duration::from_millis(10),
                on_timeout.clone(),
                std::future::pending(),
            )
            .await;
        assert_eq!(result, Err(on_timeout));
        assert!(!ctx.is_expired());
    }

    #[test]
    fn test_parent_cancellation_propagates() {
        let parent = CancellationToken::new();
        let ctx = RequestContext::new(Duration::from_secs(1), ClientTransport::Udp).with_parent(&parent);
        parent.cancel();
        assert_eq!(ctx.check(), Err(DomainError::Cancelled));
    }
}
