//! Per-upstream connection pool.
//!
//! Every open connection, busy or idle, holds one semaphore permit, so the
//! number of connections never exceeds `max_connections`. A connection is
//! owned by exactly one exchange between `get` and `put`; dropping a
//! [`PooledConnection`] without `put` closes it.

use super::{Connection, UpstreamConnector};
use ferrous_forward_application::RequestContext;
use ferrous_forward_domain::config::{ConnectionPoolConfig, PoolExhaustedPolicy};
use ferrous_forward_domain::{DomainError, TransportKind};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

const MIN_REAP_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone)]
pub struct PoolSettings {
    pub max_connections: usize,
    pub idle_timeout: Duration,
    pub acquire_timeout: Duration,
    pub connect_timeout: Duration,
    pub exhausted: PoolExhaustedPolicy,
}

impl PoolSettings {
    pub fn from_config(config: &ConnectionPoolConfig, connect_timeout: Duration) -> Self {
        Self {
            max_connections: config.max_connections,
            idle_timeout: Duration::from_secs(config.idle_timeout_secs),
            acquire_timeout: Duration::from_millis(config.acquire_timeout_ms),
            connect_timeout,
            exhausted: config.exhausted,
        }
    }
}

struct IdleConnection {
    conn: Connection,
    permit: OwnedSemaphorePermit,
    idle_since: Instant,
}

/// A connection checked out of a pool.
pub struct PooledConnection {
    conn: Connection,
    permit: OwnedSemaphorePermit,
    reused: bool,
}

impl PooledConnection {
    /// True when this connection already served an earlier exchange.
    pub fn is_reused(&self) -> bool {
        self.reused
    }

    pub fn kind(&self) -> TransportKind {
        self.conn.kind()
    }

    pub async fn exchange(&mut self, query: &[u8]) -> Result<Vec<u8>, DomainError> {
        self.conn.exchange(query).await
    }
}

pub struct ConnectionPool {
    connector: UpstreamConnector,
    settings: PoolSettings,
    permits: Arc<Semaphore>,
    idle: Mutex<VecDeque<IdleConnection>>,
    returned: Notify,
    opened: AtomicU64,
    reused: AtomicU64,
}

impl ConnectionPool {
    pub fn new(connector: UpstreamConnector, settings: PoolSettings) -> Arc<Self> {
        Arc::new(Self {
            permits: Arc::new(Semaphore::new(settings.max_connections)),
            connector,
            settings,
            idle: Mutex::new(VecDeque::new()),
            returned: Notify::new(),
            opened: AtomicU64::new(0),
            reused: AtomicU64::new(0),
        })
    }

    pub fn kind(&self) -> TransportKind {
        self.connector.kind()
    }

    pub fn connector(&self) -> &UpstreamConnector {
        &self.connector
    }

    fn idle_set(&self) -> MutexGuard<'_, VecDeque<IdleConnection>> {
        self.idle.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Checks out an idle connection or opens a new one.
    pub async fn get(&self, ctx: &RequestContext) -> Result<PooledConnection, DomainError> {
        ctx.check()?;
        let wait_until = Instant::now() + self.settings.acquire_timeout;

        loop {
            if let Some(conn) = self.take_idle() {
                return Ok(conn);
            }

            match Arc::clone(&self.permits).try_acquire_owned() {
                Ok(permit) => return self.open(ctx, permit).await,
                Err(TryAcquireError::Closed) => return Err(self.exhausted()),
                Err(TryAcquireError::NoPermits) => {}
            }

            if self.settings.exhausted == PoolExhaustedPolicy::FailFast {
                debug!(server = %self.connector.server(), "Connection pool exhausted");
                return Err(self.exhausted());
            }

            let returned = self.returned.notified();
            tokio::select! {
                biased;
                _ = ctx.cancellation_token().cancelled() => return Err(DomainError::Cancelled),
                _ = tokio::time::sleep_until(ctx.deadline()) => return Err(DomainError::QueryTimeout),
                _ = tokio::time::sleep_until(wait_until) => {
                    debug!(server = %self.connector.server(), "Timed out waiting for a pooled connection");
                    return Err(self.exhausted());
                }
                permit = Arc::clone(&self.permits).acquire_owned() => {
                    let permit = permit.map_err(|_| self.exhausted())?;
                    return self.open(ctx, permit).await;
                }
                _ = returned => continue,
            }
        }
    }

    /// Returns a connection after an exchange. Non-reusable connections and
    /// datagram sockets are closed.
    pub fn put(&self, conn: PooledConnection, reusable: bool) {
        if !reusable || !conn.kind().is_stream() {
            return;
        }
        self.idle_set().push_back(IdleConnection {
            conn: conn.conn,
            permit: conn.permit,
            idle_since: Instant::now(),
        });
        self.returned.notify_one();
    }

    fn take_idle(&self) -> Option<PooledConnection> {
        let mut idle = self.idle_set();
        while let Some(entry) = idle.pop_back() {
            if entry.idle_since.elapsed() >= self.settings.idle_timeout {
                continue;
            }
            self.reused.fetch_add(1, Ordering::Relaxed);
            return Some(PooledConnection {
                conn: entry.conn,
                permit: entry.permit,
                reused: true,
            });
        }
        None
    }

    async fn open(
        &self,
        ctx: &RequestContext,
        permit: OwnedSemaphorePermit,
    ) -> Result<PooledConnection, DomainError> {
        let server = self.connector.server().to_string();
        let conn = ctx
            .run_with_timeout(
                self.settings.connect_timeout,
                DomainError::TransportTimeout { server },
                self.connector.connect(),
            )
            .await?;
        self.opened.fetch_add(1, Ordering::Relaxed);
        Ok(PooledConnection {
            conn,
            permit,
            reused: false,
        })
    }

    fn exhausted(&self) -> DomainError {
        DomainError::PoolExhausted {
            server: self.connector.server().to_string(),
        }
    }

    /// Closes idle connections past their expiry. Returns how many were closed.
    pub fn reap_expired(&self) -> usize {
        let mut idle = self.idle_set();
        let before = idle.len();
        let timeout = self.settings.idle_timeout;
        idle.retain(|entry| entry.idle_since.elapsed() < timeout);
        before - idle.len()
    }

    /// Spawns the background task that closes expired idle connections.
    /// It stops on `shutdown` or once the pool is dropped.
    pub fn start_reaper(self: &Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        let weak: Weak<Self> = Arc::downgrade(self);
        let interval = (self.settings.idle_timeout / 2).max(MIN_REAP_INTERVAL);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
                let Some(pool) = weak.upgrade() else { break };
                let closed = pool.reap_expired();
                if closed > 0 {
                    debug!(server = %pool.connector.server(), closed, "Closed idle connections");
                }
            }
        })
    }

    pub fn idle_count(&self) -> usize {
        self.idle_set().len()
    }

    /// Connections currently open, busy or idle.
    pub fn open_count(&self) -> usize {
        self.settings.max_connections - self.permits.available_permits()
    }

    pub fn opened_total(&self) -> u64 {
        self.opened.load(Ordering::Relaxed)
    }

    pub fn reused_total(&self) -> u64 {
        self.reused.load(Ordering::Relaxed)
    }
}
