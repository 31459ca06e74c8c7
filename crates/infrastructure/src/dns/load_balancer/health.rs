use super::upstream::Upstream;
use crate::dns::events::{ForwardEvent, ForwardEventEmitter, HealthTransition};
use crate::dns::forwarding::{MessageBuilder, ResponseParser};
use ferrous_forward_application::ports::UpstreamStatus;
use ferrous_forward_domain::DomainError;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Health state of one upstream.
///
/// Reads are lock-free. Upstreams start healthy, go unhealthy after
/// `failure_threshold` consecutive failures and come back only through a
/// successful probe.
pub struct HealthChecker {
    upstream: Arc<str>,
    healthy: AtomicBool,
    consecutive_failures: AtomicU32,
    last_probe_unix_ms: AtomicU64,
    failure_threshold: u32,
    probe_now: Notify,
    emitter: ForwardEventEmitter,
}

impl HealthChecker {
    pub fn new(upstream: Arc<str>, failure_threshold: u32, emitter: ForwardEventEmitter) -> Self {
        Self {
            upstream,
            healthy: AtomicBool::new(true),
            consecutive_failures: AtomicU32::new(0),
            last_probe_unix_ms: AtomicU64::new(0),
            failure_threshold: failure_threshold.max(1),
            probe_now: Notify::new(),
            emitter,
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Acquire)
    }

    pub fn status(&self) -> UpstreamStatus {
        if self.is_healthy() {
            UpstreamStatus::Healthy
        } else {
            UpstreamStatus::Unhealthy
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::Acquire)
    }

    pub fn last_probe(&self) -> Option<SystemTime> {
        match self.last_probe_unix_ms.load(Ordering::Relaxed) {
            0 => None,
            ms => Some(UNIX_EPOCH + Duration::from_millis(ms)),
        }
    }

    /// Counts one failure. Returns true when this failure took the upstream
    /// out of rotation.
    pub fn record_failure(&self) -> bool {
        let failures = self
            .consecutive_failures
            .fetch_add(1, Ordering::AcqRel)
            .saturating_add(1);

        if failures >= self.failure_threshold
            && self
                .healthy
                .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
        {
            warn!(server = %self.upstream, failures, "Upstream marked UNHEALTHY");
            self.emit_transition(UpstreamStatus::Healthy, UpstreamStatus::Unhealthy);
            return true;
        }
        false
    }

    /// A failed exchange on the request path. Also asks the prober to check
    /// the upstream right away.
    pub fn record_live_failure(&self) -> bool {
        let transitioned = self.record_failure();
        self.probe_now.notify_one();
        transitioned
    }

    /// A successful exchange on the request path resets the failure streak
    /// but never brings an unhealthy upstream back.
    pub fn record_live_success(&self) {
        self.consecutive_failures.store(0, Ordering::Release);
    }

    pub fn record_probe_success(&self) {
        self.consecutive_failures.store(0, Ordering::Release);
        if self
            .healthy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            info!(server = %self.upstream, "Upstream marked HEALTHY");
            self.emit_transition(UpstreamStatus::Unhealthy, UpstreamStatus::Healthy);
        }
    }

    fn mark_probed(&self) {
        let now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        self.last_probe_unix_ms.store(now_ms, Ordering::Relaxed);
    }

    fn emit_transition(&self, from: UpstreamStatus, to: UpstreamStatus) {
        self.emitter.emit_with(|| {
            ForwardEvent::Health(HealthTransition {
                upstream: self.upstream.clone(),
                from,
                to,
            })
        });
    }
}

#[derive(Debug, Clone)]
pub struct ProbeSettings {
    pub interval: Duration,
    pub timeout: Duration,
    pub probe_name: String,
}

/// Background task probing one upstream on a fixed interval, or sooner when
/// live traffic reports a failure.
pub fn spawn_prober(
    upstream: Arc<Upstream>,
    settings: ProbeSettings,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        debug!(
            server = %upstream.label(),
            interval_ms = settings.interval.as_millis() as u64,
            "Health prober running"
        );

        let mut ticker = interval(settings.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
                _ = upstream.health().probe_now.notified() => {}
            }

            let result = probe_once(&upstream, &settings).await;
            upstream.health().mark_probed();
            match result {
                Ok(latency_ms) => {
                    debug!(server = %upstream.label(), latency_ms, "Health probe: OK");
                    upstream.health().record_probe_success();
                }
                Err(e) => {
                    debug!(server = %upstream.label(), error = %e, "Health probe: FAILED");
                    upstream.health().record_failure();
                }
            }
        }
    })
}

/// Sends one probe over a fresh connection on the upstream's normal
/// transport. Any well-formed matching reply counts, whatever its rcode.
pub async fn probe_once(upstream: &Upstream, settings: &ProbeSettings) -> Result<u64, DomainError> {
    let start = std::time::Instant::now();
    let connector = upstream.pool(upstream.probe_transport())?.connector().clone();
    let server = connector.server();
    let probe = MessageBuilder::build_probe(&settings.probe_name)?;
    let probe_bytes = MessageBuilder::serialize_message(&probe)?;

    let reply = tokio::time::timeout(settings.timeout, async {
        let mut conn = connector.connect().await?;
        conn.exchange(&probe_bytes).await
    })
    .await
    .map_err(|_| DomainError::TransportTimeout {
        server: server.to_string(),
    })??;

    ResponseParser::parse_reply(&reply, &probe, server)?;
    Ok(start.elapsed().as_millis() as u64)
}
