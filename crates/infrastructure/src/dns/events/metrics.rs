use super::{ExchangeEvent, ExchangeOutcome, ForwardEvent};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpstreamCounters {
    pub successes: u64,
    pub timeouts: u64,
    pub transport_errors: u64,
    pub malformed: u64,
    pub cancelled: u64,
    pub pool_exhausted: u64,
    pub total_latency_us: u64,
    pub health_transitions: u64,
}

impl UpstreamCounters {
    pub fn failures(&self) -> u64 {
        self.timeouts + self.transport_errors + self.malformed + self.pool_exhausted
    }

    pub fn avg_latency_ms(&self) -> Option<f64> {
        let total = self.successes + self.failures();
        (total > 0).then(|| self.total_latency_us as f64 / total as f64 / 1000.0)
    }
}

/// Per-upstream counters aggregated from the forward event stream.
#[derive(Clone, Default)]
pub struct UpstreamMetrics {
    counters: Arc<DashMap<Arc<str>, UpstreamCounters>>,
}

impl UpstreamMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track(&self, event: &ForwardEvent) {
        match event {
            ForwardEvent::Exchange(exchange) => self.track_exchange(exchange),
            ForwardEvent::Health(transition) => {
                self.counters
                    .entry(transition.upstream.clone())
                    .or_default()
                    .health_transitions += 1;
            }
        }
    }

    fn track_exchange(&self, event: &ExchangeEvent) {
        let mut entry = self.counters.entry(event.upstream.clone()).or_default();
        match event.outcome {
            ExchangeOutcome::Success => entry.successes += 1,
            ExchangeOutcome::Timeout => entry.timeouts += 1,
            ExchangeOutcome::TransportError => entry.transport_errors += 1,
            ExchangeOutcome::Malformed => entry.malformed += 1,
            ExchangeOutcome::Cancelled => entry.cancelled += 1,
            ExchangeOutcome::PoolExhausted => entry.pool_exhausted += 1,
        }
        entry.total_latency_us += event.latency_us;
    }

    pub fn get(&self, upstream: &str) -> Option<UpstreamCounters> {
        self.counters.get(upstream).map(|c| *c)
    }

    pub fn snapshot(&self) -> Vec<(Arc<str>, UpstreamCounters)> {
        let mut all: Vec<_> = self
            .counters
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    /// Consumes the event channel until every emitter is dropped.
    pub fn spawn_collector(&self, mut rx: mpsc::UnboundedReceiver<ForwardEvent>) -> JoinHandle<()> {
        let metrics = self.clone();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if let ForwardEvent::Exchange(ref exchange) = event {
                    debug!(
                        zone = %exchange.zone,
                        upstream = %exchange.upstream,
                        transport = %exchange.transport,
                        outcome = exchange.outcome.as_str(),
                        attempt = exchange.attempt,
                        latency_ms = exchange.latency_ms(),
                        "Upstream exchange"
                    );
                }
                metrics.track(&event);
            }
            info!("Forward event stream closed");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::events::HealthTransition;
    use ferrous_forward_application::ports::UpstreamStatus;
    use ferrous_forward_domain::TransportKind;

    fn exchange(upstream: &str, outcome: ExchangeOutcome, latency_us: u64) -> ForwardEvent {
        ForwardEvent::Exchange(ExchangeEvent {
            zone: Arc::from("."),
            upstream: Arc::from(upstream),
            transport: TransportKind::Udp,
            outcome,
            latency_us,
            attempt: 0,
        })
    }

    #[test]
    fn test_tracks_outcomes_per_upstream() {
        let metrics = UpstreamMetrics::new();
        metrics.track(&exchange("dns://10.0.0.1:53", ExchangeOutcome::Success, 1000));
        metrics.track(&exchange("dns://10.0.0.1:53", ExchangeOutcome::Timeout, 3000));
        metrics.track(&exchange("dns://10.0.0.2:53", ExchangeOutcome::Malformed, 500));

        let first = metrics.get("dns://10.0.0.1:53").unwrap();
        assert_eq!(first.successes, 1);
        assert_eq!(first.timeouts, 1);
        assert_eq!(first.failures(), 1);
        assert_eq!(first.avg_latency_ms(), Some(2.0));

        let second = metrics.get("dns://10.0.0.2:53").unwrap();
        assert_eq!(second.malformed, 1);
        assert_eq!(metrics.snapshot().len(), 2);
    }

    #[test]
    fn test_tracks_health_transitions() {
        let metrics = UpstreamMetrics::new();
        metrics.track(&ForwardEvent::Health(HealthTransition {
            upstream: Arc::from("dns://10.0.0.1:53"),
            from: UpstreamStatus::Healthy,
            to: UpstreamStatus::Unhealthy,
        }));
        assert_eq!(metrics.get("dns://10.0.0.1:53").unwrap().health_transitions, 1);
    }

    #[tokio::test]
    async fn test_collector_drains_channel() {
        let (emitter, rx) = crate::dns::events::ForwardEventEmitter::new_enabled();
        let metrics = UpstreamMetrics::new();
        let handle = metrics.spawn_collector(rx);

        emitter.emit(exchange("dns://10.0.0.1:53", ExchangeOutcome::Success, 10));
        drop(emitter);
        handle.await.unwrap();

        assert_eq!(metrics.get("dns://10.0.0.1:53").unwrap().successes, 1);
    }
}
