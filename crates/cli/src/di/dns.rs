use ferrous_forward_application::ports::{PipelineStage, UpstreamHealthPort};
use ferrous_forward_application::use_cases::HandleDnsQueryUseCase;
use ferrous_forward_domain::Config;
use ferrous_forward_infrastructure::dns::{
    DnsServerHandler, ForwardEventEmitter, ForwardStage, Forwarder, HostsStage,
    UpstreamHealthAdapter, UpstreamMetrics, UpstreamRegistry,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Everything the listeners need, wired from configuration.
pub struct DnsServices {
    pub handler: DnsServerHandler,
    pub registry: Arc<UpstreamRegistry>,
    pub hosts: Option<Arc<HostsStage>>,
    pub health: Arc<dyn UpstreamHealthPort>,
    pub metrics: UpstreamMetrics,
    hosts_reload: Duration,
}

impl DnsServices {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        info!("Initializing DNS forwarding services");

        let (emitter, event_rx) = ForwardEventEmitter::new_enabled();
        let metrics = UpstreamMetrics::new();
        metrics.spawn_collector(event_rx);

        let registry = Arc::new(UpstreamRegistry::from_config(&config.forward, emitter.clone())?);
        let health: Arc<dyn UpstreamHealthPort> =
            Arc::new(UpstreamHealthAdapter::new(Arc::clone(&registry)));

        let mut stages: Vec<Arc<dyn PipelineStage>> = Vec::new();
        let hosts = match &config.hosts {
            Some(hosts_config) => {
                let stage = Arc::new(HostsStage::from_config(hosts_config)?);
                info!(
                    entries = stage.hosts().snapshot().len(),
                    fallthrough = hosts_config.fallthrough,
                    "Hosts stage enabled"
                );
                stages.push(stage.clone());
                Some(stage)
            }
            None => None,
        };
        stages.push(Arc::new(ForwardStage::new(
            Arc::clone(&registry),
            Forwarder::new(emitter),
        )));

        let use_case = Arc::new(HandleDnsQueryUseCase::new(stages));
        info!(stages = ?use_case.stage_names(), "Query pipeline ready");

        let handler = DnsServerHandler::new(
            use_case,
            Duration::from_millis(config.server.request_timeout_ms),
        );

        Ok(Self {
            handler,
            registry,
            hosts,
            health,
            metrics,
            hosts_reload: Duration::from_secs(
                config.hosts.as_ref().map(|h| h.reload_secs).unwrap_or(0),
            ),
        })
    }

    /// Spawns health probers, pool reapers and the hosts reloader.
    pub fn start_background_tasks(&self, shutdown: &CancellationToken) -> Vec<JoinHandle<()>> {
        let mut tasks = self.registry.start(shutdown);
        if let Some(hosts) = &self.hosts {
            tasks.extend(hosts.hosts().spawn_reloader(self.hosts_reload, shutdown.child_token()));
        }
        info!(
            tasks = tasks.len(),
            healthy = self.health.healthy_count(),
            "Background tasks started"
        );
        tasks
    }

    /// Logs final per-upstream counters.
    pub fn log_shutdown_summary(&self) {
        for (upstream, counters) in self.metrics.snapshot() {
            info!(
                upstream = %upstream,
                successes = counters.successes,
                failures = counters.failures(),
                avg_latency_ms = counters.avg_latency_ms().unwrap_or_default(),
                health_transitions = counters.health_transitions,
                "Upstream totals"
            );
        }
        for status in self.health.get_all_upstream_status() {
            info!(
                zone = %status.zone,
                upstream = %status.upstream,
                status = status.status.as_str(),
                "Upstream status at shutdown"
            );
        }
    }
}
