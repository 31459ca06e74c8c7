use super::health::ProbeSettings;
use super::selector::UpstreamSelector;
use super::upstream::{Upstream, UpstreamOptions};
use crate::dns::events::ForwardEventEmitter;
use crate::dns::forwarding::EdnsPolicy;
use crate::dns::transport::{PoolSettings, TlsClientFactory};
use ferrous_forward_domain::config::ForwardZoneConfig;
use ferrous_forward_domain::zone::longest_match;
use ferrous_forward_domain::{DomainError, ZoneName};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Per-request limits of one forward zone.
#[derive(Debug, Clone)]
pub struct ForwardSettings {
    pub max_attempts: usize,
    pub exchange_timeout: Duration,
    pub edns: EdnsPolicy,
}

/// A configured forward block: its origin, exclusions and upstreams.
pub struct ForwardZone {
    name: ZoneName,
    label: Arc<str>,
    except: Vec<ZoneName>,
    selector: UpstreamSelector,
    settings: ForwardSettings,
}

impl ForwardZone {
    pub fn from_config(
        config: &ForwardZoneConfig,
        emitter: ForwardEventEmitter,
    ) -> Result<Self, DomainError> {
        let name = config.zone_name().map_err(DomainError::ConfigError)?;
        let except = config.except_zones().map_err(DomainError::ConfigError)?;
        let protocols = config.protocols().map_err(DomainError::ConfigError)?;
        if protocols.is_empty() {
            return Err(DomainError::ConfigError(format!(
                "Forward zone '{}' has no upstreams",
                name
            )));
        }

        let tls = if protocols.iter().any(|p| p.is_tls()) {
            Some(Arc::new(TlsClientFactory::new(config.tls.ca_file.as_deref())?))
        } else {
            None
        };

        let exchange_timeout = Duration::from_millis(config.exchange_timeout_ms);
        let label: Arc<str> = Arc::from(name.as_str());
        let options = UpstreamOptions {
            zone: label.clone(),
            pool: PoolSettings::from_config(&config.pool, exchange_timeout),
            probe: ProbeSettings {
                interval: Duration::from_secs(config.health_check.interval_secs),
                timeout: Duration::from_millis(config.health_check.probe_timeout_ms),
                probe_name: config.health_check.probe_name.clone(),
            },
            failure_threshold: config.health_check.failure_threshold,
            force_tcp: config.force_tcp,
            prefer_udp: config.prefer_udp,
            tls,
            emitter,
        };

        let upstreams = protocols
            .into_iter()
            .map(|protocol| Upstream::new(protocol, &options))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            name,
            label,
            except,
            selector: UpstreamSelector::new(upstreams, config.policy, config.health_fallback),
            settings: ForwardSettings {
                max_attempts: config.max_attempts.max(1),
                exchange_timeout,
                edns: EdnsPolicy::from_config(&config.edns),
            },
        })
    }

    pub fn name(&self) -> &ZoneName {
        &self.name
    }

    pub fn label(&self) -> &Arc<str> {
        &self.label
    }

    pub fn selector(&self) -> &UpstreamSelector {
        &self.selector
    }

    pub fn settings(&self) -> &ForwardSettings {
        &self.settings
    }

    pub fn upstreams(&self) -> &[Arc<Upstream>] {
        self.selector.upstreams()
    }

    /// True when `qname` falls under one of the `except` sub-zones.
    pub fn is_excluded(&self, qname: &str) -> bool {
        self.except.iter().any(|zone| zone.contains(qname))
    }
}

/// Every forward zone, routed by longest matching origin.
pub struct UpstreamRegistry {
    zones: Vec<Arc<ForwardZone>>,
}

impl UpstreamRegistry {
    pub fn from_config(
        configs: &[ForwardZoneConfig],
        emitter: ForwardEventEmitter,
    ) -> Result<Self, DomainError> {
        let zones = configs
            .iter()
            .map(|config| ForwardZone::from_config(config, emitter.clone()).map(Arc::new))
            .collect::<Result<Vec<_>, _>>()?;

        for zone in &zones {
            info!(
                zone = %zone.name(),
                upstreams = zone.upstreams().len(),
                policy = zone.selector().policy().as_str(),
                "Forward zone configured"
            );
        }
        Ok(Self { zones })
    }

    pub fn zones(&self) -> &[Arc<ForwardZone>] {
        &self.zones
    }

    /// The most specific zone containing `qname`. A name excluded by that
    /// zone is not forwarded at all, even if a broader zone would match.
    pub fn route(&self, qname: &str) -> Option<&Arc<ForwardZone>> {
        let index = longest_match(self.zones.iter().map(|z| z.name()), qname)?;
        let zone = &self.zones[index];
        if zone.is_excluded(qname) {
            debug!(zone = %zone.name(), domain = %qname, "Name excluded from forwarding");
            return None;
        }
        Some(zone)
    }

    /// Starts health probers and pool reapers for every upstream.
    pub fn start(&self, shutdown: &CancellationToken) -> Vec<JoinHandle<()>> {
        self.zones
            .iter()
            .flat_map(|zone| zone.upstreams().iter())
            .flat_map(|upstream| upstream.start(shutdown))
            .collect()
    }
}
