use super::health::{spawn_prober, HealthChecker, ProbeSettings};
use crate::dns::events::ForwardEventEmitter;
use crate::dns::transport::{ConnectionPool, PoolSettings, TlsClientFactory, UpstreamConnector};
use ferrous_forward_domain::{ClientTransport, DnsProtocol, DomainError, TransportKind};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Construction parameters shared by every upstream of a forward zone.
#[derive(Clone)]
pub struct UpstreamOptions {
    pub zone: Arc<str>,
    pub pool: PoolSettings,
    pub probe: ProbeSettings,
    pub failure_threshold: u32,
    pub force_tcp: bool,
    pub prefer_udp: bool,
    pub tls: Option<Arc<TlsClientFactory>>,
    pub emitter: ForwardEventEmitter,
}

/// One configured upstream endpoint with its pools and health state.
pub struct Upstream {
    protocol: DnsProtocol,
    label: Arc<str>,
    zone: Arc<str>,
    udp: Option<Arc<ConnectionPool>>,
    tcp: Option<Arc<ConnectionPool>>,
    tls: Option<Arc<ConnectionPool>>,
    health: HealthChecker,
    probe: ProbeSettings,
    force_tcp: bool,
    prefer_udp: bool,
}

impl Upstream {
    pub fn new(protocol: DnsProtocol, options: &UpstreamOptions) -> Result<Arc<Self>, DomainError> {
        let label: Arc<str> = Arc::from(protocol.to_string());
        let addr = protocol.socket_addr();
        let pool = |connector: UpstreamConnector| {
            Some(ConnectionPool::new(connector, options.pool.clone()))
        };

        let (udp, tcp, tls) = match &protocol {
            DnsProtocol::Plain { .. } => (
                pool(UpstreamConnector::udp(addr)),
                pool(UpstreamConnector::tcp(addr)),
                None,
            ),
            DnsProtocol::Udp { .. } => (pool(UpstreamConnector::udp(addr)), None, None),
            DnsProtocol::Tcp { .. } => (None, pool(UpstreamConnector::tcp(addr)), None),
            DnsProtocol::Tls { server_name, .. } => {
                let factory = match &options.tls {
                    Some(factory) => Arc::clone(factory),
                    None => Arc::new(TlsClientFactory::new(None)?),
                };
                let connector = UpstreamConnector::tls(addr, factory, server_name.as_deref())?;
                (None, None, pool(connector))
            }
        };

        Ok(Arc::new(Self {
            health: HealthChecker::new(
                label.clone(),
                options.failure_threshold,
                options.emitter.clone(),
            ),
            protocol,
            label,
            zone: options.zone.clone(),
            udp,
            tcp,
            tls,
            probe: options.probe.clone(),
            force_tcp: options.force_tcp,
            prefer_udp: options.prefer_udp,
        }))
    }

    pub fn protocol(&self) -> &DnsProtocol {
        &self.protocol
    }

    /// Stable display name, e.g. `tls://1.1.1.1:853#cloudflare-dns.com`.
    pub fn label(&self) -> &Arc<str> {
        &self.label
    }

    pub fn zone(&self) -> &Arc<str> {
        &self.zone
    }

    pub fn health(&self) -> &HealthChecker {
        &self.health
    }

    pub fn is_healthy(&self) -> bool {
        self.health.is_healthy()
    }

    pub fn transport_for(&self, client: ClientTransport) -> TransportKind {
        self.protocol
            .transport_for(client, self.force_tcp, self.prefer_udp)
    }

    /// Transport used by health probes: what a UDP client would get.
    pub fn probe_transport(&self) -> TransportKind {
        self.transport_for(ClientTransport::Udp)
    }

    pub fn pool(&self, kind: TransportKind) -> Result<&Arc<ConnectionPool>, DomainError> {
        let pool = match kind {
            TransportKind::Udp => self.udp.as_ref(),
            TransportKind::Tcp => self.tcp.as_ref(),
            TransportKind::Tls => self.tls.as_ref(),
        };
        pool.ok_or_else(|| {
            DomainError::ConfigError(format!("{} has no {} transport", self.label, kind))
        })
    }

    /// True for plain endpoints, which can retry a truncated UDP reply over TCP.
    pub fn can_upgrade_to_tcp(&self) -> bool {
        self.udp.is_some() && self.tcp.is_some()
    }

    /// Spawns the health prober and the idle reapers of the stream pools.
    pub fn start(self: &Arc<Self>, shutdown: &CancellationToken) -> Vec<JoinHandle<()>> {
        let mut tasks = vec![spawn_prober(
            Arc::clone(self),
            self.probe.clone(),
            shutdown.child_token(),
        )];
        for pool in [&self.tcp, &self.tls].into_iter().flatten() {
            tasks.push(pool.start_reaper(shutdown.child_token()));
        }
        tasks
    }
}

impl std::fmt::Debug for Upstream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Upstream")
            .field("label", &self.label)
            .field("zone", &self.zone)
            .field("healthy", &self.is_healthy())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferrous_forward_domain::config::ConnectionPoolConfig;
    use std::time::Duration;

    fn options(force_tcp: bool, prefer_udp: bool) -> UpstreamOptions {
        UpstreamOptions {
            zone: Arc::from("."),
            pool: PoolSettings::from_config(&ConnectionPoolConfig::default(), Duration::from_secs(1)),
            probe: ProbeSettings {
                interval: Duration::from_secs(5),
                timeout: Duration::from_secs(1),
                probe_name: ".".to_string(),
            },
            failure_threshold: 2,
            force_tcp,
            prefer_udp,
            tls: None,
            emitter: ForwardEventEmitter::new_disabled(),
        }
    }

    #[test]
    fn test_plain_upstream_follows_client_transport() {
        let upstream = Upstream::new("192.0.2.1:53".parse().unwrap(), &options(false, false)).unwrap();
        assert_eq!(upstream.transport_for(ClientTransport::Udp), TransportKind::Udp);
        assert_eq!(upstream.transport_for(ClientTransport::Tcp), TransportKind::Tcp);
        assert!(upstream.pool(TransportKind::Udp).is_ok());
        assert!(upstream.pool(TransportKind::Tcp).is_ok());
        assert!(upstream.pool(TransportKind::Tls).is_err());
        assert!(upstream.can_upgrade_to_tcp());
    }

    #[test]
    fn test_force_tcp_and_prefer_udp() {
        let forced = Upstream::new("192.0.2.1:53".parse().unwrap(), &options(true, false)).unwrap();
        assert_eq!(forced.transport_for(ClientTransport::Udp), TransportKind::Tcp);

        let preferred = Upstream::new("192.0.2.1:53".parse().unwrap(), &options(false, true)).unwrap();
        assert_eq!(preferred.transport_for(ClientTransport::Tcp), TransportKind::Udp);
    }

    #[test]
    fn test_tls_upstream_only_has_tls_pool() {
        let upstream = Upstream::new(
            "tls://192.0.2.1#dns.example".parse().unwrap(),
            &options(false, false),
        )
        .unwrap();
        assert_eq!(upstream.label().as_ref(), "tls://192.0.2.1:853#dns.example");
        assert_eq!(upstream.transport_for(ClientTransport::Udp), TransportKind::Tls);
        assert!(upstream.pool(TransportKind::Udp).is_err());
        assert!(!upstream.can_upgrade_to_tcp());
    }
}
