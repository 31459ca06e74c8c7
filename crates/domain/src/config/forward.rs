use serde::{Deserialize, Serialize};

use super::health::HealthCheckConfig;
use super::pool::ConnectionPoolConfig;
use crate::dns_protocol::DnsProtocol;
use crate::zone::ZoneName;

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPolicy {
    Sequential,
    RoundRobin,
    #[default]
    Random,
}

impl SelectionPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sequential => "sequential",
            Self::RoundRobin => "round_robin",
            Self::Random => "random",
        }
    }
}

/// Candidate list used when no upstream in a zone is healthy.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum HealthFallback {
    /// Every upstream becomes a candidate again.
    #[default]
    AllCandidates,
    /// Healthy upstreams first, unhealthy ones appended after them.
    AfterHealthy,
    /// Fail without touching the network.
    Disabled,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq, Default)]
pub struct TlsClientConfig {
    /// Name verified against the upstream certificate when the endpoint
    /// itself does not carry one (`tls://IP#name`).
    #[serde(default)]
    pub server_name: Option<String>,

    /// Extra PEM roots trusted on top of the bundled web PKI roots.
    #[serde(default)]
    pub ca_file: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq, Default)]
pub struct EdnsConfig {
    /// Ceiling applied to the UDP payload size advertised upstream.
    #[serde(default)]
    pub max_udp_payload: Option<u16>,

    /// EDNS option codes allowed to travel from an upstream reply back to
    /// the client.
    #[serde(default)]
    pub response_option_whitelist: Vec<u16>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ForwardZoneConfig {
    #[serde(default = "default_zone")]
    pub zone: String,

    pub upstreams: Vec<String>,

    /// Sub-domains of `zone` that must not be forwarded by this block.
    #[serde(default)]
    pub except: Vec<String>,

    #[serde(default)]
    pub policy: SelectionPolicy,

    #[serde(default)]
    pub health_fallback: HealthFallback,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,

    #[serde(default = "default_exchange_timeout")]
    pub exchange_timeout_ms: u64,

    #[serde(default)]
    pub force_tcp: bool,

    #[serde(default)]
    pub prefer_udp: bool,

    #[serde(default)]
    pub tls: TlsClientConfig,

    #[serde(default)]
    pub health_check: HealthCheckConfig,

    #[serde(default)]
    pub pool: ConnectionPoolConfig,

    #[serde(default)]
    pub edns: EdnsConfig,
}

impl ForwardZoneConfig {
    pub fn new(zone: &str, upstreams: Vec<String>) -> Self {
        Self {
            zone: zone.to_string(),
            upstreams,
            except: Vec::new(),
            policy: SelectionPolicy::default(),
            health_fallback: HealthFallback::default(),
            max_attempts: default_max_attempts(),
            exchange_timeout_ms: default_exchange_timeout(),
            force_tcp: false,
            prefer_udp: false,
            tls: TlsClientConfig::default(),
            health_check: HealthCheckConfig::default(),
            pool: ConnectionPoolConfig::default(),
            edns: EdnsConfig::default(),
        }
    }

    pub fn zone_name(&self) -> Result<ZoneName, String> {
        self.zone.parse()
    }

    /// Worst-case time spent when every attempt runs to its exchange timeout.
    pub fn attempt_budget_ms(&self) -> u64 {
        (self.max_attempts as u64).saturating_mul(self.exchange_timeout_ms)
    }

    pub fn except_zones(&self) -> Result<Vec<ZoneName>, String> {
        self.except.iter().map(|z| z.parse()).collect()
    }

    /// Parses the upstream list, applying the zone-wide TLS server name to
    /// TLS endpoints that do not name one.
    pub fn protocols(&self) -> Result<Vec<DnsProtocol>, String> {
        self.upstreams
            .iter()
            .map(|s| {
                s.parse::<DnsProtocol>()
                    .map(|p| p.with_default_server_name(self.tls.server_name.as_deref()))
            })
            .collect()
    }
}

fn default_zone() -> String {
    ".".to_string()
}

fn default_max_attempts() -> usize {
    3
}

fn default_exchange_timeout() -> u64 {
    2000
}
