#![allow(dead_code)]
use ferrous_forward_application::RequestContext;
use ferrous_forward_domain::config::{ForwardZoneConfig, HealthFallback, SelectionPolicy};
use ferrous_forward_domain::ClientTransport;
use ferrous_forward_infrastructure::dns::{ForwardEventEmitter, UpstreamRegistry};
use hickory_proto::op::{Edns, Message, MessageType, OpCode, Query};
use hickory_proto::rr::{Name, RecordType};
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Forward zone config tuned for tests: short timeouts, sequential order and
/// a long probe interval so probes do not interfere unless a test wants them.
pub struct ZoneBuilder {
    config: ForwardZoneConfig,
}

impl ZoneBuilder {
    pub fn new(zone: &str) -> Self {
        let mut config = ForwardZoneConfig::new(zone, Vec::new());
        config.policy = SelectionPolicy::Sequential;
        config.exchange_timeout_ms = 300;
        config.health_check.interval_secs = 3600;
        config.health_check.probe_timeout_ms = 200;
        config.pool.acquire_timeout_ms = 200;
        Self { config }
    }

    pub fn upstream(mut self, endpoint: impl Into<String>) -> Self {
        self.config.upstreams.push(endpoint.into());
        self
    }

    pub fn plain(self, addr: SocketAddr) -> Self {
        self.upstream(addr.to_string())
    }

    pub fn max_attempts(mut self, attempts: usize) -> Self {
        self.config.max_attempts = attempts;
        self
    }

    pub fn exchange_timeout_ms(mut self, ms: u64) -> Self {
        self.config.exchange_timeout_ms = ms;
        self
    }

    pub fn fallback(mut self, fallback: HealthFallback) -> Self {
        self.config.health_fallback = fallback;
        self
    }

    pub fn failure_threshold(mut self, threshold: u32) -> Self {
        self.config.health_check.failure_threshold = threshold;
        self
    }

    pub fn probe_interval_secs(mut self, secs: u64) -> Self {
        self.config.health_check.interval_secs = secs;
        self
    }

    pub fn prefer_udp(mut self) -> Self {
        self.config.prefer_udp = true;
        self
    }

    pub fn force_tcp(mut self) -> Self {
        self.config.force_tcp = true;
        self
    }

    pub fn ca_file(mut self, path: String) -> Self {
        self.config.tls.ca_file = Some(path);
        self
    }

    pub fn whitelist(mut self, codes: Vec<u16>) -> Self {
        self.config.edns.response_option_whitelist = codes;
        self
    }

    pub fn config(self) -> ForwardZoneConfig {
        self.config
    }

    pub fn registry(self) -> Arc<UpstreamRegistry> {
        Arc::new(UpstreamRegistry::from_config(&[self.config], ForwardEventEmitter::new_disabled()).unwrap())
    }
}

pub fn query(name: &str, record_type: RecordType) -> Message {
    let mut message = Message::new(4242, MessageType::Query, OpCode::Query);
    message.set_recursion_desired(true);
    message.add_query(Query::query(Name::from_str(name).unwrap(), record_type));
    message
}

pub fn query_with_edns(name: &str, record_type: RecordType, dnssec_ok: bool) -> Message {
    let mut message = query(name, record_type);
    let mut edns = Edns::new();
    edns.set_max_payload(4096);
    edns.flags_mut().dnssec_ok = dnssec_ok;
    message.set_edns(edns);
    message
}

pub fn udp_ctx() -> RequestContext {
    RequestContext::new(Duration::from_secs(5), ClientTransport::Udp)
}

pub fn tcp_ctx() -> RequestContext {
    RequestContext::new(Duration::from_secs(5), ClientTransport::Tcp)
}
