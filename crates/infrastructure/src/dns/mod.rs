pub mod events;
pub mod forwarding;
pub mod hosts;
pub mod load_balancer;
pub mod server;
pub mod transport;

pub use events::{ExchangeEvent, ExchangeOutcome, ForwardEvent, ForwardEventEmitter, UpstreamMetrics};
pub use forwarding::{ExchangeResult, ForwardStage, Forwarder};
pub use hosts::{HostsFile, HostsStage};
pub use load_balancer::{
    ForwardZone, HealthChecker, Upstream, UpstreamHealthAdapter, UpstreamRegistry, UpstreamSelector,
};
pub use server::DnsServerHandler;
pub use transport::{ConnectionPool, TlsClientFactory};
