pub mod health;
pub mod registry;
pub mod selector;
pub mod upstream;
pub mod upstream_health_adapter;

pub use health::{probe_once, spawn_prober, HealthChecker, ProbeSettings};
pub use registry::{ForwardSettings, ForwardZone, UpstreamRegistry};
pub use selector::{Candidates, UpstreamSelector};
pub use upstream::{Upstream, UpstreamOptions};
pub use upstream_health_adapter::UpstreamHealthAdapter;
