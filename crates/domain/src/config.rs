pub mod errors;
pub mod forward;
pub mod health;
pub mod hosts;
pub mod logging;
pub mod pool;
pub mod root;
pub mod server;

pub use errors::ConfigError;
pub use forward::{EdnsConfig, ForwardZoneConfig, HealthFallback, SelectionPolicy, TlsClientConfig};
pub use health::HealthCheckConfig;
pub use hosts::HostsConfig;
pub use logging::{LogFormat, LoggingConfig};
pub use pool::{ConnectionPoolConfig, PoolExhaustedPolicy};
pub use root::{CliOverrides, Config};
pub use server::ServerConfig;
