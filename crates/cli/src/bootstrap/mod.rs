mod logging;

pub use logging::init_logging;

use ferrous_forward_domain::config::CliOverrides;
use ferrous_forward_domain::Config;
use tracing::{info, warn};

/// Loads and validates the configuration, applying command-line overrides.
pub fn load_config(path: Option<&str>, overrides: CliOverrides) -> anyhow::Result<Config> {
    let config = Config::load(path, overrides)?;
    config.validate()?;
    Ok(config)
}

/// Logs the effective configuration once logging is up.
pub fn log_config_summary(config: &Config) {
    info!(
        bind = %config.server.bind_address,
        port = config.server.dns_port,
        request_timeout_ms = config.server.request_timeout_ms,
        zones = config.forward.len(),
        hosts = config.hosts.is_some(),
        "Configuration loaded"
    );

    for block in config.zones_exceeding_request_timeout() {
        warn!(
            zone = %block.zone,
            max_attempts = block.max_attempts,
            exchange_timeout_ms = block.exchange_timeout_ms,
            request_timeout_ms = config.server.request_timeout_ms,
            "Request timeout is shorter than the attempt budget, the last attempt will be cut short"
        );
    }
}
