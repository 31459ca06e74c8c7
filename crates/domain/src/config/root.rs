use serde::{Deserialize, Serialize};

use super::errors::ConfigError;
use super::forward::ForwardZoneConfig;
use super::hosts::HostsConfig;
use super::logging::LoggingConfig;
use super::server::ServerConfig;

const LOCAL_CONFIG_PATH: &str = "ferrous-forward.toml";
const SYSTEM_CONFIG_PATH: &str = "/etc/ferrous-forward/config.toml";

/// Main configuration structure for Ferrous Forward
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Forwarding blocks, one per routed zone.
    #[serde(default = "default_forward", rename = "forward")]
    pub forward: Vec<ForwardZoneConfig>,

    /// Static hosts plugin, consulted before forwarding.
    #[serde(default)]
    pub hosts: Option<HostsConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
            forward: default_forward(),
            hosts: None,
        }
    }
}

fn default_forward() -> Vec<ForwardZoneConfig> {
    vec![ForwardZoneConfig::new(
        ".",
        vec!["8.8.8.8:53".to_string(), "1.1.1.1:53".to_string()],
    )]
}

impl Config {
    /// Load configuration from file or use defaults
    ///
    /// Priority order:
    /// 1. Explicitly provided path
    /// 2. ferrous-forward.toml in current directory
    /// 3. /etc/ferrous-forward/config.toml
    /// 4. Default configuration
    pub fn load(path: Option<&str>, cli_overrides: CliOverrides) -> Result<Self, ConfigError> {
        let mut config = if let Some(path) = path {
            Self::from_file(path)?
        } else if std::path::Path::new(LOCAL_CONFIG_PATH).exists() {
            Self::from_file(LOCAL_CONFIG_PATH)?
        } else if std::path::Path::new(SYSTEM_CONFIG_PATH).exists() {
            Self::from_file(SYSTEM_CONFIG_PATH)?
        } else {
            Self::default()
        };

        config.apply_cli_overrides(cli_overrides);
        Ok(config)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    fn from_file(path: &str) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::FileRead(path.to_string(), e.to_string()))?;
        Self::from_toml(&contents)
    }

    fn apply_cli_overrides(&mut self, overrides: CliOverrides) {
        if let Some(port) = overrides.dns_port {
            self.server.dns_port = port;
        }
        if let Some(bind) = overrides.bind_address {
            self.server.bind_address = bind;
        }
        if let Some(level) = overrides.log_level {
            self.logging.level = level;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.dns_port == 0 {
            return Err(ConfigError::Validation("DNS port cannot be 0".to_string()));
        }
        if self.server.request_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "server.request_timeout_ms cannot be 0".to_string(),
            ));
        }
        if self.forward.is_empty() {
            return Err(ConfigError::Validation(
                "No forward zones configured".to_string(),
            ));
        }

        let mut seen_zones = std::collections::HashSet::new();
        for block in &self.forward {
            let zone = block.zone_name().map_err(ConfigError::Validation)?;
            if !seen_zones.insert(zone.clone()) {
                return Err(ConfigError::Validation(format!(
                    "Zone '{}' is forwarded more than once",
                    zone
                )));
            }
            validate_forward_block(&zone.to_string(), block)?;
        }

        if let Some(hosts) = &self.hosts {
            for zone in &hosts.zones {
                zone.parse::<crate::zone::ZoneName>()
                    .map_err(ConfigError::Validation)?;
            }
        }

        Ok(())
    }
}

impl Config {
    /// Zones whose attempts cannot all run to their exchange timeout before
    /// the request deadline. Their last attempt gets whatever time is left.
    pub fn zones_exceeding_request_timeout(&self) -> Vec<&ForwardZoneConfig> {
        self.forward
            .iter()
            .filter(|block| block.attempt_budget_ms() > self.server.request_timeout_ms)
            .collect()
    }
}

fn validate_forward_block(zone: &str, block: &ForwardZoneConfig) -> Result<(), ConfigError> {
    let fail = |msg: String| Err(ConfigError::Validation(format!("[forward {}] {}", zone, msg)));

    if block.upstreams.is_empty() {
        return fail("no upstream servers".to_string());
    }
    if let Err(e) = block.protocols() {
        return fail(e);
    }
    if let Err(e) = block.except_zones() {
        return fail(e);
    }
    if block.max_attempts == 0 {
        return fail("max_attempts cannot be 0".to_string());
    }
    if block.exchange_timeout_ms == 0 {
        return fail("exchange_timeout_ms cannot be 0".to_string());
    }
    if block.force_tcp && block.prefer_udp {
        return fail("force_tcp and prefer_udp are mutually exclusive".to_string());
    }
    if block.pool.max_connections == 0 {
        return fail("pool.max_connections cannot be 0".to_string());
    }
    if block.health_check.interval_secs == 0 {
        return fail("health_check.interval_secs cannot be 0".to_string());
    }
    if block.health_check.failure_threshold == 0 {
        return fail("health_check.failure_threshold cannot be 0".to_string());
    }
    if let Some(size) = block.edns.max_udp_payload {
        if size < 512 {
            return fail(format!("edns.max_udp_payload {} is below 512", size));
        }
    }
    Ok(())
}

/// Command-line overrides for configuration
#[derive(Debug, Default)]
pub struct CliOverrides {
    pub dns_port: Option<u16>,
    pub bind_address: Option<String>,
    pub log_level: Option<String>,
}
