use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct HealthCheckConfig {
    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_ms: u64,

    /// Consecutive failures (probe or live traffic) before an upstream is
    /// taken out of rotation.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    #[serde(default = "default_probe_name")]
    pub probe_name: String,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
            probe_timeout_ms: default_probe_timeout(),
            failure_threshold: default_failure_threshold(),
            probe_name: default_probe_name(),
        }
    }
}

fn default_interval() -> u64 {
    5
}

fn default_probe_timeout() -> u64 {
    1000
}

fn default_failure_threshold() -> u32 {
    2
}

fn default_probe_name() -> String {
    ".".to_string()
}
