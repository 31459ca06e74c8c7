use serde::{Deserialize, Serialize};

/// What `get` does once every connection slot of a pool is taken.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PoolExhaustedPolicy {
    #[default]
    Wait,
    FailFast,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ConnectionPoolConfig {
    /// Busy plus idle connections allowed per upstream and transport.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_ms: u64,

    #[serde(default)]
    pub exhausted: PoolExhaustedPolicy,
}

impl Default for ConnectionPoolConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            idle_timeout_secs: default_idle_timeout(),
            acquire_timeout_ms: default_acquire_timeout(),
            exhausted: PoolExhaustedPolicy::default(),
        }
    }
}

fn default_max_connections() -> usize {
    16
}

fn default_idle_timeout() -> u64 {
    10
}

fn default_acquire_timeout() -> u64 {
    500
}
