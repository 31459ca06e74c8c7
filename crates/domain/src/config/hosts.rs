use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct HostsConfig {
    /// Hosts file in `/etc/hosts` format. `None` serves only inline entries.
    #[serde(default)]
    pub path: Option<String>,

    #[serde(default = "default_zones")]
    pub zones: Vec<String>,

    #[serde(default = "default_ttl")]
    pub ttl: u32,

    /// How often the file's modification time is checked. 0 disables reloads.
    #[serde(default = "default_reload")]
    pub reload_secs: u64,

    #[serde(default = "default_true")]
    pub fallthrough: bool,

    #[serde(default)]
    pub inline: Vec<String>,
}

impl Default for HostsConfig {
    fn default() -> Self {
        Self {
            path: None,
            zones: default_zones(),
            ttl: default_ttl(),
            reload_secs: default_reload(),
            fallthrough: default_true(),
            inline: Vec::new(),
        }
    }
}

fn default_zones() -> Vec<String> {
    vec![".".to_string()]
}

fn default_ttl() -> u32 {
    3600
}

fn default_reload() -> u64 {
    5
}

fn default_true() -> bool {
    true
}
