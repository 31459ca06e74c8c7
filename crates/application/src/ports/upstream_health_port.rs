/// Status of an upstream DNS server as seen by its health checker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamStatus {
    Healthy,
    Unhealthy,
}

impl UpstreamStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Unhealthy => "unhealthy",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamHealthSnapshot {
    pub zone: String,
    pub upstream: String,
    pub status: UpstreamStatus,
    pub consecutive_failures: u32,
}

/// Read-only view over the health of every configured upstream.
pub trait UpstreamHealthPort: Send + Sync {
    fn get_all_upstream_status(&self) -> Vec<UpstreamHealthSnapshot>;

    fn healthy_count(&self) -> usize {
        self.get_all_upstream_status()
            .iter()
            .filter(|s| s.status == UpstreamStatus::Healthy)
            .count()
    }
}
