use super::UpstreamRegistry;
use ferrous_forward_application::ports::{UpstreamHealthPort, UpstreamHealthSnapshot};
use std::sync::Arc;

pub struct UpstreamHealthAdapter {
    registry: Arc<UpstreamRegistry>,
}

impl UpstreamHealthAdapter {
    pub fn new(registry: Arc<UpstreamRegistry>) -> Self {
        Self { registry }
    }
}

impl UpstreamHealthPort for UpstreamHealthAdapter {
    fn get_all_upstream_status(&self) -> Vec<UpstreamHealthSnapshot> {
        self.registry
            .zones()
            .iter()
            .flat_map(|zone| {
                zone.upstreams().iter().map(move |upstream| UpstreamHealthSnapshot {
                    zone: zone.name().to_string(),
                    upstream: upstream.label().to_string(),
                    status: upstream.health().status(),
                    consecutive_failures: upstream.health().consecutive_failures(),
                })
            })
            .collect()
    }
}
