use super::upstream::Upstream;
use ferrous_forward_domain::config::{HealthFallback, SelectionPolicy};
use ferrous_forward_domain::DomainError;
use smallvec::SmallVec;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

pub type Candidates = SmallVec<[Arc<Upstream>; 8]>;

/// Orders the upstreams of one zone for a single request.
pub struct UpstreamSelector {
    upstreams: Vec<Arc<Upstream>>,
    policy: SelectionPolicy,
    fallback: HealthFallback,
    counter: AtomicUsize,
}

impl UpstreamSelector {
    pub fn new(upstreams: Vec<Arc<Upstream>>, policy: SelectionPolicy, fallback: HealthFallback) -> Self {
        Self {
            upstreams,
            policy,
            fallback,
            counter: AtomicUsize::new(0),
        }
    }

    pub fn upstreams(&self) -> &[Arc<Upstream>] {
        &self.upstreams
    }

    pub fn policy(&self) -> SelectionPolicy {
        self.policy
    }

    /// Healthy upstreams in policy order.
    ///
    /// When none is healthy the configured fallback decides: every upstream,
    /// the same list with unhealthy ones last, or an error.
    pub fn candidates(&self) -> Result<Candidates, DomainError> {
        let mut ordered: Candidates = self.upstreams.iter().cloned().collect();
        self.apply_policy(&mut ordered);

        let (healthy, unhealthy): (Candidates, Candidates) =
            ordered.into_iter().partition(|u| u.is_healthy());

        if !healthy.is_empty() {
            return Ok(match self.fallback {
                HealthFallback::AfterHealthy => healthy.into_iter().chain(unhealthy).collect(),
                _ => healthy,
            });
        }

        match self.fallback {
            HealthFallback::Disabled => Err(DomainError::TransportNoHealthyServers),
            HealthFallback::AllCandidates | HealthFallback::AfterHealthy => {
                debug!(
                    upstreams = unhealthy.len(),
                    "No healthy upstream, trying all candidates"
                );
                Ok(unhealthy)
            }
        }
    }

    fn apply_policy(&self, list: &mut Candidates) {
        if list.len() < 2 {
            return;
        }
        match self.policy {
            SelectionPolicy::Sequential => {}
            SelectionPolicy::RoundRobin => {
                let start = self.counter.fetch_add(1, Ordering::Relaxed) % list.len();
                list.rotate_left(start);
            }
            SelectionPolicy::Random => fastrand::shuffle(list.as_mut_slice()),
        }
    }
}
