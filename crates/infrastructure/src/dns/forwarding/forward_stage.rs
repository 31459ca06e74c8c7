use super::forwarder::Forwarder;
use crate::dns::load_balancer::UpstreamRegistry;
use async_trait::async_trait;
use ferrous_forward_application::ports::{PipelineStage, StageOutcome};
use ferrous_forward_application::RequestContext;
use ferrous_forward_domain::DomainError;
use hickory_proto::op::Message;
use std::sync::Arc;
use tracing::debug;

/// Pipeline stage forwarding queries whose name falls in a configured zone.
pub struct ForwardStage {
    registry: Arc<UpstreamRegistry>,
    forwarder: Forwarder,
}

impl ForwardStage {
    pub fn new(registry: Arc<UpstreamRegistry>, forwarder: Forwarder) -> Self {
        Self {
            registry,
            forwarder,
        }
    }
}

#[async_trait]
impl PipelineStage for ForwardStage {
    fn name(&self) -> &'static str {
        "forward"
    }

    async fn handle(&self, ctx: &RequestContext, query: &Message) -> Result<StageOutcome, DomainError> {
        let Some(question) = query.queries().first() else {
            return Ok(StageOutcome::Continue);
        };
        let qname = question.name().to_ascii();

        let Some(zone) = self.registry.route(&qname) else {
            debug!(domain = %qname, "No forward zone for query");
            return Ok(StageOutcome::Continue);
        };

        let result = self.forwarder.forward(ctx, zone, query).await?;
        debug!(
            domain = %qname,
            upstream = %result.upstream,
            attempts = result.attempts,
            elapsed_ms = result.elapsed.as_millis() as u64,
            "Query forwarded"
        );
        Ok(StageOutcome::Respond(result.response))
    }
}
