use crate::context::RequestContext;
use async_trait::async_trait;
use ferrous_forward_domain::DomainError;
use hickory_proto::op::Message;

/// Result of one pipeline stage.
#[derive(Debug)]
pub enum StageOutcome {
    /// The stage did not answer; the next stage runs.
    Continue,
    /// Final answer for the client. Later stages are skipped.
    Respond(Message),
}

/// One step of the request pipeline.
///
/// Stages run in configuration order. An `Err` ends the pipeline and the
/// client receives SERVFAIL.
#[async_trait]
pub trait PipelineStage: Send + Sync {
    fn name(&self) -> &'static str;

    async fn handle(
        &self,
        ctx: &RequestContext,
        query: &Message,
    ) -> Result<StageOutcome, DomainError>;
}
