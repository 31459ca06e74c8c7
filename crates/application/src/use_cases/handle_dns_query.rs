use crate::context::RequestContext;
use crate::ports::{PipelineStage, StageOutcome};
use hickory_proto::op::{Message, MessageType, OpCode, ResponseCode};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Runs an inbound query through the ordered stage list.
///
/// Never fails: a stage error or a query no stage answers becomes SERVFAIL,
/// and queries the server cannot handle become FORMERR or NOTIMP.
pub struct HandleDnsQueryUseCase {
    stages: Vec<Arc<dyn PipelineStage>>,
}

impl HandleDnsQueryUseCase {
    pub fn new(stages: Vec<Arc<dyn PipelineStage>>) -> Self {
        Self { stages }
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    pub async fn execute(&self, ctx: &RequestContext, query: &Message) -> Message {
        let start = Instant::now();

        if query.message_type() != MessageType::Query {
            return error_response(query, ResponseCode::FormErr);
        }
        if query.op_code() != OpCode::Query {
            return error_response(query, ResponseCode::NotImp);
        }
        if query.queries().len() != 1 {
            return error_response(query, ResponseCode::FormErr);
        }

        let qname = query.queries()[0].name().to_string();

        for stage in &self.stages {
            match stage.handle(ctx, query).await {
                Ok(StageOutcome::Continue) => continue,
                Ok(StageOutcome::Respond(response)) => {
                    debug!(
                        stage = stage.name(),
                        domain = %qname,
                        rcode = ?response.response_code(),
                        elapsed_us = start.elapsed().as_micros() as u64,
                        "Query answered"
                    );
                    return response;
                }
                Err(e) => {
                    warn!(stage = stage.name(), domain = %qname, error = %e, "Stage failed");
                    return error_response(query, ResponseCode::ServFail);
                }
            }
        }

        debug!(domain = %qname, "No stage answered the query");
        error_response(query, ResponseCode::ServFail)
    }
}

/// Builds an empty reply echoing the question and RD bit of `query`.
pub fn error_response(query: &Message, rcode: ResponseCode) -> Message {
    let mut response = Message::new(query.id(), MessageType::Response, query.op_code());
    response.set_recursion_desired(query.recursion_desired());
    response.set_checking_disabled(query.checking_disabled());
    response.add_queries(query.queries().to_vec());
    response.set_response_code(rcode);
    response
}
