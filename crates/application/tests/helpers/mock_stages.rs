use async_trait::async_trait;
use ferrous_forward_application::ports::{PipelineStage, StageOutcome};
use ferrous_forward_application::RequestContext;
use ferrous_forward_domain::DomainError;
use hickory_proto::op::{Message, MessageType, OpCode, Query, ResponseCode};
use hickory_proto::rr::{Name, RecordType};
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};

pub enum MockBehavior {
    Continue,
    Respond(ResponseCode),
    Fail(DomainError),
}

pub struct MockStage {
    name: &'static str,
    behavior: MockBehavior,
    calls: AtomicUsize,
}

impl MockStage {
    pub fn continuing(name: &'static str) -> Self {
        Self::with_behavior(name, MockBehavior::Continue)
    }

    pub fn responding(name: &'static str, rcode: ResponseCode) -> Self {
        Self::with_behavior(name, MockBehavior::Respond(rcode))
    }

    pub fn failing(name: &'static str, error: DomainError) -> Self {
        Self::with_behavior(name, MockBehavior::Fail(error))
    }

    fn with_behavior(name: &'static str, behavior: MockBehavior) -> Self {
        Self {
            name,
            behavior,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PipelineStage for MockStage {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn handle(
        &self,
        _ctx: &RequestContext,
        query: &Message,
    ) -> Result<StageOutcome, DomainError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            MockBehavior::Continue => Ok(StageOutcome::Continue),
            MockBehavior::Respond(rcode) => {
                let mut response =
                    Message::new(query.id(), MessageType::Response, query.op_code());
                response.add_queries(query.queries().to_vec());
                response.set_response_code(*rcode);
                Ok(StageOutcome::Respond(response))
            }
            MockBehavior::Fail(e) => Err(e.clone()),
        }
    }
}

pub fn build_query(name: &str, record_type: RecordType) -> Message {
    let mut message = Message::new(4242, MessageType::Query, OpCode::Query);
    message.set_recursion_desired(true);
    message.add_query(Query::query(Name::from_str(name).unwrap(), record_type));
    message
}
