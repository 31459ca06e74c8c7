mod helpers;

use ferrous_forward_application::ports::PipelineStage;
use ferrous_forward_application::use_cases::HandleDnsQueryUseCase;
use ferrous_forward_application::RequestContext;
use ferrous_forward_domain::{ClientTransport, DomainError};
use helpers::{build_query, MockStage};
use hickory_proto::op::{MessageType, OpCode, ResponseCode};
use hickory_proto::rr::RecordType;
use std::sync::Arc;
use std::time::Duration;

fn ctx() -> RequestContext {
    RequestContext::new(Duration::from_secs(2), ClientTransport::Udp)
}

#[tokio::test]
async fn test_first_responding_stage_wins() {
    let hosts = Arc::new(MockStage::continuing("hosts"));
    let forward = Arc::new(MockStage::responding("forward", ResponseCode::NXDomain));
    let tail = Arc::new(MockStage::responding("tail", ResponseCode::NoError));
    let use_case = HandleDnsQueryUseCase::new(vec![
        hosts.clone() as Arc<dyn PipelineStage>,
        forward.clone(),
        tail.clone(),
    ]);

    let query = build_query("example.org.", RecordType::A);
    let response = use_case.execute(&ctx(), &query).await;

    assert_eq!(response.response_code(), ResponseCode::NXDomain);
    assert_eq!(response.id(), query.id());
    assert_eq!(hosts.calls(), 1);
    assert_eq!(forward.calls(), 1);
    assert_eq!(tail.calls(), 0);
}

#[tokio::test]
async fn test_stage_error_becomes_servfail() {
    let forward = Arc::new(MockStage::failing(
        "forward",
        DomainError::TransportAllServersUnreachable {
            attempts: 3,
            last_error: "timeout".into(),
        },
    ));
    let use_case = HandleDnsQueryUseCase::new(vec![forward as Arc<dyn PipelineStage>]);

    let query = build_query("example.org.", RecordType::A);
    let response = use_case.execute(&ctx(), &query).await;

    assert_eq!(response.response_code(), ResponseCode::ServFail);
    assert_eq!(response.message_type(), MessageType::Response);
    assert_eq!(response.queries(), query.queries());
    assert!(response.recursion_desired());
}

#[tokio::test]
async fn test_unanswered_query_becomes_servfail() {
    let use_case = HandleDnsQueryUseCase::new(vec![
        Arc::new(MockStage::continuing("hosts")) as Arc<dyn PipelineStage>
    ]);

    let response = use_case
        .execute(&ctx(), &build_query("example.org.", RecordType::AAAA))
        .await;

    assert_eq!(response.response_code(), ResponseCode::ServFail);
}

#[tokio::test]
async fn test_non_query_opcode_is_not_implemented() {
    let forward = Arc::new(MockStage::responding("forward", ResponseCode::NoError));
    let use_case = HandleDnsQueryUseCase::new(vec![forward.clone() as Arc<dyn PipelineStage>]);

    let mut query = build_query("example.org.", RecordType::SOA);
    query.set_op_code(OpCode::Update);
    let response = use_case.execute(&ctx(), &query).await;

    assert_eq!(response.response_code(), ResponseCode::NotImp);
    assert_eq!(forward.calls(), 0);
}

#[tokio::test]
async fn test_response_message_is_rejected() {
    let forward = Arc::new(MockStage::responding("forward", ResponseCode::NoError));
    let use_case = HandleDnsQueryUseCase::new(vec![forward.clone() as Arc<dyn PipelineStage>]);

    let mut query = build_query("example.org.", RecordType::A);
    let mut header = *query.header();
    header.set_message_type(MessageType::Response);
    query.set_header(header);
    let response = use_case.execute(&ctx(), &query).await;

    assert_eq!(response.response_code(), ResponseCode::FormErr);
    assert_eq!(forward.calls(), 0);
}

#[test]
fn test_stage_names_follow_configuration_order() {
    let use_case = HandleDnsQueryUseCase::new(vec![
        Arc::new(MockStage::continuing("hosts")) as Arc<dyn PipelineStage>,
        Arc::new(MockStage::continuing("forward")),
    ]);
    assert_eq!(use_case.stage_names(), vec!["hosts", "forward"]);
}
