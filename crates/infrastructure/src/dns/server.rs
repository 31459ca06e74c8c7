use crate::dns::forwarding::MessageBuilder;
use ferrous_forward_application::use_cases::{error_response, HandleDnsQueryUseCase};
use ferrous_forward_application::RequestContext;
use ferrous_forward_domain::ClientTransport;
use hickory_proto::op::{Message, MessageType, OpCode, ResponseCode};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

const DNS_HEADER_LEN: usize = 12;
const DEFAULT_UDP_PAYLOAD: usize = 512;

/// Wire-level entry point shared by the UDP and TCP listeners.
#[derive(Clone)]
pub struct DnsServerHandler {
    use_case: Arc<HandleDnsQueryUseCase>,
    request_timeout: Duration,
}

impl DnsServerHandler {
    pub fn new(use_case: Arc<HandleDnsQueryUseCase>, request_timeout: Duration) -> Self {
        Self {
            use_case,
            request_timeout,
        }
    }

    /// Handles one raw query and returns the encoded reply.
    ///
    /// `None` means nothing should be sent: the packet was not a query or
    /// was too short to answer. `parent` is cancelled when the client goes
    /// away or the server shuts down.
    pub async fn handle_raw(
        &self,
        bytes: &[u8],
        transport: ClientTransport,
        client: SocketAddr,
        parent: &CancellationToken,
    ) -> Option<Vec<u8>> {
        if bytes.len() < DNS_HEADER_LEN || bytes[2] & 0x80 != 0 {
            debug!(client = %client, len = bytes.len(), "Dropping non-query packet");
            return None;
        }

        let query = match Message::from_vec(bytes) {
            Ok(query) => query,
            Err(e) => {
                debug!(client = %client, error = %e, "Malformed query");
                let id = u16::from_be_bytes([bytes[0], bytes[1]]);
                let mut response = Message::new(id, MessageType::Response, OpCode::Query);
                response.set_response_code(ResponseCode::FormErr);
                return MessageBuilder::serialize_message(&response).ok();
            }
        };

        let ctx = RequestContext::new(self.request_timeout, transport)
            .with_client_addr(client)
            .with_parent(parent);

        let response = self.use_case.execute(&ctx, &query).await;
        if ctx.is_cancelled() {
            return None;
        }

        let limit = match transport {
            ClientTransport::Udp => udp_payload_limit(&query),
            ClientTransport::Tcp => u16::MAX as usize,
        };
        self.encode(&query, response, limit)
    }

    fn encode(&self, query: &Message, response: Message, limit: usize) -> Option<Vec<u8>> {
        let bytes = match MessageBuilder::serialize_message(&response) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(error = %e, "Failed to encode response");
                return MessageBuilder::serialize_message(&error_response(
                    query,
                    ResponseCode::ServFail,
                ))
                .ok();
            }
        };

        if bytes.len() <= limit {
            return Some(bytes);
        }

        debug!(size = bytes.len(), limit, "Response too large, truncating");
        MessageBuilder::serialize_message(&truncated(&response)).ok()
    }
}

/// Largest reply a UDP client accepts: its EDNS payload size, or 512.
fn udp_payload_limit(query: &Message) -> usize {
    query
        .extensions()
        .as_ref()
        .map(|edns| (edns.max_payload() as usize).max(DEFAULT_UDP_PAYLOAD))
        .unwrap_or(DEFAULT_UDP_PAYLOAD)
}

/// Header, question and OPT of `response` with the TC bit set.
fn truncated(response: &Message) -> Message {
    let mut message = Message::new(response.id(), MessageType::Response, response.op_code());
    message.set_authoritative(response.authoritative());
    message.set_truncated(true);
    message.set_recursion_desired(response.recursion_desired());
    message.set_recursion_available(response.recursion_available());
    message.set_authentic_data(response.authentic_data());
    message.set_checking_disabled(response.checking_disabled());
    message.set_response_code(response.response_code());
    message.add_queries(response.queries().to_vec());
    if let Some(edns) = response.extensions() {
        message.set_edns(edns.clone());
    }
    message
}
