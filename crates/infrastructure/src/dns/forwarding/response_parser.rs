use super::message_builder::EdnsPolicy;
use ferrous_forward_domain::DomainError;
use hickory_proto::op::{Edns, Message, MessageType};
use hickory_proto::rr::rdata::opt::EdnsCode;
use std::net::SocketAddr;
use tracing::debug;

pub struct ResponseParser;

impl ResponseParser {
    /// Decodes an upstream reply and checks that it answers `sent`: it must be
    /// a response with the same id and the same single question.
    pub fn parse_reply(
        bytes: &[u8],
        sent: &Message,
        server: SocketAddr,
    ) -> Result<Message, DomainError> {
        let reply = Message::from_vec(bytes).map_err(|e| DomainError::InvalidDnsResponse {
            server: server.to_string(),
            reason: e.to_string(),
        })?;

        if reply.message_type() != MessageType::Response {
            return Err(DomainError::InvalidDnsResponse {
                server: server.to_string(),
                reason: "QR bit not set".into(),
            });
        }

        if reply.id() != sent.id() || reply.queries() != sent.queries() {
            debug!(
                server = %server,
                sent_id = sent.id(),
                reply_id = reply.id(),
                "Reply does not match the outstanding query"
            );
            return Err(DomainError::MismatchedResponse {
                server: server.to_string(),
            });
        }

        Ok(reply)
    }

    /// Rebuilds the reply sent to the client from a validated upstream reply.
    ///
    /// The id and question come from the client. Header bits and every
    /// record section come from the upstream. An OPT record is present only
    /// when the client sent one; it advertises `payload`, carries the DO bit
    /// of the upstream reply and only the whitelisted upstream options.
    pub fn build_client_response(
        client: &Message,
        upstream: &Message,
        payload: u16,
        policy: &EdnsPolicy,
    ) -> Message {
        let mut response = Message::new(client.id(), MessageType::Response, upstream.op_code());
        response.set_authoritative(upstream.authoritative());
        response.set_truncated(upstream.truncated());
        response.set_recursion_desired(client.recursion_desired());
        response.set_recursion_available(upstream.recursion_available());
        response.set_authentic_data(upstream.authentic_data());
        response.set_checking_disabled(upstream.checking_disabled());
        response.set_response_code(upstream.response_code());

        response.add_queries(client.queries().to_vec());
        response.add_answers(upstream.answers().to_vec());
        response.add_authorities(upstream.authorities().to_vec());
        response.add_additionals(upstream.additionals().to_vec());

        if let Some(client_edns) = client.extensions() {
            let mut edns = Edns::new();
            edns.set_max_payload(payload);
            match upstream.extensions() {
                Some(upstream_edns) => {
                    edns.flags_mut().dnssec_ok = upstream_edns.flags().dnssec_ok;
                    for code in &policy.response_option_whitelist {
                        if let Some(option) = upstream_edns.option(EdnsCode::from(*code)) {
                            edns.options_mut().insert(option.clone());
                        }
                    }
                }
                None => edns.flags_mut().dnssec_ok = client_edns.flags().dnssec_ok,
            }
            response.set_edns(edns);
        }

        response
    }
}
