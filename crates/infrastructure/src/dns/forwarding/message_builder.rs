//! Upstream query construction.
//!
//! The message sent upstream is rebuilt from the client query rather than
//! relayed: the header bits that matter for resolution and the question are
//! copied, and EDNS is reduced to payload size and the DO bit. Client EDNS
//! options never leave this process.

use ferrous_forward_domain::config::EdnsConfig;
use ferrous_forward_domain::DomainError;
use hickory_proto::op::{Edns, Message, MessageType, OpCode, Query};
use hickory_proto::rr::{Name, RecordType};
use hickory_proto::serialize::binary::{BinEncodable, BinEncoder};
use std::str::FromStr;

/// Smallest payload size a DNS message may advertise (RFC 6891).
pub const MIN_UDP_PAYLOAD: u16 = 512;

/// EDNS handling for one forward zone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EdnsPolicy {
    pub max_udp_payload: Option<u16>,
    pub response_option_whitelist: Vec<u16>,
}

impl EdnsPolicy {
    pub fn from_config(config: &EdnsConfig) -> Self {
        Self {
            max_udp_payload: config.max_udp_payload,
            response_option_whitelist: config.response_option_whitelist.clone(),
        }
    }

    pub fn clamp_payload(&self, requested: u16) -> u16 {
        let requested = requested.max(MIN_UDP_PAYLOAD);
        match self.max_udp_payload {
            Some(max) => requested.min(max.max(MIN_UDP_PAYLOAD)),
            None => requested,
        }
    }
}

pub struct MessageBuilder;

impl MessageBuilder {
    /// Builds the template forwarded upstream for `client`.
    ///
    /// The id is a placeholder; [`MessageBuilder::next_attempt`] assigns a
    /// fresh one for every exchange.
    pub fn build_forward(client: &Message, policy: &EdnsPolicy) -> Message {
        let mut message = Message::new(0, MessageType::Query, client.op_code());
        message.set_recursion_desired(client.recursion_desired());
        message.set_checking_disabled(client.checking_disabled());
        message.set_authentic_data(client.authentic_data());
        message.add_queries(client.queries().to_vec());

        if let Some(client_edns) = client.extensions() {
            let mut edns = Edns::new();
            edns.set_max_payload(policy.clamp_payload(client_edns.max_payload()));
            edns.flags_mut().dnssec_ok = client_edns.flags().dnssec_ok;
            message.set_edns(edns);
        }
        message
    }

    /// Stamps a new random id on a copy of `template` and encodes it.
    pub fn next_attempt(template: &Message) -> Result<(Message, Vec<u8>), DomainError> {
        let mut message = template.clone();
        message.set_id(fastrand::u16(..));
        let bytes = Self::serialize_message(&message)?;
        Ok((message, bytes))
    }

    /// `. IN NS`-style health probe for `name`.
    pub fn build_probe(name: &str) -> Result<Message, DomainError> {
        let name = Name::from_str(name).map_err(|e| {
            DomainError::InvalidDomainName(format!("Invalid probe name '{}': {}", name, e))
        })?;
        let mut message = Message::new(fastrand::u16(..), MessageType::Query, OpCode::Query);
        message.set_recursion_desired(true);
        message.add_query(Query::query(name, RecordType::NS));
        Ok(message)
    }

    pub fn serialize_message(message: &Message) -> Result<Vec<u8>, DomainError> {
        let mut buf = Vec::with_capacity(512);
        let mut encoder = BinEncoder::new(&mut buf);

        message.emit(&mut encoder).map_err(|e| {
            DomainError::InvalidDnsQuery(format!("Failed to serialize DNS message: {}", e))
        })?;

        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hickory_proto::rr::rdata::opt::{EdnsCode, EdnsOption};

    fn client_query(with_edns: bool) -> Message {
        let mut message = Message::new(777, MessageType::Query, OpCode::Query);
        message.set_recursion_desired(true);
        message.set_checking_disabled(true);
        message.add_query(Query::query(Name::from_str("example.org.").unwrap(), RecordType::A));
        if with_edns {
            let mut edns = Edns::new();
            edns.set_max_payload(4096);
            edns.flags_mut().dnssec_ok = true;
            edns.options_mut().insert(EdnsOption::Unknown(3, Vec::new()));
            message.set_edns(edns);
        }
        message
    }

    #[test]
    fn test_copies_question_and_flags() {
        let forward = MessageBuilder::build_forward(&client_query(false), &EdnsPolicy::default());
        assert_eq!(forward.queries(), client_query(false).queries());
        assert!(forward.recursion_desired());
        assert!(forward.checking_disabled());
        assert!(forward.extensions().is_none());
    }

    #[test]
    fn test_strips_client_options_but_keeps_do_bit() {
        let forward = MessageBuilder::build_forward(&client_query(true), &EdnsPolicy::default());
        let edns = forward.extensions().as_ref().unwrap();
        assert!(edns.flags().dnssec_ok);
        assert_eq!(edns.max_payload(), 4096);
        assert!(edns.option(EdnsCode::NSID).is_none());
    }

    #[test]
    fn test_clamps_payload() {
        let policy = EdnsPolicy {
            max_udp_payload: Some(1232),
            response_option_whitelist: Vec::new(),
        };
        let forward = MessageBuilder::build_forward(&client_query(true), &policy);
        assert_eq!(forward.extensions().as_ref().unwrap().max_payload(), 1232);
        assert_eq!(policy.clamp_payload(100), MIN_UDP_PAYLOAD);
    }

    #[test]
    fn test_next_attempt_encodes_its_id() {
        let template = MessageBuilder::build_forward(&client_query(false), &EdnsPolicy::default());
        let (message, bytes) = MessageBuilder::next_attempt(&template).unwrap();
        assert_eq!(u16::from_be_bytes([bytes[0], bytes[1]]), message.id());
        assert_eq!(bytes[2] & 0x01, 0x01, "RD flag should be set");
    }

    #[test]
    fn test_probe_asks_for_root_ns() {
        let probe = MessageBuilder::build_probe(".").unwrap();
        assert_eq!(probe.queries()[0].query_type(), RecordType::NS);
        assert!(probe.queries()[0].name().is_root());
    }
}
