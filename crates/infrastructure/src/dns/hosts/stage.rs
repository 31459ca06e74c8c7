use super::hosts_file::{reverse_name_to_addr, HostsFile};
use async_trait::async_trait;
use ferrous_forward_application::ports::{PipelineStage, StageOutcome};
use ferrous_forward_application::use_cases::error_response;
use ferrous_forward_application::RequestContext;
use ferrous_forward_domain::config::HostsConfig;
use ferrous_forward_domain::{DomainError, ZoneName};
use hickory_proto::op::{Message, MessageType, ResponseCode};
use hickory_proto::rr::rdata::{A, AAAA, PTR};
use hickory_proto::rr::{Name, RData, Record, RecordType};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

/// Answers A, AAAA and PTR queries from a hosts table.
///
/// A name present in the table under another type gets an empty
/// authoritative answer. Unknown names go to the next stage when
/// fallthrough is enabled and get SERVFAIL otherwise.
pub struct HostsStage {
    hosts: Arc<HostsFile>,
    zones: Vec<ZoneName>,
    ttl: u32,
    fallthrough: bool,
}

impl HostsStage {
    pub fn new(hosts: Arc<HostsFile>, zones: Vec<ZoneName>, ttl: u32, fallthrough: bool) -> Self {
        Self {
            hosts,
            zones,
            ttl,
            fallthrough,
        }
    }

    pub fn from_config(config: &HostsConfig) -> Result<Self, DomainError> {
        let zones = config
            .zones
            .iter()
            .map(|z| z.parse::<ZoneName>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(DomainError::ConfigError)?;
        let hosts = HostsFile::new(config.path.as_ref().map(PathBuf::from), &config.inline);
        Ok(Self::new(Arc::new(hosts), zones, config.ttl, config.fallthrough))
    }

    pub fn hosts(&self) -> &Arc<HostsFile> {
        &self.hosts
    }

    fn answers(&self, name: &Name, qname: &str, qtype: RecordType) -> Vec<Record> {
        let table = self.hosts.snapshot();
        let rdata: Vec<RData> = match qtype {
            RecordType::A => table.lookup_v4(qname).iter().map(|ip| RData::A(A(*ip))).collect(),
            RecordType::AAAA => table
                .lookup_v6(qname)
                .iter()
                .map(|ip| RData::AAAA(AAAA(*ip)))
                .collect(),
            RecordType::PTR => match reverse_name_to_addr(qname) {
                Some(addr) => table
                    .lookup_addr(addr)
                    .iter()
                    .filter_map(|host| Name::from_str(host).ok())
                    .map(|host| RData::PTR(PTR(host)))
                    .collect(),
                None => Vec::new(),
            },
            _ => Vec::new(),
        };
        rdata
            .into_iter()
            .map(|data| Record::from_rdata(name.clone(), self.ttl, data))
            .collect()
    }
}

#[async_trait]
impl PipelineStage for HostsStage {
    fn name(&self) -> &'static str {
        "hosts"
    }

    async fn handle(&self, _ctx: &RequestContext, query: &Message) -> Result<StageOutcome, DomainError> {
        let Some(question) = query.queries().first() else {
            return Ok(StageOutcome::Continue);
        };
        let qname = question.name().to_ascii();
        if !self.zones.iter().any(|zone| zone.contains(&qname)) {
            return Ok(StageOutcome::Continue);
        }

        let answers = self.answers(question.name(), &qname, question.query_type());
        if answers.is_empty() && !self.hosts.snapshot().contains_name(&qname) {
            if self.fallthrough {
                return Ok(StageOutcome::Continue);
            }
            debug!(domain = %qname, "Name not in hosts table");
            return Ok(StageOutcome::Respond(error_response(query, ResponseCode::ServFail)));
        }

        let mut response = Message::new(query.id(), MessageType::Response, query.op_code());
        response.set_authoritative(true);
        response.set_recursion_desired(query.recursion_desired());
        response.add_queries(query.queries().to_vec());
        response.add_answers(answers);
        response.set_response_code(ResponseCode::NoError);
        Ok(StageOutcome::Respond(response))
    }
}
