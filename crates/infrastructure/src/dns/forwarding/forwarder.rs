//! Per-request upstream exchange loop.
//!
//! The candidate list is taken once per request and cycled until an attempt
//! succeeds or `max_attempts` is spent. Every attempt borrows a connection
//! from the upstream's pool, sends a copy of the forward template with a new
//! id and validates the reply before it is accepted.

use super::message_builder::{MessageBuilder, MIN_UDP_PAYLOAD};
use super::response_parser::ResponseParser;
use crate::dns::events::{ExchangeEvent, ExchangeOutcome, ForwardEvent, ForwardEventEmitter};
use crate::dns::load_balancer::{ForwardZone, Upstream};
use ferrous_forward_application::RequestContext;
use ferrous_forward_domain::{ClientTransport, DomainError, TransportKind};
use hickory_proto::op::Message;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// A client-facing response and where it came from.
#[derive(Debug, Clone)]
pub struct ExchangeResult {
    pub response: Message,
    pub upstream: Arc<str>,
    pub transport: TransportKind,
    pub elapsed: Duration,
    pub attempts: usize,
}

#[derive(Debug, Clone, Default)]
pub struct Forwarder {
    emitter: ForwardEventEmitter,
}

impl Forwarder {
    pub fn new(emitter: ForwardEventEmitter) -> Self {
        Self { emitter }
    }

    pub async fn forward(
        &self,
        ctx: &RequestContext,
        zone: &ForwardZone,
        query: &Message,
    ) -> Result<ExchangeResult, DomainError> {
        let start = Instant::now();
        ctx.check()?;

        let settings = zone.settings();
        let candidates = zone.selector().candidates()?;
        let template = MessageBuilder::build_forward(query, &settings.edns);
        let payload = template
            .extensions()
            .as_ref()
            .map(|edns| edns.max_payload())
            .unwrap_or(MIN_UDP_PAYLOAD);

        let mut last_error: Option<DomainError> = None;

        for attempt in 0..settings.max_attempts {
            ctx.check()?;
            let upstream = &candidates[attempt % candidates.len()];
            let kind = upstream.transport_for(ctx.client_transport());

            let attempt_start = Instant::now();
            let result = self.attempt(ctx, zone, upstream, kind, &template).await;
            self.emit_exchange(zone, upstream, kind, &result, attempt_start, attempt);

            match result {
                Ok((reply, transport)) => {
                    upstream.health().record_live_success();
                    debug!(
                        zone = %zone.name(),
                        upstream = %upstream.label(),
                        transport = %transport,
                        attempt,
                        rcode = ?reply.response_code(),
                        "Upstream answered"
                    );
                    let response =
                        ResponseParser::build_client_response(query, &reply, payload, &settings.edns);
                    return Ok(ExchangeResult {
                        response,
                        upstream: upstream.label().clone(),
                        transport,
                        elapsed: start.elapsed(),
                        attempts: attempt + 1,
                    });
                }
                Err(e) if e.is_cancelled() || matches!(e, DomainError::QueryTimeout) => {
                    return Err(e);
                }
                Err(e) => {
                    if e.counts_against_upstream() {
                        upstream.health().record_live_failure();
                    }
                    warn!(
                        zone = %zone.name(),
                        upstream = %upstream.label(),
                        attempt,
                        error = %e,
                        "Upstream exchange failed"
                    );
                    if !e.is_retryable() {
                        return Err(e);
                    }
                    last_error = Some(e);
                }
            }
        }

        Err(DomainError::TransportAllServersUnreachable {
            attempts: settings.max_attempts,
            last_error: last_error.map(|e| e.to_string()).unwrap_or_default(),
        })
    }

    /// One attempt against one upstream, including the TCP retry of a
    /// truncated UDP reply for TCP clients.
    async fn attempt(
        &self,
        ctx: &RequestContext,
        zone: &ForwardZone,
        upstream: &Upstream,
        kind: TransportKind,
        template: &Message,
    ) -> Result<(Message, TransportKind), DomainError> {
        let reply = self.exchange(ctx, zone, upstream, kind, template).await?;

        if reply.truncated()
            && kind == TransportKind::Udp
            && ctx.client_transport() == ClientTransport::Tcp
            && upstream.can_upgrade_to_tcp()
        {
            debug!(upstream = %upstream.label(), "Truncated UDP reply, retrying over TCP");
            let reply = self
                .exchange(ctx, zone, upstream, TransportKind::Tcp, template)
                .await?;
            return Ok((reply, TransportKind::Tcp));
        }
        Ok((reply, kind))
    }

    async fn exchange(
        &self,
        ctx: &RequestContext,
        zone: &ForwardZone,
        upstream: &Upstream,
        kind: TransportKind,
        template: &Message,
    ) -> Result<Message, DomainError> {
        let pool = upstream.pool(kind)?;
        let server = pool.connector().server();
        let timeout = zone.settings().exchange_timeout;

        loop {
            let mut conn = pool.get(ctx).await?;
            let (sent, bytes) = MessageBuilder::next_attempt(template)?;

            let result = ctx
                .run_with_timeout(
                    timeout,
                    DomainError::TransportTimeout {
                        server: server.to_string(),
                    },
                    conn.exchange(&bytes),
                )
                .await
                .map_err(|e| match e {
                    // The request deadline cut this exchange short: it still
                    // timed out on this upstream.
                    DomainError::QueryTimeout => DomainError::TransportTimeout {
                        server: server.to_string(),
                    },
                    other => other,
                })
                .and_then(|reply| ResponseParser::parse_reply(&reply, &sent, server));

            match result {
                Ok(reply) => {
                    pool.put(conn, true);
                    return Ok(reply);
                }
                // The peer closed an idle pooled stream; retry on another one.
                Err(ref e) if conn.is_reused() && is_stale_connection(e) => {
                    debug!(server = %server, error = %e, "Discarding stale pooled connection");
                    pool.put(conn, false);
                }
                Err(e) => {
                    pool.put(conn, false);
                    return Err(e);
                }
            }
        }
    }

    fn emit_exchange(
        &self,
        zone: &ForwardZone,
        upstream: &Upstream,
        kind: TransportKind,
        result: &Result<(Message, TransportKind), DomainError>,
        start: Instant,
        attempt: usize,
    ) {
        self.emitter.emit_with(|| {
            ForwardEvent::Exchange(ExchangeEvent {
                zone: zone.label().clone(),
                upstream: upstream.label().clone(),
                transport: result.as_ref().map(|(_, t)| *t).unwrap_or(kind),
                outcome: ExchangeOutcome::from_result(result),
                latency_us: start.elapsed().as_micros() as u64,
                attempt,
            })
        });
    }
}

fn is_stale_connection(e: &DomainError) -> bool {
    matches!(
        e,
        DomainError::TransportConnectionReset { .. } | DomainError::TransportError { .. }
    )
}
