//! The Proxy Gateway: one request in, at most one upstream call out, the response relayed back.
//!
//! Hosting runtimes plug in through [`HostAdapter`] (request parsing and the upstream call) and
//! [`ResponseWriter`] (the caller-facing response). Everything else is shared.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use web_time::Instant;

use crate::config::GatewayConfig;
use crate::cors::CorsHeaders;
use crate::error::GatewayError;
use crate::failure::failure_response;
use crate::headers::normalize_headers;
use crate::http::{is_preflight, HeaderMap, Method, StatusCode};
use crate::proxy::{UpstreamRequest, UpstreamResponse};
use crate::pump::{is_event_stream, pump, response_head, ResponseWriter};
use crate::relay::{relay_body, RequestBody};
use crate::response::FixedResponse;
use crate::sse::SseFramer;
use crate::target::{resolve_target, TargetSource};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HostCapabilities {
    /// The runtime can stream request and response bodies. When `false`, bodies are read fully
    /// into memory before they are forwarded.
    pub streaming_body: bool,
}

impl HostCapabilities {
    pub const STREAMING: Self = Self {
        streaming_body: true,
    };
    pub const BUFFERED: Self = Self {
        streaming_body: false,
    };
}

/// Host-neutral view of the caller's request.
#[derive(Debug)]
pub struct InboundRequest {
    pub method: Method,
    pub target: TargetSource,
    pub headers: HeaderMap,
    pub body: RequestBody,
}

impl InboundRequest {
    pub fn new(method: Method, target: TargetSource, headers: HeaderMap, body: RequestBody) -> Self {
        Self {
            method,
            target,
            headers,
            body,
        }
    }
}

#[async_trait(?Send)]
pub trait HostAdapter {
    /// The runtime's native request type.
    type Inbound: 'static;

    fn capabilities(&self) -> HostCapabilities;

    async fn parse_request(&self, inbound: Self::Inbound) -> Result<InboundRequest, GatewayError>;

    /// Performs the single upstream call. An `Err` means no response was received at all; HTTP
    /// error statuses come back as `Ok`.
    async fn open_upstream_call(
        &self,
        request: UpstreamRequest,
    ) -> Result<UpstreamResponse, GatewayError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RelayKind {
    Preflight,
    Relayed,
    UpstreamFailure,
    Rejected,
}

impl fmt::Display for RelayKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RelayKind::Preflight => "preflight",
            RelayKind::Relayed => "relayed",
            RelayKind::UpstreamFailure => "upstream_failure",
            RelayKind::Rejected => "rejected",
        })
    }
}

/// What happened to one request. `error` is informational; the caller has already been answered.
#[derive(Debug)]
pub struct RelayOutcome {
    pub status: StatusCode,
    pub kind: RelayKind,
    pub chunks: usize,
    pub bytes: usize,
    pub events: Option<usize>,
    pub error: Option<GatewayError>,
}

impl RelayOutcome {
    fn new(status: StatusCode, kind: RelayKind) -> Self {
        Self {
            status,
            kind,
            chunks: 0,
            bytes: 0,
            events: None,
            error: None,
        }
    }
}

#[derive(Clone)]
pub struct Gateway {
    config: Arc<GatewayConfig>,
}

impl Gateway {
    pub fn new(config: GatewayConfig) -> Self {
        Self::from_shared(Arc::new(config))
    }

    pub fn from_shared(config: Arc<GatewayConfig>) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Parses `inbound` with `adapter` and handles it. Never fails: every error is answered on
    /// `writer` and reported in the outcome.
    pub async fn serve<A, W>(&self, adapter: &A, inbound: A::Inbound, writer: &mut W) -> RelayOutcome
    where
        A: HostAdapter + ?Sized,
        W: ResponseWriter + ?Sized,
    {
        match adapter.parse_request(inbound).await {
            Ok(request) => self.handle(adapter, request, writer).await,
            Err(err) => {
                let started = Instant::now();
                let cors = CorsHeaders::for_request(&self.config, &HeaderMap::new());
                let outcome = reject(err, &cors, writer).await;
                log_outcome("-", "-", &outcome, started.elapsed());
                outcome
            }
        }
    }

    pub async fn handle<A, W>(
        &self,
        adapter: &A,
        request: InboundRequest,
        writer: &mut W,
    ) -> RelayOutcome
    where
        A: HostAdapter + ?Sized,
        W: ResponseWriter + ?Sized,
    {
        let started = Instant::now();
        let method = request.method.clone();
        let path = request.target.inbound_path().to_string();

        let outcome = self.relay(adapter, request, writer).await;
        log_outcome(method.as_str(), &path, &outcome, started.elapsed());
        outcome
    }

    async fn relay<A, W>(&self, adapter: &A, request: InboundRequest, writer: &mut W) -> RelayOutcome
    where
        A: HostAdapter + ?Sized,
        W: ResponseWriter + ?Sized,
    {
        let InboundRequest {
            method,
            target,
            headers,
            body,
        } = request;
        let cors = CorsHeaders::for_request(&self.config, &headers);

        if is_preflight(&method) {
            return respond(cors.preflight(), RelayKind::Preflight, None, writer).await;
        }

        let capabilities = adapter.capabilities();
        let descriptor = resolve_target(&self.config, &target);
        let mut outbound = normalize_headers(&self.config, &headers);
        drop(headers);

        let body = match relay_body(&method, body, &mut outbound, capabilities).await {
            Ok(body) => body,
            Err(err) => return reject(err, &cors, writer).await,
        };
        let uri = match descriptor.uri() {
            Ok(uri) => uri,
            Err(err) => return reject(err, &cors, writer).await,
        };

        log::debug!("forwarding {} {}", method, descriptor);
        let request = UpstreamRequest::new(method, uri, outbound, body);
        let upstream = match adapter.open_upstream_call(request).await {
            Ok(upstream) => upstream,
            Err(err) => {
                let response = failure_response(&self.config, &cors, &err);
                return respond(response, RelayKind::UpstreamFailure, Some(err), writer).await;
            }
        };

        let (status, upstream_headers, body) = upstream.into_parts();
        let head = response_head(&upstream_headers, &cors);
        let framer = is_event_stream(&upstream_headers).then(SseFramer::new);

        let mut outcome = RelayOutcome::new(status, RelayKind::Relayed);
        if let Err(err) = writer.write_head(status, &head).await {
            drop(body);
            if let Err(close_err) = writer.close().await {
                log::debug!("closing writer after failed head: {}", close_err);
            }
            outcome.error = Some(err);
            return outcome;
        }

        let pumped = pump(body, writer, capabilities, framer).await;
        outcome.chunks = pumped.chunks;
        outcome.bytes = pumped.bytes;
        outcome.events = pumped.events;
        outcome.error = pumped.error;
        outcome
    }
}

impl fmt::Debug for Gateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gateway")
            .field("config", &self.config)
            .finish()
    }
}

async fn reject<W>(err: GatewayError, cors: &CorsHeaders, writer: &mut W) -> RelayOutcome
where
    W: ResponseWriter + ?Sized,
{
    let response = FixedResponse::json_error(err.status(), &err.message(), cors);
    respond(response, RelayKind::Rejected, Some(err), writer).await
}

async fn respond<W>(
    response: FixedResponse,
    kind: RelayKind,
    error: Option<GatewayError>,
    writer: &mut W,
) -> RelayOutcome
where
    W: ResponseWriter + ?Sized,
{
    let mut outcome = RelayOutcome::new(response.status(), kind);
    outcome.error = error;
    match response.write_to(writer).await {
        Ok(written) => {
            outcome.bytes = written;
            outcome.chunks = usize::from(written > 0);
        }
        Err(err) => {
            outcome.error.get_or_insert(err);
        }
    }
    outcome
}

fn log_outcome(method: &str, path: &str, outcome: &RelayOutcome, elapsed: Duration) {
    let elapsed_ms = elapsed.as_secs_f64() * 1000.0;
    let events = outcome
        .events
        .map(|count| count.to_string())
        .unwrap_or_else(|| "-".to_string());

    match &outcome.error {
        Some(err) if !err.is_disconnect() => log::warn!(
            "relay method={} path={} status={} kind={} chunks={} bytes={} events={} error={} elapsed_ms={:.2}",
            method,
            path,
            outcome.status.as_u16(),
            outcome.kind,
            outcome.chunks,
            outcome.bytes,
            events,
            err,
            elapsed_ms
        ),
        _ => log::info!(
            "relay method={} path={} status={} kind={} chunks={} bytes={} events={} elapsed_ms={:.2}",
            method,
            path,
            outcome.status.as_u16(),
            outcome.kind,
            outcome.chunks,
            outcome.bytes,
            events,
            elapsed_ms
        ),
    }
}
