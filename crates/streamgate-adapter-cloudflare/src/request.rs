use std::fmt;

use bytes::Bytes;
use futures_util::StreamExt;
use streamgate_core::body::Body;
use streamgate_core::config::{ConfigError, GatewayConfig, GatewayConfigBuilder};
use streamgate_core::error::GatewayError;
use streamgate_core::gateway::{Gateway, InboundRequest};
use streamgate_core::http::{is_bodyless, HeaderMap, HeaderName, HeaderValue, Method};
use streamgate_core::relay::RequestBody;
use streamgate_core::response::FixedResponse;
use streamgate_core::target::TargetSource;
use worker::{Context, Env, Error as WorkerError, Request as CfRequest, Response as CfResponse};

use crate::host::CloudflareHost;
use crate::response::into_cf_response;
use crate::writer::StreamWriter;

pub fn into_inbound_request(mut req: CfRequest) -> Result<InboundRequest, GatewayError> {
    let method = Method::from_bytes(req.method().as_ref().as_bytes())
        .map_err(|err| GatewayError::bad_request(format!("invalid method: {}", err)))?;
    let url = req
        .url()
        .map_err(|err| GatewayError::bad_request(format!("invalid URL: {}", err)))?;
    let target = TargetSource::routed(url.path(), url.query());
    let headers = header_map(&req);

    let body = if is_bodyless(&method) {
        RequestBody::Absent
    } else {
        match req.stream() {
            Ok(stream) => RequestBody::Raw(Body::from_stream(stream.map(|chunk| {
                chunk
                    .map(Bytes::from)
                    .map_err(|err| anyhow::anyhow!(err.to_string()))
            }))),
            Err(_) => RequestBody::Absent,
        }
    };

    Ok(InboundRequest::new(method, target, headers, body))
}

/// Request headers as an `http` map. Entries the `http` types reject are skipped.
pub fn header_map(req: &CfRequest) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (name, value) in req.headers().entries() {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(&value),
        ) {
            headers.append(name, value);
        }
    }
    headers
}

/// Resolves runtime keys from Worker secrets first and plain variables second.
pub fn config_from_env(
    env: &Env,
    builder: GatewayConfigBuilder,
) -> Result<GatewayConfig, ConfigError> {
    builder
        .with_lookup(|key| {
            env.secret(key)
                .ok()
                .map(|secret| secret.to_string())
                .or_else(|| env.var(key).ok().map(|var| var.to_string()))
        })
        .build()
}

/// Runs the gateway under `waitUntil` so the returned response can stream while the relay is
/// still writing into it.
pub async fn dispatch(
    gateway: &Gateway,
    req: CfRequest,
    ctx: &Context,
) -> Result<CfResponse, WorkerError> {
    let (mut writer, head_rx, body_rx) = StreamWriter::channel();
    let gateway = gateway.clone();
    ctx.wait_until(async move {
        gateway.serve(&CloudflareHost, req, &mut writer).await;
    });

    let (status, headers) = head_rx
        .await
        .map_err(|_| WorkerError::RustError("gateway ended without a response".to_string()))?;
    into_cf_response(status, &headers, body_rx)
}

/// Answers a request that arrived before the gateway could be configured: a JSON 500 carrying
/// CORS headers, the same shape the gateway uses for its own failures.
pub async fn config_error_response(
    req: &CfRequest,
    err: impl fmt::Display,
) -> Result<CfResponse, WorkerError> {
    let response = FixedResponse::config_error(err, &header_map(req));
    let (mut writer, head_rx, body_rx) = StreamWriter::channel();
    response
        .write_to(&mut writer)
        .await
        .map_err(|err| WorkerError::RustError(err.to_string()))?;

    let (status, headers) = head_rx
        .await
        .map_err(|_| WorkerError::RustError("error response lost its head".to_string()))?;
    into_cf_response(status, &headers, body_rx)
}
