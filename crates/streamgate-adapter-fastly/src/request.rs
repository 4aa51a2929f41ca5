use std::fmt;
use std::io::Read;

use fastly::config_store::ConfigStore;
use fastly::{Error as FastlyError, Request as FastlyRequest, Response as FastlyResponse};
use futures::executor;
use streamgate_core::body::Body;
use streamgate_core::config::{ConfigError, GatewayConfig, GatewayConfigBuilder};
use streamgate_core::error::GatewayError;
use streamgate_core::gateway::{Gateway, InboundRequest};
use streamgate_core::http::{is_bodyless, HeaderMap, HeaderName, HeaderValue, Method};
use streamgate_core::relay::RequestBody;
use streamgate_core::response::FixedResponse;
use streamgate_core::target::TargetSource;

use crate::host::FastlyHost;
use crate::response::from_buffered;
use crate::writer::BufferedWriter;

pub fn into_inbound_request(mut req: FastlyRequest) -> Result<InboundRequest, GatewayError> {
    let method = Method::from_bytes(req.get_method_str().as_bytes())
        .map_err(|err| GatewayError::bad_request(format!("invalid method: {}", err)))?;
    let target = TargetSource::routed(req.get_path(), req.get_query_str());
    let headers = header_map(&req);

    let body = if is_bodyless(&method) || !req.has_body() {
        RequestBody::Absent
    } else {
        let mut bytes = Vec::new();
        req.take_body().read_to_end(&mut bytes).map_err(|err| {
            GatewayError::bad_request(format!("failed to read request body: {}", err))
        })?;
        if bytes.is_empty() {
            RequestBody::Absent
        } else {
            RequestBody::Raw(Body::from_bytes(bytes))
        }
    };

    Ok(InboundRequest::new(method, target, headers, body))
}

pub fn header_map(req: &FastlyRequest) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (name, value) in req.get_headers() {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_str().as_bytes()),
            HeaderValue::from_bytes(value.as_bytes()),
        ) {
            headers.append(name, value);
        }
    }
    headers
}

/// Resolves runtime keys from the named config store. A missing store leaves every key to the
/// builder's fallbacks.
pub fn config_from_store(
    store_name: &str,
    builder: GatewayConfigBuilder,
) -> Result<GatewayConfig, ConfigError> {
    let store = ConfigStore::try_open(store_name).ok();
    if store.is_none() {
        log::debug!("config store {} not linked, using fallbacks", store_name);
    }
    builder
        .with_lookup(|key| store.as_ref().and_then(|store| store.try_get(key).ok().flatten()))
        .build()
}

pub fn dispatch(gateway: &Gateway, req: FastlyRequest) -> Result<FastlyResponse, FastlyError> {
    dispatch_with_host(gateway, &FastlyHost::default(), req)
}

pub fn dispatch_with_host(
    gateway: &Gateway,
    host: &FastlyHost,
    req: FastlyRequest,
) -> Result<FastlyResponse, FastlyError> {
    let mut writer = BufferedWriter::new();
    executor::block_on(gateway.serve(host, req, &mut writer));
    from_buffered(writer).map_err(|err| FastlyError::msg(err.to_string()))
}

/// JSON 500 with CORS for a request that arrived before the gateway could be configured.
pub fn config_error_response(
    req: &FastlyRequest,
    err: impl fmt::Display,
) -> Result<FastlyResponse, FastlyError> {
    let mut writer = BufferedWriter::new();
    executor::block_on(FixedResponse::config_error(err, &header_map(req)).write_to(&mut writer))
        .map_err(|err| FastlyError::msg(err.to_string()))?;
    from_buffered(writer).map_err(|err| FastlyError::msg(err.to_string()))
}
