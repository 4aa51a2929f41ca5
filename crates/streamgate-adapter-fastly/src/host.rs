use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::io;
use std::time::Duration;

use anyhow::anyhow;
use async_stream::try_stream;
use async_trait::async_trait;
use bytes::Bytes;
use fastly::{Backend, Request as FastlyRequest, Response as FastlyResponse};
use futures_util::stream::{LocalBoxStream, StreamExt};
use streamgate_core::body::Body;
use streamgate_core::error::GatewayError;
use streamgate_core::gateway::{HostAdapter, HostCapabilities, InboundRequest};
use streamgate_core::http::header::LOCATION;
use streamgate_core::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri};
use streamgate_core::proxy::{UpstreamRequest, UpstreamResponse};

use crate::redirect::{self, MAX_REDIRECTS};
use crate::request::into_inbound_request;

const BACKEND_PREFIX: &str = "streamgate-upstream-";
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Host adapter for Fastly Compute. The runtime hands over whole requests and takes back whole
/// responses, so bodies are buffered on both sides. Backend requests do not follow redirects, so
/// the host follows up to [`MAX_REDIRECTS`] hops itself.
#[derive(Clone, Copy, Debug)]
pub struct FastlyHost {
    connect_timeout: Duration,
}

impl FastlyHost {
    pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Default for FastlyHost {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CONNECT_TIMEOUT)
    }
}

#[async_trait(?Send)]
impl HostAdapter for FastlyHost {
    type Inbound = FastlyRequest;

    fn capabilities(&self) -> HostCapabilities {
        HostCapabilities::BUFFERED
    }

    async fn parse_request(&self, inbound: Self::Inbound) -> Result<InboundRequest, GatewayError> {
        into_inbound_request(inbound)
    }

    async fn open_upstream_call(
        &self,
        request: UpstreamRequest,
    ) -> Result<UpstreamResponse, GatewayError> {
        let (mut method, mut uri, mut headers, body) = request.into_parts();
        let mut body = match body {
            Some(body) => body.collect().await.map_err(GatewayError::internal)?,
            None => Bytes::new(),
        };

        let mut hops = 0;
        loop {
            let backend = ensure_backend(&uri, self.connect_timeout)?;
            let mut fastly_request = build_fastly_request(&method, &uri, &headers)?;
            if !body.is_empty() {
                fastly_request.set_body(body.to_vec());
            }

            let mut fastly_response = fastly_request
                .send(backend.name())
                .map_err(GatewayError::upstream)?;

            let status = StatusCode::from_u16(fastly_response.get_status().as_u16())
                .map_err(GatewayError::upstream)?;
            let location = fastly_response
                .get_header(LOCATION.as_str())
                .and_then(|value| value.to_str().ok());
            let Some(redirect) = redirect::next_hop(status, &method, &uri, location) else {
                return convert_response(&mut fastly_response, method == Method::HEAD);
            };

            if hops == MAX_REDIRECTS {
                return Err(GatewayError::upstream(anyhow!(
                    "stopped after {} redirects at {}",
                    MAX_REDIRECTS,
                    uri
                )));
            }
            hops += 1;

            log::debug!("following {} redirect {} -> {}", status, uri, redirect.uri);
            redirect.apply(&uri, &mut headers);
            if !redirect.keeps_body {
                body = Bytes::new();
            }
            method = redirect.method;
            uri = redirect.uri;
        }
    }
}

fn build_fastly_request(
    method: &Method,
    uri: &Uri,
    headers: &HeaderMap,
) -> Result<FastlyRequest, GatewayError> {
    let method = fastly::http::Method::from_bytes(method.as_str().as_bytes())
        .map_err(|err| GatewayError::bad_request(format!("invalid method: {}", err)))?;
    let mut fastly_request = FastlyRequest::new(method, uri.to_string());

    for (name, value) in headers.iter() {
        fastly_request.append_header(name.as_str(), value.as_bytes());
    }
    if let Some(host) = uri.host() {
        let host = match uri.port_u16() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };
        fastly_request.set_header("host", host);
    }

    Ok(fastly_request)
}

fn ensure_backend(uri: &Uri, connect_timeout: Duration) -> Result<Backend, GatewayError> {
    let host = uri
        .host()
        .ok_or_else(|| GatewayError::bad_request("upstream URL must include a host"))?;
    let target = match uri.port_u16() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    };
    let tls = uri.scheme_str() == Some("https");
    let name = backend_name(&target, tls);

    if let Ok(backend) = Backend::from_name(&name) {
        return Ok(backend);
    }

    let mut builder = Backend::builder(&name, &target)
        .override_host(host)
        .connect_timeout(connect_timeout);
    if tls {
        builder = builder
            .enable_ssl()
            .sni_hostname(host)
            .check_certificate(host);
    }
    builder.finish().map_err(GatewayError::upstream)
}

/// Dynamic backends are registered once per (target, scheme) and reused by name afterwards.
fn backend_name(target: &str, tls: bool) -> String {
    let mut hasher = DefaultHasher::new();
    target.hash(&mut hasher);
    tls.hash(&mut hasher);
    format!("{}{:016x}", BACKEND_PREFIX, hasher.finish())
}

fn convert_response(
    fastly_response: &mut FastlyResponse,
    head_only: bool,
) -> Result<UpstreamResponse, GatewayError> {
    let code = fastly_response.get_status().as_u16();
    let status = StatusCode::from_u16(code).map_err(GatewayError::upstream)?;

    let mut headers = HeaderMap::new();
    for (name, value) in fastly_response.get_headers() {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_str().as_bytes()),
            HeaderValue::from_bytes(value.as_bytes()),
        ) {
            headers.append(name, value);
        }
    }

    let body = if head_only || status == StatusCode::NO_CONTENT || status == StatusCode::NOT_MODIFIED
    {
        None
    } else {
        Some(Body::from_stream(body_stream(fastly_response.take_body())))
    };

    Ok(UpstreamResponse::new(status, headers, body))
}

fn body_stream(mut body: fastly::Body) -> LocalBoxStream<'static, Result<Bytes, io::Error>> {
    try_stream! {
        for chunk in body.read_chunks(READ_CHUNK_SIZE) {
            let chunk = chunk?;
            yield Bytes::from(chunk);
        }
    }
    .boxed_local()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn backend_names_are_stable_per_target_and_scheme() {
        assert_eq!(
            backend_name("proxy.example.com", true),
            backend_name("proxy.example.com", true)
        );
        assert_ne!(
            backend_name("proxy.example.com", true),
            backend_name("proxy.example.com", false)
        );
        assert!(backend_name("proxy.example.com:8443", true).starts_with(BACKEND_PREFIX));
    }

    #[test]
    fn reports_buffered_capability() {
        assert_eq!(
            FastlyHost::default().capabilities(),
            HostCapabilities::BUFFERED
        );
    }

    #[test]
    fn body_stream_yields_all_bytes() {
        let mut body = fastly::Body::new();
        body.write_all(b"data: hello\n\n").unwrap();
        let collected = futures::executor::block_on(
            Body::from_stream(body_stream(body)).collect(),
        )
        .expect("collect");
        assert_eq!(collected.as_ref(), b"data: hello\n\n");
    }
}
