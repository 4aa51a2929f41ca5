use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{self, StreamExt};
use streamgate_core::body::Body;
use streamgate_core::error::GatewayError;
use streamgate_core::gateway::{HostAdapter, HostCapabilities, InboundRequest};
use streamgate_core::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use streamgate_core::proxy::{UpstreamRequest, UpstreamResponse};
use worker::{
    wasm_bindgen::JsValue, Body as WorkerBody, Fetch, Headers, Method as CfMethod,
    Request as CfRequest, RequestInit, Response as CfResponse,
};

use crate::request::into_inbound_request;
use crate::writer::NULL_BODY_STATUSES;

/// Host adapter for the Workers Fetch API. Request and response bodies stay `ReadableStream`s
/// end to end.
#[derive(Clone, Copy, Debug, Default)]
pub struct CloudflareHost;

#[async_trait(?Send)]
impl HostAdapter for CloudflareHost {
    type Inbound = CfRequest;

    fn capabilities(&self) -> HostCapabilities {
        HostCapabilities::STREAMING
    }

    async fn parse_request(&self, inbound: Self::Inbound) -> Result<InboundRequest, GatewayError> {
        into_inbound_request(inbound)
    }

    async fn open_upstream_call(
        &self,
        request: UpstreamRequest,
    ) -> Result<UpstreamResponse, GatewayError> {
        let (method, uri, headers, body) = request.into_parts();
        let head_only = method == Method::HEAD;

        let mut init = RequestInit::new();
        init.with_method(into_cf_method(&method));
        init.with_headers(Headers::from(&headers));
        if let Some(body) = body {
            attach_body(&mut init, body)?;
        }

        let cf_request = CfRequest::new_with_init(&uri.to_string(), &init)
            .map_err(|err| GatewayError::bad_request(err.to_string()))?;
        let mut cf_response = Fetch::Request(cf_request)
            .send()
            .await
            .map_err(|err| GatewayError::upstream(anyhow::anyhow!(err.to_string())))?;

        convert_response(&mut cf_response, head_only)
    }
}

fn attach_body(init: &mut RequestInit, body: Body) -> Result<(), GatewayError> {
    let chunks = match body {
        Body::Once(bytes) if bytes.is_empty() => return Ok(()),
        Body::Once(bytes) => {
            let chunk = bytes.to_vec();
            stream::once(async move { Ok::<Vec<u8>, JsValue>(chunk) }).boxed_local()
        }
        Body::Stream(stream) => stream
            .map(|res| match res {
                Ok(bytes) => Ok::<Vec<u8>, JsValue>(bytes.to_vec()),
                Err(err) => Err(JsValue::from_str(&err.to_string())),
            })
            .boxed_local(),
    };

    let worker_body = WorkerBody::from_stream(chunks)
        .map_err(|err| GatewayError::internal(anyhow::anyhow!(err.to_string())))?;
    if let Some(readable) = worker_body.into_inner() {
        init.with_body(Some(JsValue::from(readable)));
    }
    Ok(())
}

fn convert_response(
    cf_response: &mut CfResponse,
    head_only: bool,
) -> Result<UpstreamResponse, GatewayError> {
    let code = cf_response.status_code();
    let status = StatusCode::from_u16(code).map_err(GatewayError::upstream)?;

    let mut headers = HeaderMap::new();
    for (name, value) in cf_response.headers().entries() {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(&value),
        ) {
            headers.append(name, value);
        }
    }

    let body = if head_only || NULL_BODY_STATUSES.contains(&code) {
        None
    } else {
        match cf_response.stream() {
            Ok(stream) => Some(Body::from_stream(stream.map(|chunk| {
                chunk
                    .map(Bytes::from)
                    .map_err(|err| anyhow::anyhow!(err.to_string()))
            }))),
            Err(err) => {
                log::debug!("upstream response has no body stream: {}", err);
                None
            }
        }
    };

    Ok(UpstreamResponse::new(status, headers, body))
}

fn into_cf_method(method: &Method) -> CfMethod {
    match *method {
        Method::GET => CfMethod::Get,
        Method::POST => CfMethod::Post,
        Method::PUT => CfMethod::Put,
        Method::PATCH => CfMethod::Patch,
        Method::DELETE => CfMethod::Delete,
        Method::HEAD => CfMethod::Head,
        Method::OPTIONS => CfMethod::Options,
        Method::CONNECT => CfMethod::Connect,
        Method::TRACE => CfMethod::Trace,
        _ => CfMethod::from(method.as_str().to_string()),
    }
}
