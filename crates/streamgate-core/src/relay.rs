//! Body Relay: decides what, if anything, is sent upstream as the request body.

use serde_json::Value;

use crate::body::Body;
use crate::error::GatewayError;
use crate::gateway::HostCapabilities;
use crate::http::header::CONTENT_TYPE;
use crate::http::{is_bodyless, HeaderMap, HeaderValue, Method};

/// Inbound body as a host delivers it.
#[derive(Debug, Default)]
pub enum RequestBody {
    #[default]
    Absent,
    /// Raw bytes or a byte stream, forwarded verbatim.
    Raw(Body),
    /// A body the host already parsed into a JSON value.
    Structured(Value),
}

impl From<Body> for RequestBody {
    fn from(body: Body) -> Self {
        RequestBody::Raw(body)
    }
}

impl From<Option<Body>> for RequestBody {
    fn from(body: Option<Body>) -> Self {
        body.map(RequestBody::Raw).unwrap_or_default()
    }
}

/// `headers` are the outbound headers; only `content-type` may be added, and only for a
/// structured body the caller sent without one.
pub async fn relay_body(
    method: &Method,
    body: RequestBody,
    headers: &mut HeaderMap,
    capabilities: HostCapabilities,
) -> Result<Option<Body>, GatewayError> {
    if is_bodyless(method) {
        return Ok(None);
    }

    match body {
        RequestBody::Absent | RequestBody::Structured(Value::Null) => Ok(None),
        RequestBody::Raw(body) if body.is_empty() => Ok(None),
        RequestBody::Raw(body @ Body::Once(_)) => Ok(Some(body)),
        RequestBody::Raw(body) if capabilities.streaming_body => Ok(Some(body)),
        RequestBody::Raw(body) => {
            let bytes = body.collect().await.map_err(|err| {
                GatewayError::bad_request(format!("failed to read request body: {}", err))
            })?;
            if bytes.is_empty() {
                Ok(None)
            } else {
                Ok(Some(Body::from_bytes(bytes)))
            }
        }
        RequestBody::Structured(value) => {
            let body = Body::json(&value).map_err(GatewayError::internal)?;
            if !headers.contains_key(CONTENT_TYPE) {
                headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            }
            Ok(Some(body))
        }
    }
}
