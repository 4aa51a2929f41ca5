use axum::body::{Body as AxumBody, HttpBody};
use axum::http::Request;
use streamgate_core::body::Body;
use streamgate_core::gateway::InboundRequest;
use streamgate_core::relay::RequestBody;
use streamgate_core::target::TargetSource;

/// Converts an axum request into the gateway's view. The body stays a stream; a body that is
/// known to be empty is reported as absent.
pub fn into_inbound_request(request: Request<AxumBody>) -> InboundRequest {
    let (parts, body) = request.into_parts();
    let target = TargetSource::routed(parts.uri.path(), parts.uri.query());

    let body = if body.size_hint().exact() == Some(0) {
        RequestBody::Absent
    } else {
        RequestBody::Raw(Body::from_stream(body.into_data_stream()))
    };

    InboundRequest::new(parts.method, target, parts.headers, body)
}
