#![cfg(all(feature = "fastly", target_arch = "wasm32"))]

use bytes::Bytes;
use fastly::http::{Method as FastlyMethod, StatusCode as FastlyStatus};
use fastly::Request as FastlyRequest;
use futures::executor::block_on;
use streamgate_adapter_fastly::{dispatch, from_buffered, into_inbound_request, BufferedWriter};
use streamgate_core::config::GatewayConfig;
use streamgate_core::gateway::Gateway;
use streamgate_core::http::{HeaderMap, HeaderValue, Method, StatusCode};
use streamgate_core::pump::ResponseWriter;
use streamgate_core::relay::RequestBody;
use streamgate_core::target::TargetSource;

fn fastly_request(method: FastlyMethod, path: &str, body: Option<&[u8]>) -> FastlyRequest {
    let mut req = FastlyRequest::new(method, format!("http://gateway.example.com{}", path));
    req.set_header("origin", "https://app.example");
    req.set_header("x-goog-api-key", "sk-caller");
    if let Some(bytes) = body {
        req.set_body(bytes.to_vec());
    }
    req
}

#[test]
fn inbound_request_keeps_method_target_headers_and_body() {
    let req = fastly_request(
        FastlyMethod::POST,
        "/api/gemini/v1beta/models?alt=sse",
        Some(b"payload"),
    );
    let inbound = into_inbound_request(req).expect("inbound");

    assert_eq!(inbound.method, Method::POST);
    assert_eq!(
        inbound.target,
        TargetSource::Routed {
            path: "/api/gemini/v1beta/models".to_string(),
            query: Some("alt=sse".to_string()),
        }
    );
    assert_eq!(inbound.headers.get("x-goog-api-key").unwrap(), "sk-caller");

    let RequestBody::Raw(body) = inbound.body else {
        panic!("expected raw body");
    };
    assert_eq!(body.as_bytes(), Some(&b"payload"[..]));
}

#[test]
fn get_request_body_is_absent() {
    let inbound =
        into_inbound_request(fastly_request(FastlyMethod::GET, "/api/gemini", None)).expect("inbound");
    assert!(matches!(inbound.body, RequestBody::Absent));
}

#[test]
fn buffered_writer_converts_to_fastly_response() {
    let mut writer = BufferedWriter::new();
    let mut headers = HeaderMap::new();
    headers.insert("content-type", HeaderValue::from_static("text/event-stream"));
    block_on(async {
        writer.write_head(StatusCode::OK, &headers).await.unwrap();
        writer.write_chunk(Bytes::from_static(b"data: 1\n\n")).await.unwrap();
        writer.write_chunk(Bytes::from_static(b"data: 2\n\n")).await.unwrap();
        writer.close().await.unwrap();
    });

    let mut response = from_buffered(writer).expect("response");
    assert_eq!(response.get_status(), FastlyStatus::OK);
    assert_eq!(
        response.get_header_str("content-type"),
        Some("text/event-stream")
    );
    assert_eq!(response.take_body_bytes(), b"data: 1\n\ndata: 2\n\n");
}

#[test]
fn dispatch_answers_preflight_without_upstream() {
    let gateway = Gateway::new(GatewayConfig::default());
    let req = fastly_request(FastlyMethod::OPTIONS, "/api/gemini/v1beta/models", None);

    let mut response = dispatch(&gateway, req).expect("response");

    assert_eq!(response.get_status(), FastlyStatus::NO_CONTENT);
    assert_eq!(
        response.get_header_str("access-control-allow-origin"),
        Some("https://app.example")
    );
    assert!(response.take_body_bytes().is_empty());
}
