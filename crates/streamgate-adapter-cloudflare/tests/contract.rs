#![cfg(all(feature = "cloudflare", target_arch = "wasm32"))]

use bytes::Bytes;
use futures::channel::mpsc;
use futures::SinkExt;
use streamgate_adapter_cloudflare::{
    config_error_response, into_cf_response, into_inbound_request,
};
use streamgate_core::http::{HeaderMap, HeaderValue, Method, StatusCode};
use streamgate_core::relay::RequestBody;
use streamgate_core::target::TargetSource;
use wasm_bindgen_test::*;
use worker::{wasm_bindgen::JsValue, Method as CfMethod, Request as CfRequest, RequestInit};

wasm_bindgen_test_configure!(run_in_browser);

fn cf_request(method: CfMethod, path: &str, body: Option<&[u8]>) -> CfRequest {
    use js_sys::Uint8Array;

    let mut init = RequestInit::new();
    init.with_method(method);

    let headers = worker::Headers::new();
    headers.set("origin", "https://example.com").expect("origin header");
    headers.set("x-goog-api-key", "sk-caller").expect("key header");
    init.with_headers(headers);

    if let Some(bytes) = body {
        init.with_body(Some(JsValue::from(Uint8Array::from(bytes))));
    }

    CfRequest::new_with_init(&format!("https://gateway.example.com{}", path), &init)
        .expect("cf request")
}

#[wasm_bindgen_test]
async fn inbound_request_keeps_path_query_headers_and_body() {
    let req = cf_request(
        CfMethod::Post,
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
    assert_eq!(body.collect().await.expect("body").as_ref(), b"payload");
}

#[wasm_bindgen_test]
async fn get_request_has_no_body() {
    let inbound = into_inbound_request(cf_request(CfMethod::Get, "/api/gemini", None))
        .expect("inbound");
    assert!(matches!(inbound.body, RequestBody::Absent));
}

#[wasm_bindgen_test]
async fn response_streams_channel_chunks() {
    let (mut tx, rx) = mpsc::channel(4);
    let mut headers = HeaderMap::new();
    headers.insert("content-type", HeaderValue::from_static("text/event-stream"));
    headers.append("set-cookie", HeaderValue::from_static("a=1"));
    headers.append("set-cookie", HeaderValue::from_static("b=2"));

    let mut response = into_cf_response(StatusCode::CREATED, &headers, rx).expect("response");
    tx.send(Bytes::from_static(b"data: 1\n\n")).await.unwrap();
    tx.send(Bytes::from_static(b"data: 2\n\n")).await.unwrap();
    drop(tx);

    assert_eq!(response.status_code(), 201);
    assert_eq!(
        response.headers().get("content-type").unwrap().as_deref(),
        Some("text/event-stream")
    );
    let text = response.text().await.expect("text");
    assert_eq!(text, "data: 1\n\ndata: 2\n\n");
}

#[wasm_bindgen_test]
async fn no_content_response_has_empty_body() {
    let (_tx, rx) = mpsc::channel(1);
    let response =
        into_cf_response(StatusCode::NO_CONTENT, &HeaderMap::new(), rx).expect("response");
    assert_eq!(response.status_code(), 204);
}

#[wasm_bindgen_test]
async fn config_error_is_json_500_with_cors() {
    let req = cf_request(CfMethod::Post, "/api/gemini/v1", Some(b"{}"));
    let mut response = config_error_response(&req, "invalid PROXY_GEMINI_BASE")
        .await
        .expect("response");

    assert_eq!(response.status_code(), 500);
    assert_eq!(
        response
            .headers()
            .get("access-control-allow-origin")
            .unwrap()
            .as_deref(),
        Some("https://example.com")
    );
    assert_eq!(
        response.headers().get("content-type").unwrap().as_deref(),
        Some("application/json")
    );
    let text = response.text().await.expect("text");
    assert_eq!(
        text,
        "{\"error\":\"Gateway is misconfigured: invalid PROXY_GEMINI_BASE\"}"
    );
}
