#![cfg(feature = "axum")]

use std::convert::Infallible;
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::extract::Request;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use futures::StreamExt;
use serde_json::{json, Value};
use streamgate_adapter_axum::{AxumServer, AxumServerConfig};
use streamgate_core::config::GatewayConfig;
use streamgate_core::gateway::Gateway;
use tokio::net::TcpListener;

async fn start_upstream() -> String {
    let app = Router::new()
        .route("/v1/stream", get(stream_events))
        .route("/v1/endless", get(endless_events))
        .route(
            "/v1/limited",
            get(|| async {
                (
                    StatusCode::TOO_MANY_REQUESTS,
                    [("content-type", "application/json")],
                    "{\"error\":\"quota\"}",
                )
            }),
        )
        .fallback(echo);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

async fn stream_events() -> Response {
    let chunks = futures::stream::iter(vec![
        (Duration::ZERO, "data: {\"n\":1}\n\n"),
        (Duration::from_millis(300), "data: {\"n\":2}\n\n"),
        (Duration::from_millis(300), "data: {\"n\":3}\n\n"),
    ])
    .then(|(delay, chunk)| async move {
        tokio::time::sleep(delay).await;
        Ok::<_, Infallible>(Bytes::from_static(chunk.as_bytes()))
    });

    (
        [
            ("content-type", "text/event-stream"),
            ("access-control-allow-origin", "https://upstream.invalid"),
        ],
        Body::from_stream(chunks),
    )
        .into_response()
}

async fn endless_events() -> Response {
    let ticks = futures::stream::unfold((), |()| async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        Some((Ok::<_, Infallible>(Bytes::from_static(b"data: x\n\n")), ()))
    });
    ([("content-type", "text/event-stream")], Body::from_stream(ticks)).into_response()
}

async fn echo(request: Request) -> Json<Value> {
    let (parts, body) = request.into_parts();
    let body = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    let header = |name: &str| {
        parts
            .headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    Json(json!({
        "method": parts.method.as_str(),
        "uri": parts.uri.to_string(),
        "key": header("x-goog-api-key"),
        "content_type": header("content-type"),
        "accept_encoding": header("accept-encoding"),
        "body": String::from_utf8_lossy(&body),
    }))
}

async fn start_gateway(upstream: &str) -> String {
    start_gateway_with_workers(upstream, 2).await
}

async fn start_gateway_with_workers(upstream: &str, local_workers: usize) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let config = GatewayConfig::builder()
        .upstream_base(upstream)
        .default_credential("sk-test")
        .build()
        .expect("config");
    let server = AxumServer::with_config(
        Gateway::new(config),
        AxumServerConfig {
            addr,
            enable_ctrl_c: false,
            connect_timeout: Duration::from_secs(2),
            local_workers,
        },
    );
    tokio::spawn(async move {
        let _ = server.serve(listener).await;
    });
    format!("http://{}", addr)
}

async fn json_body(response: reqwest::Response) -> Value {
    let bytes = response.bytes().await.unwrap();
    serde_json::from_slice(&bytes).expect("json body")
}

fn client() -> reqwest::Client {
    reqwest::Client::builder().build().unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn relays_sse_chunks_as_they_arrive() {
    let upstream = start_upstream().await;
    let gateway = start_gateway(&upstream).await;

    let response = client()
        .get(format!("{}/api/gemini/v1/stream", gateway))
        .header("origin", "https://example.com")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let headers: HeaderMap = response.headers().clone();
    assert_eq!(headers["access-control-allow-origin"], "https://example.com");
    assert_eq!(headers["content-type"], "text/event-stream");
    assert!(headers.get("content-length").is_none());

    let mut stream = response.bytes_stream();
    let first = tokio::time::timeout(Duration::from_millis(250), stream.next())
        .await
        .expect("first chunk before the upstream finished")
        .expect("chunk")
        .unwrap();
    assert_eq!(&first[..], b"data: {\"n\":1}\n\n");

    let mut rest = Vec::new();
    while let Some(chunk) = stream.next().await {
        rest.extend_from_slice(&chunk.unwrap());
    }
    assert_eq!(rest, b"data: {\"n\":2}\n\ndata: {\"n\":3}\n\n");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn forwards_path_query_and_default_credential() {
    let upstream = start_upstream().await;
    let gateway = start_gateway(&upstream).await;

    let echoed = client()
        .get(format!(
            "{}/api/gemini/v1beta/models/m:streamGenerateContent?alt=sse",
            gateway
        ))
        .header("accept-encoding", "gzip")
        .send()
        .await
        .unwrap();
    let echoed = json_body(echoed).await;

    assert_eq!(echoed["method"], "GET");
    assert_eq!(echoed["uri"], "/v1beta/models/m:streamGenerateContent?alt=sse");
    assert_eq!(echoed["key"], "sk-test");
    assert_eq!(echoed["accept_encoding"], Value::Null);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn catch_all_query_form_is_unpacked() {
    let upstream = start_upstream().await;
    let gateway = start_gateway(&upstream).await;

    let echoed = client()
        .get(format!(
            "{}/api/gemini?path=%2Fv1beta%2Fmodels%3Falt%3Dsse",
            gateway
        ))
        .send()
        .await
        .unwrap();
    let echoed = json_body(echoed).await;

    assert_eq!(echoed["uri"], "/v1beta/models?alt=sse");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn keeps_caller_credential_and_body() {
    let upstream = start_upstream().await;
    let gateway = start_gateway(&upstream).await;

    let echoed = client()
        .post(format!("{}/api/gemini/v1/models/x:generateContent", gateway))
        .header("x-goog-api-key", "sk-caller")
        .header("content-type", "application/json")
        .body("{\"contents\":[]}")
        .send()
        .await
        .unwrap();
    let echoed = json_body(echoed).await;

    assert_eq!(echoed["method"], "POST");
    assert_eq!(echoed["key"], "sk-caller");
    assert_eq!(echoed["content_type"], "application/json");
    assert_eq!(echoed["body"], "{\"contents\":[]}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn relays_upstream_error_status() {
    let upstream = start_upstream().await;
    let gateway = start_gateway(&upstream).await;

    let response = client()
        .get(format!("{}/api/gemini/v1/limited", gateway))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.text().await.unwrap(), "{\"error\":\"quota\"}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn unreachable_upstream_returns_502() {
    let gateway = start_gateway("http://127.0.0.1:1").await;

    let response = client()
        .post(format!("{}/api/gemini/v1/models", gateway))
        .header("origin", "https://example.com")
        .body("{}")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(response.headers()["content-type"], "application/json");
    assert_eq!(
        response.headers()["access-control-allow-origin"],
        "https://example.com"
    );
    let body = json_body(response).await;
    assert_eq!(body, json!({ "error": "Failed to contact Gemini proxy." }));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn preflight_never_reaches_upstream() {
    let gateway = start_gateway("http://127.0.0.1:1").await;

    let response = client()
        .request(reqwest::Method::OPTIONS, format!("{}/api/gemini/v1", gateway))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(response.headers()["access-control-allow-origin"], "*");
    assert_eq!(
        response.headers()["access-control-allow-methods"],
        "GET,POST,PUT,PATCH,DELETE,OPTIONS"
    );
}

#[test]
fn open_stream_does_not_starve_other_requests() {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .max_blocking_threads(1)
        .enable_all()
        .build()
        .unwrap();

    runtime.block_on(async {
        let upstream = start_upstream().await;
        let gateway = start_gateway_with_workers(&upstream, 1).await;
        let wait = Duration::from_secs(3);

        let open = client()
            .get(format!("{}/api/gemini/v1/endless", gateway))
            .send()
            .await
            .unwrap();
        assert_eq!(open.status(), StatusCode::OK);
        let mut stream = open.bytes_stream();
        let first = tokio::time::timeout(wait, stream.next())
            .await
            .expect("first event")
            .expect("chunk")
            .unwrap();
        assert!(first.starts_with(b"data: x"));

        let preflight = tokio::time::timeout(
            wait,
            client()
                .request(reqwest::Method::OPTIONS, format!("{}/api/gemini/v1", gateway))
                .header("origin", "https://example.com")
                .send(),
        )
        .await
        .expect("preflight answered while a stream is open")
        .unwrap();
        assert_eq!(preflight.status(), StatusCode::NO_CONTENT);

        let echoed = tokio::time::timeout(
            wait,
            client()
                .post(format!("{}/api/gemini/v1/models", gateway))
                .body("{}")
                .send(),
        )
        .await
        .expect("relayed request answered while a stream is open")
        .unwrap();
        assert_eq!(json_body(echoed).await["body"], "{}");

        let later = tokio::time::timeout(wait, stream.next())
            .await
            .expect("stream still flowing")
            .expect("chunk")
            .unwrap();
        assert!(later.starts_with(b"data: x"));
    });
}
