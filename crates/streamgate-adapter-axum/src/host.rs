use std::io;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body as AxumBody;
use axum::http::Request;
use bytes::Bytes;
use futures::channel::mpsc;
use futures::future::{self, Either};
use futures_util::stream::LocalBoxStream;
use futures_util::{SinkExt, StreamExt};
use reqwest::Client;
use streamgate_core::body::Body;
use streamgate_core::error::GatewayError;
use streamgate_core::gateway::{HostAdapter, HostCapabilities, InboundRequest};
use streamgate_core::http::{Method, StatusCode};
use streamgate_core::proxy::{UpstreamRequest, UpstreamResponse};

use crate::request::into_inbound_request;

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Chunks buffered between the inbound body and the upstream request.
const REQUEST_BODY_BUFFER: usize = 8;

/// Host adapter backed by a shared `reqwest` client. Only a connect timeout is set so long
/// generations are never cut off mid-stream.
#[derive(Clone, Debug)]
pub struct AxumHost {
    client: Client,
}

impl AxumHost {
    pub fn new(connect_timeout: Duration) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(GatewayError::internal)?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait(?Send)]
impl HostAdapter for AxumHost {
    type Inbound = Request<AxumBody>;

    fn capabilities(&self) -> HostCapabilities {
        HostCapabilities::STREAMING
    }

    async fn parse_request(&self, inbound: Self::Inbound) -> Result<InboundRequest, GatewayError> {
        Ok(into_inbound_request(inbound))
    }

    async fn open_upstream_call(
        &self,
        request: UpstreamRequest,
    ) -> Result<UpstreamResponse, GatewayError> {
        let (method, uri, headers, body) = request.into_parts();
        let head_only = method == Method::HEAD;
        let mut builder = self
            .client
            .request(method, uri.to_string())
            .headers(headers);

        let mut forwarder = None;
        match body {
            None => {}
            Some(Body::Once(bytes)) => builder = builder.body(bytes),
            Some(Body::Stream(stream)) => {
                let (tx, rx) = mpsc::channel(REQUEST_BODY_BUFFER);
                builder = builder.body(reqwest::Body::wrap_stream(rx));
                forwarder = Some(forward_body(stream, tx));
            }
        }

        let send = builder.send();
        let response = match forwarder {
            None => send.await,
            Some(forwarder) => {
                futures::pin_mut!(send);
                futures::pin_mut!(forwarder);
                match future::select(send, forwarder).await {
                    Either::Left((response, _)) => response,
                    Either::Right(((), send)) => send.await,
                }
            }
        }
        .map_err(GatewayError::upstream)?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = if head_only || status == StatusCode::NO_CONTENT || status == StatusCode::NOT_MODIFIED
        {
            None
        } else {
            Some(Body::from_stream(response.bytes_stream()))
        };

        Ok(UpstreamResponse::new(status, headers, body))
    }
}

/// Feeds the `!Send` inbound stream into the channel reqwest reads from. Stops when the stream
/// ends, fails, or reqwest drops the receiving side.
async fn forward_body(
    mut stream: LocalBoxStream<'static, Result<Bytes, anyhow::Error>>,
    mut tx: mpsc::Sender<Result<Bytes, io::Error>>,
) {
    while let Some(item) = stream.next().await {
        let failed = item.is_err();
        let item = item.map_err(|err| io::Error::other(err.to_string()));
        if tx.send(item).await.is_err() || failed {
            break;
        }
    }
}
