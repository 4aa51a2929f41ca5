use std::fmt;

use bytes::Bytes;
use serde_json::json;

use crate::config::GatewayConfig;
use crate::cors::CorsHeaders;
use crate::error::GatewayError;
use crate::http::header::CONTENT_TYPE;
use crate::http::{HeaderMap, HeaderValue, StatusCode};
use crate::pump::ResponseWriter;

/// A response produced by the gateway itself rather than relayed from upstream.
#[derive(Clone, Debug)]
pub struct FixedResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Option<Bytes>,
}

impl FixedResponse {
    pub fn new(status: StatusCode, headers: HeaderMap, body: Option<Bytes>) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    /// `{"error": message}` with `application/json` and the CORS headers applied.
    pub fn json_error(status: StatusCode, message: &str, cors: &CorsHeaders) -> Self {
        let mut headers = HeaderMap::with_capacity(5);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        cors.apply(&mut headers);
        let body = json!({ "error": message }).to_string();
        Self::new(status, headers, Some(Bytes::from(body)))
    }

    /// 500 for a request that arrived before a usable configuration existed. CORS follows the
    /// defaults so a browser caller can still read the error.
    pub fn config_error(err: impl fmt::Display, request_headers: &HeaderMap) -> Self {
        log::error!("gateway configuration rejected: {}", err);
        let cors = CorsHeaders::for_request(&GatewayConfig::default(), request_headers);
        Self::json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            &format!("Gateway is misconfigured: {}", err),
            &cors,
        )
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    /// Writes the head and the body in one chunk. The writer is closed even when a write fails;
    /// the first error wins.
    pub async fn write_to<W>(self, writer: &mut W) -> Result<usize, GatewayError>
    where
        W: ResponseWriter + ?Sized,
    {
        let written = self.write_parts(writer).await;
        let closed = writer.close().await;
        let written = written?;
        closed?;
        Ok(written)
    }

    async fn write_parts<W>(self, writer: &mut W) -> Result<usize, GatewayError>
    where
        W: ResponseWriter + ?Sized,
    {
        writer.write_head(self.status, &self.headers).await?;
        match self.body {
            Some(body) if !body.is_empty() => {
                let len = body.len();
                writer.write_chunk(body).await?;
                Ok(len)
            }
            _ => Ok(0),
        }
    }
}
