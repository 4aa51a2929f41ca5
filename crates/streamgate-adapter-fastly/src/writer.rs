use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use streamgate_core::error::GatewayError;
use streamgate_core::http::{HeaderMap, StatusCode};
use streamgate_core::pump::ResponseWriter;

/// Collects the whole response in memory. Compute hands the response back in one piece, so the
/// gateway runs to completion before anything reaches the caller.
#[derive(Debug, Default)]
pub struct BufferedWriter {
    head: Option<(StatusCode, HeaderMap)>,
    body: BytesMut,
    closed: bool,
}

impl BufferedWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> Option<StatusCode> {
        self.head.as_ref().map(|(status, _)| *status)
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// The recorded response, or `None` when no head was ever written.
    pub fn into_parts(self) -> Option<(StatusCode, HeaderMap, Bytes)> {
        let body = self.body.freeze();
        self.head.map(|(status, headers)| (status, headers, body))
    }
}

#[async_trait(?Send)]
impl ResponseWriter for BufferedWriter {
    async fn write_head(
        &mut self,
        status: StatusCode,
        headers: &HeaderMap,
    ) -> Result<(), GatewayError> {
        if self.head.is_some() {
            return Err(GatewayError::internal(anyhow::anyhow!(
                "response head already written"
            )));
        }
        self.head = Some((status, headers.clone()));
        Ok(())
    }

    async fn write_chunk(&mut self, chunk: Bytes) -> Result<(), GatewayError> {
        if self.closed {
            return Err(GatewayError::Disconnected);
        }
        self.body.extend_from_slice(&chunk);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), GatewayError> {
        self.closed = true;
        Ok(())
    }
}
