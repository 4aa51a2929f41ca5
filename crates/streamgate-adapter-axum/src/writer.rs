use std::io;

use async_trait::async_trait;
use bytes::Bytes;
use futures::channel::{mpsc, oneshot};
use futures_util::SinkExt;
use streamgate_core::error::GatewayError;
use streamgate_core::http::{HeaderMap, StatusCode};
use streamgate_core::pump::ResponseWriter;

/// Body chunks queued towards hyper before a write waits on the caller.
pub const RESPONSE_BODY_BUFFER: usize = 16;

pub type ResponseHead = (StatusCode, HeaderMap);
pub type BodyReceiver = mpsc::Receiver<Result<Bytes, io::Error>>;

/// Hands the head and body chunks from the gateway thread to the axum response. Once hyper drops
/// the body (the caller went away) every further write fails with `Disconnected`.
pub struct ChannelWriter {
    head: Option<oneshot::Sender<ResponseHead>>,
    body: Option<mpsc::Sender<Result<Bytes, io::Error>>>,
}

impl ChannelWriter {
    pub fn channel() -> (Self, oneshot::Receiver<ResponseHead>, BodyReceiver) {
        let (head_tx, head_rx) = oneshot::channel();
        let (body_tx, body_rx) = mpsc::channel(RESPONSE_BODY_BUFFER);
        let writer = Self {
            head: Some(head_tx),
            body: Some(body_tx),
        };
        (writer, head_rx, body_rx)
    }
}

#[async_trait(?Send)]
impl ResponseWriter for ChannelWriter {
    async fn write_head(
        &mut self,
        status: StatusCode,
        headers: &HeaderMap,
    ) -> Result<(), GatewayError> {
        let sender = self.head.take().ok_or_else(|| {
            GatewayError::internal(anyhow::anyhow!("response head already sent"))
        })?;
        sender
            .send((status, headers.clone()))
            .map_err(|_| GatewayError::Disconnected)
    }

    async fn write_chunk(&mut self, chunk: Bytes) -> Result<(), GatewayError> {
        let sender = self.body.as_mut().ok_or(GatewayError::Disconnected)?;
        sender
            .send(Ok(chunk))
            .await
            .map_err(|_| GatewayError::Disconnected)
    }

    async fn close(&mut self) -> Result<(), GatewayError> {
        self.body.take();
        Ok(())
    }
}
