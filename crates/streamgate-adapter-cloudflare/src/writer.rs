use async_trait::async_trait;
use bytes::Bytes;
use futures::channel::{mpsc, oneshot};
use futures_util::SinkExt;
use streamgate_core::error::GatewayError;
use streamgate_core::http::{HeaderMap, StatusCode};
use streamgate_core::pump::ResponseWriter;

/// Statuses the Workers runtime refuses to attach a body to.
pub const NULL_BODY_STATUSES: [u16; 4] = [101, 204, 205, 304];

const BODY_BUFFER: usize = 16;

pub type ResponseHead = (StatusCode, HeaderMap);

/// Hands the head and body chunks from the gateway task (running under `waitUntil`) to the
/// `ReadableStream` returned to the runtime.
pub struct StreamWriter {
    head: Option<oneshot::Sender<ResponseHead>>,
    body: Option<mpsc::Sender<Bytes>>,
}

impl StreamWriter {
    pub fn channel() -> (Self, oneshot::Receiver<ResponseHead>, mpsc::Receiver<Bytes>) {
        let (head_tx, head_rx) = oneshot::channel();
        let (body_tx, body_rx) = mpsc::channel(BODY_BUFFER);
        (
            Self {
                head: Some(head_tx),
                body: Some(body_tx),
            },
            head_rx,
            body_rx,
        )
    }
}

#[async_trait(?Send)]
impl ResponseWriter for StreamWriter {
    async fn write_head(
        &mut self,
        status: StatusCode,
        headers: &HeaderMap,
    ) -> Result<(), GatewayError> {
        let Some(sender) = self.head.take() else {
            return Err(GatewayError::internal(anyhow::anyhow!(
                "response head already sent"
            )));
        };
        sender
            .send((status, headers.clone()))
            .map_err(|_| GatewayError::Disconnected)
    }

    async fn write_chunk(&mut self, chunk: Bytes) -> Result<(), GatewayError> {
        match self.body.as_mut() {
            Some(sender) => sender
                .send(chunk)
                .await
                .map_err(|_| GatewayError::Disconnected),
            None => Err(GatewayError::Disconnected),
        }
    }

    async fn close(&mut self) -> Result<(), GatewayError> {
        self.body.take();
        Ok(())
    }
}
