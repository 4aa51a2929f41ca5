use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body as AxumBody;
use axum::http::{Request, Response};
use http::header::{CONNECTION, TRANSFER_ENCODING};
use http::{HeaderName, StatusCode};
use streamgate_core::gateway::Gateway;
use tokio_util::task::LocalPoolHandle;
use tower::Service;

use crate::host::AxumHost;
use crate::writer::ChannelWriter;

/// Connection-level headers hyper manages itself.
const FRAMING_HEADERS: [HeaderName; 2] = [CONNECTION, TRANSFER_ENCODING];

/// Tower service running every request through the gateway.
///
/// The gateway future is `!Send`, so each request becomes a local task pinned to one thread of a
/// [`LocalPoolHandle`] while the response head and body flow back over channels. Tasks on the same
/// pool thread interleave at every await, so an open stream never holds a thread to itself. The
/// returned body is a live stream.
#[derive(Clone)]
pub struct GatewayAxumService {
    gateway: Gateway,
    host: Arc<AxumHost>,
    pool: LocalPoolHandle,
}

impl GatewayAxumService {
    /// One local worker per available core.
    pub fn new(gateway: Gateway, host: AxumHost) -> Self {
        Self::with_local_workers(gateway, host, default_local_workers())
    }

    pub fn with_local_workers(gateway: Gateway, host: AxumHost, workers: usize) -> Self {
        Self {
            gateway,
            host: Arc::new(host),
            pool: LocalPoolHandle::new(workers.max(1)),
        }
    }

    pub fn local_workers(&self) -> usize {
        self.pool.num_threads()
    }
}

pub(crate) fn default_local_workers() -> usize {
    std::thread::available_parallelism().map_or(1, usize::from)
}

impl Service<Request<AxumBody>> for GatewayAxumService {
    type Response = Response<AxumBody>;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request<AxumBody>) -> Self::Future {
        let gateway = self.gateway.clone();
        let host = Arc::clone(&self.host);
        let pool = self.pool.clone();

        Box::pin(async move {
            let (mut writer, head_rx, body_rx) = ChannelWriter::channel();
            // Detached: the relay outlives this future while the body streams.
            drop(pool.spawn_pinned(move || async move {
                gateway.serve(host.as_ref(), request, &mut writer).await;
            }));

            let Ok((status, headers)) = head_rx.await else {
                log::error!("gateway task ended without a response");
                let mut response = Response::new(AxumBody::empty());
                *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
                return Ok(response);
            };

            let body = if status == StatusCode::NO_CONTENT || status == StatusCode::NOT_MODIFIED {
                AxumBody::empty()
            } else {
                AxumBody::from_stream(body_rx)
            };

            let mut response = Response::new(body);
            *response.status_mut() = status;
            for (name, value) in headers.iter() {
                if !FRAMING_HEADERS.contains(name) {
                    response.headers_mut().append(name.clone(), value.clone());
                }
            }
            Ok(response)
        })
    }
}
