//! Axum/tokio host for the StreamGate gateway.
//!
//! Upstream calls go through `reqwest` with streaming request and response bodies. The gateway
//! runs each request as a task pinned to a small pool of local-executor threads, so its `!Send`
//! body streams can be driven to completion while axum sees an ordinary `Send` service.

#[cfg(feature = "axum")]
mod host;
#[cfg(feature = "axum")]
mod request;
#[cfg(feature = "axum")]
mod server;
#[cfg(feature = "axum")]
mod service;
#[cfg(feature = "axum")]
mod writer;

#[cfg(feature = "axum")]
pub use host::AxumHost;
#[cfg(feature = "axum")]
pub use request::into_inbound_request;
#[cfg(feature = "axum")]
pub use server::{init_logger, AxumServer, AxumServerConfig};
#[cfg(feature = "axum")]
pub use service::GatewayAxumService;
#[cfg(feature = "axum")]
pub use writer::ChannelWriter;
