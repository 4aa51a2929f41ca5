//! Core of the StreamGate proxy: a stateless reverse proxy that forwards browser requests to a
//! generative-content upstream and relays Server-Sent-Event responses chunk by chunk.
//!
//! The gateway logic is written once in [`gateway::Gateway`]; each hosting runtime only supplies a
//! [`gateway::HostAdapter`] and a [`pump::ResponseWriter`].

pub mod body;
pub mod client_url;
pub mod config;
pub mod cors;
pub mod error;
pub mod failure;
pub mod gateway;
pub mod headers;
pub mod http;
pub mod manifest;
pub mod proxy;
pub mod pump;
pub mod relay;
pub mod response;
pub mod sse;
pub mod target;

pub use body::Body;
pub use config::{ConfigError, GatewayConfig, GatewayConfigBuilder};
pub use cors::CorsHeaders;
pub use error::GatewayError;
pub use manifest::{LogLevel, ManifestLoader};
pub use gateway::{Gateway, HostAdapter, HostCapabilities, InboundRequest, RelayKind, RelayOutcome};
pub use proxy::{UpstreamRequest, UpstreamResponse};
pub use pump::ResponseWriter;
pub use relay::RequestBody;
pub use response::FixedResponse;
pub use target::{resolve_target, TargetDescriptor, TargetSource};
