//! Failure Responder: the terminal reply when the upstream call could not be completed at all.
//! Upstream HTTP error statuses never come through here; they are relayed as-is.

use crate::config::GatewayConfig;
use crate::cors::CorsHeaders;
use crate::error::GatewayError;
use crate::http::StatusCode;
use crate::response::FixedResponse;

pub fn failure_message(config: &GatewayConfig) -> String {
    format!("Failed to contact {} proxy.", config.upstream_name())
}

/// Logs `error` and builds the fixed `502` JSON reply. The upstream error detail is not exposed
/// to the caller.
pub fn failure_response(
    config: &GatewayConfig,
    cors: &CorsHeaders,
    error: &GatewayError,
) -> FixedResponse {
    log::error!("{} upstream call failed: {}", config.upstream_name(), error);
    FixedResponse::json_error(StatusCode::BAD_GATEWAY, &failure_message(config), cors)
}
