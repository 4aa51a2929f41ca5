//! Cloudflare Workers host for the StreamGate gateway.
//!
//! ```rust,ignore
//! #[worker::event(fetch)]
//! async fn fetch(req: worker::Request, env: worker::Env, ctx: worker::Context) -> worker::Result<worker::Response> {
//!     streamgate_adapter_cloudflare::run(req, env, ctx).await
//! }
//! ```

mod writer;

#[cfg(all(feature = "cloudflare", target_arch = "wasm32"))]
mod host;
#[cfg(all(feature = "cloudflare", target_arch = "wasm32"))]
mod request;
#[cfg(all(feature = "cloudflare", target_arch = "wasm32"))]
mod response;

pub use writer::{StreamWriter, NULL_BODY_STATUSES};

#[cfg(all(feature = "cloudflare", target_arch = "wasm32"))]
pub use host::CloudflareHost;
#[cfg(all(feature = "cloudflare", target_arch = "wasm32"))]
pub use request::{
    config_error_response, config_from_env, dispatch, header_map, into_inbound_request,
};
#[cfg(all(feature = "cloudflare", target_arch = "wasm32"))]
pub use response::into_cf_response;

/// Workers forward `log` output through the runtime console on their own.
pub fn init_logger() -> Result<(), log::SetLoggerError> {
    Ok(())
}

/// Entry point for a `#[worker::event(fetch)]` handler. Configuration comes from Worker secrets
/// and variables on every invocation; a rejected configuration is answered with a JSON 500.
#[cfg(all(feature = "cloudflare", target_arch = "wasm32"))]
pub async fn run(
    req: worker::Request,
    env: worker::Env,
    ctx: worker::Context,
) -> Result<worker::Response, worker::Error> {
    init_logger().ok();
    match config_from_env(&env, streamgate_core::config::GatewayConfig::builder()) {
        Ok(config) => dispatch(&streamgate_core::gateway::Gateway::new(config), req, &ctx).await,
        Err(err) => config_error_response(&req, err).await,
    }
}

/// Like [`run`], with `[gateway]` defaults taken from an embedded `streamgate.toml`.
///
/// ```rust,ignore
/// run_with_manifest(include_str!("../../streamgate.toml"), req, env, ctx).await
/// ```
#[cfg(all(feature = "cloudflare", target_arch = "wasm32"))]
pub async fn run_with_manifest(
    manifest_src: &str,
    req: worker::Request,
    env: worker::Env,
    ctx: worker::Context,
) -> Result<worker::Response, worker::Error> {
    init_logger().ok();
    let loader = match streamgate_core::manifest::ManifestLoader::load_from_str(manifest_src) {
        Ok(loader) => loader,
        Err(err) => return config_error_response(&req, err).await,
    };
    match config_from_env(&env, loader.manifest().gateway().builder()) {
        Ok(config) => dispatch(&streamgate_core::gateway::Gateway::new(config), req, &ctx).await,
        Err(err) => config_error_response(&req, err).await,
    }
}
