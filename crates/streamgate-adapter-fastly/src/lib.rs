//! Fastly Compute host for the StreamGate gateway.
//!
//! ```rust,ignore
//! #[fastly::main]
//! fn main(req: fastly::Request) -> Result<fastly::Response, fastly::Error> {
//!     streamgate_adapter_fastly::run_with_manifest(include_str!("../streamgate.toml"), req)
//! }
//! ```

mod redirect;
mod writer;

#[cfg(feature = "fastly")]
mod host;
#[cfg(feature = "fastly")]
mod logger;
#[cfg(feature = "fastly")]
mod request;
#[cfg(feature = "fastly")]
mod response;

pub use redirect::{next_hop, Redirect, MAX_REDIRECTS};
pub use writer::BufferedWriter;

#[cfg(feature = "fastly")]
pub use host::FastlyHost;
#[cfg(feature = "fastly")]
pub use request::{
    config_error_response, config_from_store, dispatch, dispatch_with_host, header_map,
    into_inbound_request,
};
#[cfg(feature = "fastly")]
pub use response::from_buffered;

use streamgate_core::manifest::ResolvedLoggingConfig;

/// Config store consulted for `PROXY_GEMINI_BASE`, `GEMINI_API_KEY` and the other runtime keys.
pub const CONFIG_STORE_NAME: &str = "streamgate";

/// Manifest section read by [`run_with_manifest`]: `[logging.fastly]`.
pub const MANIFEST_ADAPTER: &str = "fastly";

#[derive(Debug, Clone)]
pub struct FastlyLogging {
    pub endpoint: Option<String>,
    pub level: log::LevelFilter,
    pub echo_stdout: bool,
}

impl From<ResolvedLoggingConfig> for FastlyLogging {
    fn from(config: ResolvedLoggingConfig) -> Self {
        Self {
            endpoint: config.endpoint,
            level: config.level.into(),
            echo_stdout: config.echo_stdout.unwrap_or(true),
        }
    }
}

#[cfg(feature = "fastly")]
pub fn init_logger(endpoint: &str, level: log::LevelFilter, echo_stdout: bool) -> anyhow::Result<()> {
    logger::init_logger(endpoint, level, echo_stdout)
}

#[cfg(not(feature = "fastly"))]
pub fn init_logger(
    _endpoint: &str,
    _level: log::LevelFilter,
    _echo_stdout: bool,
) -> anyhow::Result<()> {
    Ok(())
}

/// Handles one request with configuration from the [`CONFIG_STORE_NAME`] store.
#[cfg(feature = "fastly")]
pub fn run(req: fastly::Request) -> Result<fastly::Response, fastly::Error> {
    run_with_logging(
        FastlyLogging::from(ResolvedLoggingConfig::default()),
        streamgate_core::config::GatewayConfig::builder(),
        req,
    )
}

/// Like [`run`], with `[gateway]` defaults and `[logging.fastly]` taken from an embedded
/// `streamgate.toml`.
#[cfg(feature = "fastly")]
pub fn run_with_manifest(
    manifest_src: &str,
    req: fastly::Request,
) -> Result<fastly::Response, fastly::Error> {
    let loader = match streamgate_core::manifest::ManifestLoader::load_from_str(manifest_src) {
        Ok(loader) => loader,
        Err(err) => return config_error_response(&req, err),
    };
    let manifest = loader.manifest();
    run_with_logging(
        manifest.logging_or_default(MANIFEST_ADAPTER).into(),
        manifest.gateway().builder(),
        req,
    )
}

#[cfg(feature = "fastly")]
pub fn run_with_logging(
    logging: FastlyLogging,
    builder: streamgate_core::config::GatewayConfigBuilder,
    req: fastly::Request,
) -> Result<fastly::Response, fastly::Error> {
    let endpoint = logging.endpoint.as_deref().unwrap_or("stdout");
    if let Err(err) = init_logger(endpoint, logging.level, logging.echo_stdout) {
        eprintln!("streamgate: logger unavailable: {}", err);
    }

    match config_from_store(CONFIG_STORE_NAME, builder) {
        Ok(config) => dispatch(&streamgate_core::gateway::Gateway::new(config), req),
        Err(err) => config_error_response(&req, err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use streamgate_core::manifest::{LogLevel, ManifestLoader};

    #[test]
    fn logging_defaults_echo_to_stdout() {
        let logging = FastlyLogging::from(ResolvedLoggingConfig::default());
        assert!(logging.endpoint.is_none());
        assert!(logging.echo_stdout);
    }

    #[test]
    fn logging_from_manifest_section() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(
            file,
            "[logging.fastly]\nlevel = \"debug\"\nendpoint = \"relay-log\"\necho_stdout = false"
        )
        .expect("write manifest");

        let loader = ManifestLoader::from_path(file.path()).expect("manifest");
        let resolved = loader.manifest().logging_or_default(MANIFEST_ADAPTER);
        assert_eq!(resolved.level, LogLevel::Debug);

        let logging = FastlyLogging::from(resolved);
        assert_eq!(logging.endpoint.as_deref(), Some("relay-log"));
        assert_eq!(logging.level, log::LevelFilter::Debug);
        assert!(!logging.echo_stdout);
    }

    #[cfg(not(feature = "fastly"))]
    #[test]
    fn logger_is_noop_without_runtime() {
        assert!(init_logger("stdout", log::LevelFilter::Info, true).is_ok());
    }
}
