//! `streamgate` server: loads `streamgate.toml` when present, applies environment overrides and
//! serves the gateway until ctrl-c.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use streamgate_adapter_axum::{init_logger, AxumServer, AxumServerConfig};
use streamgate_core::gateway::Gateway;
use streamgate_core::manifest::{LogLevel, Manifest, ManifestLoader, DEFAULT_MANIFEST_FILE};

#[derive(Parser, Debug)]
#[command(name = "streamgate", about = "Streaming reverse proxy for generative-content APIs")]
struct Args {
    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1:8787")]
    addr: SocketAddr,
    /// Manifest path (default: ./streamgate.toml when it exists)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Overrides `[logging.axum] level`
    #[arg(long)]
    log_level: Option<LogLevel>,
    /// Upstream connect timeout in seconds
    #[arg(long, default_value_t = 10)]
    connect_timeout: u64,
    /// Threads running gateway request tasks (default: one per core)
    #[arg(long)]
    local_workers: Option<usize>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let loader = load_manifest(args.config.as_deref())?;
    let manifest = loader.as_ref().map(ManifestLoader::manifest);

    let mut logging = manifest
        .map(|m| m.logging_or_default("axum"))
        .unwrap_or_default();
    if let Some(level) = args.log_level {
        logging.level = level;
    }
    init_logger(&logging);

    let config = manifest
        .map(Manifest::gateway)
        .map(|gateway| gateway.builder())
        .unwrap_or_default()
        .with_lookup(|key| std::env::var(key).ok())
        .build()
        .context("invalid gateway configuration")?;
    log::debug!("gateway configuration: {:?}", config);

    let mut server_config = AxumServerConfig {
        addr: args.addr,
        enable_ctrl_c: true,
        connect_timeout: Duration::from_secs(args.connect_timeout),
        ..AxumServerConfig::default()
    };
    if let Some(workers) = args.local_workers {
        server_config.local_workers = workers;
    }
    AxumServer::with_config(Gateway::new(config), server_config).run()
}

fn load_manifest(path: Option<&std::path::Path>) -> anyhow::Result<Option<ManifestLoader>> {
    match path {
        Some(path) => ManifestLoader::from_path(path)
            .map(Some)
            .with_context(|| format!("failed to load {}", path.display())),
        None => {
            let default = PathBuf::from(DEFAULT_MANIFEST_FILE);
            if default.exists() {
                ManifestLoader::from_path(&default)
                    .map(Some)
                    .with_context(|| format!("failed to load {}", default.display()))
            } else {
                Ok(None)
            }
        }
    }
}
