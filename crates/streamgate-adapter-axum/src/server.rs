use std::net::{SocketAddr, TcpListener as StdTcpListener};
use std::time::Duration;

use anyhow::Context;
use axum::Router;
use log::LevelFilter;
use simple_logger::SimpleLogger;
use streamgate_core::gateway::Gateway;
use streamgate_core::manifest::ResolvedLoggingConfig;
use tokio::runtime::Builder as RuntimeBuilder;
use tokio::signal;

use crate::host::{AxumHost, DEFAULT_CONNECT_TIMEOUT};
use crate::service::{default_local_workers, GatewayAxumService};

#[derive(Clone, Debug)]
pub struct AxumServerConfig {
    pub addr: SocketAddr,
    pub enable_ctrl_c: bool,
    pub connect_timeout: Duration,
    /// Threads running the gateway's local request tasks.
    pub local_workers: usize,
}

impl Default for AxumServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 8787)),
            enable_ctrl_c: true,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            local_workers: default_local_workers(),
        }
    }
}

/// Blocking server runner used by the `streamgate` binary.
pub struct AxumServer {
    gateway: Gateway,
    config: AxumServerConfig,
}

impl AxumServer {
    pub fn new(gateway: Gateway) -> Self {
        Self {
            gateway,
            config: AxumServerConfig::default(),
        }
    }

    pub fn with_config(gateway: Gateway, config: AxumServerConfig) -> Self {
        Self { gateway, config }
    }

    pub fn run(self) -> anyhow::Result<()> {
        let runtime = RuntimeBuilder::new_multi_thread()
            .enable_all()
            .build()
            .context("failed to build tokio runtime")?;

        runtime.block_on(async move { self.run_async().await })
    }

    async fn run_async(self) -> anyhow::Result<()> {
        let listener = StdTcpListener::bind(self.config.addr)
            .with_context(|| format!("failed to bind gateway to {}", self.config.addr))?;
        listener
            .set_nonblocking(true)
            .context("failed to set listener to non-blocking")?;
        let listener = tokio::net::TcpListener::from_std(listener)
            .context("failed to adopt std listener into tokio")?;

        self.serve(listener).await
    }

    /// Serves on an already-bound listener until ctrl-c (when enabled) or an I/O error.
    pub async fn serve(self, listener: tokio::net::TcpListener) -> anyhow::Result<()> {
        let AxumServer { gateway, config } = self;
        let host = AxumHost::new(config.connect_timeout).context("failed to build HTTP client")?;

        if let Ok(addr) = listener.local_addr() {
            log::info!(
                "streamgate listening on http://{} -> {}",
                addr,
                gateway.config().upstream_base()
            );
        }

        let service = GatewayAxumService::with_local_workers(gateway, host, config.local_workers);
        let router = Router::new().fallback_service(service);
        let server = axum::serve(listener, router);

        if config.enable_ctrl_c {
            server
                .with_graceful_shutdown(async {
                    let _ = signal::ctrl_c().await;
                })
                .await
                .context("axum server error")?;
        } else {
            server.await.context("axum server error")?;
        }

        Ok(())
    }
}

/// Installs `simple_logger`. `echo_stdout = false` silences it; repeated calls are ignored.
pub fn init_logger(logging: &ResolvedLoggingConfig) {
    let level: LevelFilter = logging.level.into();
    let level = if logging.echo_stdout.unwrap_or(true) {
        level
    } else {
        LevelFilter::Off
    };

    SimpleLogger::new().with_level(level).init().ok();
}
