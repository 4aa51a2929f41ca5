//! `streamgate.toml` loading: gateway defaults plus per-adapter logging.
//!
//! ```toml
//! [gateway]
//! upstream_base = "https://proxy.example.com/google"
//! mount_prefix = "/api/gemini"
//!
//! [logging.axum]
//! level = "debug"
//! echo_stdout = true
//! ```
//!
//! Values found here sit below runtime keys: [`ManifestGateway::builder`] returns a builder that
//! callers finish with [`GatewayConfigBuilder::with_lookup`].

use log::LevelFilter;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::io;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use validator::Validate;

use crate::config::GatewayConfigBuilder;

pub const DEFAULT_MANIFEST_FILE: &str = "streamgate.toml";

pub struct ManifestLoader {
    manifest: Arc<Manifest>,
}

impl ManifestLoader {
    pub fn load_from_str(contents: &str) -> Result<Self, io::Error> {
        let mut manifest: Manifest = toml::from_str(contents)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
        manifest
            .validate()
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err.to_string()))?;
        manifest.finalize();
        Ok(Self {
            manifest: Arc::new(manifest),
        })
    }

    pub fn from_path(path: &Path) -> Result<Self, io::Error> {
        let contents = std::fs::read_to_string(path)?;
        Self::load_from_str(&contents)
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct Manifest {
    #[serde(default)]
    #[validate(nested)]
    pub gateway: ManifestGateway,
    #[serde(default)]
    #[validate(nested)]
    pub logging: ManifestLogging,
    #[serde(skip)]
    pub(crate) logging_resolved: BTreeMap<String, ResolvedLoggingConfig>,
}

impl Manifest {
    pub fn gateway(&self) -> &ManifestGateway {
        &self.gateway
    }

    pub fn logging_for(&self, adapter: &str) -> Option<&ResolvedLoggingConfig> {
        self.logging_resolved.get(&adapter.to_ascii_lowercase())
    }

    pub fn logging_or_default(&self, adapter: &str) -> ResolvedLoggingConfig {
        self.logging_for(adapter).cloned().unwrap_or_default()
    }

    fn finalize(&mut self) {
        self.logging_resolved = self
            .logging
            .adapters
            .iter()
            .map(|(adapter, cfg)| {
                (
                    adapter.to_ascii_lowercase(),
                    ResolvedLoggingConfig::from_manifest(cfg),
                )
            })
            .collect();
    }
}

#[derive(Clone, Debug, Default, Deserialize, Validate)]
pub struct ManifestGateway {
    #[serde(default)]
    #[validate(url)]
    pub upstream_base: Option<String>,
    #[serde(default)]
    #[validate(length(min = 1))]
    pub default_credential: Option<String>,
    #[serde(default)]
    #[validate(length(min = 1))]
    pub credential_header: Option<String>,
    #[serde(default)]
    pub mount_prefix: Option<String>,
    #[serde(default)]
    #[validate(length(min = 1))]
    pub catch_all_param: Option<String>,
    #[serde(default)]
    #[validate(length(min = 1))]
    pub upstream_name: Option<String>,
}

impl ManifestGateway {
    pub fn builder(&self) -> GatewayConfigBuilder {
        let mut builder = GatewayConfigBuilder::default();
        if let Some(value) = &self.upstream_base {
            builder = builder.upstream_base(value.as_str());
        }
        if let Some(value) = &self.default_credential {
            builder = builder.default_credential(value.as_str());
        }
        if let Some(value) = &self.credential_header {
            builder = builder.credential_header(value.as_str());
        }
        if let Some(value) = &self.mount_prefix {
            builder = builder.mount_prefix(value.as_str());
        }
        if let Some(value) = &self.catch_all_param {
            builder = builder.catch_all_param(value.as_str());
        }
        if let Some(value) = &self.upstream_name {
            builder = builder.upstream_name(value.as_str());
        }
        builder
    }
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct ManifestLogging {
    #[serde(flatten)]
    #[validate(nested)]
    pub adapters: BTreeMap<String, ManifestLoggingConfig>,
}

#[derive(Debug, Default, Deserialize, Clone, Validate)]
pub struct ManifestLoggingConfig {
    #[serde(default)]
    pub level: Option<LogLevel>,
    #[serde(default)]
    #[validate(length(min = 1))]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub echo_stdout: Option<bool>,
}

#[derive(Debug, Clone, Default)]
pub struct ResolvedLoggingConfig {
    pub level: LogLevel,
    pub endpoint: Option<String>,
    pub echo_stdout: Option<bool>,
}

impl ResolvedLoggingConfig {
    fn from_manifest(cfg: &ManifestLoggingConfig) -> Self {
        Self {
            level: cfg.level.unwrap_or_default(),
            endpoint: cfg.endpoint.clone(),
            echo_stdout: cfg.echo_stdout,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Default)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    Off,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
            Self::Off => "off",
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "trace" => Ok(Self::Trace),
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            "off" => Ok(Self::Off),
            other => Err(format!(
                "logging level must be trace, debug, info, warn, error, or off (got `{}`)",
                other
            )),
        }
    }
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => LevelFilter::Trace,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Off => LevelFilter::Off,
        }
    }
}

impl<'de> Deserialize<'de> for LogLevel {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        value.parse().map_err(serde::de::Error::custom)
    }
}
