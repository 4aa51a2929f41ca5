//! Read-only gateway configuration, resolved once at startup and shared by reference.

use std::fmt;

use thiserror::Error;

use crate::http::{HeaderName, HeaderValue, Uri};

pub const DEFAULT_UPSTREAM_BASE: &str = "https://key.lixining.com/proxy/google";
pub const DEFAULT_CREDENTIAL: &str = "sk-lixining";
pub const DEFAULT_CREDENTIAL_HEADER: &str = "x-goog-api-key";
pub const DEFAULT_MOUNT_PREFIX: &str = "/api/gemini";
pub const DEFAULT_CATCH_ALL_PARAM: &str = "path";
pub const DEFAULT_UPSTREAM_NAME: &str = "Gemini";

/// Runtime keys consulted for the upstream base, first non-blank wins.
pub const UPSTREAM_BASE_KEYS: [&str; 2] = ["PROXY_GEMINI_BASE", "GOOGLE_PROXY_BASE"];
/// Runtime keys consulted for the default credential, first non-blank wins.
pub const CREDENTIAL_KEYS: [&str; 2] = ["GEMINI_API_KEY", "API_KEY"];

const BUILD_UPSTREAM_BASE: Option<&str> = option_env!("PROXY_GEMINI_BASE");
const BUILD_CREDENTIAL: Option<&str> = option_env!("GEMINI_API_KEY");

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("upstream base `{0}` must be an absolute http(s) URL")]
    InvalidUpstreamBase(String),
    #[error("default credential must not be blank")]
    BlankCredential,
    #[error("default credential is not a valid header value")]
    InvalidCredential,
    #[error("`{0}` is not a valid header name")]
    InvalidHeaderName(String),
    #[error("catch-all parameter name must not be blank")]
    BlankCatchAllParam,
}

#[derive(Clone)]
pub struct GatewayConfig {
    upstream_base: String,
    default_credential: HeaderValue,
    credential_header: HeaderName,
    mount_prefix: String,
    catch_all_param: String,
    upstream_name: String,
}

impl GatewayConfig {
    pub fn builder() -> GatewayConfigBuilder {
        GatewayConfigBuilder::default()
    }

    /// Resolve the configuration from any key/value source (process environment, Worker bindings,
    /// a Fastly config store). Blank values count as absent.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Self::builder().with_lookup(lookup).build()
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Upstream origin and base path, never ending in `/`.
    pub fn upstream_base(&self) -> &str {
        &self.upstream_base
    }

    pub fn default_credential(&self) -> &HeaderValue {
        &self.default_credential
    }

    pub fn credential_header(&self) -> &HeaderName {
        &self.credential_header
    }

    /// Mount prefix with one leading `/` and no trailing `/`; empty when mounted at the root.
    pub fn mount_prefix(&self) -> &str {
        &self.mount_prefix
    }

    pub fn catch_all_param(&self) -> &str {
        &self.catch_all_param
    }

    pub fn upstream_name(&self) -> &str {
        &self.upstream_name
    }

    fn compiled() -> Self {
        let mut default_credential = HeaderValue::from_static(DEFAULT_CREDENTIAL);
        default_credential.set_sensitive(true);
        Self {
            upstream_base: DEFAULT_UPSTREAM_BASE.to_string(),
            default_credential,
            credential_header: HeaderName::from_static(DEFAULT_CREDENTIAL_HEADER),
            mount_prefix: DEFAULT_MOUNT_PREFIX.to_string(),
            catch_all_param: DEFAULT_CATCH_ALL_PARAM.to_string(),
            upstream_name: DEFAULT_UPSTREAM_NAME.to_string(),
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        match Self::builder().build() {
            Ok(config) => config,
            Err(err) => {
                log::warn!("ignoring build-time gateway overrides: {}", err);
                Self::compiled()
            }
        }
    }
}

impl fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("upstream_base", &self.upstream_base)
            .field("default_credential", &"<redacted>")
            .field("credential_header", &self.credential_header)
            .field("mount_prefix", &self.mount_prefix)
            .field("catch_all_param", &self.catch_all_param)
            .field("upstream_name", &self.upstream_name)
            .finish()
    }
}

/// Layered construction: unset fields fall back to build-time overrides and then to the
/// compiled-in defaults.
#[derive(Clone, Debug, Default)]
pub struct GatewayConfigBuilder {
    upstream_base: Option<String>,
    default_credential: Option<String>,
    credential_header: Option<String>,
    mount_prefix: Option<String>,
    catch_all_param: Option<String>,
    upstream_name: Option<String>,
}

impl GatewayConfigBuilder {
    #[must_use]
    pub fn upstream_base(mut self, value: impl Into<String>) -> Self {
        self.upstream_base = Some(value.into());
        self
    }

    #[must_use]
    pub fn default_credential(mut self, value: impl Into<String>) -> Self {
        self.default_credential = Some(value.into());
        self
    }

    #[must_use]
    pub fn credential_header(mut self, value: impl Into<String>) -> Self {
        self.credential_header = Some(value.into());
        self
    }

    #[must_use]
    pub fn mount_prefix(mut self, value: impl Into<String>) -> Self {
        self.mount_prefix = Some(value.into());
        self
    }

    #[must_use]
    pub fn catch_all_param(mut self, value: impl Into<String>) -> Self {
        self.catch_all_param = Some(value.into());
        self
    }

    #[must_use]
    pub fn upstream_name(mut self, value: impl Into<String>) -> Self {
        self.upstream_name = Some(value.into());
        self
    }

    /// Override the upstream base and default credential from runtime keys
    /// ([`UPSTREAM_BASE_KEYS`], [`CREDENTIAL_KEYS`]).
    #[must_use]
    pub fn with_lookup<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(base) = first_present(&lookup, &UPSTREAM_BASE_KEYS) {
            self.upstream_base = Some(base);
        }
        if let Some(credential) = first_present(&lookup, &CREDENTIAL_KEYS) {
            self.default_credential = Some(credential);
        }
        self
    }

    pub fn build(self) -> Result<GatewayConfig, ConfigError> {
        let upstream_base = non_blank(self.upstream_base)
            .or_else(|| non_blank(BUILD_UPSTREAM_BASE.map(str::to_string)))
            .unwrap_or_else(|| DEFAULT_UPSTREAM_BASE.to_string());
        let upstream_base = normalize_upstream_base(&upstream_base)?;

        let credential = match self.default_credential {
            Some(value) => value,
            None => BUILD_CREDENTIAL.unwrap_or(DEFAULT_CREDENTIAL).to_string(),
        };
        let credential = credential.trim();
        if credential.is_empty() {
            return Err(ConfigError::BlankCredential);
        }
        let mut default_credential =
            HeaderValue::from_str(credential).map_err(|_| ConfigError::InvalidCredential)?;
        default_credential.set_sensitive(true);

        let header = non_blank(self.credential_header)
            .unwrap_or_else(|| DEFAULT_CREDENTIAL_HEADER.to_string());
        let credential_header = HeaderName::from_bytes(header.trim().as_bytes())
            .map_err(|_| ConfigError::InvalidHeaderName(header.clone()))?;

        let mount_prefix = normalize_mount_prefix(
            self.mount_prefix
                .as_deref()
                .unwrap_or(DEFAULT_MOUNT_PREFIX),
        );

        let catch_all_param = match self.catch_all_param {
            Some(value) if value.trim().is_empty() => return Err(ConfigError::BlankCatchAllParam),
            Some(value) => value.trim().to_string(),
            None => DEFAULT_CATCH_ALL_PARAM.to_string(),
        };

        let upstream_name =
            non_blank(self.upstream_name).unwrap_or_else(|| DEFAULT_UPSTREAM_NAME.to_string());

        Ok(GatewayConfig {
            upstream_base,
            default_credential,
            credential_header,
            mount_prefix,
            catch_all_param,
            upstream_name,
        })
    }
}

fn first_present<F>(lookup: &F, keys: &[&str]) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    keys.iter().find_map(|key| non_blank(lookup(key)))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn normalize_upstream_base(raw: &str) -> Result<String, ConfigError> {
    let trimmed = raw.trim().trim_end_matches('/');
    let lower = trimmed.to_ascii_lowercase();
    if !(lower.starts_with("http://") || lower.starts_with("https://")) {
        return Err(ConfigError::InvalidUpstreamBase(raw.to_string()));
    }

    match trimmed.parse::<Uri>() {
        Ok(uri) if uri.host().is_some_and(|host| !host.is_empty()) => Ok(trimmed.to_string()),
        _ => Err(ConfigError::InvalidUpstreamBase(raw.to_string())),
    }
}

fn normalize_mount_prefix(raw: &str) -> String {
    let trimmed = raw.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{}", trimmed)
    }
}
