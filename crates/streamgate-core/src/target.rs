//! Target Resolver: maps the inbound path and query onto one absolute upstream URL.

use std::fmt;

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::http::Uri;

/// The shape in which a host delivers the request location.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TargetSource {
    /// Raw URL path (still percent-encoded) and raw query string, as seen by a router that parses
    /// paths itself. The gateway mount prefix is stripped from `path`.
    Routed { path: String, query: Option<String> },
    /// Decoded query pairs where the path segments travel in the catch-all parameter.
    CatchAll { query: Vec<(String, String)> },
}

impl TargetSource {
    pub fn routed(path: impl Into<String>, query: Option<&str>) -> Self {
        TargetSource::Routed {
            path: path.into(),
            query: query.filter(|q| !q.is_empty()).map(str::to_string),
        }
    }

    pub fn catch_all<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        TargetSource::CatchAll {
            query: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Inbound path for log lines; the catch-all shape has none.
    pub fn inbound_path(&self) -> &str {
        match self {
            TargetSource::Routed { path, .. } => path,
            TargetSource::CatchAll { .. } => "-",
        }
    }
}

/// Resolved upstream location. `path` is empty or starts with exactly one `/`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TargetDescriptor {
    base: String,
    path: String,
    query: String,
}

impl TargetDescriptor {
    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn url(&self) -> String {
        let mut url =
            String::with_capacity(self.base.len() + self.path.len() + self.query.len() + 1);
        url.push_str(&self.base);
        url.push_str(&self.path);
        if !self.query.is_empty() {
            url.push('?');
            url.push_str(&self.query);
        }
        url
    }

    pub fn uri(&self) -> Result<Uri, GatewayError> {
        let url = self.url();
        url.parse::<Uri>().map_err(|err| {
            GatewayError::bad_request(format!("invalid upstream target `{}`: {}", url, err))
        })
    }
}

impl fmt::Display for TargetDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url())
    }
}

/// Resolution never fails: malformed input collapses to "no suffix" or is forwarded as-is.
pub fn resolve_target(config: &GatewayConfig, source: &TargetSource) -> TargetDescriptor {
    let (path, query) = match source {
        TargetSource::Routed { path, query } => resolve_routed(config, path, query.as_deref()),
        TargetSource::CatchAll { query } => resolve_catch_all(config.catch_all_param(), query),
    };

    TargetDescriptor {
        base: config.upstream_base().to_string(),
        path,
        query,
    }
}

fn resolve_routed(config: &GatewayConfig, path: &str, query: Option<&str>) -> (String, String) {
    let suffix = collapse_segments(strip_mount(config.mount_prefix(), path).split('/'));
    let Some(raw_query) = query.filter(|q| !q.is_empty()) else {
        return (suffix, String::new());
    };

    match serde_urlencoded::from_str::<Vec<(String, String)>>(raw_query) {
        // A bare mount hit carrying the catch-all key came from the catch-all URL form.
        Ok(pairs) if suffix.is_empty() && has_key(&pairs, config.catch_all_param()) => {
            resolve_catch_all(config.catch_all_param(), &pairs)
        }
        Ok(pairs) => (suffix, encode_pairs(&pairs, raw_query)),
        Err(err) => {
            log::debug!("forwarding unparsed query `{}`: {}", raw_query, err);
            (suffix, raw_query.to_string())
        }
    }
}

fn resolve_catch_all(param: &str, pairs: &[(String, String)]) -> (String, String) {
    let mut segments = Vec::new();
    let mut embedded = Vec::new();

    for (_, value) in pairs.iter().filter(|(k, _)| k == param) {
        let (path, query) = match value.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (value.as_str(), None),
        };
        segments.extend(path.split('/').map(encode_segment));
        if let Some(query) = query {
            match serde_urlencoded::from_str::<Vec<(String, String)>>(query) {
                Ok(parsed) => embedded.extend(parsed),
                Err(err) => log::debug!("dropping malformed embedded query `{}`: {}", query, err),
            }
        }
    }

    embedded.extend(pairs.iter().filter(|(k, _)| k != param).cloned());
    let path = collapse_segments(segments.iter().map(String::as_str));
    (path, encode_pairs(&embedded, ""))
}

fn has_key(pairs: &[(String, String)], key: &str) -> bool {
    pairs.iter().any(|(k, _)| k == key)
}

/// Segment-aware: `/api/geminiX` is not under `/api/gemini`.
fn strip_mount<'a>(prefix: &str, path: &'a str) -> &'a str {
    if prefix.is_empty() {
        return path;
    }
    match path.strip_prefix(prefix) {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => rest,
        _ => path,
    }
}

fn collapse_segments<'a, I>(segments: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let mut path = String::new();
    for segment in segments.into_iter().filter(|s| !s.is_empty()) {
        path.push('/');
        path.push_str(segment);
    }
    path
}

fn encode_pairs(pairs: &[(String, String)], fallback: &str) -> String {
    serde_urlencoded::to_string(pairs).unwrap_or_else(|err| {
        log::debug!("query re-encoding failed: {}", err);
        fallback.to_string()
    })
}

/// Everything outside RFC 3986 `pchar` is escaped.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~')
    .remove(b'!')
    .remove(b'$')
    .remove(b'&')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')')
    .remove(b'*')
    .remove(b'+')
    .remove(b',')
    .remove(b';')
    .remove(b'=')
    .remove(b':')
    .remove(b'@');

fn encode_segment(segment: &str) -> String {
    utf8_percent_encode(segment, PATH_SEGMENT).to_string()
}
