//! Builds the URL a browser-side caller uses to reach the gateway.
//!
//! An absolute base addresses the upstream (or another gateway) directly. A relative base under
//! the mount prefix uses the catch-all form, `<mount>?path=<encoded path and query>`, which
//! [`crate::target::resolve_target`] unpacks again.

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use crate::config::GatewayConfig;

pub fn build_proxy_aware_url(
    config: &GatewayConfig,
    base: Option<&str>,
    path: &str,
    params: &[(&str, &str)],
) -> String {
    let path = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    };
    let query = search_string(params);

    let raw_base = base.map(str::trim).unwrap_or_default();
    let base = if raw_base.is_empty() {
        config.mount_prefix()
    } else {
        raw_base
    };

    if is_absolute(base) {
        return format!("{}{}{}", base.strip_suffix('/').unwrap_or(base), path, query);
    }

    let base = normalize_relative(base);
    if is_under_mount(config.mount_prefix(), &base) {
        let separator = if base.contains('?') { '&' } else { '?' };
        return format!(
            "{}{}{}={}",
            base,
            separator,
            config.catch_all_param(),
            encode_component(&format!("{}{}", path, query))
        );
    }

    format!("{}{}{}", base, path, query)
}

fn is_absolute(base: &str) -> bool {
    let lower = base.get(..8).unwrap_or(base).to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

fn is_under_mount(mount: &str, base: &str) -> bool {
    if mount.is_empty() {
        return false;
    }
    match base.strip_prefix(mount) {
        Some(rest) => rest.is_empty() || rest.starts_with('/') || rest.starts_with('?'),
        None => false,
    }
}

fn normalize_relative(base: &str) -> String {
    let rooted = if base.starts_with('/') {
        base.to_string()
    } else {
        format!("/{}", base)
    };
    match rooted.strip_suffix('/') {
        Some(stripped) => stripped.to_string(),
        None => rooted,
    }
}

/// Blank values are dropped and a repeated key replaces the earlier value in place.
fn search_string(params: &[(&str, &str)]) -> String {
    let mut kept: Vec<(&str, &str)> = Vec::new();
    for &(key, value) in params {
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        match kept.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => kept.push((key, value)),
        }
    }

    match serde_urlencoded::to_string(&kept) {
        Ok(query) if !query.is_empty() => format!("?{}", query),
        _ => String::new(),
    }
}

/// The JavaScript `encodeURIComponent` safe set.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

fn encode_component(value: &str) -> String {
    utf8_percent_encode(value, URI_COMPONENT).to_string()
}
