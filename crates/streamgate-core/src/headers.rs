//! Header Normalizer: derives the outbound header set from the caller's headers.

use crate::config::GatewayConfig;
use crate::http::header::{ACCEPT_ENCODING, CONNECTION, CONTENT_LENGTH, HOST};
use crate::http::{HeaderMap, HeaderName, HeaderValue};

/// Never forwarded upstream. `accept-encoding` is dropped on every host so upstream bodies always
/// arrive uncompressed and can be relayed byte-for-byte.
pub const STRIPPED_HEADERS: [HeaderName; 4] = [HOST, CONNECTION, CONTENT_LENGTH, ACCEPT_ENCODING];

/// Pure: the same input always yields the same output and `inbound` is left untouched.
pub fn normalize_headers(config: &GatewayConfig, inbound: &HeaderMap) -> HeaderMap {
    let mut outbound = HeaderMap::with_capacity(inbound.keys_len() + 1);

    for name in inbound.keys() {
        if STRIPPED_HEADERS.contains(name) {
            continue;
        }
        if let Some(value) = joined_value(inbound, name) {
            outbound.insert(name.clone(), value);
        }
    }

    let credential = config.credential_header();
    let missing = outbound
        .get(credential)
        .map(|value| is_blank(value.as_bytes()))
        .unwrap_or(true);
    if missing {
        outbound.insert(credential.clone(), config.default_credential().clone());
    }

    outbound
}

/// Empty values are skipped; remaining values are joined with `,` in arrival order.
fn joined_value(headers: &HeaderMap, name: &HeaderName) -> Option<HeaderValue> {
    let values: Vec<&[u8]> = headers
        .get_all(name)
        .iter()
        .map(HeaderValue::as_bytes)
        .filter(|value| !value.is_empty())
        .collect();

    match values.as_slice() {
        [] => None,
        [single] => HeaderValue::from_bytes(single).ok(),
        many => {
            let joined = many.join(&b","[..]);
            match HeaderValue::from_bytes(&joined) {
                Ok(value) => Some(value),
                Err(err) => {
                    log::debug!("dropping header {}: {}", name, err);
                    None
                }
            }
        }
    }
}

fn is_blank(value: &[u8]) -> bool {
    value.iter().all(u8::is_ascii_whitespace)
}
