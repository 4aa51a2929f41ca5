//! Redirect following for the Fastly host, whose backend requests never follow `Location` on
//! their own.

use streamgate_core::http::header::{
    AUTHORIZATION, CONTENT_ENCODING, CONTENT_LENGTH, CONTENT_TYPE, COOKIE, PROXY_AUTHORIZATION,
};
use streamgate_core::http::{HeaderMap, Method, StatusCode, Uri};
use url::Url;

/// Hops followed before the upstream call is treated as failed.
pub const MAX_REDIRECTS: usize = 10;

/// Where and how to resend after a redirect response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Redirect {
    pub method: Method,
    pub uri: Uri,
    /// False when the method was rewritten to `GET`, which drops the request body.
    pub keeps_body: bool,
}

impl Redirect {
    /// Adjusts the outbound headers for the next hop. A rewritten request loses its body headers,
    /// and a hop to another origin loses credentials tied to the previous one.
    pub fn apply(&self, previous: &Uri, headers: &mut HeaderMap) {
        if !self.keeps_body {
            headers.remove(CONTENT_TYPE);
            headers.remove(CONTENT_LENGTH);
            headers.remove(CONTENT_ENCODING);
        }
        if !same_origin(previous, &self.uri) {
            headers.remove(AUTHORIZATION);
            headers.remove(PROXY_AUTHORIZATION);
            headers.remove(COOKIE);
        }
    }
}

/// Returns the next hop for a redirect status carrying a usable `Location`, or `None` when the
/// response should be relayed as it is.
///
/// `303` becomes `GET` for every method but `HEAD`; `301` and `302` become `GET` only for `POST`.
/// `307` and `308` keep the method and body.
pub fn next_hop(
    status: StatusCode,
    method: &Method,
    base: &Uri,
    location: Option<&str>,
) -> Option<Redirect> {
    let rewrite = match status {
        StatusCode::SEE_OTHER => *method != Method::HEAD,
        StatusCode::MOVED_PERMANENTLY | StatusCode::FOUND => *method == Method::POST,
        StatusCode::TEMPORARY_REDIRECT | StatusCode::PERMANENT_REDIRECT => false,
        _ => return None,
    };
    let location = location?.trim();
    if location.is_empty() {
        return None;
    }

    let uri = match resolve_location(base, location) {
        Some(uri) => uri,
        None => {
            log::debug!("ignoring unusable redirect location {:?}", location);
            return None;
        }
    };

    Some(if rewrite {
        Redirect {
            method: Method::GET,
            uri,
            keeps_body: false,
        }
    } else {
        Redirect {
            method: method.clone(),
            uri,
            keeps_body: true,
        }
    })
}

/// Resolves `location` against `base` the way a browser would. Only `http` and `https` targets
/// are followed; the fragment is dropped.
fn resolve_location(base: &Uri, location: &str) -> Option<Uri> {
    let base = Url::parse(&base.to_string()).ok()?;
    let mut next = base.join(location).ok()?;
    if !matches!(next.scheme(), "http" | "https") {
        return None;
    }
    next.set_fragment(None);
    next.as_str().parse().ok()
}

fn same_origin(a: &Uri, b: &Uri) -> bool {
    a.scheme() == b.scheme() && a.host() == b.host() && a.port_u16() == b.port_u16()
}
