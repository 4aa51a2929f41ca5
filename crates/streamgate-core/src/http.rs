pub use http::header;

pub type Method = http::Method;
pub type StatusCode = http::StatusCode;
pub type HeaderMap = http::HeaderMap;
pub type HeaderValue = http::HeaderValue;
pub type HeaderName = http::header::HeaderName;
pub type Uri = http::Uri;

/// Methods that never carry a request body, compared case-insensitively so extension spellings
/// such as `get` are treated like their canonical form.
pub fn is_bodyless(method: &Method) -> bool {
    let name = method.as_str();
    name.eq_ignore_ascii_case("GET") || name.eq_ignore_ascii_case("HEAD")
}

pub fn is_preflight(method: &Method) -> bool {
    method.as_str().eq_ignore_ascii_case("OPTIONS")
}
