//! CORS Responder. The gateway's policy is permissive and computed per request; it is applied
//! last on every response so upstream CORS headers never leak through.

use crate::config::GatewayConfig;
use crate::http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
    ACCESS_CONTROL_EXPOSE_HEADERS, ACCESS_CONTROL_REQUEST_HEADERS, CONTENT_TYPE, ORIGIN,
};
use crate::http::{HeaderMap, HeaderValue, StatusCode};
use crate::response::FixedResponse;

pub const ALLOW_METHODS: &str = "GET,POST,PUT,PATCH,DELETE,OPTIONS";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CorsHeaders {
    allow_origin: HeaderValue,
    allow_methods: HeaderValue,
    allow_headers: HeaderValue,
    expose_headers: HeaderValue,
}

impl CorsHeaders {
    pub fn for_request(config: &GatewayConfig, request_headers: &HeaderMap) -> Self {
        let allow_origin = echoed(request_headers, &ORIGIN).unwrap_or(HeaderValue::from_static("*"));
        let allow_headers = echoed(request_headers, &ACCESS_CONTROL_REQUEST_HEADERS)
            .unwrap_or_else(|| default_allow_headers(config));

        Self {
            allow_origin,
            allow_methods: HeaderValue::from_static(ALLOW_METHODS),
            allow_headers,
            expose_headers: HeaderValue::from_static("*"),
        }
    }

    pub fn allow_origin(&self) -> &HeaderValue {
        &self.allow_origin
    }

    pub fn allow_headers(&self) -> &HeaderValue {
        &self.allow_headers
    }

    /// Overwrites any access-control headers already present.
    pub fn apply(&self, headers: &mut HeaderMap) {
        headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, self.allow_origin.clone());
        headers.insert(ACCESS_CONTROL_ALLOW_METHODS, self.allow_methods.clone());
        headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, self.allow_headers.clone());
        headers.insert(ACCESS_CONTROL_EXPOSE_HEADERS, self.expose_headers.clone());
    }

    /// `204 No Content` carrying only the CORS headers.
    pub fn preflight(&self) -> FixedResponse {
        let mut headers = HeaderMap::with_capacity(4);
        self.apply(&mut headers);
        FixedResponse::new(StatusCode::NO_CONTENT, headers, None)
    }
}

fn echoed(headers: &HeaderMap, name: &crate::http::HeaderName) -> Option<HeaderValue> {
    headers
        .get(name)
        .filter(|value| !value.as_bytes().iter().all(u8::is_ascii_whitespace))
        .cloned()
}

fn default_allow_headers(config: &GatewayConfig) -> HeaderValue {
    let value = format!("{},{}", CONTENT_TYPE, config.credential_header());
    HeaderValue::from_str(&value).unwrap_or(HeaderValue::from_static("content-type"))
}
