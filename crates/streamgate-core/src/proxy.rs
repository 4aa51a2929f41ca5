use std::fmt;

use crate::body::Body;
use crate::http::{HeaderMap, Method, StatusCode, Uri};

/// The single outbound call made for an inbound request. Headers are already normalized and the
/// body already relayed; host adapters translate it verbatim.
pub struct UpstreamRequest {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Option<Body>,
}

impl UpstreamRequest {
    pub fn new(method: Method, uri: Uri, headers: HeaderMap, body: Option<Body>) -> Self {
        Self {
            method,
            uri,
            headers,
            body,
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> Option<&Body> {
        self.body.as_ref()
    }

    pub fn into_parts(self) -> (Method, Uri, HeaderMap, Option<Body>) {
        (self.method, self.uri, self.headers, self.body)
    }
}

impl fmt::Debug for UpstreamRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpstreamRequest")
            .field("method", &self.method)
            .field("uri", &self.uri)
            .field("headers", &self.headers)
            .field("body", &self.body.as_ref().map(|_| ".."))
            .finish()
    }
}

/// Upstream reply as received; consumed exactly once by the pump. A `None` body means the
/// upstream declared none (HEAD, 204, 304).
pub struct UpstreamResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Option<Body>,
}

impl UpstreamResponse {
    pub fn new(status: StatusCode, headers: HeaderMap, body: Option<Body>) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn body(&self) -> Option<&Body> {
        self.body.as_ref()
    }

    pub fn into_parts(self) -> (StatusCode, HeaderMap, Option<Body>) {
        (self.status, self.headers, self.body)
    }
}

impl fmt::Debug for UpstreamResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpstreamResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish()
    }
}
