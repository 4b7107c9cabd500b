//! The request/response abstraction the cache operates on.
//!
//! The engine does not depend on any particular HTTP client; it works over
//! these owned message types, built on the `http` crate's method, URI, status,
//! and header primitives. A transport interceptor converts to and from its own
//! representation at the boundary.

use std::time::SystemTime;

use bytes::Bytes;
use http::header::{self, HeaderName, HeaderValue};
use http::{HeaderMap, Method, StatusCode, Uri};

use crate::directives::CacheControl;

/// An outgoing request, as seen by the cache.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    /// Headers describing the request body (e.g. `Content-Type`).
    ///
    /// Kept apart from `headers` because Vary-axis resolution consults the
    /// request headers first and falls back to the content headers.
    pub content_headers: HeaderMap,
}

impl Request {
    pub fn new(method: Method, uri: Uri) -> Self {
        Request {
            method,
            uri,
            headers: HeaderMap::new(),
            content_headers: HeaderMap::new(),
        }
    }

    /// Shorthand for a bare GET request, the common case in tests and docs.
    pub fn get(uri: Uri) -> Self {
        Request::new(Method::GET, uri)
    }

    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    #[must_use]
    pub fn with_content_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.content_headers.append(name, value);
        self
    }

    /// The request's `Cache-Control` directives; "no directives" if absent.
    pub fn cache_control(&self) -> CacheControl {
        CacheControl::from_headers(&self.headers)
    }
}

/// A response, as seen by the cache: status, headers, and an optional payload.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

impl Response {
    pub fn new(status: StatusCode) -> Self {
        Response {
            status,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// The response's `Cache-Control` directives; "no directives" if absent.
    pub fn cache_control(&self) -> CacheControl {
        CacheControl::from_headers(&self.headers)
    }

    /// The `Date` header, if present and well-formed.
    pub fn date(&self) -> Option<SystemTime> {
        self.http_date(&header::DATE)
    }

    /// The `Expires` header, if present and well-formed.
    pub fn expires(&self) -> Option<SystemTime> {
        self.http_date(&header::EXPIRES)
    }

    /// The `Last-Modified` header, if present and well-formed.
    pub fn last_modified(&self) -> Option<SystemTime> {
        self.http_date(&header::LAST_MODIFIED)
    }

    /// The entity tag, if the response carries one.
    pub fn etag(&self) -> Option<&str> {
        self.headers.get(header::ETAG)?.to_str().ok()
    }

    /// True if the response carries a validator usable in a conditional
    /// request: an entity tag or a last-modified timestamp.
    pub fn has_validator(&self) -> bool {
        self.etag().is_some() || self.last_modified().is_some()
    }

    /// The header names this response declares as its Vary axes.
    ///
    /// All `Vary` headers are combined, each split on commas. Names are
    /// returned as written; key derivation canonicalizes them.
    pub fn vary_axes(&self) -> Vec<String> {
        self.headers
            .get_all(header::VARY)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(','))
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_owned)
            .collect()
    }

    fn http_date(&self, name: &HeaderName) -> Option<SystemTime> {
        let value = self.headers.get(name)?.to_str().ok()?;
        httpdate::parse_http_date(value).ok()
    }
}
