use bytes::Bytes;
use http::header::HeaderMap;
use http::{Method, StatusCode};
use url::Url;

use crate::NetError;

/// Status line and headers of a received response.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseHead {
    pub status: StatusCode,
    pub headers: HeaderMap,
}

impl ResponseHead {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
        }
    }

    /// Returns a header value as a string, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Where a redirect response points the request next.
#[derive(Debug, Clone, PartialEq)]
pub struct RedirectInfo {
    pub status: StatusCode,
    pub new_method: Method,
    pub new_url: Url,
}

impl RedirectInfo {
    /// Computes the follow-up method for a redirect status, per fetch rules:
    /// 303 turns everything but HEAD into GET, 301/302 turn POST into GET.
    pub fn for_status(status: StatusCode, method: &Method, new_url: Url) -> Self {
        let new_method = match status.as_u16() {
            303 if *method != Method::HEAD => Method::GET,
            301 | 302 if *method == Method::POST => Method::GET,
            _ => method.clone(),
        };
        Self {
            status,
            new_method,
            new_url,
        }
    }
}

/// Final outcome of one network load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletionStatus {
    /// `None` when the load finished normally.
    pub error: Option<NetError>,
    /// Bytes of response body received.
    pub encoded_body_length: u64,
}

impl CompletionStatus {
    pub fn ok(encoded_body_length: u64) -> Self {
        Self {
            error: None,
            encoded_body_length,
        }
    }

    pub fn failed(error: NetError) -> Self {
        Self {
            error: Some(error),
            encoded_body_length: 0,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// A fully buffered HTTP response, as seen by the upload engine.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// Returns a header value as a string, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}
