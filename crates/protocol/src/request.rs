use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use http::header::{HeaderMap, HeaderName, HeaderValue};
use http::Method;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::ProtocolError;

/// Scheduling priority hint passed to the network stack.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum RequestPriority {
    Throttled,
    Lowest,
    #[default]
    Low,
    Medium,
    High,
    Highest,
}

/// Per-request opt-in to automatic retries.
///
/// The values are upper bounds requested by the initiator; the loader
/// clamps them against its own configured ceilings.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryOptions {
    /// Maximum number of retries (not counting the first attempt).
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Multiplier applied to the delay for every further retry.
    pub backoff_factor: f64,
    /// Retries stop once this much time has passed since the first retry.
    pub max_age: Duration,
    /// Keep retrying after the initiator has gone away.
    pub retry_after_unload: bool,
    /// Allow retrying non-idempotent methods such as POST.
    pub retry_non_idempotent: bool,
    /// Only retry failures that prove the server never saw the request.
    pub retry_only_if_server_unreached: bool,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            backoff_factor: 2.0,
            max_age: Duration::from_secs(60),
            retry_after_unload: false,
            retry_non_idempotent: false,
            retry_only_if_server_unreached: false,
        }
    }
}

/// A fetch-style request handed to the keepalive loader.
///
/// Opaque to the loader except for the fields it needs to follow redirects
/// and judge retry eligibility.
#[derive(Debug, Clone)]
pub struct ResourceRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
    pub priority: RequestPriority,
    /// Deferred (fetchLater-style) requests wait for an explicit send.
    pub is_deferred: bool,
    pub retry_options: Option<RetryOptions>,
}

impl ResourceRequest {
    /// Creates a request with no headers and no body.
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
            priority: RequestPriority::default(),
            is_deferred: false,
            retry_options: None,
        }
    }

    /// Parses `url` and creates a GET request for it.
    pub fn get(url: &str) -> Result<Self, ProtocolError> {
        Ok(Self::new(Method::GET, Url::parse(url)?))
    }

    /// Parses `url` and creates a POST request carrying `body`.
    pub fn post(url: &str, body: impl Into<Bytes>) -> Result<Self, ProtocolError> {
        let mut req = Self::new(Method::POST, Url::parse(url)?);
        req.body = Some(body.into());
        Ok(req)
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Result<Self, ProtocolError> {
        self.set_header(name, value)?;
        Ok(self)
    }

    pub fn with_retry_options(mut self, options: RetryOptions) -> Self {
        self.retry_options = Some(options);
        self
    }

    pub fn deferred(mut self) -> Self {
        self.is_deferred = true;
        self
    }

    /// Inserts or replaces a header.
    pub fn set_header(&mut self, name: &str, value: &str) -> Result<(), ProtocolError> {
        let (name, value) = parse_header(name, value)?;
        self.headers.insert(name, value);
        Ok(())
    }

    /// Removes a header; unknown or malformed names are ignored.
    pub fn remove_header(&mut self, name: &str) {
        if let Ok(name) = HeaderName::from_bytes(name.as_bytes()) {
            self.headers.remove(name);
        }
    }

    /// Whether the request travels over a secure transport.
    pub fn is_secure(&self) -> bool {
        self.url.scheme() == "https"
    }

    /// Whether repeating the request is safe by method semantics.
    pub fn is_idempotent(&self) -> bool {
        matches!(
            self.method,
            Method::GET | Method::HEAD | Method::PUT | Method::DELETE | Method::OPTIONS | Method::TRACE
        )
    }
}

/// Validates a header name/value pair.
pub fn parse_header(name: &str, value: &str) -> Result<(HeaderName, HeaderValue), ProtocolError> {
    let name = HeaderName::from_bytes(name.as_bytes())
        .map_err(|_| ProtocolError::InvalidHeader(name.to_string()))?;
    let value = HeaderValue::from_str(value)
        .map_err(|_| ProtocolError::InvalidHeader(format!("{name}: {value}")))?;
    Ok((name, value))
}

/// Pull-based source for a streamed request body.
pub trait BodySource: Send {
    /// Total number of bytes the source will produce.
    fn size(&self) -> u64;

    /// Returns the next chunk, or `None` once the source is exhausted.
    fn next_chunk(
        &mut self,
    ) -> Pin<Box<dyn Future<Output = std::io::Result<Option<Bytes>>> + Send + '_>>;
}

/// Body of an [`HttpRequest`].
pub enum RequestBody {
    Empty,
    Bytes(Bytes),
    Stream(Box<dyn BodySource>),
}

impl RequestBody {
    /// Length of the body in bytes.
    pub fn len(&self) -> u64 {
        match self {
            RequestBody::Empty => 0,
            RequestBody::Bytes(b) => b.len() as u64,
            RequestBody::Stream(s) => s.size(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for RequestBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestBody::Empty => f.write_str("Empty"),
            RequestBody::Bytes(b) => write!(f, "Bytes({} bytes)", b.len()),
            RequestBody::Stream(s) => write!(f, "Stream({} bytes)", s.size()),
        }
    }
}

/// A single HTTP exchange issued by the upload engine.
#[derive(Debug)]
pub struct HttpRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: RequestBody,
}

impl HttpRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: RequestBody::Empty,
        }
    }

    /// Inserts or replaces a header.
    pub fn set_header(&mut self, name: &str, value: &str) -> Result<(), ProtocolError> {
        let (name, value) = parse_header(name, value)?;
        self.headers.insert(name, value);
        Ok(())
    }

    /// Returns a header value as a string, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}
