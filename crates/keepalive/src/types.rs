//! Identifiers and configuration shared by the loader and the service.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use uplink_protocol::constants::{DEFAULT_DISCONNECTED_LOADER_TIMEOUT, DEFAULT_REDIRECT_LIMIT};

/// Identifies one network attempt. A retry gets a fresh id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// Stable handle of a loader inside a [`KeepaliveService`](crate::KeepaliveService).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LoaderId(pub u64);

impl fmt::Display for LoaderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "l{}", self.0)
    }
}

/// Groups documents that count as "the same" for resuming a waiting retry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IsolationKey(pub String);

impl IsolationKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Derives the key from a URL's origin.
    pub fn for_url(url: &url::Url) -> Self {
        Self(url.origin().ascii_serialization())
    }
}

impl fmt::Display for IsolationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Hands out request ids; clones share one counter.
#[derive(Debug, Clone, Default)]
pub struct RequestIdAllocator {
    next: Arc<AtomicU64>,
}

impl RequestIdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&self) -> RequestId {
        RequestId(self.next.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

/// Service-wide limits for keepalive loads.
///
/// The retry fields are ceilings: a request's own
/// [`RetryOptions`](uplink_protocol::RetryOptions) can ask for less, never
/// for more.
#[derive(Debug, Clone, PartialEq)]
pub struct KeepaliveConfig {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub backoff_factor: f64,
    pub max_age: Duration,
    /// Redirects a load may follow, summed over all of its attempts.
    pub redirect_limit: u32,
    /// How long a loader survives once its initiator disconnected, unless a
    /// retry is pending.
    pub disconnected_loader_timeout: Duration,
}

impl Default for KeepaliveConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            initial_delay: Duration::from_secs(30),
            backoff_factor: 4.0,
            max_age: Duration::from_secs(24 * 60 * 60),
            redirect_limit: DEFAULT_REDIRECT_LIMIT,
            disconnected_loader_timeout: DEFAULT_DISCONNECTED_LOADER_TIMEOUT,
        }
    }
}

/// What the owner should do with a loader after dispatching an event to it.
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Continue,
    /// The loader has nothing left to do and must be dropped.
    Delete,
}

/// Errors returned by loader and service operations.
#[derive(Debug, thiserror::Error)]
pub enum KeepaliveError {
    #[error("unknown loader: {0}")]
    UnknownLoader(LoaderId),

    #[error("loader already started")]
    AlreadyStarted,

    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("keepalive service stopped")]
    ServiceStopped,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocator_is_shared_between_clones() {
        let a = RequestIdAllocator::new();
        let b = a.clone();
        assert_eq!(a.allocate(), RequestId(1));
        assert_eq!(b.allocate(), RequestId(2));
        assert_eq!(a.allocate(), RequestId(3));
    }

    #[test]
    fn isolation_key_uses_origin() {
        let url = url::Url::parse("https://example.com:8443/a/b?q=1").unwrap();
        assert_eq!(IsolationKey::for_url(&url).0, "https://example.com:8443");
    }

    #[test]
    fn config_defaults() {
        let config = KeepaliveConfig::default();
        assert_eq!(config.redirect_limit, 20);
        assert_eq!(config.disconnected_loader_timeout, Duration::from_secs(30));
        assert!(config.backoff_factor > 1.0);
    }
}
