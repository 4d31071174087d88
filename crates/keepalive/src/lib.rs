//! Keepalive loads that survive their initiator.
//!
//! A keepalive load is a network request (typically a beacon or a deferred
//! fetch) that must complete even if whoever started it goes away. The
//! [`KeepaliveLoader`] stores every network event before forwarding it to
//! the initiator's [`ForwardingEndpoint`], follows redirects on its own once
//! nobody is listening, and retries transient failures with exponential
//! backoff when the request opted in.
//!
//! [`KeepaliveService`] owns the loaders and routes events to them;
//! [`spawn_service`] runs a service on a tokio task behind a cloneable
//! [`KeepaliveHandle`].

pub mod driver;
pub mod loader;
pub mod network;
pub mod retry;
pub mod service;
pub mod sink;
pub mod stored;
pub mod types;

pub use driver::{KeepaliveHandle, spawn_service};
pub use loader::{KeepaliveLoader, LoaderContext, RetryEligibilityCheck};
pub use network::{
    LoaderThrottle, NetworkEvent, NetworkEventKind, SchemeRedirectThrottle, ThrottleDecision,
    ThrottleProvider, UrlLoaderFactory, default_throttle_provider,
};
pub use retry::{RetryPolicy, RetryState};
pub use service::KeepaliveService;
pub use sink::{ForwardingClient, ForwardingEndpoint};
pub use stored::{StoredEvent, StoredUrlLoad};
pub use types::{
    Disposition, IsolationKey, KeepaliveConfig, KeepaliveError, LoaderId, RequestId,
    RequestIdAllocator,
};
