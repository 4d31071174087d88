//! The forwarding sink: the initiator's receiving end, reachable or not.

use std::sync::{Arc, Weak};

use uplink_protocol::{CompletionStatus, RedirectInfo, ResponseHead};

/// Receives replayed network events on behalf of the initiator.
pub trait ForwardingClient: Send + Sync {
    fn on_receive_redirect(&self, redirect: &RedirectInfo, head: &ResponseHead);
    fn on_receive_response(&self, head: &ResponseHead);
    fn on_complete(&self, status: &CompletionStatus);
}

/// Weak handle to a [`ForwardingClient`].
///
/// The initiator owns the client; dropping it is a disconnect. Every use goes
/// through [`get`](Self::get), which fails once the client is gone.
#[derive(Default, Clone)]
pub struct ForwardingEndpoint {
    client: Option<Weak<dyn ForwardingClient>>,
}

impl ForwardingEndpoint {
    pub fn new(client: Weak<dyn ForwardingClient>) -> Self {
        Self {
            client: Some(client),
        }
    }

    /// An endpoint with nobody listening.
    pub fn disconnected() -> Self {
        Self { client: None }
    }

    /// Convenience for owners that hold the client in an `Arc`.
    pub fn from_arc(client: &Arc<dyn ForwardingClient>) -> Self {
        Self::new(Arc::downgrade(client))
    }

    pub fn get(&self) -> Option<Arc<dyn ForwardingClient>> {
        self.client.as_ref().and_then(Weak::upgrade)
    }

    pub fn is_connected(&self) -> bool {
        self.get().is_some()
    }

    /// Whether a client was attached but has since been dropped.
    pub fn is_dangling(&self) -> bool {
        self.client.as_ref().is_some_and(|c| c.strong_count() == 0)
    }

    pub fn disconnect(&mut self) {
        self.client = None;
    }
}

impl std::fmt::Debug for ForwardingEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForwardingEndpoint")
            .field("connected", &self.is_connected())
            .finish()
    }
}
