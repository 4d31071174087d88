//! Buffer of observed network events awaiting delivery to the sink.

use uplink_protocol::{CompletionStatus, RedirectInfo, ResponseHead};

use crate::sink::ForwardingClient;

/// One observed network event.
#[derive(Debug, Clone, PartialEq)]
pub enum StoredEvent {
    Redirect {
        redirect: RedirectInfo,
        head: ResponseHead,
    },
    Response(ResponseHead),
    Complete(CompletionStatus),
}

impl StoredEvent {
    fn replay(&self, client: &dyn ForwardingClient) {
        match self {
            StoredEvent::Redirect { redirect, head } => client.on_receive_redirect(redirect, head),
            StoredEvent::Response(head) => client.on_receive_response(head),
            StoredEvent::Complete(status) => client.on_complete(status),
        }
    }
}

/// Recorded events plus a cursor marking how many were already delivered.
#[derive(Debug, Default)]
pub struct StoredUrlLoad {
    events: Vec<StoredEvent>,
    forwarded: usize,
}

impl StoredUrlLoad {
    pub fn push(&mut self, event: StoredEvent) {
        self.events.push(event);
    }

    /// Replays every event not yet delivered, in order, then advances the
    /// cursor. Returns how many were replayed.
    pub fn forward_to(&mut self, client: &dyn ForwardingClient) -> usize {
        let pending = &self.events[self.forwarded..];
        for event in pending {
            event.replay(client);
        }
        let n = pending.len();
        self.forwarded = self.events.len();
        n
    }

    /// Drops events that were never delivered. Used when an attempt is
    /// abandoned for a retry.
    pub fn discard_unforwarded(&mut self) {
        self.events.truncate(self.forwarded);
    }

    pub fn has_unforwarded(&self) -> bool {
        self.forwarded < self.events.len()
    }

    pub fn has_response(&self) -> bool {
        self.events
            .iter()
            .any(|e| matches!(e, StoredEvent::Response(_)))
    }

    pub fn is_complete(&self) -> bool {
        matches!(self.events.last(), Some(StoredEvent::Complete(_)))
    }

    pub fn events(&self) -> &[StoredEvent] {
        &self.events
    }

    pub fn forwarded(&self) -> usize {
        self.forwarded
    }
}
