//! Owner of all keepalive loaders.
//!
//! The service routes network events to loaders by request id, drives their
//! timers, tracks which isolation keys have a live document, and drops a
//! loader as soon as it reports [`Disposition::Delete`].

use std::collections::HashMap;
use std::sync::Arc;

use http::HeaderMap;
use tokio::time::Instant;
use tracing::{debug, info, trace};
use uplink_protocol::{RequestPriority, ResourceRequest};

use crate::loader::{KeepaliveLoader, LoaderContext, RetryEligibilityCheck};
use crate::network::{NetworkEvent, ThrottleProvider, UrlLoaderFactory, default_throttle_provider};
use crate::sink::ForwardingEndpoint;
use crate::types::{
    Disposition, IsolationKey, KeepaliveConfig, KeepaliveError, LoaderId, RequestId,
    RequestIdAllocator,
};

pub struct KeepaliveService {
    ctx: LoaderContext,
    next_loader_id: u64,
    loaders: HashMap<LoaderId, KeepaliveLoader>,
    routes: HashMap<RequestId, LoaderId>,
    active_documents: HashMap<IsolationKey, usize>,
}

impl KeepaliveService {
    pub fn new(config: KeepaliveConfig, factory: Arc<dyn UrlLoaderFactory>) -> Self {
        Self {
            ctx: LoaderContext {
                config,
                factory,
                throttle_provider: default_throttle_provider(),
                retry_eligibility: None,
                request_ids: RequestIdAllocator::new(),
            },
            next_loader_id: 0,
            loaders: HashMap::new(),
            routes: HashMap::new(),
            active_documents: HashMap::new(),
        }
    }

    pub fn with_throttle_provider(mut self, provider: ThrottleProvider) -> Self {
        self.ctx.throttle_provider = provider;
        self
    }

    /// Installs an extra veto consulted before any retry is scheduled.
    pub fn with_retry_eligibility_check(
        mut self,
        check: impl Fn(&ResourceRequest) -> bool + Send + Sync + 'static,
    ) -> Self {
        let check: RetryEligibilityCheck = Arc::new(check);
        self.ctx.retry_eligibility = Some(check);
        self
    }

    pub fn config(&self) -> &KeepaliveConfig {
        &self.ctx.config
    }

    /// Creates and starts a loader for `request`.
    pub fn start_loader(
        &mut self,
        request: ResourceRequest,
        sink: ForwardingEndpoint,
        isolation_key: IsolationKey,
        now: Instant,
    ) -> Result<LoaderId, KeepaliveError> {
        match request.url.scheme() {
            "http" | "https" => {}
            other => return Err(KeepaliveError::UnsupportedScheme(other.to_string())),
        }

        self.next_loader_id += 1;
        let id = LoaderId(self.next_loader_id);
        let mut loader = KeepaliveLoader::new(id, request, sink, isolation_key, self.ctx.clone());
        let disposition = loader.start(now)?;
        info!(loader = %id, url = %loader.original_request().url, "keepalive loader created");

        self.loaders.insert(id, loader);
        self.settle(id, disposition);
        Ok(id)
    }

    /// Routes a network event to the loader owning its request id.
    pub fn dispatch_network_event(&mut self, event: NetworkEvent, now: Instant) {
        let Some(&id) = self.routes.get(&event.request_id) else {
            trace!(request_id = %event.request_id, "no loader for network event");
            return;
        };
        let Some(loader) = self.loaders.get_mut(&id) else {
            return;
        };
        let disposition = loader.on_network_event(event, now);
        self.settle(id, disposition);
    }

    pub fn follow_redirect(
        &mut self,
        id: LoaderId,
        removed_headers: &[String],
        modified_headers: &HeaderMap,
        now: Instant,
    ) -> Result<(), KeepaliveError> {
        self.with_loader(id, |l| l.follow_redirect(removed_headers, modified_headers, now))
    }

    pub fn set_priority(
        &mut self,
        id: LoaderId,
        priority: RequestPriority,
    ) -> Result<(), KeepaliveError> {
        self.with_loader(id, |l| {
            l.set_priority(priority);
            Disposition::Continue
        })
    }

    pub fn send_now(&mut self, id: LoaderId, now: Instant) -> Result<(), KeepaliveError> {
        self.with_loader(id, |l| l.send_now(now))
    }

    pub fn cancel(&mut self, id: LoaderId) -> Result<(), KeepaliveError> {
        self.with_loader(id, KeepaliveLoader::cancel)
    }

    pub fn sink_disconnected(&mut self, id: LoaderId, now: Instant) -> Result<(), KeepaliveError> {
        self.with_loader(id, |l| l.on_sink_disconnected(now))
    }

    pub fn reconnect_sink(
        &mut self,
        id: LoaderId,
        sink: ForwardingEndpoint,
        now: Instant,
    ) -> Result<(), KeepaliveError> {
        self.with_loader(id, |l| l.reconnect_sink(sink, now))
    }

    /// A document with `key` became active. Loaders waiting on that key
    /// resume their retry.
    pub fn document_activated(&mut self, key: IsolationKey, now: Instant) {
        let waiting: Vec<LoaderId> = self
            .loaders
            .values()
            .filter(|l| *l.isolation_key() == key)
            .map(KeepaliveLoader::id)
            .collect();
        *self.active_documents.entry(key).or_default() += 1;

        for id in waiting {
            if let Some(loader) = self.loaders.get_mut(&id) {
                let disposition = loader.on_document_activated(now);
                self.settle(id, disposition);
            }
        }
    }

    pub fn document_deactivated(&mut self, key: &IsolationKey) {
        if let Some(count) = self.active_documents.get_mut(key) {
            *count -= 1;
            if *count == 0 {
                self.active_documents.remove(key);
            }
        }
    }

    pub fn has_active_document(&self, key: &IsolationKey) -> bool {
        self.active_documents.contains_key(key)
    }

    /// Earliest timer across all loaders.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.loaders
            .values()
            .filter_map(KeepaliveLoader::next_deadline)
            .min()
    }

    /// Fires every loader timer due at `now`.
    pub fn fire_due_timers(&mut self, now: Instant) {
        let due: Vec<(LoaderId, bool)> = self
            .loaders
            .values()
            .filter(|l| l.next_deadline().is_some_and(|at| at <= now))
            .map(|l| (l.id(), self.has_active_document(l.isolation_key())))
            .collect();

        for (id, same_key_active) in due {
            if let Some(loader) = self.loaders.get_mut(&id) {
                let disposition = loader.on_timer(now, same_key_active);
                self.settle(id, disposition);
            }
        }
    }

    /// Drops every loader without notifying anyone.
    pub fn shutdown(&mut self) {
        let n = self.loaders.len();
        for loader in self.loaders.values_mut() {
            loader.shutdown();
        }
        self.loaders.clear();
        self.routes.clear();
        info!(loaders = n, "keepalive service shut down");
    }

    pub fn loader_count(&self) -> usize {
        self.loaders.len()
    }

    pub fn loader(&self, id: LoaderId) -> Option<&KeepaliveLoader> {
        self.loaders.get(&id)
    }

    fn with_loader(
        &mut self,
        id: LoaderId,
        f: impl FnOnce(&mut KeepaliveLoader) -> Disposition,
    ) -> Result<(), KeepaliveError> {
        let loader = self
            .loaders
            .get_mut(&id)
            .ok_or(KeepaliveError::UnknownLoader(id))?;
        let disposition = f(loader);
        self.settle(id, disposition);
        Ok(())
    }

    /// Refreshes the loader's route and drops it if it is done.
    fn settle(&mut self, id: LoaderId, disposition: Disposition) {
        self.routes.retain(|_, owner| *owner != id);
        match disposition {
            Disposition::Delete => {
                self.loaders.remove(&id);
                debug!(loader = %id, remaining = self.loaders.len(), "keepalive loader removed");
            }
            Disposition::Continue => {
                if let Some(request_id) = self
                    .loaders
                    .get(&id)
                    .and_then(KeepaliveLoader::active_request_id)
                {
                    self.routes.insert(request_id, id);
                }
            }
        }
    }
}
