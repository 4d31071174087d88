//! The keepalive loader.
//!
//! A [`KeepaliveLoader`] runs one logical request whose initiator may go
//! away at any time. Every network event is stored first and then replayed
//! to the initiator's [`ForwardingEndpoint`] if it is reachable. Failures
//! that happen before any response arrived may be retried, rebuilding the
//! request from the pristine original.
//!
//! The loader does no I/O and keeps no clock. Its owner feeds it events and
//! the current time, and drops it when a dispatch returns
//! [`Disposition::Delete`].

use std::sync::Arc;
use std::time::Duration;

use http::{HeaderMap, Method};
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};
use uplink_protocol::constants::{RETRY_ATTEMPTS_HEADER, RETRY_GUID_HEADER};
use uplink_protocol::{
    CompletionStatus, NetError, RedirectInfo, RequestPriority, ResourceRequest, ResponseHead,
};
use url::Url;
use uuid::Uuid;

use crate::network::{
    LoaderThrottle, NetworkEvent, NetworkEventKind, ThrottleDecision, ThrottleProvider,
    UrlLoaderFactory,
};
use crate::retry::{RetryPolicy, RetryState};
use crate::sink::ForwardingEndpoint;
use crate::stored::{StoredEvent, StoredUrlLoad};
use crate::types::{
    Disposition, IsolationKey, KeepaliveConfig, KeepaliveError, LoaderId, RequestId,
    RequestIdAllocator,
};

/// Extra veto on retries, consulted after the built-in checks pass.
pub type RetryEligibilityCheck = Arc<dyn Fn(&ResourceRequest) -> bool + Send + Sync>;

/// Collaborators a loader borrows from its owner.
#[derive(Clone)]
pub struct LoaderContext {
    pub config: KeepaliveConfig,
    pub factory: Arc<dyn UrlLoaderFactory>,
    pub throttle_provider: ThrottleProvider,
    pub retry_eligibility: Option<RetryEligibilityCheck>,
    pub request_ids: RequestIdAllocator,
}

/// Mutually exclusive activity of a loader. A load is either running,
/// waiting for a retry, or finished, never two at once.
#[derive(Debug, Clone, PartialEq)]
enum Phase {
    NotStarted,
    /// Deferred request waiting for `send_now`.
    Deferred,
    /// An attempt is in flight. `pending_redirect` is set while a forwarded
    /// redirect waits for the initiator's `follow_redirect`.
    Loading {
        pending_redirect: Option<RedirectInfo>,
    },
    RetryPending,
    Completed,
}

pub struct KeepaliveLoader {
    id: LoaderId,
    request_id: RequestId,
    original_request: ResourceRequest,
    request: ResourceRequest,
    isolation_key: IsolationKey,
    sink: ForwardingEndpoint,
    sink_gone: bool,
    ctx: LoaderContext,
    throttles: Vec<Box<dyn LoaderThrottle>>,
    phase: Phase,

    initial_url: Url,
    last_url: Url,
    redirect_limit: u32,
    did_encounter_redirect: bool,
    redirect_limit_exceeded: bool,

    stored: StoredUrlLoad,

    retry_state: RetryState,
    retry_count: u32,
    first_retry_initiated_time: Option<Instant>,
    last_retry_delay: Option<Duration>,
    last_error: Option<NetError>,
    retry_guid: Uuid,

    retry_at: Option<Instant>,
    self_deletion_at: Option<Instant>,
    disconnected_at: Option<Instant>,
}

impl KeepaliveLoader {
    pub fn new(
        id: LoaderId,
        request: ResourceRequest,
        sink: ForwardingEndpoint,
        isolation_key: IsolationKey,
        ctx: LoaderContext,
    ) -> Self {
        Self {
            id,
            request_id: RequestId(0),
            initial_url: request.url.clone(),
            last_url: request.url.clone(),
            original_request: request.clone(),
            request,
            isolation_key,
            sink,
            sink_gone: false,
            redirect_limit: ctx.config.redirect_limit,
            ctx,
            throttles: Vec::new(),
            phase: Phase::NotStarted,
            did_encounter_redirect: false,
            redirect_limit_exceeded: false,
            stored: StoredUrlLoad::default(),
            retry_state: RetryState::NotAttemptingRetry,
            retry_count: 0,
            first_retry_initiated_time: None,
            last_retry_delay: None,
            last_error: None,
            retry_guid: Uuid::new_v4(),
            retry_at: None,
            self_deletion_at: None,
            disconnected_at: None,
        }
    }

    // -----------------------------------------------------------------------
    // Starting
    // -----------------------------------------------------------------------

    /// Starts the load, or parks it if the request is deferred.
    pub fn start(&mut self, now: Instant) -> Result<Disposition, KeepaliveError> {
        if self.is_started() {
            return Err(KeepaliveError::AlreadyStarted);
        }
        if !self.sink.is_connected() {
            debug!(loader = %self.id, "started without an initiator");
            self.sink_gone = true;
            self.disconnected_at = Some(now + self.ctx.config.disconnected_loader_timeout);
        } else if self.original_request.is_deferred {
            debug!(loader = %self.id, url = %self.original_request.url, "deferred until sent");
            self.phase = Phase::Deferred;
            return Ok(Disposition::Continue);
        }
        Ok(self.start_internal(false, now))
    }

    fn start_internal(&mut self, is_retry: bool, now: Instant) -> Disposition {
        if is_retry {
            self.stored.discard_unforwarded();
            self.request = self.retry_request();
            self.initial_url = self.request.url.clone();
            self.last_url = self.initial_url.clone();
            self.retry_state = RetryState::RetryInProgress;
        }
        self.request_id = self.ctx.request_ids.allocate();
        self.phase = Phase::Loading {
            pending_redirect: None,
        };
        self.throttles = (self.ctx.throttle_provider)(&self.request);

        let blocked = self.throttles.iter_mut().find_map(|t| {
            match t.will_start_request(&mut self.request) {
                ThrottleDecision::Proceed => None,
                ThrottleDecision::Cancel(error) => Some(error),
            }
        });
        if let Some(error) = blocked {
            info!(loader = %self.id, error = %error, "start blocked by throttle");
            return self.handle_completion(CompletionStatus::failed(error), now);
        }

        info!(
            loader = %self.id,
            request_id = %self.request_id,
            url = %self.request.url,
            attempt = self.retry_count,
            "starting keepalive load"
        );
        self.ctx.factory.start(self.request_id, &self.request);
        Disposition::Continue
    }

    /// Rebuilds the pristine request and tags it as a retry.
    fn retry_request(&self) -> ResourceRequest {
        let mut request = self.original_request.clone();
        let tagged = request
            .set_header(RETRY_GUID_HEADER, &self.retry_guid.to_string())
            .and_then(|()| request.set_header(RETRY_ATTEMPTS_HEADER, &self.retry_count.to_string()));
        if let Err(e) = tagged {
            warn!(loader = %self.id, error = %e, "failed to tag retry request");
        }
        request
    }

    /// Sends a deferred request now.
    pub fn send_now(&mut self, now: Instant) -> Disposition {
        if self.phase != Phase::Deferred {
            trace!(loader = %self.id, "send_now on a request that is not deferred");
            return Disposition::Continue;
        }
        info!(loader = %self.id, "sending deferred request");
        self.start_internal(false, now)
    }

    /// Aborts the load without forwarding anything.
    pub fn cancel(&mut self) -> Disposition {
        if matches!(self.phase, Phase::Loading { .. }) {
            self.ctx.factory.cancel(self.request_id);
        }
        info!(loader = %self.id, "keepalive load cancelled");
        self.phase = Phase::Completed;
        Disposition::Delete
    }

    // -----------------------------------------------------------------------
    // Network events
    // -----------------------------------------------------------------------

    /// Single entry point for events reported by the loader factory.
    pub fn on_network_event(&mut self, event: NetworkEvent, now: Instant) -> Disposition {
        if event.request_id != self.request_id || !matches!(self.phase, Phase::Loading { .. }) {
            trace!(loader = %self.id, request_id = %event.request_id, "ignoring stale network event");
            return Disposition::Continue;
        }
        if self.observe_sink(now) == Disposition::Delete {
            return Disposition::Delete;
        }
        match event.kind {
            NetworkEventKind::Redirect { redirect, head } => {
                self.on_receive_redirect(redirect, head, now)
            }
            NetworkEventKind::Response(head) => self.on_receive_response(head),
            NetworkEventKind::Complete(status) => self.on_complete(status, now),
            NetworkEventKind::Disconnected => self.cancel_with_status(None, now),
        }
    }

    fn on_receive_redirect(
        &mut self,
        redirect: RedirectInfo,
        head: ResponseHead,
        now: Instant,
    ) -> Disposition {
        self.did_encounter_redirect = true;
        self.stored.push(StoredEvent::Redirect {
            redirect: redirect.clone(),
            head: head.clone(),
        });

        if self.redirect_limit == 0 {
            warn!(loader = %self.id, url = %redirect.new_url, "redirect limit exceeded");
            self.redirect_limit_exceeded = true;
            self.ctx.factory.cancel(self.request_id);
            return self.handle_completion(CompletionStatus::failed(NetError::TooManyRedirects), now);
        }
        self.redirect_limit -= 1;

        let blocked = self.throttles.iter_mut().find_map(|t| {
            match t.will_redirect_request(&redirect, &head) {
                ThrottleDecision::Proceed => None,
                ThrottleDecision::Cancel(error) => Some(error),
            }
        });
        if let Some(error) = blocked {
            self.ctx.factory.cancel(self.request_id);
            return self.handle_completion(CompletionStatus::failed(error), now);
        }

        if self.forward_stored() {
            debug!(loader = %self.id, url = %redirect.new_url, "redirect forwarded, waiting for initiator");
            self.phase = Phase::Loading {
                pending_redirect: Some(redirect),
            };
        } else {
            self.follow_redirect_internal(redirect, &[], &HeaderMap::new());
        }
        Disposition::Continue
    }

    /// Follows the pending redirect on the initiator's behalf, applying its
    /// header changes.
    pub fn follow_redirect(
        &mut self,
        removed_headers: &[String],
        modified_headers: &HeaderMap,
        now: Instant,
    ) -> Disposition {
        if self.observe_sink(now) == Disposition::Delete {
            return Disposition::Delete;
        }
        let Phase::Loading { pending_redirect } = &mut self.phase else {
            trace!(loader = %self.id, "follow_redirect while not loading");
            return Disposition::Continue;
        };
        let Some(redirect) = pending_redirect.take() else {
            debug!(loader = %self.id, "no redirect to follow");
            return Disposition::Continue;
        };
        self.follow_redirect_internal(redirect, removed_headers, modified_headers);
        Disposition::Continue
    }

    fn follow_redirect_internal(
        &mut self,
        redirect: RedirectInfo,
        removed_headers: &[String],
        modified_headers: &HeaderMap,
    ) {
        for name in removed_headers {
            self.request.remove_header(name);
        }
        for (name, value) in modified_headers {
            self.request.headers.insert(name.clone(), value.clone());
        }
        if redirect.new_method != self.request.method && redirect.new_method == Method::GET {
            self.request.body = None;
        }
        self.request.method = redirect.new_method;
        self.request.url = redirect.new_url.clone();
        self.last_url = redirect.new_url;
        self.phase = Phase::Loading {
            pending_redirect: None,
        };

        debug!(
            loader = %self.id,
            url = %self.last_url,
            remaining = self.redirect_limit,
            "following redirect"
        );
        self.ctx
            .factory
            .follow_redirect(self.request_id, removed_headers, modified_headers);
    }

    fn on_receive_response(&mut self, head: ResponseHead) -> Disposition {
        debug!(loader = %self.id, status = head.status.as_u16(), "response received");
        self.stored.push(StoredEvent::Response(head));
        self.forward_stored();
        Disposition::Continue
    }

    fn on_complete(&mut self, status: CompletionStatus, now: Instant) -> Disposition {
        self.handle_completion(status, now)
    }

    /// The attempt ended without a completion of its own: `None` for an
    /// ambient disconnect, `Some` for a transport-side cancellation.
    pub fn cancel_with_status(&mut self, error: Option<NetError>, now: Instant) -> Disposition {
        if !matches!(self.phase, Phase::Loading { .. }) {
            return Disposition::Continue;
        }
        self.ctx.factory.cancel(self.request_id);
        if self.maybe_schedule_retry(error, now) {
            return Disposition::Continue;
        }
        self.complete_with(CompletionStatus::failed(error.unwrap_or(NetError::Aborted)))
    }

    fn handle_completion(&mut self, status: CompletionStatus, now: Instant) -> Disposition {
        if let Some(error) = status.error
            && self.maybe_schedule_retry(Some(error), now)
        {
            return Disposition::Continue;
        }
        self.complete_with(status)
    }

    fn complete_with(&mut self, status: CompletionStatus) -> Disposition {
        self.stored.push(StoredEvent::Complete(status));
        self.phase = Phase::Completed;
        self.retry_state = RetryState::NotAttemptingRetry;
        self.retry_at = None;
        self.self_deletion_at = None;
        self.disconnected_at = None;

        if self.forward_stored() {
            info!(loader = %self.id, error = ?status.error, "keepalive load forwarded");
        } else {
            info!(loader = %self.id, error = ?status.error, "initiator gone, dropping load result");
        }
        Disposition::Delete
    }

    /// Replays undelivered events if the sink is reachable.
    fn forward_stored(&mut self) -> bool {
        let Some(client) = self.sink.get() else {
            return false;
        };
        let n = self.stored.forward_to(client.as_ref());
        trace!(loader = %self.id, n, "forwarded stored events");
        true
    }

    // -----------------------------------------------------------------------
    // Retry
    // -----------------------------------------------------------------------

    fn retry_policy(&self) -> Option<RetryPolicy> {
        self.original_request
            .retry_options
            .as_ref()
            .map(|options| RetryPolicy::effective(options, &self.ctx.config))
    }

    fn retry_age_exceeded(&self, policy: &RetryPolicy, now: Instant) -> bool {
        self.first_retry_initiated_time
            .is_some_and(|first| now.saturating_duration_since(first) >= policy.max_age)
    }

    /// Why a failure with `error` cannot be retried, if it cannot.
    fn retry_blocker(&self, error: Option<NetError>, now: Instant) -> Option<&'static str> {
        let Some(options) = &self.original_request.retry_options else {
            return Some("retries not requested");
        };
        let policy = RetryPolicy::effective(options, &self.ctx.config);

        if self.retry_count >= policy.max_attempts {
            return Some("attempts exhausted");
        }
        if self.retry_age_exceeded(&policy, now) {
            return Some("max age exceeded");
        }
        if self.has_received_response() {
            return Some("response already received");
        }
        if self.redirect_limit_exceeded {
            return Some("redirect limit exceeded");
        }
        if !self.original_request.is_secure() {
            return Some("insecure scheme");
        }
        if !self.original_request.is_idempotent() && !options.retry_non_idempotent {
            return Some("non-idempotent method");
        }
        if let Some(error) = error
            && !error.is_transient()
        {
            return Some("error is not transient");
        }
        if options.retry_only_if_server_unreached && !error.is_some_and(NetError::is_server_unreached)
        {
            return Some("server may have been reached");
        }
        if !self.sink.is_connected() && !options.retry_after_unload {
            return Some("initiator gone");
        }
        if let Some(check) = &self.ctx.retry_eligibility
            && !check(&self.original_request)
        {
            return Some("vetoed by eligibility check");
        }
        None
    }

    /// Whether a failure with `error` (or an ambient disconnect, `None`)
    /// would be retried right now.
    pub fn is_eligible_for_retry(&self, error: Option<NetError>, now: Instant) -> bool {
        self.retry_blocker(error, now).is_none()
    }

    fn maybe_schedule_retry(&mut self, error: Option<NetError>, now: Instant) -> bool {
        if let Some(reason) = self.retry_blocker(error, now) {
            debug!(loader = %self.id, reason, error = ?error, "not retrying");
            self.retry_state = RetryState::NotAttemptingRetry;
            return false;
        }
        let Some(policy) = self.retry_policy() else {
            return false;
        };

        self.retry_count += 1;
        self.first_retry_initiated_time.get_or_insert(now);
        let delay = policy.delay_for_attempt(self.retry_count);
        self.last_retry_delay = Some(delay);
        self.last_error = error;
        self.retry_at = Some(now + delay);
        self.retry_state = RetryState::RetryScheduled;
        self.phase = Phase::RetryPending;

        info!(
            loader = %self.id,
            attempt = self.retry_count,
            delay_ms = delay.as_millis() as u64,
            error = ?error,
            "retry scheduled"
        );
        true
    }

    fn on_retry_timer_fired(&mut self, now: Instant, same_key_document_active: bool) -> Disposition {
        if self.retry_state != RetryState::RetryScheduled {
            return Disposition::Continue;
        }
        let Some(policy) = self.retry_policy() else {
            return self.give_up_retry();
        };
        if self.retry_age_exceeded(&policy, now) {
            info!(loader = %self.id, "retry window closed");
            return self.give_up_retry();
        }

        let retry_after_unload = self
            .original_request
            .retry_options
            .as_ref()
            .is_some_and(|o| o.retry_after_unload);
        if self.sink.is_connected() || retry_after_unload || same_key_document_active {
            return self.start_internal(true, now);
        }

        let first = self.first_retry_initiated_time.unwrap_or(now);
        self.retry_state = RetryState::WaitingForSameIsolationKeyDocument;
        self.self_deletion_at = Some(first + policy.max_age);
        debug!(loader = %self.id, key = %self.isolation_key, "waiting for a document to resume retry");
        Disposition::Continue
    }

    /// A document with this loader's isolation key became active.
    pub fn on_document_activated(&mut self, now: Instant) -> Disposition {
        if self.retry_state != RetryState::WaitingForSameIsolationKeyDocument {
            return Disposition::Continue;
        }
        self.self_deletion_at = None;
        self.start_internal(true, now)
    }

    fn give_up_retry(&mut self) -> Disposition {
        let error = self.last_error.unwrap_or(NetError::Aborted);
        self.complete_with(CompletionStatus::failed(error))
    }

    // -----------------------------------------------------------------------
    // Timers
    // -----------------------------------------------------------------------

    /// Earliest instant at which [`on_timer`](Self::on_timer) has work to do.
    pub fn next_deadline(&self) -> Option<Instant> {
        [self.retry_at, self.self_deletion_at, self.disconnected_at]
            .into_iter()
            .flatten()
            .min()
    }

    /// Fires every timer due at `now`.
    pub fn on_timer(&mut self, now: Instant, same_key_document_active: bool) -> Disposition {
        if self.observe_sink(now) == Disposition::Delete {
            return Disposition::Delete;
        }
        if self.retry_at.is_some_and(|at| at <= now) {
            self.retry_at = None;
            if self.on_retry_timer_fired(now, same_key_document_active) == Disposition::Delete {
                return Disposition::Delete;
            }
        }
        if self.self_deletion_at.is_some_and(|at| at <= now) {
            self.self_deletion_at = None;
            info!(loader = %self.id, "no document resumed the retry in time");
            return self.give_up_retry();
        }
        if self.disconnected_at.is_some_and(|at| at <= now) {
            self.disconnected_at = None;
            return self.on_disconnected_timer_fired();
        }
        Disposition::Continue
    }

    fn on_disconnected_timer_fired(&mut self) -> Disposition {
        if self.phase == Phase::RetryPending {
            debug!(loader = %self.id, "retry pending, keeping disconnected loader");
            return Disposition::Continue;
        }
        if matches!(self.phase, Phase::Loading { .. }) {
            self.ctx.factory.cancel(self.request_id);
        }
        info!(loader = %self.id, "disconnected loader timed out");
        Disposition::Delete
    }

    // -----------------------------------------------------------------------
    // Sink lifecycle
    // -----------------------------------------------------------------------

    fn observe_sink(&mut self, now: Instant) -> Disposition {
        if self.sink.is_dangling() {
            return self.on_sink_disconnected(now);
        }
        Disposition::Continue
    }

    /// The initiator went away. The network load keeps going.
    pub fn on_sink_disconnected(&mut self, now: Instant) -> Disposition {
        self.sink.disconnect();
        if self.sink_gone {
            return Disposition::Continue;
        }
        self.sink_gone = true;
        self.disconnected_at = Some(now + self.ctx.config.disconnected_loader_timeout);
        debug!(loader = %self.id, "initiator disconnected");

        match &mut self.phase {
            Phase::Deferred => {
                info!(loader = %self.id, "sending deferred request on disconnect");
                self.start_internal(false, now)
            }
            Phase::Loading { pending_redirect } => {
                if let Some(redirect) = pending_redirect.take() {
                    self.follow_redirect_internal(redirect, &[], &HeaderMap::new());
                }
                Disposition::Continue
            }
            _ => Disposition::Continue,
        }
    }

    /// Attaches a new initiator and replays whatever it has not seen. A
    /// retry parked for lack of a listener resumes right away.
    pub fn reconnect_sink(&mut self, sink: ForwardingEndpoint, now: Instant) -> Disposition {
        self.sink = sink;
        if !self.sink.is_connected() {
            return Disposition::Continue;
        }
        self.sink_gone = false;
        self.disconnected_at = None;
        debug!(loader = %self.id, "initiator reconnected");
        self.forward_stored();

        if self.retry_state == RetryState::WaitingForSameIsolationKeyDocument {
            self.self_deletion_at = None;
            info!(loader = %self.id, "initiator back, resuming retry");
            return self.start_internal(true, now);
        }
        Disposition::Continue
    }

    pub fn set_priority(&mut self, priority: RequestPriority) {
        self.request.priority = priority;
        if matches!(self.phase, Phase::Loading { .. }) {
            self.ctx.factory.set_priority(self.request_id, priority);
        }
    }

    /// Detaches from the owner without firing any callback.
    pub fn shutdown(&mut self) {
        if matches!(self.phase, Phase::Loading { .. }) {
            self.ctx.factory.cancel(self.request_id);
        }
        self.sink.disconnect();
        self.retry_at = None;
        self.self_deletion_at = None;
        self.disconnected_at = None;
        self.phase = Phase::Completed;
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn id(&self) -> LoaderId {
        self.id
    }

    /// Id of the current (or last) attempt.
    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// Id of the attempt in flight, if any.
    pub fn active_request_id(&self) -> Option<RequestId> {
        matches!(self.phase, Phase::Loading { .. }).then_some(self.request_id)
    }

    pub fn isolation_key(&self) -> &IsolationKey {
        &self.isolation_key
    }

    pub fn original_request(&self) -> &ResourceRequest {
        &self.original_request
    }

    pub fn current_request(&self) -> &ResourceRequest {
        &self.request
    }

    pub fn initial_url(&self) -> &Url {
        &self.initial_url
    }

    pub fn last_url(&self) -> &Url {
        &self.last_url
    }

    /// Redirects still allowed, across all remaining attempts.
    pub fn redirect_limit(&self) -> u32 {
        self.redirect_limit
    }

    pub fn did_encounter_redirect(&self) -> bool {
        self.did_encounter_redirect
    }

    pub fn is_started(&self) -> bool {
        self.phase != Phase::NotStarted
    }

    pub fn is_deferred(&self) -> bool {
        self.phase == Phase::Deferred
    }

    pub fn is_loading(&self) -> bool {
        matches!(self.phase, Phase::Loading { .. })
    }

    pub fn is_awaiting_follow_redirect(&self) -> bool {
        matches!(
            self.phase,
            Phase::Loading {
                pending_redirect: Some(_)
            }
        )
    }

    pub fn has_received_response(&self) -> bool {
        self.stored.has_response()
    }

    pub fn stored(&self) -> &StoredUrlLoad {
        &self.stored
    }

    pub fn retry_state(&self) -> RetryState {
        self.retry_state
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn first_retry_initiated_time(&self) -> Option<Instant> {
        self.first_retry_initiated_time
    }

    pub fn last_retry_delay(&self) -> Option<Duration> {
        self.last_retry_delay
    }

    pub fn retry_guid(&self) -> Uuid {
        self.retry_guid
    }

    fn policy_or_ceiling(&self) -> RetryPolicy {
        self.retry_policy().unwrap_or_else(|| RetryPolicy {
            max_attempts: self.ctx.config.max_attempts,
            initial_delay: self.ctx.config.initial_delay,
            backoff_factor: self.ctx.config.backoff_factor,
            max_age: self.ctx.config.max_age,
        })
    }

    pub fn max_attempts_for_retry(&self) -> u32 {
        self.policy_or_ceiling().max_attempts
    }

    pub fn initial_delay_for_retry(&self) -> Duration {
        self.policy_or_ceiling().initial_delay
    }

    pub fn backoff_factor_for_retry(&self) -> f64 {
        self.policy_or_ceiling().backoff_factor
    }

    pub fn max_age_for_retry(&self) -> Duration {
        self.policy_or_ceiling().max_age
    }
}
