//! [`UrlLoaderFactory`] over `reqwest`.
//!
//! Each attempt runs on its own task with automatic redirects disabled, so
//! every 3xx is reported to the keepalive loader and only followed when it
//! says so. Response bodies are drained and counted but not kept.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use http::HeaderMap;
use http::header::LOCATION;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};
use uplink_keepalive::{NetworkEvent, NetworkEventKind, RequestId, UrlLoaderFactory};
use uplink_protocol::{
    CompletionStatus, NetError, RedirectInfo, RequestPriority, ResourceRequest, ResponseHead,
};

use crate::error::{HttpClientError, map_reqwest_error};

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Header edits requested when following a redirect.
struct FollowUp {
    removed: Vec<String>,
    modified: HeaderMap,
}

struct Attempt {
    cancel: CancellationToken,
    follow: mpsc::UnboundedSender<FollowUp>,
}

type Attempts = Arc<Mutex<HashMap<RequestId, Attempt>>>;

/// Runs keepalive attempts with `reqwest` and reports their progress on an
/// event channel.
pub struct ReqwestLoaderFactory {
    http: reqwest::Client,
    events: mpsc::UnboundedSender<NetworkEvent>,
    attempts: Attempts,
}

impl ReqwestLoaderFactory {
    /// Creates a factory and the receiver its events arrive on.
    pub fn new() -> Result<(Self, mpsc::UnboundedReceiver<NetworkEvent>), HttpClientError> {
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .build()?;
        let (events, rx) = mpsc::unbounded_channel();
        Ok((Self::with_client(http, events), rx))
    }

    /// Uses `http` as is. It must not follow redirects by itself.
    pub fn with_client(http: reqwest::Client, events: mpsc::UnboundedSender<NetworkEvent>) -> Self {
        Self {
            http,
            events,
            attempts: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Number of attempts still running.
    pub fn active_attempts(&self) -> usize {
        self.attempts.lock().map(|a| a.len()).unwrap_or(0)
    }
}

impl UrlLoaderFactory for ReqwestLoaderFactory {
    fn start(&self, request_id: RequestId, request: &ResourceRequest) {
        let cancel = CancellationToken::new();
        let (follow_tx, follow_rx) = mpsc::unbounded_channel();
        if let Ok(mut attempts) = self.attempts.lock() {
            attempts.insert(
                request_id,
                Attempt {
                    cancel: cancel.clone(),
                    follow: follow_tx,
                },
            );
        }

        let task = AttemptTask {
            http: self.http.clone(),
            request_id,
            request: request.clone(),
            events: self.events.clone(),
            cancel,
            follow: follow_rx,
        };
        let attempts = self.attempts.clone();
        tokio::spawn(async move {
            task.run().await;
            if let Ok(mut attempts) = attempts.lock() {
                attempts.remove(&request_id);
            }
        });
    }

    fn follow_redirect(
        &self,
        request_id: RequestId,
        removed_headers: &[String],
        modified_headers: &HeaderMap,
    ) {
        let Ok(attempts) = self.attempts.lock() else {
            return;
        };
        let Some(attempt) = attempts.get(&request_id) else {
            trace!(%request_id, "follow_redirect for finished attempt");
            return;
        };
        let _ = attempt.follow.send(FollowUp {
            removed: removed_headers.to_vec(),
            modified: modified_headers.clone(),
        });
    }

    fn set_priority(&self, request_id: RequestId, priority: RequestPriority) {
        // HTTP/1.1 has no request priorities.
        trace!(%request_id, ?priority, "priority change ignored");
    }

    fn cancel(&self, request_id: RequestId) {
        let Ok(mut attempts) = self.attempts.lock() else {
            return;
        };
        if let Some(attempt) = attempts.remove(&request_id) {
            debug!(%request_id, "cancelling attempt");
            attempt.cancel.cancel();
        }
    }
}

struct AttemptTask {
    http: reqwest::Client,
    request_id: RequestId,
    request: ResourceRequest,
    events: mpsc::UnboundedSender<NetworkEvent>,
    cancel: CancellationToken,
    follow: mpsc::UnboundedReceiver<FollowUp>,
}

impl AttemptTask {
    fn emit(&self, kind: NetworkEventKind) {
        let _ = self.events.send(NetworkEvent::new(self.request_id, kind));
    }

    fn fail(&self, error: NetError) {
        self.emit(NetworkEventKind::Complete(CompletionStatus::failed(error)));
    }

    async fn run(mut self) {
        loop {
            let mut builder = self
                .http
                .request(self.request.method.clone(), self.request.url.clone())
                .headers(self.request.headers.clone());
            if let Some(body) = &self.request.body {
                builder = builder.body(body.clone());
            }

            let result = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return,
                r = builder.send() => r,
            };
            let mut resp = match result {
                Ok(resp) => resp,
                Err(e) => {
                    let error = map_reqwest_error(&e);
                    debug!(request_id = %self.request_id, error = %e, "attempt failed");
                    self.fail(error);
                    return;
                }
            };

            let mut head = ResponseHead::new(resp.status());
            head.headers = resp.headers().clone();

            if head.status.is_redirection()
                && let Some(location) = head.header(LOCATION.as_str())
            {
                let new_url = match self.request.url.join(location) {
                    Ok(url) => url,
                    Err(e) => {
                        warn!(request_id = %self.request_id, location, error = %e, "bad redirect location");
                        self.fail(NetError::InvalidUrl);
                        return;
                    }
                };
                let redirect = RedirectInfo::for_status(head.status, &self.request.method, new_url);
                drop(resp);
                self.emit(NetworkEventKind::Redirect {
                    redirect: redirect.clone(),
                    head,
                });

                let follow = tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => return,
                    f = self.follow.recv() => f,
                };
                let Some(follow) = follow else {
                    return;
                };
                self.apply_redirect(redirect, follow);
                continue;
            }

            self.emit(NetworkEventKind::Response(head));

            let mut received: u64 = 0;
            loop {
                let chunk = tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => return,
                    c = resp.chunk() => c,
                };
                match chunk {
                    Ok(Some(bytes)) => received += bytes.len() as u64,
                    Ok(None) => break,
                    Err(e) => {
                        self.fail(map_reqwest_error(&e));
                        return;
                    }
                }
            }
            debug!(request_id = %self.request_id, received, "attempt complete");
            self.emit(NetworkEventKind::Complete(CompletionStatus::ok(received)));
            return;
        }
    }

    fn apply_redirect(&mut self, redirect: RedirectInfo, follow: FollowUp) {
        for name in &follow.removed {
            self.request.remove_header(name);
        }
        for (name, value) in &follow.modified {
            self.request.headers.insert(name.clone(), value.clone());
        }
        if redirect.new_method != self.request.method && redirect.new_method == http::Method::GET {
            self.request.body = None;
        }
        self.request.method = redirect.new_method;
        self.request.url = redirect.new_url;
    }
}
