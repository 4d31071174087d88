//! In-process stand-ins for the transport seams.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;

use bytes::{Bytes, BytesMut};
use http::{HeaderMap, Method, StatusCode};
use uplink_keepalive::{ForwardingClient, RequestId, UrlLoaderFactory};
use uplink_protocol::{
    CompletionStatus, HttpRequest, HttpResponse, NetError, RedirectInfo, RequestBody,
    RequestPriority, ResourceRequest, ResponseHead,
};
use url::Url;

/// A request as the transport saw it, body fully drained.
#[derive(Debug, Clone)]
pub struct SentRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl SentRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Answers upload exchanges from a queue of canned results.
#[derive(Default)]
pub struct ScriptedTransport {
    replies: Mutex<VecDeque<Result<HttpResponse, NetError>>>,
    sent: Mutex<Vec<SentRequest>>,
}

impl ScriptedTransport {
    pub fn new(replies: Vec<Result<HttpResponse, NetError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn sent(&self) -> Vec<SentRequest> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

/// Builds a response with the given headers.
pub fn reply(status: StatusCode, headers: &[(&'static str, &str)]) -> HttpResponse {
    let mut response = HttpResponse::new(status);
    for (name, value) in headers {
        if let Ok(value) = value.parse() {
            response.headers.insert(*name, value);
        }
    }
    response
}

impl uplink_upload::HttpTransport for ScriptedTransport {
    fn send(
        &self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, NetError>> + Send + '_>> {
        Box::pin(async move {
            let body = match request.body {
                RequestBody::Empty => Bytes::new(),
                RequestBody::Bytes(b) => b,
                RequestBody::Stream(mut source) => {
                    let mut buf = BytesMut::new();
                    while let Some(chunk) = source.next_chunk().await.map_err(|_| NetError::Failed)? {
                        buf.extend_from_slice(&chunk);
                    }
                    buf.freeze()
                }
            };
            if let Ok(mut sent) = self.sent.lock() {
                sent.push(SentRequest {
                    method: request.method,
                    url: request.url,
                    headers: request.headers,
                    body,
                });
            }
            self.replies
                .lock()
                .ok()
                .and_then(|mut r| r.pop_front())
                .unwrap_or(Err(NetError::ConnectionRefused))
        })
    }
}

/// Calls a [`UrlLoaderFactory`] received, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum FactoryCall {
    Start(RequestId, Method, Url),
    Follow(RequestId),
    Cancel(RequestId),
}

/// Records attempts; the test feeds the resulting network events by hand.
#[derive(Default)]
pub struct RecordingFactory {
    calls: Mutex<Vec<FactoryCall>>,
}

impl RecordingFactory {
    pub fn calls(&self) -> Vec<FactoryCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Request id of the most recently started attempt.
    pub fn last_started(&self) -> Option<RequestId> {
        self.calls().iter().rev().find_map(|c| match c {
            FactoryCall::Start(id, ..) => Some(*id),
            _ => None,
        })
    }

    pub fn starts(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, FactoryCall::Start(..)))
            .count()
    }

    fn record(&self, call: FactoryCall) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }
}

impl UrlLoaderFactory for RecordingFactory {
    fn start(&self, request_id: RequestId, request: &ResourceRequest) {
        self.record(FactoryCall::Start(
            request_id,
            request.method.clone(),
            request.url.clone(),
        ));
    }

    fn follow_redirect(&self, request_id: RequestId, _: &[String], _: &HeaderMap) {
        self.record(FactoryCall::Follow(request_id));
    }

    fn set_priority(&self, _: RequestId, _: RequestPriority) {}

    fn cancel(&self, request_id: RequestId) {
        self.record(FactoryCall::Cancel(request_id));
    }
}

/// What a sink received, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Forwarded {
    Redirect(Url),
    Response(StatusCode),
    Complete(Option<NetError>),
}

#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<Forwarded>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<Forwarded> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    fn push(&self, event: Forwarded) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

impl ForwardingClient for RecordingSink {
    fn on_receive_redirect(&self, redirect: &RedirectInfo, _: &ResponseHead) {
        self.push(Forwarded::Redirect(redirect.new_url.clone()));
    }

    fn on_receive_response(&self, head: &ResponseHead) {
        self.push(Forwarded::Response(head.status));
    }

    fn on_complete(&self, status: &CompletionStatus) {
        self.push(Forwarded::Complete(status.error));
    }
}
