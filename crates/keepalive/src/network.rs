//! Network seam of the keepalive loader: the loader factory, the events it
//! reports back, and the throttles consulted on start and on redirect.

use std::sync::Arc;

use http::HeaderMap;
use tracing::debug;
use uplink_protocol::{
    CompletionStatus, NetError, RedirectInfo, RequestPriority, ResourceRequest, ResponseHead,
};

use crate::types::RequestId;

/// Starts and steers network attempts.
///
/// Calls return immediately; outcomes arrive later as [`NetworkEvent`]s
/// tagged with the same [`RequestId`]. Within one attempt the events come in
/// the order redirect*, response, complete.
pub trait UrlLoaderFactory: Send + Sync {
    fn start(&self, request_id: RequestId, request: &ResourceRequest);

    /// Continues an attempt paused on a redirect.
    fn follow_redirect(
        &self,
        request_id: RequestId,
        removed_headers: &[String],
        modified_headers: &HeaderMap,
    );

    fn set_priority(&self, request_id: RequestId, priority: RequestPriority);

    /// Aborts an attempt. No further events are expected for it.
    fn cancel(&self, request_id: RequestId);
}

/// Something that happened to a network attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkEvent {
    pub request_id: RequestId,
    pub kind: NetworkEventKind,
}

impl NetworkEvent {
    pub fn new(request_id: RequestId, kind: NetworkEventKind) -> Self {
        Self { request_id, kind }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NetworkEventKind {
    /// The attempt paused on a redirect and waits for `follow_redirect`.
    Redirect {
        redirect: RedirectInfo,
        head: ResponseHead,
    },
    Response(ResponseHead),
    Complete(CompletionStatus),
    /// The attempt went away without reporting a completion.
    Disconnected,
}

/// Verdict of a [`LoaderThrottle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleDecision {
    Proceed,
    Cancel(NetError),
}

/// Veto point consulted before an attempt starts and before each redirect
/// is followed.
pub trait LoaderThrottle: Send {
    fn will_start_request(&mut self, _request: &mut ResourceRequest) -> ThrottleDecision {
        ThrottleDecision::Proceed
    }

    fn will_redirect_request(
        &mut self,
        _redirect: &RedirectInfo,
        _head: &ResponseHead,
    ) -> ThrottleDecision {
        ThrottleDecision::Proceed
    }
}

/// Builds the throttles for one attempt.
pub type ThrottleProvider =
    Arc<dyn Fn(&ResourceRequest) -> Vec<Box<dyn LoaderThrottle>> + Send + Sync>;

/// Rejects redirects that leave HTTP(S).
#[derive(Debug, Default)]
pub struct SchemeRedirectThrottle;

impl LoaderThrottle for SchemeRedirectThrottle {
    fn will_redirect_request(
        &mut self,
        redirect: &RedirectInfo,
        _head: &ResponseHead,
    ) -> ThrottleDecision {
        match redirect.new_url.scheme() {
            "http" | "https" => ThrottleDecision::Proceed,
            scheme => {
                debug!(scheme, url = %redirect.new_url, "blocking redirect");
                ThrottleDecision::Cancel(NetError::UnsafeRedirect)
            }
        }
    }
}

/// The throttles every keepalive attempt gets unless configured otherwise.
pub fn default_throttle_provider() -> ThrottleProvider {
    Arc::new(|_request: &ResourceRequest| -> Vec<Box<dyn LoaderThrottle>> {
        vec![Box::new(SchemeRedirectThrottle)]
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{Method, StatusCode};

    fn redirect_to(url: &str) -> RedirectInfo {
        RedirectInfo::for_status(
            StatusCode::FOUND,
            &Method::GET,
            url::Url::parse(url).unwrap(),
        )
    }

    #[test]
    fn scheme_throttle_allows_http_family() {
        let mut t = SchemeRedirectThrottle;
        let head = ResponseHead::new(StatusCode::FOUND);
        assert_eq!(
            t.will_redirect_request(&redirect_to("http://a.example/"), &head),
            ThrottleDecision::Proceed
        );
        assert_eq!(
            t.will_redirect_request(&redirect_to("https://a.example/"), &head),
            ThrottleDecision::Proceed
        );
    }

    #[test]
    fn scheme_throttle_blocks_other_schemes() {
        let mut t = SchemeRedirectThrottle;
        let head = ResponseHead::new(StatusCode::FOUND);
        assert_eq!(
            t.will_redirect_request(&redirect_to("ftp://a.example/x"), &head),
            ThrottleDecision::Cancel(NetError::UnsafeRedirect)
        );
    }

    #[test]
    fn default_provider_installs_scheme_throttle() {
        let provider = default_throttle_provider();
        let request = ResourceRequest::get("https://a.example/").unwrap();
        let mut throttles = provider(&request);
        assert_eq!(throttles.len(), 1);
        let head = ResponseHead::new(StatusCode::FOUND);
        assert_eq!(
            throttles[0].will_redirect_request(&redirect_to("data:text/plain,x"), &head),
            ThrottleDecision::Cancel(NetError::UnsafeRedirect)
        );
    }
}
