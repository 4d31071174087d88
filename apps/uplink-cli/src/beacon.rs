//! `beacon`: a keepalive request driven through the service task.

use std::sync::Arc;

use anyhow::Context;
use http::{HeaderMap, Method, StatusCode};
use tokio::sync::mpsc;
use tracing::{debug, info};
use uplink_http::ReqwestLoaderFactory;
use uplink_keepalive::{
    ForwardingClient, ForwardingEndpoint, IsolationKey, KeepaliveError, KeepaliveService,
    spawn_service,
};
use uplink_protocol::{CompletionStatus, NetError, RedirectInfo, ResourceRequest, ResponseHead};
use url::Url;

use crate::config::UplinkConfig;

#[derive(Debug, Clone)]
pub struct BeaconArgs {
    pub url: String,
    pub method: String,
    pub body: Option<String>,
    pub retry: bool,
    pub detach: bool,
}

#[derive(Debug, PartialEq)]
pub enum BeaconOutcome {
    /// The initiator stayed attached until the load completed.
    Completed {
        status: Option<StatusCode>,
        error: Option<NetError>,
    },
    /// The initiator detached and the service finished on its own.
    Detached,
}

enum SinkEvent {
    Redirect(Url),
    Response(StatusCode),
    Complete(Option<NetError>),
}

/// Forwards loader events to the command loop.
struct ChannelSink(mpsc::UnboundedSender<SinkEvent>);

impl ForwardingClient for ChannelSink {
    fn on_receive_redirect(&self, redirect: &RedirectInfo, _head: &ResponseHead) {
        let _ = self.0.send(SinkEvent::Redirect(redirect.new_url.clone()));
    }

    fn on_receive_response(&self, head: &ResponseHead) {
        let _ = self.0.send(SinkEvent::Response(head.status));
    }

    fn on_complete(&self, status: &CompletionStatus) {
        let _ = self.0.send(SinkEvent::Complete(status.error));
    }
}

fn build_request(config: &UplinkConfig, args: &BeaconArgs) -> anyhow::Result<ResourceRequest> {
    let method = Method::from_bytes(args.method.to_ascii_uppercase().as_bytes())
        .with_context(|| format!("invalid method {:?}", args.method))?;
    let url = Url::parse(&args.url).with_context(|| format!("invalid url {:?}", args.url))?;

    let mut request = ResourceRequest::new(method, url);
    if let Some(body) = &args.body {
        request.body = Some(body.clone().into());
    }
    if args.retry {
        request = request.with_retry_options(config.retry.to_options());
    }
    Ok(request)
}

pub async fn send_beacon(config: &UplinkConfig, args: BeaconArgs) -> anyhow::Result<BeaconOutcome> {
    let request = build_request(config, &args)?;
    let key = IsolationKey::for_url(&request.url);

    let (factory, events) = ReqwestLoaderFactory::new()?;
    let service = KeepaliveService::new(config.keepalive.to_config(), Arc::new(factory));
    let (handle, task) = spawn_service(service, events);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let sink: Arc<dyn ForwardingClient> = Arc::new(ChannelSink(tx));
    let id = handle
        .start(request, ForwardingEndpoint::from_arc(&sink), key)
        .await?;
    info!(loader = %id, url = %args.url, "beacon started");

    let outcome = if args.detach {
        drop(sink);
        match handle.sink_disconnected(id).await {
            // Already finished and removed.
            Ok(()) | Err(KeepaliveError::UnknownLoader(_)) => {}
            Err(e) => return Err(e.into()),
        }
        info!(loader = %id, "initiator detached, waiting for the load to settle");
        handle.wait_idle().await?;
        BeaconOutcome::Detached
    } else {
        let mut status = None;
        loop {
            match rx.recv().await {
                Some(SinkEvent::Redirect(url)) => {
                    debug!(loader = %id, %url, "following redirect");
                    handle
                        .follow_redirect(id, Vec::new(), HeaderMap::new())
                        .await?;
                }
                Some(SinkEvent::Response(s)) => status = Some(s),
                Some(SinkEvent::Complete(error)) => {
                    break BeaconOutcome::Completed { status, error };
                }
                None => {
                    break BeaconOutcome::Completed {
                        status,
                        error: Some(NetError::Aborted),
                    };
                }
            }
        }
    };

    handle.shutdown();
    task.await?;
    Ok(outcome)
}
