//! Keepalive scenarios through the service, and one over a real socket.

use std::sync::{Arc, Weak};
use std::time::Duration;

use http::StatusCode;
use tokio::time::{Instant, timeout};
use uplink_http::ReqwestLoaderFactory;
use uplink_keepalive::{
    ForwardingEndpoint, IsolationKey, KeepaliveConfig, KeepaliveService, NetworkEvent,
    NetworkEventKind, RetryState, spawn_service,
};
use uplink_protocol::{CompletionStatus, NetError, ResourceRequest, ResponseHead, RetryOptions};
use uplink_scenarios::fakes::{FactoryCall, Forwarded, RecordingFactory, RecordingSink};
use uplink_scenarios::wire::{WireServer, response};

fn endpoint(sink: &Arc<RecordingSink>) -> ForwardingEndpoint {
    let weak: Weak<RecordingSink> = Arc::downgrade(sink);
    ForwardingEndpoint::new(weak)
}

fn beacon() -> ResourceRequest {
    ResourceRequest::get("https://a.example/beacon")
        .unwrap()
        .with_retry_options(RetryOptions::default())
}

fn key() -> IsolationKey {
    IsolationKey::new("https://a.example")
}

fn service() -> (Arc<RecordingFactory>, KeepaliveService) {
    let factory = Arc::new(RecordingFactory::default());
    let service = KeepaliveService::new(KeepaliveConfig::default(), factory.clone());
    (factory, service)
}

fn failed(rid: uplink_keepalive::RequestId, error: NetError) -> NetworkEvent {
    NetworkEvent::new(rid, NetworkEventKind::Complete(CompletionStatus::failed(error)))
}

#[test]
fn scenario_c_reset_backs_off_between_retries() {
    let (factory, mut service) = service();
    let sink = Arc::new(RecordingSink::default());
    let t0 = Instant::now();
    let id = service.start_loader(beacon(), endpoint(&sink), key(), t0).unwrap();

    let first = factory.last_started().unwrap();
    service.dispatch_network_event(failed(first, NetError::ConnectionReset), t0);

    let loader = service.loader(id).unwrap();
    assert_eq!(loader.retry_count(), 1);
    assert_eq!(loader.retry_state(), RetryState::RetryScheduled);
    assert_eq!(loader.last_retry_delay(), Some(loader.initial_delay_for_retry()));
    assert_eq!(service.next_deadline(), Some(t0 + Duration::from_secs(1)));
    // Nothing is forwarded while a retry is pending.
    assert!(sink.events().is_empty());

    let t1 = t0 + Duration::from_secs(1);
    service.fire_due_timers(t1);
    let second = factory.last_started().unwrap();
    assert_ne!(first, second);
    assert_eq!(service.loader(id).unwrap().retry_state(), RetryState::RetryInProgress);

    service.dispatch_network_event(failed(second, NetError::ConnectionReset), t1);
    let loader = service.loader(id).unwrap();
    let first_delay = loader.initial_delay_for_retry();
    let second_delay = loader.last_retry_delay().unwrap();
    assert_eq!(loader.retry_count(), 2);
    assert_eq!(second_delay, first_delay.mul_f64(loader.backoff_factor_for_retry()));
    assert!(second_delay > first_delay);
    assert_eq!(service.next_deadline(), Some(t1 + second_delay));
    assert!(sink.events().is_empty());
}

#[test]
fn scenario_d_server_error_is_forwarded_not_retried() {
    let (factory, mut service) = service();
    let sink = Arc::new(RecordingSink::default());
    let t0 = Instant::now();
    let id = service.start_loader(beacon(), endpoint(&sink), key(), t0).unwrap();
    let rid = factory.last_started().unwrap();

    let head = ResponseHead::new(StatusCode::INTERNAL_SERVER_ERROR);
    service.dispatch_network_event(NetworkEvent::new(rid, NetworkEventKind::Response(head)), t0);
    service.dispatch_network_event(failed(rid, NetError::ConnectionReset), t0);

    assert!(service.loader(id).is_none());
    assert_eq!(factory.starts(), 1);
    assert_eq!(
        sink.events(),
        vec![
            Forwarded::Response(StatusCode::INTERNAL_SERVER_ERROR),
            Forwarded::Complete(Some(NetError::ConnectionReset)),
        ]
    );
}

#[test]
fn scenario_d_without_sink_self_deletes() {
    let (factory, mut service) = service();
    let sink = Arc::new(RecordingSink::default());
    let t0 = Instant::now();
    let id = service.start_loader(beacon(), endpoint(&sink), key(), t0).unwrap();
    let rid = factory.last_started().unwrap();
    drop(sink);

    let head = ResponseHead::new(StatusCode::INTERNAL_SERVER_ERROR);
    service.dispatch_network_event(NetworkEvent::new(rid, NetworkEventKind::Response(head)), t0);
    service.dispatch_network_event(
        NetworkEvent::new(rid, NetworkEventKind::Complete(CompletionStatus::ok(0))),
        t0,
    );

    assert!(service.loader(id).is_none());
    assert_eq!(service.loader_count(), 0);
    assert_eq!(factory.starts(), 1);
    assert!(!factory.calls().iter().any(|c| matches!(c, FactoryCall::Follow(_))));
}

#[tokio::test]
async fn detached_load_follows_redirects_on_its_own() {
    let server = WireServer::bind().await.unwrap();
    let base = server.base().to_string();
    let captured = server.serve(vec![
        response("307 Temporary Redirect", &[("Location", "/final")], ""),
        response("204 No Content", &[], ""),
    ]);

    let (factory, events) = ReqwestLoaderFactory::new().unwrap();
    let service = KeepaliveService::new(KeepaliveConfig::default(), Arc::new(factory));
    let (handle, task) = spawn_service(service, events);

    let request = ResourceRequest::post(&format!("{base}/start"), "event=unload").unwrap();
    let key = IsolationKey::for_url(&request.url);
    handle
        .start(request, ForwardingEndpoint::disconnected(), key)
        .await
        .unwrap();

    timeout(Duration::from_secs(5), handle.wait_idle())
        .await
        .expect("loader settles")
        .unwrap();

    let captured = captured.await.unwrap();
    assert_eq!(captured[0].request_line(), "post /start http/1.1");
    // 307 keeps the method and the body.
    assert_eq!(captured[1].request_line(), "post /final http/1.1");
    assert_eq!(captured[1].body, b"event=unload");

    handle.shutdown();
    task.await.unwrap();
}
