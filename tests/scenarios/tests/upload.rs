//! Resumable upload scenarios, end to end through the public crates.

use std::io::Write;
use std::sync::{Arc, Mutex};

use http::{Method, StatusCode};
use uplink_http::ReqwestTransport;
use uplink_protocol::HttpResponse;
use uplink_protocol::constants::{UPLOAD_STATUS_HEADER, UPLOAD_URL_HEADER};
use uplink_scenarios::fakes::{ScriptedTransport, reply};
use uplink_scenarios::wire::{WireServer, response};
use uplink_transfer::{FileSource, PageSource};
use uplink_upload::{
    ResumableUploadRequest, ScanType, UploadCallbacks, UploadFeatures, UploadParams,
    UploadResult, inspect_content,
};

/// Everything the two callbacks reported, in firing order.
#[derive(Debug, Clone, PartialEq)]
enum Signal {
    Verdict(UploadResult, Option<StatusCode>),
    ContentUploaded,
}

fn recording_callbacks() -> (UploadCallbacks, Arc<Mutex<Vec<Signal>>>) {
    let signals = Arc::new(Mutex::new(Vec::new()));
    let v = signals.clone();
    let c = signals.clone();
    let callbacks = UploadCallbacks::new(
        move |result, response: Option<HttpResponse>| {
            v.lock()
                .unwrap()
                .push(Signal::Verdict(result, response.map(|r| r.status)));
        },
        move || c.lock().unwrap().push(Signal::ContentUploaded),
    );
    (callbacks, signals)
}

const ENDPOINT: &str = "https://scan.example/upload";

#[tokio::test]
async fn scenario_a_active_session_uploads_full_content() {
    let transport = Arc::new(ScriptedTransport::new(vec![
        Ok(reply(
            StatusCode::OK,
            &[(UPLOAD_STATUS_HEADER, "active"), (UPLOAD_URL_HEADER, "https://u")],
        )),
        Ok(reply(StatusCode::OK, &[])),
    ]));
    let features = UploadFeatures::default();
    let page = PageSource::new(&b"page body"[..]);
    let (info, get_data_result) = inspect_content(&page, &features).await;
    assert_eq!(info.size, 9);

    let (callbacks, signals) = recording_callbacks();
    let mut request = ResumableUploadRequest::create_page_request(
        transport.clone(),
        UploadParams::new(ENDPOINT, &b"{\"kind\":\"page\"}"[..]),
        page,
        get_data_result,
        &features,
        callbacks,
    )
    .unwrap();
    assert_eq!(request.scan_type(), ScanType::FullContent);

    request.start().await.unwrap();

    let sent = transport.sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].method, Method::POST);
    assert_eq!(sent[0].url.as_str(), ENDPOINT);
    assert_eq!(sent[1].method, Method::PUT);
    assert_eq!(sent[1].url.as_str(), "https://u/");
    assert_eq!(&sent[1].body[..], b"page body");
    assert_eq!(sent[1].header("Content-Range"), Some("bytes 0-8/9"));

    let signals = signals.lock().unwrap().clone();
    assert_eq!(
        signals,
        vec![
            Signal::Verdict(UploadResult::Success, Some(StatusCode::OK)),
            Signal::ContentUploaded,
        ]
    );
}

#[tokio::test]
async fn scenario_b_missing_status_stops_after_metadata() {
    let transport = Arc::new(ScriptedTransport::new(vec![Ok(reply(
        StatusCode::OK,
        &[(UPLOAD_URL_HEADER, "https://u")],
    ))]));
    let features = UploadFeatures::default();
    let page = PageSource::new(&b"page body"[..]);
    let (_, get_data_result) = inspect_content(&page, &features).await;

    let (callbacks, signals) = recording_callbacks();
    let mut request = ResumableUploadRequest::create_page_request(
        transport.clone(),
        UploadParams::new(ENDPOINT, &b"meta"[..]),
        page,
        get_data_result,
        &features,
        callbacks,
    )
    .unwrap();
    request.start().await.unwrap();

    assert_eq!(transport.sent().len(), 1);
    assert_eq!(
        *signals.lock().unwrap(),
        vec![Signal::Verdict(UploadResult::Success, Some(StatusCode::OK))]
    );
}

#[tokio::test]
async fn oversized_content_never_leaves_the_host() {
    let transport = Arc::new(ScriptedTransport::new(vec![Ok(reply(
        StatusCode::OK,
        &[(UPLOAD_STATUS_HEADER, "active"), (UPLOAD_URL_HEADER, "https://u")],
    ))]));
    let features = UploadFeatures {
        max_file_size: 4,
        ..UploadFeatures::default()
    };
    let page = PageSource::new(&b"page body"[..]);
    let (_, get_data_result) = inspect_content(&page, &features).await;

    let (callbacks, signals) = recording_callbacks();
    let mut request = ResumableUploadRequest::create_page_request(
        transport.clone(),
        UploadParams::new(ENDPOINT, &b"meta"[..]),
        page,
        get_data_result,
        &features,
        callbacks,
    )
    .unwrap();
    assert_eq!(request.scan_type(), ScanType::MetadataOnly);
    request.start().await.unwrap();

    assert_eq!(transport.sent().len(), 1);
    assert_eq!(signals.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn scenario_a_over_the_wire() {
    let server = WireServer::bind().await.unwrap();
    let session = format!("{}/session/1", server.base());
    let endpoint = format!("{}/upload", server.base());
    let captured = server.serve(vec![
        response(
            "200 OK",
            &[(UPLOAD_STATUS_HEADER, "active"), (UPLOAD_URL_HEADER, &session)],
            "",
        ),
        response("200 OK", &[], "stored"),
    ]);

    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(b"report contents").unwrap();
    let features = UploadFeatures::default();
    let source = FileSource::new(file.path()).with_chunk_size(4);
    let (info, get_data_result) = inspect_content(&source, &features).await;

    let (callbacks, signals) = recording_callbacks();
    let transport = Arc::new(ReqwestTransport::new().unwrap());
    let mut request = ResumableUploadRequest::create_file_request(
        transport,
        UploadParams::new(endpoint, &b"{\"name\":\"report\"}"[..]).histogram_suffix("Wire"),
        source,
        &info,
        get_data_result,
        &features,
        callbacks,
    )
    .unwrap();
    request.start().await.unwrap();

    let captured = captured.await.unwrap();
    assert_eq!(captured.len(), 2);
    assert_eq!(captured[0].request_line(), "post /upload http/1.1");
    assert_eq!(captured[0].header("x-upload-protocol"), Some("resumable"));
    assert_eq!(captured[0].header("x-upload-histogram-suffix"), Some("wire"));
    assert_eq!(captured[0].body, b"{\"name\":\"report\"}");
    assert_eq!(captured[1].request_line(), "put /session/1 http/1.1");
    assert_eq!(captured[1].body, b"report contents");

    assert_eq!(
        *signals.lock().unwrap(),
        vec![
            Signal::Verdict(UploadResult::Success, Some(StatusCode::OK)),
            Signal::ContentUploaded,
        ]
    );
}
