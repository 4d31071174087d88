//! `upload-file` and `upload-page`.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use http::StatusCode;
use tokio::sync::oneshot;
use tracing::info;
use uplink_protocol::HttpResponse;
use uplink_transfer::{ContentSource, DataInfo, FileSource, PageSource};
use uplink_upload::{
    inspect_content, HttpTransport, ResumableUploadRequest, UploadCallbacks, UploadParams,
    UploadResult, UploadState,
};
use url::Url;

use crate::config::UplinkConfig;

/// What the user gets told once an upload is over.
#[derive(Debug)]
pub struct UploadOutcome {
    pub result: UploadResult,
    pub status: Option<StatusCode>,
    pub upload_url: Option<Url>,
    /// Whether the content phase ran.
    pub content_sent: bool,
    pub info: String,
}

pub async fn upload_file(
    config: &UplinkConfig,
    transport: Arc<dyn HttpTransport>,
    path: &Path,
    endpoint: &str,
    metadata: Option<&Path>,
    force_sync: bool,
) -> anyhow::Result<UploadOutcome> {
    let source = FileSource::new(path).with_chunk_size(config.upload.chunk_size);
    let (info, get_data_result) = inspect_content(&source, &config.upload.features).await;
    info!(path = %path.display(), size = info.size, ?get_data_result, "file inspected");

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let metadata = load_metadata(metadata, || default_metadata("file", &file_name, &info))?;
    let params = UploadParams::new(endpoint, metadata)
        .histogram_suffix(config.upload.histogram_suffix.clone())
        .force_sync(force_sync);

    let (callbacks, signals) = signals();
    let request = ResumableUploadRequest::create_file_request(
        transport,
        params,
        source,
        &info,
        get_data_result,
        &config.upload.features,
        callbacks,
    )?;
    drive(request, signals).await
}

pub async fn upload_page(
    config: &UplinkConfig,
    transport: Arc<dyn HttpTransport>,
    capture: &Path,
    endpoint: &str,
    metadata: Option<&Path>,
) -> anyhow::Result<UploadOutcome> {
    let region = tokio::fs::read(capture)
        .await
        .with_context(|| format!("reading page capture {}", capture.display()))?;
    let page = PageSource::new(region).with_chunk_size(config.upload.chunk_size);
    let (info, get_data_result) = inspect_content(&page, &config.upload.features).await;
    info!(kind = %page.kind(), size = info.size, ?get_data_result, "page capture inspected");

    let name = capture
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let metadata = load_metadata(metadata, || default_metadata("page", &name, &info))?;
    let params =
        UploadParams::new(endpoint, metadata).histogram_suffix(config.upload.histogram_suffix.clone());

    let (callbacks, signals) = signals();
    let request = ResumableUploadRequest::create_page_request(
        transport,
        params,
        page,
        get_data_result,
        &config.upload.features,
        callbacks,
    )?;
    drive(request, signals).await
}

struct Signals {
    verdict: oneshot::Receiver<(UploadResult, Option<HttpResponse>)>,
    content_uploaded: oneshot::Receiver<()>,
}

fn signals() -> (UploadCallbacks, Signals) {
    let (verdict_tx, verdict_rx) = oneshot::channel();
    let (done_tx, done_rx) = oneshot::channel();
    let callbacks = UploadCallbacks::new(
        move |result, response| {
            let _ = verdict_tx.send((result, response));
        },
        move || {
            let _ = done_tx.send(());
        },
    );
    let signals = Signals {
        verdict: verdict_rx,
        content_uploaded: done_rx,
    };
    (callbacks, signals)
}

async fn drive(
    mut request: ResumableUploadRequest,
    signals: Signals,
) -> anyhow::Result<UploadOutcome> {
    request.start().await?;
    if request.state() == UploadState::ContentPending {
        info!("content deferred past the verdict, sending it now");
        request.send_content_soon().await?;
    }

    let (result, response) = signals
        .verdict
        .await
        .context("upload finished without a verdict")?;
    // Metadata-only uploads drop the content callback unfired.
    let content_sent = signals.content_uploaded.await.is_ok();

    Ok(UploadOutcome {
        result,
        status: response.map(|r| r.status),
        upload_url: request.upload_url().cloned(),
        content_sent,
        info: request.get_upload_info(),
    })
}

fn load_metadata(
    path: Option<&Path>,
    default: impl FnOnce() -> anyhow::Result<Vec<u8>>,
) -> anyhow::Result<Vec<u8>> {
    match path {
        Some(p) => std::fs::read(p).with_context(|| format!("reading metadata {}", p.display())),
        None => default(),
    }
}

fn default_metadata(kind: &str, name: &str, info: &DataInfo) -> anyhow::Result<Vec<u8>> {
    let value = serde_json::json!({
        "kind": kind,
        "name": name,
        "size": info.size,
        "sha256": info.sha256,
        "encrypted": info.is_encrypted,
    });
    Ok(serde_json::to_vec(&value)?)
}
