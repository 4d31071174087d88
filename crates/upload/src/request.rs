//! The resumable upload request: metadata phase, then content phase.
//!
//! One [`ResumableUploadRequest`] drives one upload. Each external event
//! (metadata response, content handle acquired, content response) lands in
//! exactly one dispatch method that moves [`UploadState`] forward, so the
//! whole flow can be exercised against a fake [`HttpTransport`].

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use http::{Method, StatusCode};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uplink_protocol::constants::{
    UPLOAD_COMMAND_HEADER, UPLOAD_COMMAND_START, UPLOAD_COMMAND_UPLOAD_FINALIZE,
    UPLOAD_CONTENT_LENGTH_HEADER, UPLOAD_HISTOGRAM_SUFFIX_HEADER, UPLOAD_OBFUSCATED_HEADER,
    UPLOAD_OFFSET_HEADER, UPLOAD_PROTOCOL_HEADER, UPLOAD_PROTOCOL_RESUMABLE, UPLOAD_STATUS_ACTIVE,
    UPLOAD_STATUS_HEADER, UPLOAD_URL_HEADER,
};
use uplink_protocol::{HttpRequest, HttpResponse, NetError, RequestBody};
use uplink_transfer::{
    ContentSource, ContentStream, DataInfo, FileSource, GetDataResult, PageSource, SourceKind,
    TransferError,
};
use url::Url;

use crate::error::UploadError;
use crate::scan::{ScanType, UploadFeatures, scan_type_for};
use crate::transport::HttpTransport;

/// Execution state of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadState {
    NotStarted,
    MetadataInFlight,
    /// Metadata accepted; content not sent yet.
    ContentPending,
    ContentInFlight,
    Done,
}

impl fmt::Display for UploadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UploadState::NotStarted => "not started",
            UploadState::MetadataInFlight => "metadata in flight",
            UploadState::ContentPending => "content pending",
            UploadState::ContentInFlight => "content in flight",
            UploadState::Done => "done",
        };
        f.write_str(s)
    }
}

/// Outcome reported to the verdict callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadResult {
    Success,
    /// The server answered with a non-success status.
    HttpFailure(StatusCode),
    /// No response was received.
    NetworkFailure(NetError),
    /// The content could not be opened for reading.
    ContentUnavailable,
}

impl UploadResult {
    fn from_response(response: &HttpResponse) -> Self {
        if response.status.is_success() {
            UploadResult::Success
        } else {
            UploadResult::HttpFailure(response.status)
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, UploadResult::Success)
    }
}

/// Fired once with the terminal (or pre-content) outcome.
pub type VerdictCallback = Box<dyn FnOnce(UploadResult, Option<HttpResponse>) + Send>;

/// Fired once after the content phase ends, successful or not.
pub type ContentUploadedCallback = Box<dyn FnOnce() + Send>;

/// The two caller-facing signals of an upload.
pub struct UploadCallbacks {
    pub verdict: VerdictCallback,
    pub content_uploaded: ContentUploadedCallback,
}

impl UploadCallbacks {
    pub fn new(
        verdict: impl FnOnce(UploadResult, Option<HttpResponse>) + Send + 'static,
        content_uploaded: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            verdict: Box::new(verdict),
            content_uploaded: Box::new(content_uploaded),
        }
    }
}

/// Caller-supplied parameters shared by file and page uploads.
#[derive(Debug, Clone)]
pub struct UploadParams {
    pub base_url: String,
    pub metadata: Bytes,
    pub histogram_suffix: String,
    /// Send content immediately even when the scan type allows deferral.
    pub force_sync_upload: bool,
}

impl UploadParams {
    pub fn new(base_url: impl Into<String>, metadata: impl Into<Bytes>) -> Self {
        Self {
            base_url: base_url.into(),
            metadata: metadata.into(),
            histogram_suffix: String::new(),
            force_sync_upload: false,
        }
    }

    pub fn histogram_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.histogram_suffix = suffix.into();
        self
    }

    pub fn force_sync(mut self, force: bool) -> Self {
        self.force_sync_upload = force;
        self
    }
}

struct Content {
    kind: SourceKind,
    source: Box<dyn ContentSource>,
    size: u64,
    is_obfuscated: bool,
}

/// A single two-phase upload. Not reusable.
pub struct ResumableUploadRequest {
    kind: SourceKind,
    base_url: Url,
    metadata: Bytes,
    histogram_suffix: String,
    force_sync_upload: bool,
    source: Box<dyn ContentSource>,
    content_size: u64,
    is_obfuscated: bool,
    get_data_result: GetDataResult,
    scan_type: ScanType,
    async_encrypted_upload: bool,
    upload_url: Option<Url>,
    state: UploadState,
    transport: Arc<dyn HttpTransport>,
    verdict_callback: Option<VerdictCallback>,
    content_uploaded_callback: Option<ContentUploadedCallback>,
    cancel: CancellationToken,
    phase_started: Instant,
}

impl ResumableUploadRequest {
    /// Creates an unstarted upload of a file.
    ///
    /// `info` and `get_data_result` come from the pre-flight inspection
    /// (see [`inspect_content`](crate::inspect_content)).
    pub fn create_file_request(
        transport: Arc<dyn HttpTransport>,
        params: UploadParams,
        source: FileSource,
        info: &DataInfo,
        get_data_result: GetDataResult,
        features: &UploadFeatures,
        callbacks: UploadCallbacks,
    ) -> Result<Self, UploadError> {
        let content = Content {
            kind: SourceKind::File,
            source: Box::new(source),
            size: info.size,
            is_obfuscated: info.is_obfuscated,
        };
        Self::build(transport, params, content, get_data_result, features, callbacks)
    }

    /// Creates an unstarted upload of an in-memory page capture.
    pub fn create_page_request(
        transport: Arc<dyn HttpTransport>,
        params: UploadParams,
        page: PageSource,
        get_data_result: GetDataResult,
        features: &UploadFeatures,
        callbacks: UploadCallbacks,
    ) -> Result<Self, UploadError> {
        let content = Content {
            kind: SourceKind::Page,
            size: page.len() as u64,
            source: Box::new(page),
            is_obfuscated: false,
        };
        Self::build(transport, params, content, get_data_result, features, callbacks)
    }

    fn build(
        transport: Arc<dyn HttpTransport>,
        params: UploadParams,
        content: Content,
        get_data_result: GetDataResult,
        features: &UploadFeatures,
        callbacks: UploadCallbacks,
    ) -> Result<Self, UploadError> {
        let base_url = Url::parse(&params.base_url)
            .map_err(|e| UploadError::InvalidUrl(format!("{}: {e}", params.base_url)))?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(UploadError::InvalidUrl(params.base_url));
        }
        if params.metadata.is_empty() {
            return Err(UploadError::EmptyMetadata);
        }

        let scan_type = scan_type_for(get_data_result, features);
        debug!(kind = %content.kind, ?get_data_result, %scan_type, "upload request created");

        Ok(Self {
            kind: content.kind,
            base_url,
            metadata: params.metadata,
            histogram_suffix: params.histogram_suffix,
            force_sync_upload: params.force_sync_upload,
            source: content.source,
            content_size: content.size,
            is_obfuscated: content.is_obfuscated,
            get_data_result,
            scan_type,
            async_encrypted_upload: features.async_encrypted_upload,
            upload_url: None,
            state: UploadState::NotStarted,
            transport,
            verdict_callback: Some(callbacks.verdict),
            content_uploaded_callback: Some(callbacks.content_uploaded),
            cancel: CancellationToken::new(),
            phase_started: Instant::now(),
        })
    }

    // -----------------------------------------------------------------------
    // Public operations
    // -----------------------------------------------------------------------

    /// Runs the metadata phase and, unless the content is deferred, the
    /// content phase.
    pub async fn start(&mut self) -> Result<(), UploadError> {
        if self.state != UploadState::NotStarted {
            return Err(UploadError::AlreadyStarted);
        }
        if self.cancel.is_cancelled() {
            return Err(self.abort());
        }

        let request = self.metadata_request()?;
        info!(
            kind = %self.kind,
            scan_type = %self.scan_type,
            suffix = %self.histogram_suffix,
            "starting resumable upload"
        );
        self.state = UploadState::MetadataInFlight;
        self.phase_started = Instant::now();

        let transport = Arc::clone(&self.transport);
        let result = tokio::select! {
            _ = self.cancel.cancelled() => None,
            r = transport.send(request) => Some(r),
        };
        let Some(result) = result else {
            return Err(self.abort());
        };

        if self.on_metadata_upload_completed(result) {
            self.run_content_phase().await?;
        }
        Ok(())
    }

    /// Sends content whose upload was deferred after the verdict.
    pub async fn send_content_soon(&mut self) -> Result<(), UploadError> {
        if self.state != UploadState::ContentPending {
            return Err(UploadError::NotPending(self.state));
        }
        self.run_content_phase().await
    }

    /// Aborts whatever phase is in flight. No callback fires afterwards.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Token that cancels this request from elsewhere.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Diagnostic description for logs.
    pub fn get_upload_info(&self) -> String {
        format!(
            "Resumable {} upload, scan_type={}, get_data_result={:?}, state={}",
            self.kind, self.scan_type, self.get_data_result, self.state
        )
    }

    /// Content destination announced by the metadata response.
    pub fn upload_url(&self) -> Option<&Url> {
        self.upload_url.as_ref()
    }

    pub fn scan_type(&self) -> ScanType {
        self.scan_type
    }

    pub fn state(&self) -> UploadState {
        self.state
    }

    // -----------------------------------------------------------------------
    // Metadata phase
    // -----------------------------------------------------------------------

    fn metadata_request(&self) -> Result<HttpRequest, UploadError> {
        let mut request = HttpRequest::new(Method::POST, self.base_url.clone());
        request.set_header(UPLOAD_PROTOCOL_HEADER, UPLOAD_PROTOCOL_RESUMABLE)?;
        request.set_header(UPLOAD_COMMAND_HEADER, UPLOAD_COMMAND_START)?;
        request.set_header(UPLOAD_CONTENT_LENGTH_HEADER, &self.content_size.to_string())?;
        request.set_header(
            UPLOAD_OBFUSCATED_HEADER,
            if self.is_obfuscated { "true" } else { "false" },
        )?;
        request.set_header(UPLOAD_HISTOGRAM_SUFFIX_HEADER, &self.histogram_suffix)?;
        request.set_header("Content-Type", "application/octet-stream")?;
        request.body = RequestBody::Bytes(self.metadata.clone());
        Ok(request)
    }

    /// Returns `true` when the content phase should start right away.
    fn on_metadata_upload_completed(&mut self, result: Result<HttpResponse, NetError>) -> bool {
        if self.state != UploadState::MetadataInFlight {
            return false;
        }
        debug!(
            elapsed_ms = self.phase_started.elapsed().as_millis() as u64,
            suffix = %self.histogram_suffix,
            "metadata phase finished"
        );

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "metadata upload failed");
                self.finish(UploadResult::NetworkFailure(e), None);
                return false;
            }
        };

        if !self.can_upload_content(&response) || self.scan_type == ScanType::MetadataOnly {
            let result = UploadResult::from_response(&response);
            debug!(status = response.status.as_u16(), ?result, "finishing without content");
            self.finish(result, Some(response));
            return false;
        }

        self.state = UploadState::ContentPending;
        if self.should_defer_content() {
            debug!("content upload deferred until requested");
            let result = UploadResult::from_response(&response);
            self.fire_verdict(result, Some(response));
            return false;
        }
        true
    }

    /// Checks the metadata response for an active session and caches the
    /// announced upload URL.
    fn can_upload_content(&mut self, response: &HttpResponse) -> bool {
        if response.status != StatusCode::OK {
            return false;
        }
        let (Some(status), Some(url)) = (
            response.header(UPLOAD_STATUS_HEADER),
            response.header(UPLOAD_URL_HEADER),
        ) else {
            return false;
        };
        match Url::parse(url) {
            Ok(url) => self.upload_url = Some(url),
            Err(e) => {
                warn!(url, error = %e, "metadata response carried a malformed upload url");
                return false;
            }
        }
        status == UPLOAD_STATUS_ACTIVE
    }

    fn should_defer_content(&self) -> bool {
        self.scan_type == ScanType::Async && self.async_encrypted_upload && !self.force_sync_upload
    }

    // -----------------------------------------------------------------------
    // Content phase
    // -----------------------------------------------------------------------

    async fn run_content_phase(&mut self) -> Result<(), UploadError> {
        self.phase_started = Instant::now();

        let opened = tokio::select! {
            _ = self.cancel.cancelled() => None,
            r = self.source.open() => Some(r),
        };
        let Some(opened) = opened else {
            return Err(self.abort());
        };
        let Some(stream) = self.on_data_pipe_created(opened) else {
            return Ok(());
        };
        let Some(request) = self.send_content_now(stream)? else {
            return Ok(());
        };

        let transport = Arc::clone(&self.transport);
        let result = tokio::select! {
            _ = self.cancel.cancelled() => None,
            r = transport.send(request) => Some(r),
        };
        let Some(result) = result else {
            return Err(self.abort());
        };
        self.on_send_content_completed(result);
        Ok(())
    }

    fn on_data_pipe_created(
        &mut self,
        opened: Result<ContentStream, TransferError>,
    ) -> Option<ContentStream> {
        match opened {
            Ok(stream) => Some(stream),
            Err(e) => {
                warn!(kind = %self.kind, error = %e, "content could not be opened");
                self.finish_content(UploadResult::ContentUnavailable, None);
                None
            }
        }
    }

    fn send_content_now(
        &mut self,
        stream: ContentStream,
    ) -> Result<Option<HttpRequest>, UploadError> {
        let Some(url) = self.upload_url.clone() else {
            self.finish_content(UploadResult::NetworkFailure(NetError::InvalidUrl), None);
            return Ok(None);
        };

        let size = stream.size();
        let range = if size == 0 {
            "bytes */0".to_string()
        } else {
            format!("bytes 0-{}/{size}", size - 1)
        };

        let mut request = HttpRequest::new(Method::PUT, url);
        request.set_header(UPLOAD_COMMAND_HEADER, UPLOAD_COMMAND_UPLOAD_FINALIZE)?;
        request.set_header(UPLOAD_OFFSET_HEADER, "0")?;
        request.set_header("Content-Range", &range)?;
        request.set_header("Content-Type", "application/octet-stream")?;
        request.body = RequestBody::Stream(Box::new(stream));

        debug!(size, %range, "sending content");
        self.state = UploadState::ContentInFlight;
        Ok(Some(request))
    }

    fn on_send_content_completed(&mut self, result: Result<HttpResponse, NetError>) {
        if self.state != UploadState::ContentInFlight {
            return;
        }
        debug!(
            elapsed_ms = self.phase_started.elapsed().as_millis() as u64,
            suffix = %self.histogram_suffix,
            "content phase finished"
        );
        match result {
            Ok(response) => {
                let result = UploadResult::from_response(&response);
                self.finish_content(result, Some(response));
            }
            Err(e) => {
                warn!(error = %e, "content upload failed");
                self.finish_content(UploadResult::NetworkFailure(e), None);
            }
        }
    }

    // -----------------------------------------------------------------------
    // Completion
    // -----------------------------------------------------------------------

    fn fire_verdict(&mut self, result: UploadResult, response: Option<HttpResponse>) {
        if let Some(callback) = self.verdict_callback.take() {
            callback(result, response);
        }
    }

    /// Terminal outcome without a content phase.
    fn finish(&mut self, result: UploadResult, response: Option<HttpResponse>) {
        self.state = UploadState::Done;
        self.content_uploaded_callback = None;
        self.fire_verdict(result, response);
    }

    /// Terminal outcome after the content phase ran.
    fn finish_content(&mut self, result: UploadResult, response: Option<HttpResponse>) {
        self.state = UploadState::Done;
        self.fire_verdict(result, response);
        if let Some(callback) = self.content_uploaded_callback.take() {
            callback();
        }
    }

    fn abort(&mut self) -> UploadError {
        debug!(state = %self.state, "upload cancelled");
        self.state = UploadState::Done;
        self.verdict_callback = None;
        self.content_uploaded_callback = None;
        UploadError::Cancelled
    }
}
