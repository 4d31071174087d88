use std::time::Duration;

/// Identifies the logical request across retry attempts.
pub const RETRY_GUID_HEADER: &str = "Retry-GUID";

/// 1-based retry number carried by every retried attempt.
pub const RETRY_ATTEMPTS_HEADER: &str = "Retry-Attempts";

/// Selects the resumable upload protocol on the metadata request.
pub const UPLOAD_PROTOCOL_HEADER: &str = "X-Upload-Protocol";

/// Upload command (`start`, `upload, finalize`).
pub const UPLOAD_COMMAND_HEADER: &str = "X-Upload-Command";

/// Session status returned by the metadata response.
pub const UPLOAD_STATUS_HEADER: &str = "X-Upload-Status";

/// Content destination returned by the metadata response.
pub const UPLOAD_URL_HEADER: &str = "X-Upload-URL";

/// Byte offset of the content being sent.
pub const UPLOAD_OFFSET_HEADER: &str = "X-Upload-Offset";

/// Announced size of the content that will follow the metadata.
pub const UPLOAD_CONTENT_LENGTH_HEADER: &str = "X-Upload-Header-Content-Length";

/// Whether the content on disk is obfuscated.
pub const UPLOAD_OBFUSCATED_HEADER: &str = "X-Upload-Obfuscated";

/// Caller-chosen suffix used to group upload timings.
pub const UPLOAD_HISTOGRAM_SUFFIX_HEADER: &str = "X-Upload-Histogram-Suffix";

/// `X-Upload-Protocol` value for the two-phase protocol.
pub const UPLOAD_PROTOCOL_RESUMABLE: &str = "resumable";

/// `X-Upload-Command` value opening a session.
pub const UPLOAD_COMMAND_START: &str = "start";

/// `X-Upload-Command` value sending the whole content in one request.
pub const UPLOAD_COMMAND_UPLOAD_FINALIZE: &str = "upload, finalize";

/// The only `X-Upload-Status` value that permits a content upload.
pub const UPLOAD_STATUS_ACTIVE: &str = "active";

/// Default number of redirects a keepalive load may follow, across all attempts.
pub const DEFAULT_REDIRECT_LIMIT: u32 = 20;

/// Default grace period for a loader whose initiator went away.
pub const DEFAULT_DISCONNECTED_LOADER_TIMEOUT: Duration = Duration::from_secs(30);
