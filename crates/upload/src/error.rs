//! Upload error types.

use crate::request::UploadState;

/// Errors returned by the upload engine's own operations.
///
/// Network and server outcomes are not errors here; they are reported
/// through the verdict callback as an [`UploadResult`](crate::UploadResult).
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("invalid base url: {0}")]
    InvalidUrl(String),

    #[error("metadata must not be empty")]
    EmptyMetadata,

    #[error("upload already started")]
    AlreadyStarted,

    #[error("no content upload pending (state: {0})")]
    NotPending(UploadState),

    #[error("cancelled")]
    Cancelled,

    #[error("protocol error: {0}")]
    Protocol(#[from] uplink_protocol::ProtocolError),
}
