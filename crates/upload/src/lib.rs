//! Two-phase resumable upload engine.
//!
//! An upload first POSTs opaque metadata to a collection endpoint. The
//! response decides whether content follows: only a `200` carrying an
//! `active` session and an upload URL opens the content phase, which PUTs
//! the bytes to that URL as one finalizing request.
//!
//! # Callbacks
//!
//! Progress is reported through two independent signals:
//!
//! - **verdict**: fired once with the terminal outcome, or with the metadata
//!   outcome when the content is deferred;
//! - **content uploaded**: fired once after a content phase ran, whatever
//!   its result.
//!
//! The engine never retries. A failed upload is retried by creating a new
//! request.

pub mod error;
pub mod request;
pub mod scan;
pub mod transport;

pub use error::UploadError;
pub use request::{
    ContentUploadedCallback, ResumableUploadRequest, UploadCallbacks, UploadParams, UploadResult,
    UploadState, VerdictCallback,
};
pub use scan::{ScanType, UploadFeatures, inspect_content, scan_type_for};
pub use transport::HttpTransport;
