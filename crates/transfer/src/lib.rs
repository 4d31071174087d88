//! Content sources for resumable uploads.
//!
//! A [`ContentSource`] describes the bytes an upload will carry (a file on
//! disk or an in-memory page capture). It answers a cheap pre-flight
//! [`ContentSource::get_info`] and, only when content is actually needed,
//! opens a pull-based [`ContentStream`].

mod chunked;
mod source;
mod stream;

pub use chunked::{ChunkReader, calculate_file_checksum, checksum_bytes, sniff_encrypted_zip};
pub use source::{
    AccessCheck, ContentSource, DataInfo, FileSource, GetDataResult, PageSource, SourceKind,
    classify_data,
};
pub use stream::ContentStream;

/// Default chunk size: 1 MiB.
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("read access denied: {0}")]
    AccessDenied(String),

    #[error("content source closed")]
    Closed,

    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl From<TransferError> for std::io::Error {
    fn from(err: TransferError) -> Self {
        match err {
            TransferError::Io(e) => e,
            TransferError::AccessDenied(msg) => {
                std::io::Error::new(std::io::ErrorKind::PermissionDenied, msg)
            }
            other => std::io::Error::other(other.to_string()),
        }
    }
}
