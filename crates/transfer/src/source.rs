use std::fmt;
use std::future::Future;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use tracing::debug;

use crate::chunked::{ChunkReader, calculate_file_checksum, checksum_bytes, sniff_encrypted_zip};
use crate::{ContentStream, TransferError};

/// What backs a [`ContentSource`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    File,
    Page,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::File => f.write_str("file"),
            SourceKind::Page => f.write_str("page"),
        }
    }
}

/// Pre-flight facts about upload content, gathered before any stream opens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataInfo {
    pub size: u64,
    /// Hex SHA-256 of the content.
    pub sha256: String,
    pub is_obfuscated: bool,
    pub is_encrypted: bool,
}

/// Outcome of gathering [`DataInfo`]; decides how much of the content an
/// upload may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GetDataResult {
    Success,
    FileTooLarge,
    FileEncrypted,
    UnsupportedFileType,
    Unknown,
}

/// Classifies content against the configured size limit.
pub fn classify_data(info: &DataInfo, max_size: u64) -> GetDataResult {
    if info.size > max_size {
        GetDataResult::FileTooLarge
    } else if info.is_encrypted {
        GetDataResult::FileEncrypted
    } else {
        GetDataResult::Success
    }
}

/// Asynchronous read-permission negotiation for file content.
///
/// Runs when the content is about to be opened, not when the request is
/// created; implementations may prompt, consult a broker, or wait on the OS.
pub trait AccessCheck: Send + Sync {
    fn request_read_access<'a>(
        &'a self,
        path: &'a Path,
    ) -> Pin<Box<dyn Future<Output = Result<(), TransferError>> + Send + 'a>>;
}

/// Bytes an upload can carry.
pub trait ContentSource: Send + Sync {
    fn kind(&self) -> SourceKind;

    /// Gathers size, digest and flags without keeping anything open.
    fn get_info(&self) -> Pin<Box<dyn Future<Output = Result<DataInfo, TransferError>> + Send + '_>>;

    /// Acquires a readable handle on the content.
    fn open(&self) -> Pin<Box<dyn Future<Output = Result<ContentStream, TransferError>> + Send + '_>>;
}

// ---------------------------------------------------------------------------
// FileSource
// ---------------------------------------------------------------------------

/// A file on disk.
pub struct FileSource {
    path: PathBuf,
    is_obfuscated: bool,
    chunk_size: usize,
    access: Option<Arc<dyn AccessCheck>>,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            is_obfuscated: false,
            chunk_size: 0,
            access: None,
        }
    }

    /// Marks the on-disk content as obfuscated.
    pub fn obfuscated(mut self, is_obfuscated: bool) -> Self {
        self.is_obfuscated = is_obfuscated;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Requires `access` to grant read permission before the file opens.
    pub fn with_access_check(mut self, access: Arc<dyn AccessCheck>) -> Self {
        self.access = Some(access);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ContentSource for FileSource {
    fn kind(&self) -> SourceKind {
        SourceKind::File
    }

    fn get_info(&self) -> Pin<Box<dyn Future<Output = Result<DataInfo, TransferError>> + Send + '_>> {
        let path = self.path.clone();
        let is_obfuscated = self.is_obfuscated;
        Box::pin(async move {
            let info = tokio::task::spawn_blocking(move || -> Result<DataInfo, TransferError> {
                let size = std::fs::metadata(&path)?.len();
                let mut header = [0u8; 8];
                let n = std::fs::File::open(&path)?.read(&mut header)?;
                Ok(DataInfo {
                    size,
                    sha256: calculate_file_checksum(&path)?,
                    is_obfuscated,
                    is_encrypted: sniff_encrypted_zip(&header[..n]),
                })
            })
            .await??;
            debug!(path = %self.path.display(), size = info.size, "file info gathered");
            Ok(info)
        })
    }

    fn open(&self) -> Pin<Box<dyn Future<Output = Result<ContentStream, TransferError>> + Send + '_>> {
        Box::pin(async move {
            if let Some(access) = &self.access {
                access.request_read_access(&self.path).await?;
            }
            let path = self.path.clone();
            let chunk_size = self.chunk_size;
            let reader =
                tokio::task::spawn_blocking(move || ChunkReader::new(&path, chunk_size)).await??;
            Ok(ContentStream::from_file(reader))
        })
    }
}

// ---------------------------------------------------------------------------
// PageSource
// ---------------------------------------------------------------------------

/// A page capture held in memory.
#[derive(Clone)]
pub struct PageSource {
    region: Bytes,
    chunk_size: usize,
}

impl PageSource {
    pub fn new(region: impl Into<Bytes>) -> Self {
        Self {
            region: region.into(),
            chunk_size: 0,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn len(&self) -> usize {
        self.region.len()
    }

    pub fn is_empty(&self) -> bool {
        self.region.is_empty()
    }
}

impl ContentSource for PageSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Page
    }

    fn get_info(&self) -> Pin<Box<dyn Future<Output = Result<DataInfo, TransferError>> + Send + '_>> {
        Box::pin(async move {
            Ok(DataInfo {
                size: self.region.len() as u64,
                sha256: checksum_bytes(&self.region),
                is_obfuscated: false,
                is_encrypted: false,
            })
        })
    }

    fn open(&self) -> Pin<Box<dyn Future<Output = Result<ContentStream, TransferError>> + Send + '_>> {
        Box::pin(async move { Ok(ContentStream::from_bytes(self.region.clone(), self.chunk_size)) })
    }
}
