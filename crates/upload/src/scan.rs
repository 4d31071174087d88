//! Scan-type selection: how much of the content an upload may carry.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;
use uplink_transfer::{ContentSource, DataInfo, GetDataResult, classify_data};

/// How the content of an upload is handled once the metadata is accepted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ScanType {
    /// Not decided yet.
    #[default]
    Pending,
    /// Only the metadata is sent; the content never leaves the host.
    MetadataOnly,
    /// Content is sent right after the metadata.
    FullContent,
    /// Content may be sent out of band, after the verdict is delivered.
    Async,
}

impl fmt::Display for ScanType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ScanType::Pending => "PENDING",
            ScanType::MetadataOnly => "METADATA_ONLY",
            ScanType::FullContent => "FULL_CONTENT",
            ScanType::Async => "ASYNC",
        };
        f.write_str(s)
    }
}

/// Feature switches for the upload engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadFeatures {
    /// Encrypted files are uploaded (asynchronously) instead of being
    /// reduced to metadata.
    pub upload_encrypted_files: bool,
    /// Async uploads hold their content until explicitly sent.
    pub async_encrypted_upload: bool,
    /// Content larger than this is never uploaded.
    pub max_file_size: u64,
}

impl Default for UploadFeatures {
    fn default() -> Self {
        Self {
            upload_encrypted_files: false,
            async_encrypted_upload: false,
            max_file_size: 50 * 1024 * 1024,
        }
    }
}

impl UploadFeatures {
    /// Whether encrypted content should be uploaded at all.
    pub fn should_upload_encrypted_file(&self) -> bool {
        self.upload_encrypted_files
    }
}

/// Derives the scan type from the pre-flight outcome. Chosen once per request.
pub fn scan_type_for(result: GetDataResult, features: &UploadFeatures) -> ScanType {
    match result {
        GetDataResult::Success => ScanType::FullContent,
        GetDataResult::FileEncrypted if features.should_upload_encrypted_file() => ScanType::Async,
        GetDataResult::FileEncrypted
        | GetDataResult::FileTooLarge
        | GetDataResult::UnsupportedFileType
        | GetDataResult::Unknown => ScanType::MetadataOnly,
    }
}

/// Gathers [`DataInfo`] for `source` and classifies it.
///
/// A source that cannot be inspected yields `Unknown` with zeroed info, so
/// the upload degrades to metadata only.
pub async fn inspect_content(
    source: &dyn ContentSource,
    features: &UploadFeatures,
) -> (DataInfo, GetDataResult) {
    match source.get_info().await {
        Ok(info) => {
            let result = classify_data(&info, features.max_file_size);
            (info, result)
        }
        Err(e) => {
            warn!(kind = %source.kind(), error = %e, "content inspection failed");
            let info = DataInfo {
                size: 0,
                sha256: String::new(),
                is_obfuscated: false,
                is_encrypted: false,
            };
            (info, GetDataResult::Unknown)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uplink_transfer::{FileSource, PageSource};

    fn encrypted_ok() -> UploadFeatures {
        UploadFeatures {
            upload_encrypted_files: true,
            ..UploadFeatures::default()
        }
    }

    #[test]
    fn success_uploads_full_content() {
        assert_eq!(
            scan_type_for(GetDataResult::Success, &UploadFeatures::default()),
            ScanType::FullContent
        );
    }

    #[test]
    fn unscannable_results_skip_content() {
        for result in [
            GetDataResult::FileTooLarge,
            GetDataResult::UnsupportedFileType,
            GetDataResult::Unknown,
        ] {
            for features in [UploadFeatures::default(), encrypted_ok()] {
                let scan = scan_type_for(result, &features);
                assert_ne!(scan, ScanType::FullContent, "{result:?}");
                assert_eq!(scan, ScanType::MetadataOnly);
            }
        }
    }

    #[test]
    fn encrypted_depends_on_policy() {
        assert_eq!(
            scan_type_for(GetDataResult::FileEncrypted, &UploadFeatures::default()),
            ScanType::MetadataOnly
        );
        assert_eq!(
            scan_type_for(GetDataResult::FileEncrypted, &encrypted_ok()),
            ScanType::Async
        );
    }

    #[test]
    fn scan_type_display() {
        assert_eq!(ScanType::MetadataOnly.to_string(), "METADATA_ONLY");
        assert_eq!(ScanType::default().to_string(), "PENDING");
    }

    #[tokio::test]
    async fn inspect_classifies_by_size() {
        let features = UploadFeatures {
            max_file_size: 4,
            ..UploadFeatures::default()
        };
        let (info, result) = inspect_content(&PageSource::new(&b"abc"[..]), &features).await;
        assert_eq!(info.size, 3);
        assert_eq!(result, GetDataResult::Success);

        let (_, result) = inspect_content(&PageSource::new(&b"abcde"[..]), &features).await;
        assert_eq!(result, GetDataResult::FileTooLarge);
    }

    #[tokio::test]
    async fn inspect_missing_file_is_unknown() {
        let source = FileSource::new("/no/such/upload.bin");
        let (info, result) = inspect_content(&source, &UploadFeatures::default()).await;
        assert_eq!(result, GetDataResult::Unknown);
        assert_eq!(info.size, 0);
    }
}
