//! CLI configuration management.
//!
//! Configuration is stored as TOML:
//! - Linux: `~/.config/uplink/uplink.toml`
//! - Windows: `%APPDATA%/uplink/uplink.toml`
//!
//! Durations are written in milliseconds.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uplink_keepalive::KeepaliveConfig;
use uplink_protocol::RetryOptions;
use uplink_upload::UploadFeatures;

/// Top-level configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UplinkConfig {
    pub upload: UploadSection,
    pub keepalive: KeepaliveSection,
    pub retry: RetrySection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadSection {
    #[serde(flatten)]
    pub features: UploadFeatures,
    /// Sent as `X-Upload-Histogram-Suffix`.
    pub histogram_suffix: String,
    pub chunk_size: usize,
}

impl Default for UploadSection {
    fn default() -> Self {
        Self {
            features: UploadFeatures::default(),
            histogram_suffix: String::new(),
            chunk_size: uplink_transfer::DEFAULT_CHUNK_SIZE,
        }
    }
}

/// Service-wide keepalive ceilings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeepaliveSection {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub backoff_factor: f64,
    pub max_age_ms: u64,
    pub redirect_limit: u32,
    pub disconnected_loader_timeout_ms: u64,
}

impl Default for KeepaliveSection {
    fn default() -> Self {
        let d = KeepaliveConfig::default();
        Self {
            max_attempts: d.max_attempts,
            initial_delay_ms: d.initial_delay.as_millis() as u64,
            backoff_factor: d.backoff_factor,
            max_age_ms: d.max_age.as_millis() as u64,
            redirect_limit: d.redirect_limit,
            disconnected_loader_timeout_ms: d.disconnected_loader_timeout.as_millis() as u64,
        }
    }
}

impl KeepaliveSection {
    pub fn to_config(&self) -> KeepaliveConfig {
        KeepaliveConfig {
            max_attempts: self.max_attempts,
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            backoff_factor: self.backoff_factor,
            max_age: Duration::from_millis(self.max_age_ms),
            redirect_limit: self.redirect_limit,
            disconnected_loader_timeout: Duration::from_millis(self.disconnected_loader_timeout_ms),
        }
    }
}

/// Retry options attached to `beacon --retry`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySection {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub backoff_factor: f64,
    pub max_age_ms: u64,
    pub retry_after_unload: bool,
    pub retry_non_idempotent: bool,
    pub retry_only_if_server_unreached: bool,
}

impl Default for RetrySection {
    fn default() -> Self {
        let d = RetryOptions::default();
        Self {
            max_attempts: d.max_attempts,
            initial_delay_ms: d.initial_delay.as_millis() as u64,
            backoff_factor: d.backoff_factor,
            max_age_ms: d.max_age.as_millis() as u64,
            retry_after_unload: d.retry_after_unload,
            retry_non_idempotent: d.retry_non_idempotent,
            retry_only_if_server_unreached: d.retry_only_if_server_unreached,
        }
    }
}

impl RetrySection {
    pub fn to_options(&self) -> RetryOptions {
        RetryOptions {
            max_attempts: self.max_attempts,
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            backoff_factor: self.backoff_factor,
            max_age: Duration::from_millis(self.max_age_ms),
            retry_after_unload: self.retry_after_unload,
            retry_non_idempotent: self.retry_non_idempotent,
            retry_only_if_server_unreached: self.retry_only_if_server_unreached,
        }
    }
}

impl UplinkConfig {
    /// Loads configuration from `path` (or the platform default), creating a
    /// default file if none exists.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => config_path()?,
        };

        if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            let config: UplinkConfig = toml::from_str(&content)?;
            tracing::debug!(path = %path.display(), "configuration loaded");
            Ok(config)
        } else {
            let config = UplinkConfig::default();
            config.save(&path)?;
            Ok(config)
        }
    }

    /// Saves the configuration to `path`.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }
}

/// Returns the platform-specific configuration file path.
fn config_path() -> anyhow::Result<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        Ok(PathBuf::from(appdata).join("uplink").join("uplink.toml"))
    }

    #[cfg(not(target_os = "windows"))]
    {
        let base = match std::env::var("XDG_CONFIG_HOME") {
            Ok(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
                PathBuf::from(home).join(".config")
            }
        };
        Ok(base.join("uplink").join("uplink.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_sections_match_library_defaults() {
        let config = UplinkConfig::default();
        assert_eq!(config.keepalive.to_config(), KeepaliveConfig::default());
        assert_eq!(config.retry.to_options(), RetryOptions::default());
        assert_eq!(config.upload.features, UploadFeatures::default());
    }

    #[test]
    fn missing_file_is_created_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("uplink.toml");

        let config = UplinkConfig::load(Some(&path)).unwrap();
        assert_eq!(config, UplinkConfig::default());
        assert!(path.exists());

        let reloaded = UplinkConfig::load(Some(&path)).unwrap();
        assert_eq!(reloaded, config);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("uplink.toml");
        std::fs::write(
            &path,
            "[upload]\nupload_encrypted_files = true\n\n[keepalive]\ninitial_delay_ms = 500\n",
        )
        .unwrap();

        let config = UplinkConfig::load(Some(&path)).unwrap();
        assert!(config.upload.features.upload_encrypted_files);
        assert_eq!(
            config.upload.features.max_file_size,
            UploadFeatures::default().max_file_size
        );
        assert_eq!(
            config.keepalive.to_config().initial_delay,
            Duration::from_millis(500)
        );
        assert_eq!(config.keepalive.redirect_limit, 20);
        assert_eq!(config.retry, RetrySection::default());
    }

    #[test]
    fn save_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("uplink.toml");
        let mut config = UplinkConfig::default();
        config.upload.histogram_suffix = "Cli".into();
        config.retry.retry_after_unload = true;
        config.save(&path).unwrap();

        let loaded = UplinkConfig::load(Some(&path)).unwrap();
        assert_eq!(loaded, config);
    }
}
