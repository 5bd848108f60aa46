//! Tunable settings for the assetstore engines.
//!
//! Settings are layered:
//! - Bundled defaults (include_str! from assetstore.toml)
//! - User overrides (~/.config/assetstore/assetstore.toml)
//! - Working directory overrides (./assetstore.toml), highest precedence

use assetstore_error::{AssetstoreError, AssetstoreResult, ConfigError};
use config::{Config, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument};

/// Connectivity probe settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeSettings {
    /// Per-attempt timeout in milliseconds
    pub timeout_ms: u64,
    /// Extra attempts after the first failure
    pub retries: usize,
    /// Pause between attempts in milliseconds
    pub retry_delay_ms: u64,
}

impl ProbeSettings {
    /// Per-attempt timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Pause between attempts.
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            timeout_ms: 2000,
            retries: 1,
            retry_delay_ms: 250,
        }
    }
}

/// Filesystem backend settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilesystemSettings {
    /// Preferred chunk size when relaying bytes
    pub chunk_size: u64,
}

impl Default for FilesystemSettings {
    fn default() -> Self {
        Self {
            chunk_size: 64 * 1024 * 1024,
        }
    }
}

/// Object-store backend settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectStoreSettings {
    /// Largest single PUT; bigger uploads go multipart with parts of this size
    pub chunk_length: u64,
    /// Lifetime of pre-signed URLs in seconds
    pub presign_expiry_secs: u64,
    /// Endpoint used when an Assetstore sets none
    pub default_service: String,
    /// Region used when an Assetstore sets none
    pub default_region: String,
}

impl Default for ObjectStoreSettings {
    fn default() -> Self {
        Self {
            chunk_length: 64 * 1024 * 1024,
            presign_expiry_secs: 3600,
            default_service: "https://s3.amazonaws.com".to_string(),
            default_region: "us-east-1".to_string(),
        }
    }
}

/// Document-store backend settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentStoreSettings {
    /// Bytes per chunk document
    pub chunk_size: u64,
}

impl Default for DocumentStoreSettings {
    fn default() -> Self {
        Self {
            chunk_size: 256 * 1024,
        }
    }
}

/// Upload session bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadSettings {
    /// Seconds a finished, cancelled or failed session stays queryable
    pub closed_retention_secs: u64,
}

impl UploadSettings {
    /// How long closed sessions are kept.
    pub fn closed_retention(&self) -> Duration {
        Duration::from_secs(self.closed_retention_secs)
    }
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            closed_retention_secs: 3600,
        }
    }
}

/// All assetstore settings.
///
/// # Examples
///
/// ```
/// use assetstore_core::AssetstoreSettings;
///
/// let settings = AssetstoreSettings::default();
/// assert_eq!(settings.probe.retries, 1);
/// assert_eq!(settings.upload.closed_retention(), std::time::Duration::from_secs(3600));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetstoreSettings {
    /// Connectivity probe
    #[serde(default)]
    pub probe: ProbeSettings,
    /// Filesystem backend
    #[serde(default)]
    pub filesystem: FilesystemSettings,
    /// Object-store backend
    #[serde(default)]
    pub object_store: ObjectStoreSettings,
    /// Document-store backend
    #[serde(default)]
    pub document_store: DocumentStoreSettings,
    /// Upload sessions
    #[serde(default)]
    pub upload: UploadSettings,
}

impl AssetstoreSettings {
    /// Load settings from an explicit TOML file.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn from_file(path: impl AsRef<std::path::Path>) -> AssetstoreResult<Self> {
        debug!("Loading settings from file");

        Config::builder()
            .add_source(File::from(path.as_ref()))
            .build()
            .map_err(|e| {
                AssetstoreError::from(ConfigError::read(path.as_ref().display(), e))
            })?
            .try_deserialize()
            .map_err(|e| {
                AssetstoreError::from(ConfigError::parse(e))
            })
    }

    /// Load settings with precedence: current dir > home dir > bundled defaults.
    #[instrument]
    pub fn load() -> AssetstoreResult<Self> {
        debug!("Loading settings with precedence: current dir > home dir > bundled defaults");

        const DEFAULT_SETTINGS: &str = include_str!("../../../assetstore.toml");

        let mut builder =
            Config::builder().add_source(File::from_str(DEFAULT_SETTINGS, FileFormat::Toml));

        if let Some(home) = dirs::home_dir() {
            let home_settings = home.join(".config/assetstore/assetstore.toml");
            builder = builder.add_source(File::from(home_settings).required(false));
        }

        builder = builder.add_source(File::with_name("assetstore").required(false));

        builder
            .build()
            .map_err(|e| {
                AssetstoreError::from(ConfigError::read("layered settings", e))
            })?
            .try_deserialize()
            .map_err(|e| {
                AssetstoreError::from(ConfigError::parse(e))
            })
    }
}
