//! Configured storage backends.

use crate::AssetstoreId;
use assetstore_error::{AssetstoreResult, ValidationError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Type tag of a configured backend.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::EnumIter,
    derive_more::Display,
)]
#[serde(rename_all = "snake_case")]
pub enum AssetstoreType {
    /// Regular files under a root directory
    #[display("filesystem")]
    Filesystem,
    /// S3-compatible object store
    #[display("object_store")]
    ObjectStore,
    /// Document store holding fixed-size chunk documents
    #[display("document_store")]
    DocumentStore,
}

impl std::str::FromStr for AssetstoreType {
    type Err = ValidationError;

    /// Parse the tag written by `Display`.
    ///
    /// ```
    /// use assetstore_core::AssetstoreType;
    ///
    /// assert_eq!("object_store".parse::<AssetstoreType>().unwrap(), AssetstoreType::ObjectStore);
    /// assert!("gridfs".parse::<AssetstoreType>().is_err());
    /// ```
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        use strum::IntoEnumIterator;

        AssetstoreType::iter()
            .find(|kind| kind.to_string() == s)
            .ok_or_else(|| ValidationError::field("type", "Invalid type parameter"))
    }
}

/// Filesystem backend settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilesystemConfig {
    /// Directory holding the bytes
    pub root: PathBuf,
    /// Permission bits applied to finalized files
    #[serde(default = "default_perms")]
    pub perms: u32,
}

fn default_perms() -> u32 {
    0o600
}

impl FilesystemConfig {
    /// Create a config with the default `0o600` permission bits.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            perms: default_perms(),
        }
    }

    /// Parse permission bits given as an octal string such as `"644"`.
    ///
    /// # Examples
    ///
    /// ```
    /// use assetstore_core::FilesystemConfig;
    ///
    /// assert_eq!(FilesystemConfig::parse_perms("755").unwrap(), 0o755);
    /// assert!(FilesystemConfig::parse_perms("384").is_err());
    /// assert!(FilesystemConfig::parse_perms("400").is_err());
    /// ```
    pub fn parse_perms(raw: &str) -> AssetstoreResult<u32> {
        let perms = u32::from_str_radix(raw.trim(), 8).map_err(|_| {
            ValidationError::field("perms", "File permissions must be an octal integer.")
        })?;
        Self::check_perms(perms)?;
        Ok(perms)
    }

    /// Check that permission bits are sane and let the owner read and write.
    pub fn check_perms(perms: u32) -> AssetstoreResult<()> {
        if perms > 0o7777 {
            return Err(ValidationError::field(
                "perms",
                "File permissions must be an octal integer.",
            )
            .into());
        }
        if perms & 0o600 != 0o600 {
            return Err(ValidationError::field(
                "perms",
                "File permissions must allow \"rw\" for user.",
            )
            .into());
        }
        Ok(())
    }
}

/// Object-store backend settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectStoreConfig {
    /// Bucket holding the objects
    pub bucket: String,
    /// Key prefix, with or without surrounding slashes
    #[serde(default)]
    pub prefix: String,
    /// Access key id used for signing
    #[serde(default)]
    pub access_key_id: Option<String>,
    /// Secret access key used for signing
    #[serde(default)]
    pub secret: Option<String>,
    /// Service endpoint, e.g. `https://s3.amazonaws.com`
    #[serde(default)]
    pub service: Option<String>,
    /// Signing region
    #[serde(default)]
    pub region: Option<String>,
}

impl ObjectStoreConfig {
    /// Create a config for a bucket with no prefix and no explicit endpoint.
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            prefix: String::new(),
            access_key_id: None,
            secret: None,
            service: None,
            region: None,
        }
    }

    /// Key prefix with surrounding slashes removed.
    ///
    /// # Examples
    ///
    /// ```
    /// use assetstore_core::ObjectStoreConfig;
    ///
    /// let mut config = ObjectStoreConfig::new("bucketname");
    /// config.prefix = "/foo/bar/".to_string();
    /// assert_eq!(config.normalized_prefix(), "foo/bar");
    /// ```
    pub fn normalized_prefix(&self) -> &str {
        self.prefix.trim_matches('/')
    }
}

/// Document-store backend settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentStoreConfig {
    /// Database name
    pub db: String,
    /// Connection string listing one or more hosts
    #[serde(default)]
    pub hosts: Option<String>,
    /// Replica set name, when the hosts form one
    #[serde(default)]
    pub replica_set: Option<String>,
}

impl DocumentStoreConfig {
    /// Create a config for a database on the default host.
    pub fn new(db: impl Into<String>) -> Self {
        Self {
            db: db.into(),
            hosts: None,
            replica_set: None,
        }
    }
}

/// Backend-specific configuration, tagged by backend type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AssetstoreConfig {
    /// Local filesystem
    Filesystem(FilesystemConfig),
    /// S3-compatible object store
    ObjectStore(ObjectStoreConfig),
    /// Document store
    DocumentStore(DocumentStoreConfig),
}

impl AssetstoreConfig {
    /// Type tag of this configuration.
    pub fn kind(&self) -> AssetstoreType {
        match self {
            AssetstoreConfig::Filesystem(_) => AssetstoreType::Filesystem,
            AssetstoreConfig::ObjectStore(_) => AssetstoreType::ObjectStore,
            AssetstoreConfig::DocumentStore(_) => AssetstoreType::DocumentStore,
        }
    }
}

/// Best-effort capacity of a backend; `None` means unknown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capacity {
    /// Total bytes
    pub total: Option<u64>,
    /// Free bytes
    pub free: Option<u64>,
}

impl Capacity {
    /// Capacity that could not be determined.
    pub fn unknown() -> Self {
        Self::default()
    }

    /// Known capacity.
    pub fn known(total: u64, free: u64) -> Self {
        Self {
            total: Some(total),
            free: Some(free),
        }
    }
}

/// A configured backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assetstore {
    /// Identifier
    pub id: AssetstoreId,
    /// Unique human name
    pub name: String,
    /// Whether this is the default target for new uploads
    #[serde(default)]
    pub current: bool,
    /// Backend-specific configuration
    pub config: AssetstoreConfig,
    /// Computed capacity, filled in when listing
    #[serde(default)]
    pub capacity: Capacity,
    /// Creation time, used to pick a successor when the current one is deleted
    pub created: DateTime<Utc>,
}

impl Assetstore {
    /// Create a non-current Assetstore record.
    pub fn new(name: impl Into<String>, config: AssetstoreConfig) -> Self {
        Self {
            id: AssetstoreId::new(),
            name: name.into(),
            current: false,
            config,
            capacity: Capacity::unknown(),
            created: Utc::now(),
        }
    }

    /// Type tag of the backend.
    pub fn kind(&self) -> AssetstoreType {
        self.config.kind()
    }
}

/// Administrative request to create an Assetstore.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAssetstore {
    /// Unique human name
    pub name: String,
    /// Backend configuration
    pub config: AssetstoreConfig,
    /// Make it current right away
    #[serde(default)]
    pub current: bool,
}

impl NewAssetstore {
    /// Request a non-current Assetstore.
    pub fn new(name: impl Into<String>, config: AssetstoreConfig) -> Self {
        Self {
            name: name.into(),
            config,
            current: false,
        }
    }

    /// Request that the new Assetstore becomes current.
    pub fn current(mut self) -> Self {
        self.current = true;
        self
    }
}

/// Administrative request to change an Assetstore.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssetstoreUpdate {
    /// New name
    #[serde(default)]
    pub name: Option<String>,
    /// New configuration; must keep the same backend type
    #[serde(default)]
    pub config: Option<AssetstoreConfig>,
    /// `Some(true)` makes the Assetstore current
    #[serde(default)]
    pub current: Option<bool>,
}
