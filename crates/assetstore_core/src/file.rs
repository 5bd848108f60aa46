//! Logical file records and the reference to their physical bytes.

use crate::{AssetstoreId, FileId, ItemId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Where a file's bytes live inside its Assetstore.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendRef {
    /// Zero-byte file with no backing bytes
    Empty,
    /// Local path, relative to the root for uploaded files and absolute for imported ones
    Path {
        /// Path to the bytes
        path: PathBuf,
    },
    /// Object key within the configured bucket
    ObjectKey {
        /// Full key
        key: String,
        /// Computed `/<bucket>/<key>` path
        relpath: Option<String>,
    },
    /// Document-store chunk sequence
    ChunkSequence {
        /// Identifier shared by every chunk document
        chunk_id: String,
    },
}

impl BackendRef {
    /// Whether the reference names no bytes at all.
    pub fn is_empty(&self) -> bool {
        matches!(self, BackendRef::Empty)
    }

    /// Short tag used when filtering by reference kind.
    pub fn tag(&self) -> &'static str {
        match self {
            BackendRef::Empty => "empty",
            BackendRef::Path { .. } => "path",
            BackendRef::ObjectKey { .. } => "object_key",
            BackendRef::ChunkSequence { .. } => "chunk_sequence",
        }
    }
}

/// Logical byte-sequence record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct File {
    /// Identifier
    pub id: FileId,
    /// Display name
    pub name: String,
    /// Declared size in bytes
    pub size: u64,
    /// Hex sha-512 of the contents, when known
    #[serde(default)]
    pub sha512: Option<String>,
    /// Owning Assetstore
    pub assetstore_id: AssetstoreId,
    /// Location of the bytes
    pub backend: BackendRef,
    /// Bytes were bound in place by an import and are never deleted
    #[serde(default)]
    pub imported: bool,
    /// MIME type
    #[serde(default)]
    pub mime_type: Option<String>,
    /// Owning item
    #[serde(default)]
    pub item_id: Option<ItemId>,
    /// Creation time
    pub created: DateTime<Utc>,
}

impl File {
    /// Create a non-imported record with no checksum.
    pub fn new(
        name: impl Into<String>,
        size: u64,
        assetstore_id: AssetstoreId,
        backend: BackendRef,
    ) -> Self {
        Self {
            id: FileId::new(),
            name: name.into(),
            size,
            sha512: None,
            assetstore_id,
            backend,
            imported: false,
            mime_type: None,
            item_id: None,
            created: Utc::now(),
        }
    }
}

/// Criteria for listing or counting file records.
///
/// # Examples
///
/// ```
/// use assetstore_core::{AssetstoreId, BackendRef, File, FileFilter};
///
/// let store = AssetstoreId::new();
/// let file = File::new("a.txt", 0, store, BackendRef::Empty);
/// assert!(FileFilter::default().assetstore(store).matches(&file));
/// assert!(!FileFilter::default().imported(true).matches(&file));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileFilter {
    /// Owning Assetstore
    pub assetstore_id: Option<AssetstoreId>,
    /// Imported flag
    pub imported: Option<bool>,
    /// Exact backend reference
    pub backend: Option<BackendRef>,
    /// Owning item
    pub item_id: Option<ItemId>,
}

impl FileFilter {
    /// Restrict to one Assetstore.
    pub fn assetstore(mut self, id: AssetstoreId) -> Self {
        self.assetstore_id = Some(id);
        self
    }

    /// Restrict by imported flag.
    pub fn imported(mut self, imported: bool) -> Self {
        self.imported = Some(imported);
        self
    }

    /// Restrict to files sharing a backend reference.
    pub fn backend(mut self, backend: BackendRef) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Restrict to one item.
    pub fn item(mut self, id: ItemId) -> Self {
        self.item_id = Some(id);
        self
    }

    /// Whether a record satisfies every set criterion.
    pub fn matches(&self, file: &File) -> bool {
        self.assetstore_id.is_none_or(|id| file.assetstore_id == id)
            && self.imported.is_none_or(|imported| file.imported == imported)
            && self.backend.as_ref().is_none_or(|b| &file.backend == b)
            && self.item_id.is_none_or(|id| file.item_id == Some(id))
    }
}
