//! Backend adapter contract.
//!
//! Every backend (filesystem, object store, document store) implements
//! [`AssetstoreAdapter`]. The upload engine, file service, mover, importer and
//! scanner only ever talk to this trait, so none of them branch on the
//! backend type.

use assetstore_core::{
    Assetstore, AssetstoreType, BackendRef, ByteRange, Capacity, ChunkPayload,
    ContentDisposition, File, OffsetReply, RequestDescriptor, UploadSession,
};
use assetstore_error::{AssetstoreResult, ValidationError};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

/// Stream of file contents.
pub type ByteStream = BoxStream<'static, AssetstoreResult<Bytes>>;

/// Result of finalizing the bytes of an upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalizedBytes {
    /// Where the bytes now live
    pub backend: BackendRef,
    /// Follow-up request the client must send, for direct multipart uploads
    pub finalize_request: Option<RequestDescriptor>,
}

impl FinalizedBytes {
    /// Finalized bytes with no follow-up request.
    pub fn stored(backend: BackendRef) -> Self {
        Self {
            backend,
            finalize_request: None,
        }
    }
}

/// What a namespace node is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NamespaceKind {
    /// Directory or common key prefix
    Directory,
    /// Regular file or object
    File {
        /// Size in bytes
        size: u64,
        /// Reference binding a File record to the node in place
        backend: BackendRef,
    },
}

/// One node of an external namespace walked by an import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceEntry {
    /// Last path component
    pub name: String,
    /// Full path or key, usable with `list_namespace`
    pub path: String,
    /// Node type
    pub kind: NamespaceKind,
}

impl NamespaceEntry {
    /// Whether the node can contain other nodes.
    pub fn is_directory(&self) -> bool {
        matches!(self.kind, NamespaceKind::Directory)
    }
}

/// Backend-specific byte I/O.
///
/// Upload methods receive the session by mutable reference so that the
/// adapter can store its continuation on it. The caller owns the state
/// machine: it checks state, offset and size before calling `write_chunk`,
/// and advances `received` and the state itself after each call succeeds.
#[async_trait]
pub trait AssetstoreAdapter: Send + Sync {
    /// Assetstore this adapter serves.
    fn assetstore(&self) -> &Assetstore;

    /// Backend type.
    fn kind(&self) -> AssetstoreType {
        self.assetstore().kind()
    }

    /// Preferred chunk size when relaying bytes.
    fn chunk_size(&self) -> u64;

    /// Noun used in messages about imported entries ("Files" or "Keys").
    fn import_noun(&self) -> &'static str {
        "Files"
    }

    /// Check that the backend is reachable.
    async fn ping(&self) -> AssetstoreResult<()>;

    /// Best-effort capacity.
    async fn capacity_info(&self) -> AssetstoreResult<Capacity>;

    /// Allocate backend resources for a new upload.
    async fn initiate_upload(&self, session: &mut UploadSession) -> AssetstoreResult<()>;

    /// Accept one chunk at the session's current offset.
    ///
    /// Returns a request descriptor when the client must send the bytes
    /// itself.
    async fn write_chunk(
        &self,
        session: &mut UploadSession,
        payload: &ChunkPayload,
    ) -> AssetstoreResult<Option<RequestDescriptor>>;

    /// Where a resumed upload should continue.
    async fn request_offset(&self, session: &UploadSession) -> AssetstoreResult<OffsetReply>;

    /// Bytes the backend actually holds, checked before finalizing.
    async fn confirm_received(&self, session: &UploadSession) -> AssetstoreResult<u64> {
        Ok(*session.received())
    }

    /// Close backend resources and report where the bytes live.
    async fn finalize_upload(
        &self,
        session: &mut UploadSession,
        sha512: Option<&str>,
    ) -> AssetstoreResult<FinalizedBytes>;

    /// Release backend resources of an unfinished upload.
    async fn cancel_upload(&self, session: &mut UploadSession) -> AssetstoreResult<()>;

    /// Stream a file's bytes, optionally restricted to a range.
    async fn open_for_read(
        &self,
        file: &File,
        range: Option<ByteRange>,
    ) -> AssetstoreResult<ByteStream>;

    /// Redirect target for downloads, when the backend serves bytes itself.
    async fn download_url(
        &self,
        _file: &File,
        _disposition: ContentDisposition,
    ) -> AssetstoreResult<Option<String>> {
        Ok(None)
    }

    /// Remove a file's bytes.
    async fn delete_bytes(&self, file: &File) -> AssetstoreResult<()>;

    /// Whether a file's bytes still resolve.
    async fn bytes_exist(&self, file: &File) -> AssetstoreResult<bool>;

    /// Describe one node of the backend's own namespace.
    async fn stat_namespace(&self, _path: &str) -> AssetstoreResult<NamespaceEntry> {
        Err(ValidationError::new(format!(
            "The {} assetstore type does not support importing.",
            self.kind()
        ))
        .into())
    }

    /// List the children of a directory node.
    async fn list_namespace(&self, _path: &str) -> AssetstoreResult<Vec<NamespaceEntry>> {
        Err(ValidationError::new(format!(
            "The {} assetstore type does not support importing.",
            self.kind()
        ))
        .into())
    }
}
