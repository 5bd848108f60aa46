//! In-flight upload sessions.

use crate::{AssetstoreId, DirectUpload, FileId, RequestDescriptor, UploadId, UploadParent};
use assetstore_error::{AssetstoreResult, StateError, StateErrorKind, ValidationError};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use derive_getters::Getters;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Upload state machine.
///
/// `Initiated → Receiving → Finalizing → Complete`, with `Cancelled` and
/// `Error` reachable from `Initiated` and `Receiving`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display,
)]
#[serde(rename_all = "snake_case")]
pub enum UploadState {
    /// Created, backend resources not yet allocated
    #[display("initiated")]
    Initiated,
    /// Accepting chunks
    #[display("receiving")]
    Receiving,
    /// Finalize in progress
    #[display("finalizing")]
    Finalizing,
    /// Converted into a file record
    #[display("complete")]
    Complete,
    /// Released without creating a file record
    #[display("cancelled")]
    Cancelled,
    /// A backend failure left the session unusable except for cancel
    #[display("error")]
    Error,
}

impl UploadState {
    /// Whether the session is closed for good.
    pub fn is_closed(&self) -> bool {
        matches!(self, UploadState::Complete | UploadState::Cancelled)
    }

    /// Whether cancel is legal from this state.
    pub fn can_cancel(&self) -> bool {
        matches!(
            self,
            UploadState::Initiated | UploadState::Receiving | UploadState::Error
        )
    }
}

/// One completed part of an object-store multipart upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartRecord {
    /// 1-based part number
    pub part_number: u32,
    /// Bytes in the part
    pub size: u64,
    /// ETag returned by the store
    pub etag: String,
}

/// Object-store continuation state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectStoreContinuation {
    /// Object key
    pub key: String,
    /// Multipart sequence rather than a single PUT
    pub chunked: bool,
    /// Bytes are relayed through the engine instead of sent by the client
    #[serde(default)]
    pub relay: bool,
    /// Multipart upload id, once initiated
    #[serde(default)]
    pub multipart_id: Option<String>,
    /// Parts uploaded so far in relay mode
    #[serde(default)]
    pub parts: Vec<PartRecord>,
    /// Relayed bytes not yet sent as a part
    #[serde(skip)]
    pub buffer: Vec<u8>,
}

/// Backend-specific state carried between chunk writes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Continuation {
    /// Nothing allocated yet
    #[default]
    None,
    /// Temporary file receiving the bytes
    Filesystem {
        /// Absolute path of the temp file
        temp_path: PathBuf,
    },
    /// Object key and multipart progress
    ObjectStore(ObjectStoreContinuation),
    /// Chunk sequence being written
    DocumentStore {
        /// Identifier shared by the chunk documents
        chunk_id: String,
    },
}

/// Transient record of an in-flight upload.
///
/// # Examples
///
/// ```
/// use assetstore_core::{AssetstoreId, UploadSession, UploadState};
///
/// let mut session = UploadSession::new("hello.txt", 10, AssetstoreId::new());
/// session.set_state(UploadState::Receiving);
/// session.check_write(0, 5).unwrap();
/// session.record_received(5).unwrap();
/// assert!(session.check_write(0, 5).is_err());
/// assert_eq!(*session.received(), 5);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Getters)]
#[serde(rename_all = "camelCase")]
pub struct UploadSession {
    /// Identifier
    id: UploadId,
    /// File name
    name: String,
    /// Declared size
    size: u64,
    /// Bytes accepted so far
    received: u64,
    /// Target Assetstore
    assetstore_id: AssetstoreId,
    /// Folder or item receiving a new file
    parent: Option<UploadParent>,
    /// Existing file whose contents are replaced
    file_id: Option<FileId>,
    /// MIME type
    mime_type: Option<String>,
    /// State
    state: UploadState,
    /// Direct-to-object-store instructions
    direct: Option<DirectUpload>,
    /// Backend continuation
    continuation: Continuation,
    /// Creation time
    created: DateTime<Utc>,
}

impl UploadSession {
    /// Create a session in `Initiated` state.
    pub fn new(name: impl Into<String>, size: u64, assetstore_id: AssetstoreId) -> Self {
        Self {
            id: UploadId::new(),
            name: name.into(),
            size,
            received: 0,
            assetstore_id,
            parent: None,
            file_id: None,
            mime_type: None,
            state: UploadState::Initiated,
            direct: None,
            continuation: Continuation::None,
            created: Utc::now(),
        }
    }

    /// Attach the hierarchy parent.
    pub fn with_parent(mut self, parent: UploadParent) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Target an existing file whose contents are replaced.
    pub fn with_file(mut self, file_id: FileId) -> Self {
        self.file_id = Some(file_id);
        self
    }

    /// Attach a MIME type.
    pub fn with_mime_type(mut self, mime_type: Option<String>) -> Self {
        self.mime_type = mime_type;
        self
    }

    /// Bytes still expected.
    pub fn remaining(&self) -> u64 {
        self.size - self.received
    }

    /// Move to another state.
    pub fn set_state(&mut self, state: UploadState) {
        self.state = state;
    }

    /// Record direct-upload instructions.
    pub fn set_direct(&mut self, direct: Option<DirectUpload>) {
        self.direct = direct;
    }

    /// Replace the backend continuation.
    pub fn set_continuation(&mut self, continuation: Continuation) {
        self.continuation = continuation;
    }

    /// Mutable access to the backend continuation.
    pub fn continuation_mut(&mut self) -> &mut Continuation {
        &mut self.continuation
    }

    /// Fail unless the session is in `state`.
    #[track_caller]
    pub fn require_state(&self, state: UploadState, operation: &str) -> AssetstoreResult<()> {
        if self.state != state {
            return Err(StateError::new(StateErrorKind::InvalidState {
                operation: operation.to_string(),
                state: self.state.to_string(),
            })
            .into());
        }
        Ok(())
    }

    /// Validate a chunk write at `offset` of `length` bytes.
    #[track_caller]
    pub fn check_write(&self, offset: u64, length: u64) -> AssetstoreResult<()> {
        self.require_state(UploadState::Receiving, "write a chunk to")?;
        if offset != self.received {
            return Err(StateError::new(StateErrorKind::WrongOffset {
                offset,
                received: self.received,
            })
            .into());
        }
        if length > self.remaining() {
            return Err(StateError::new(StateErrorKind::ChunkExceedsSize {
                length,
                remaining: self.remaining(),
            })
            .into());
        }
        Ok(())
    }

    /// Advance `received` by an accepted chunk.
    #[track_caller]
    pub fn record_received(&mut self, length: u64) -> AssetstoreResult<()> {
        if length > self.remaining() {
            return Err(StateError::new(StateErrorKind::ChunkExceedsSize {
                length,
                remaining: self.remaining(),
            })
            .into());
        }
        self.received += length;
        Ok(())
    }

    /// Overwrite `received`, used when a backend confirms the stored size.
    pub fn set_received(&mut self, received: u64) {
        self.received = received.min(self.size);
    }

    /// Fail unless every declared byte has arrived.
    #[track_caller]
    pub fn require_complete(&self) -> AssetstoreResult<()> {
        if self.received != self.size {
            return Err(StateError::new(StateErrorKind::Incomplete {
                received: self.received,
                size: self.size,
            })
            .into());
        }
        Ok(())
    }
}

/// Part request sent by a client uploading straight to an object store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartRequest {
    /// 1-based part number
    pub part_number: u32,
    /// Multipart upload id the client received
    #[serde(rename = "s3UploadId")]
    pub upload_id: String,
    /// Bytes the client will send in this part, when it says so
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

/// Payload of one chunk write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkPayload {
    /// Raw bytes relayed through the engine
    Bytes(Bytes),
    /// Request for a pre-signed part upload
    Part(PartRequest),
}

impl ChunkPayload {
    /// Bytes this chunk accounts for.
    pub fn len(&self) -> u64 {
        match self {
            ChunkPayload::Bytes(bytes) => bytes.len() as u64,
            ChunkPayload::Part(part) => part.size.unwrap_or(0),
        }
    }

    /// Whether the chunk carries no bytes.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Parse a part request sent as JSON.
    ///
    /// # Examples
    ///
    /// ```
    /// use assetstore_core::ChunkPayload;
    ///
    /// let payload =
    ///     ChunkPayload::part_from_json(r#"{"partNumber": 1, "s3UploadId": "abc", "size": 5}"#)
    ///         .unwrap();
    /// assert_eq!(payload.len(), 5);
    ///
    /// let unsized_part =
    ///     ChunkPayload::part_from_json(r#"{"partNumber": 2, "s3UploadId": "abc"}"#).unwrap();
    /// assert_eq!(unsized_part.len(), 0);
    /// assert!(ChunkPayload::part_from_json("not json").is_err());
    /// ```
    pub fn part_from_json(raw: &str) -> AssetstoreResult<Self> {
        let part: PartRequest = serde_json::from_str(raw).map_err(|e| {
            ValidationError::field("chunk", format!("Invalid part request: {}", e))
        })?;
        Ok(ChunkPayload::Part(part))
    }
}

impl From<Bytes> for ChunkPayload {
    fn from(bytes: Bytes) -> Self {
        ChunkPayload::Bytes(bytes)
    }
}

impl From<Vec<u8>> for ChunkPayload {
    fn from(bytes: Vec<u8>) -> Self {
        ChunkPayload::Bytes(Bytes::from(bytes))
    }
}

/// Answer to an offset query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum OffsetReply {
    /// Bytes the backend holds; resume from here
    Received(u64),
    /// Re-issue this request to resume
    Request(RequestDescriptor),
}
