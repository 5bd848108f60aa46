//! Chunked, resumable uploads.
//!
//! The engine owns the session state machine: it checks state, offset and
//! size before handing a chunk to the adapter, and advances `received` and
//! the sha-512 accumulator only after the adapter accepted it. Each session
//! sits behind its own mutex; a second writer fails fast instead of waiting.

use crate::AssetstoreRegistry;
use crate::files::release_bytes;
use assetstore_core::{
    AssetstoreId, BackendRef, ChunkPayload, File, FileId, Item, OffsetReply, RequestDescriptor,
    UploadId, UploadParent, UploadSession, UploadState,
};
use assetstore_error::{
    AssetstoreError, AssetstoreErrorKind, AssetstoreResult, NotFoundError, StateError,
    StateErrorKind, StorageError, StorageErrorKind,
};
use assetstore_interface::AssetstoreAdapter;
use bytes::Bytes;
use futures::StreamExt;
use sha2::{Digest, Sha512};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::AsyncRead;
use tokio::sync::{Mutex, RwLock};
use tokio_util::io::ReaderStream;
use tracing::{debug, info, instrument, warn};

/// Request to start an upload of a new file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRequest {
    /// File name
    pub name: String,
    /// Declared size in bytes
    pub size: u64,
    /// Folder or item receiving the file
    pub parent: Option<UploadParent>,
    /// Target Assetstore; the current one when unset
    pub assetstore_id: Option<AssetstoreId>,
    /// MIME type
    pub mime_type: Option<String>,
}

impl UploadRequest {
    /// Upload to the current Assetstore with no parent.
    pub fn new(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            size,
            parent: None,
            assetstore_id: None,
            mime_type: None,
        }
    }

    /// Place the file under a folder or item.
    pub fn parent(mut self, parent: UploadParent) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Store the bytes in a specific Assetstore.
    pub fn assetstore(mut self, id: AssetstoreId) -> Self {
        self.assetstore_id = Some(id);
        self
    }

    /// Attach a MIME type.
    pub fn mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }
}

/// Result of starting an upload.
#[derive(Debug, Clone, PartialEq)]
pub enum UploadStart {
    /// Session waiting for chunks
    Receiving(UploadSession),
    /// Zero-byte upload, finished without touching the backend
    Complete(File),
}

impl UploadStart {
    /// The session, when one is waiting for chunks.
    pub fn session(self) -> Option<UploadSession> {
        match self {
            UploadStart::Receiving(session) => Some(session),
            UploadStart::Complete(_) => None,
        }
    }
}

/// Result of a successful finalize.
#[derive(Debug, Clone, PartialEq)]
pub struct FinalizedUpload {
    /// Created or updated file record
    pub file: File,
    /// Follow-up request the client must send, for direct multipart uploads
    pub finalize_request: Option<RequestDescriptor>,
}

struct Slot {
    session: UploadSession,
    hasher: Sha512,
    hashed: u64,
    closed_at: Option<Instant>,
}

impl Slot {
    fn new(session: UploadSession) -> Self {
        let closed_at = session.state().is_closed().then(Instant::now);
        Self {
            session,
            hasher: Sha512::new(),
            hashed: 0,
            closed_at,
        }
    }

    /// Move to `Complete` or `Cancelled` and start the retention clock.
    fn close(&mut self, state: UploadState) {
        self.session.set_state(state);
        self.closed_at = Some(Instant::now());
    }

    fn expired(&self, retention: Duration) -> bool {
        self.closed_at.is_some_and(|at| at.elapsed() >= retention)
    }

    /// Hex sha-512, when every byte passed through the engine.
    fn checksum(&self) -> Option<String> {
        (self.hashed == *self.session.size()).then(|| hex::encode(self.hasher.clone().finalize()))
    }
}

/// Drives upload sessions through their adapters.
///
/// Completed and cancelled sessions stay queryable for the configured
/// retention, so late writes get a state error, and are dropped by the next
/// sweep after that. Sessions in `Error` are kept until cancelled, since they
/// may still hold backend bytes.
pub struct UploadService {
    registry: Arc<AssetstoreRegistry>,
    sessions: RwLock<HashMap<UploadId, Arc<Mutex<Slot>>>>,
    closed_retention: Duration,
}

impl UploadService {
    /// Engine backed by a registry.
    pub fn new(registry: Arc<AssetstoreRegistry>) -> Self {
        let closed_retention = registry.factory().settings().upload.closed_retention();
        Self {
            registry,
            sessions: RwLock::new(HashMap::new()),
            closed_retention,
        }
    }

    /// Keep closed sessions for `retention` instead of the configured time.
    pub fn with_closed_retention(mut self, retention: Duration) -> Self {
        self.closed_retention = retention;
        self
    }

    /// Number of sessions currently tracked, closed ones included.
    pub async fn tracked_sessions(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Registry the engine resolves Assetstores through.
    pub fn registry(&self) -> &Arc<AssetstoreRegistry> {
        &self.registry
    }

    /// Start an upload of a new file.
    ///
    /// A zero-byte upload creates its file at once, with the checksum of the
    /// empty input and no backend bytes.
    #[instrument(skip_all, fields(name = %request.name, size = request.size))]
    pub async fn initiate(&self, request: UploadRequest) -> AssetstoreResult<UploadStart> {
        let store = self.registry.resolve(request.assetstore_id).await?;
        let mut session = UploadSession::new(request.name, request.size, store.id)
            .with_mime_type(request.mime_type);
        if let Some(parent) = request.parent {
            session = session.with_parent(parent);
        }
        self.start(session).await
    }

    /// Start an upload that replaces the contents of an existing file.
    ///
    /// The new bytes go to `assetstore_id`, or to the current Assetstore.
    #[instrument(skip(self), fields(file = %file_id))]
    pub async fn replace_contents(
        &self,
        file_id: FileId,
        size: u64,
        assetstore_id: Option<AssetstoreId>,
    ) -> AssetstoreResult<UploadStart> {
        let file = self.registry.metadata().load_file(file_id).await?;
        let store = self.registry.resolve(assetstore_id).await?;
        let session = UploadSession::new(file.name, size, store.id)
            .with_file(file.id)
            .with_mime_type(file.mime_type);
        self.start(session).await
    }

    async fn start(&self, mut session: UploadSession) -> AssetstoreResult<UploadStart> {
        if *session.size() == 0 {
            let sha = hex::encode(Sha512::digest(b""));
            let file = self
                .record_file(&session, BackendRef::Empty, Some(sha))
                .await?;
            session.set_state(UploadState::Complete);
            self.insert(session).await;
            info!(file = %file.id, "Created empty file");
            return Ok(UploadStart::Complete(file));
        }

        let store = self.registry.load(*session.assetstore_id()).await?;
        let adapter = self.registry.require_adapter(&store).await?;
        adapter.initiate_upload(&mut session).await?;
        session.set_state(UploadState::Receiving);
        self.insert(session.clone()).await;

        info!(upload = %session.id(), assetstore = %store.name, "Initiated upload");
        Ok(UploadStart::Receiving(session))
    }

    /// Accept one chunk at `offset`.
    ///
    /// Returns a request descriptor when the client sends the bytes to the
    /// backend itself. A backend failure moves the session to `Error`, from
    /// which only cancel is legal.
    #[instrument(skip_all, fields(upload = %upload_id, offset = offset, length = payload.len()))]
    pub async fn write_chunk(
        &self,
        upload_id: UploadId,
        offset: u64,
        payload: ChunkPayload,
    ) -> AssetstoreResult<Option<RequestDescriptor>> {
        let slot = self.slot(upload_id).await?;
        let mut slot = slot
            .try_lock()
            .map_err(|_| StateError::new(StateErrorKind::Busy(upload_id.to_string())))?;
        slot.session.check_write(offset, payload.len())?;

        let adapter = self.adapter(&slot.session).await?;
        let reply = match adapter.write_chunk(&mut slot.session, &payload).await {
            Ok(reply) => reply,
            Err(e) => {
                if is_backend_failure(&e) {
                    warn!(error = %e, "Chunk write failed, upload is unusable");
                    slot.session.set_state(UploadState::Error);
                }
                return Err(e);
            }
        };

        slot.session.record_received(payload.len())?;
        if let ChunkPayload::Bytes(bytes) = &payload {
            slot.hasher.update(bytes);
            slot.hashed += bytes.len() as u64;
        }
        debug!(received = *slot.session.received(), "Accepted chunk");
        Ok(reply)
    }

    /// Where a resumed upload should continue.
    #[instrument(skip_all, fields(upload = %upload_id))]
    pub async fn request_offset(&self, upload_id: UploadId) -> AssetstoreResult<OffsetReply> {
        let slot = self.slot(upload_id).await?;
        let slot = slot
            .try_lock()
            .map_err(|_| StateError::new(StateErrorKind::Busy(upload_id.to_string())))?;
        slot.session
            .require_state(UploadState::Receiving, "request the offset of")?;
        let adapter = self.adapter(&slot.session).await?;
        adapter.request_offset(&slot.session).await
    }

    /// Turn a fully received upload into a file record.
    ///
    /// A failure returns the session to `Receiving` and leaves every record
    /// untouched.
    #[instrument(skip_all, fields(upload = %upload_id))]
    pub async fn finalize(&self, upload_id: UploadId) -> AssetstoreResult<FinalizedUpload> {
        let slot = self.slot(upload_id).await?;
        let mut slot = slot
            .try_lock()
            .map_err(|_| StateError::new(StateErrorKind::Busy(upload_id.to_string())))?;
        slot.session.require_state(UploadState::Receiving, "finalize")?;
        slot.session.set_state(UploadState::Finalizing);

        match self.finish(&mut slot).await {
            Ok(finalized) => {
                slot.close(UploadState::Complete);
                info!(
                    file = %finalized.file.id,
                    size = finalized.file.size,
                    "Finalized upload"
                );
                Ok(finalized)
            }
            Err(e) => {
                warn!(error = %e, "Finalize failed");
                slot.session.set_state(UploadState::Receiving);
                Err(e)
            }
        }
    }

    async fn finish(&self, slot: &mut Slot) -> AssetstoreResult<FinalizedUpload> {
        let adapter = self.adapter(&slot.session).await?;
        let confirmed = adapter.confirm_received(&slot.session).await?;
        slot.session.set_received(confirmed);
        slot.session.require_complete()?;

        let sha = slot.checksum();
        let finalized = adapter
            .finalize_upload(&mut slot.session, sha.as_deref())
            .await?;
        let file = self
            .record_file(&slot.session, finalized.backend, sha)
            .await?;
        Ok(FinalizedUpload {
            file,
            finalize_request: finalized.finalize_request,
        })
    }

    /// Abandon an upload and release its backend resources.
    #[instrument(skip_all, fields(upload = %upload_id))]
    pub async fn cancel(&self, upload_id: UploadId) -> AssetstoreResult<()> {
        let slot = self.slot(upload_id).await?;
        let mut slot = slot
            .try_lock()
            .map_err(|_| StateError::new(StateErrorKind::Busy(upload_id.to_string())))?;
        let state = *slot.session.state();
        if !state.can_cancel() {
            return Err(StateError::new(StateErrorKind::InvalidState {
                operation: "cancel".to_string(),
                state: state.to_string(),
            })
            .into());
        }

        if state != UploadState::Initiated {
            let adapter = self.adapter(&slot.session).await?;
            adapter.cancel_upload(&mut slot.session).await?;
        }
        slot.close(UploadState::Cancelled);
        info!("Cancelled upload");
        Ok(())
    }

    /// Snapshot of a session, including closed ones.
    pub async fn session(&self, upload_id: UploadId) -> AssetstoreResult<UploadSession> {
        let slot = self.slot(upload_id).await?;
        let slot = slot.lock().await;
        Ok(slot.session.clone())
    }

    /// Upload everything `reader` yields, in chunks of the adapter's size.
    ///
    /// The upload is cancelled if reading or writing fails.
    #[instrument(skip_all, fields(name = %request.name, size = request.size))]
    pub async fn upload_from_reader<R>(
        &self,
        request: UploadRequest,
        reader: R,
    ) -> AssetstoreResult<File>
    where
        R: AsyncRead + Unpin + Send,
    {
        let session = match self.initiate(request).await? {
            UploadStart::Complete(file) => return Ok(file),
            UploadStart::Receiving(session) => session,
        };
        let upload_id = *session.id();
        let chunk_size = self.adapter(&session).await?.chunk_size();

        let pumped = async {
            let mut chunks = ReaderStream::with_capacity(reader, chunk_size as usize);
            let mut offset = 0;
            while let Some(chunk) = chunks.next().await {
                let chunk: Bytes = chunk.map_err(|e| {
                    AssetstoreError::from(StorageError::new(StorageErrorKind::FileRead(
                        format!("upload source: {}", e),
                    )))
                })?;
                let length = chunk.len() as u64;
                self.write_chunk(upload_id, offset, ChunkPayload::Bytes(chunk))
                    .await?;
                offset += length;
            }
            self.finalize(upload_id).await
        };

        match pumped.await {
            Ok(finalized) => Ok(finalized.file),
            Err(e) => {
                if let Err(cancel_error) = self.cancel(upload_id).await {
                    warn!(error = %cancel_error, "Unable to cancel failed upload");
                }
                Err(e)
            }
        }
    }

    async fn insert(&self, session: UploadSession) {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        // A locked slot is in use and therefore not expired
        sessions.retain(|_, slot| {
            slot.try_lock()
                .map_or(true, |slot| !slot.expired(self.closed_retention))
        });
        if sessions.len() < before {
            debug!(dropped = before - sessions.len(), "Dropped closed upload sessions");
        }
        sessions.insert(*session.id(), Arc::new(Mutex::new(Slot::new(session))));
    }

    async fn slot(&self, upload_id: UploadId) -> AssetstoreResult<Arc<Mutex<Slot>>> {
        self.sessions
            .read()
            .await
            .get(&upload_id)
            .cloned()
            .ok_or_else(|| NotFoundError::new(format!("Upload not found: {}", upload_id)).into())
    }

    async fn adapter(&self, session: &UploadSession) -> AssetstoreResult<Arc<dyn AssetstoreAdapter>> {
        self.registry.adapter_for(*session.assetstore_id()).await
    }

    /// Create the new file record, or overwrite the one being replaced.
    async fn record_file(
        &self,
        session: &UploadSession,
        backend: BackendRef,
        sha512: Option<String>,
    ) -> AssetstoreResult<File> {
        let metadata = self.registry.metadata();

        if let Some(file_id) = session.file_id() {
            let previous = metadata.load_file(*file_id).await?;
            let mut file = previous.clone();
            file.size = *session.size();
            file.sha512 = sha512;
            file.assetstore_id = *session.assetstore_id();
            file.backend = backend;
            file.imported = false;
            metadata.save_file(&file).await?;

            if let Some(item_id) = file.item_id
                && previous.size != file.size
            {
                let mut item = metadata.load_item(item_id).await?;
                item.size = (item.size + file.size).saturating_sub(previous.size);
                metadata.update_item(&item).await?;
            }
            if let Err(e) = release_bytes(&self.registry, &previous, None).await {
                warn!(file = %file.id, error = %e, "Unable to release replaced bytes");
            }
            return Ok(file);
        }

        let mut file = File::new(
            session.name().clone(),
            *session.size(),
            *session.assetstore_id(),
            backend,
        );
        file.sha512 = sha512;
        file.mime_type = session.mime_type().clone();

        let item = match session.parent() {
            Some(UploadParent::Folder(folder_id)) => {
                let item = Item::new(session.name().clone(), *folder_id);
                metadata.insert_item(&item).await?;
                Some(item)
            }
            Some(UploadParent::Item(item_id)) => Some(metadata.load_item(*item_id).await?),
            None => None,
        };
        if let Some(mut item) = item {
            file.item_id = Some(item.id);
            item.size += file.size;
            metadata.update_item(&item).await?;
        }

        metadata.save_file(&file).await?;
        Ok(file)
    }
}

fn is_backend_failure(error: &AssetstoreError) -> bool {
    matches!(
        error.kind(),
        AssetstoreErrorKind::BackendUnavailable(_) | AssetstoreErrorKind::Storage(_)
    )
}
