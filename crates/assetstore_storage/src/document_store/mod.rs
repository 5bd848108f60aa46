//! Document-store assetstore adapter.
//!
//! A file's bytes are a sequence of chunk documents `{uuid, n, data}` of a
//! fixed size; only the last chunk may be shorter. A chunk write that starts
//! inside a chunk completes that partial chunk before adding new ones.

mod collection;
mod memory;
mod mongo;

pub use collection::{ChunkCollection, ChunkDocument, DocumentStoreConnector};
pub use memory::{InMemoryChunkCollection, InMemoryDocumentStore};
pub use mongo::{MongoChunkCollection, MongoDocumentStoreConnector};

use crate::probe::probe;
use assetstore_core::{
    Assetstore, AssetstoreConfig, BackendRef, ByteRange, Capacity, ChunkPayload, Continuation,
    DocumentStoreConfig, File, OffsetReply, ProbeSettings, RequestDescriptor, UploadSession,
};
use assetstore_error::{
    AssetstoreResult, StateError, StateErrorKind, StorageError, StorageErrorKind, ValidationError,
};
use assetstore_interface::{AssetstoreAdapter, ByteStream, FinalizedBytes};
use async_trait::async_trait;
use bytes::BytesMut;
use futures::StreamExt;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Document-store backend.
pub struct DocumentStoreAdapter {
    assetstore: Assetstore,
    collection: Arc<dyn ChunkCollection>,
    chunk_size: u64,
    probe: ProbeSettings,
}

impl DocumentStoreAdapter {
    /// Create an adapter for a document-store Assetstore.
    pub fn new(
        assetstore: Assetstore,
        collection: Arc<dyn ChunkCollection>,
        chunk_size: u64,
        probe: ProbeSettings,
    ) -> AssetstoreResult<Self> {
        if !matches!(assetstore.config, AssetstoreConfig::DocumentStore(_)) {
            return Err(ValidationError::new(format!(
                "Assetstore {} is not a document store assetstore.",
                assetstore.name
            ))
            .into());
        }
        Ok(Self {
            assetstore,
            collection,
            chunk_size: chunk_size.max(1),
            probe,
        })
    }

    /// Reject an empty database name.
    pub fn validate(config: &DocumentStoreConfig) -> AssetstoreResult<()> {
        if config.db.trim().is_empty() {
            return Err(
                ValidationError::field("db", "Database name must not be empty.").into(),
            );
        }
        Ok(())
    }

    fn chunk_id(session: &UploadSession) -> AssetstoreResult<String> {
        match session.continuation() {
            Continuation::DocumentStore { chunk_id } => Ok(chunk_id.clone()),
            _ => Err(StateError::new(StateErrorKind::ContinuationMismatch(
                "document_store".to_string(),
            ))
            .into()),
        }
    }

    fn sequence_of(file: &File) -> AssetstoreResult<Option<String>> {
        match &file.backend {
            BackendRef::Empty => Ok(None),
            BackendRef::ChunkSequence { chunk_id } => Ok(Some(chunk_id.clone())),
            other => Err(ValidationError::new(format!(
                "File {} has a {} reference, not a chunk sequence.",
                file.name,
                other.tag()
            ))
            .into()),
        }
    }
}

#[async_trait]
impl AssetstoreAdapter for DocumentStoreAdapter {
    fn assetstore(&self) -> &Assetstore {
        &self.assetstore
    }

    fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    async fn ping(&self) -> AssetstoreResult<()> {
        let collection = self.collection.clone();
        probe(&self.assetstore.name, &self.probe, || {
            let collection = collection.clone();
            async move { collection.ping().await }
        })
        .await
    }

    #[instrument(skip(self), fields(assetstore = %self.assetstore.name))]
    async fn capacity_info(&self) -> AssetstoreResult<Capacity> {
        if let Err(e) = self.ping().await {
            warn!(error = %e, "Document store unreachable, capacity unknown");
            return Ok(Capacity::unknown());
        }
        match self.collection.stats().await {
            Ok(stats) => Ok(stats.unwrap_or_default()),
            Err(e) => {
                warn!(error = %e, "Document store stats unavailable");
                Ok(Capacity::unknown())
            }
        }
    }

    #[instrument(skip(self, session), fields(upload_id = %session.id(), size = session.size()))]
    async fn initiate_upload(&self, session: &mut UploadSession) -> AssetstoreResult<()> {
        let chunk_id = uuid::Uuid::new_v4().to_string();
        debug!(chunk_id = %chunk_id, "Allocated chunk sequence");
        session.set_continuation(Continuation::DocumentStore { chunk_id });
        Ok(())
    }

    #[instrument(skip(self, session, payload), fields(upload_id = %session.id(), offset = session.received(), length = payload.len()))]
    async fn write_chunk(
        &self,
        session: &mut UploadSession,
        payload: &ChunkPayload,
    ) -> AssetstoreResult<Option<RequestDescriptor>> {
        let ChunkPayload::Bytes(bytes) = payload else {
            return Err(ValidationError::field(
                "chunk",
                "Part requests are only valid for direct-to-object uploads.",
            )
            .into());
        };
        let chunk_id = Self::chunk_id(session)?;
        let offset = *session.received();
        let mut n = offset / self.chunk_size;
        let position = (offset % self.chunk_size) as usize;
        let mut rest = bytes.clone();

        if position > 0 && !rest.is_empty() {
            let existing = self
                .collection
                .find_chunk(&chunk_id, n)
                .await?
                .ok_or_else(|| {
                    StorageError::new(StorageErrorKind::NotFound(format!(
                        "chunk {} of {}",
                        n, chunk_id
                    )))
                })?;
            let take = rest.len().min(self.chunk_size as usize - position);
            let mut data = BytesMut::with_capacity(position + take);
            data.extend_from_slice(&existing.data[..position.min(existing.data.len())]);
            data.extend_from_slice(&rest.split_to(take));
            self.collection
                .replace_chunk(ChunkDocument {
                    uuid: chunk_id.clone(),
                    n,
                    data: data.freeze(),
                })
                .await?;
            n += 1;
        }

        // Every chunk past the received offset is new
        while !rest.is_empty() {
            let take = rest.len().min(self.chunk_size as usize);
            self.collection
                .insert_chunk(ChunkDocument {
                    uuid: chunk_id.clone(),
                    n,
                    data: rest.split_to(take),
                })
                .await?;
            n += 1;
        }

        debug!(next_chunk = n, "Wrote chunk documents");
        Ok(None)
    }

    async fn request_offset(&self, session: &UploadSession) -> AssetstoreResult<OffsetReply> {
        Ok(OffsetReply::Received(*session.received()))
    }

    #[instrument(skip(self, session, _sha512), fields(upload_id = %session.id()))]
    async fn finalize_upload(
        &self,
        session: &mut UploadSession,
        _sha512: Option<&str>,
    ) -> AssetstoreResult<FinalizedBytes> {
        let chunk_id = Self::chunk_id(session)?;
        info!(chunk_id = %chunk_id, "Finalized document store upload");
        Ok(FinalizedBytes::stored(BackendRef::ChunkSequence { chunk_id }))
    }

    #[instrument(skip(self, session), fields(upload_id = %session.id()))]
    async fn cancel_upload(&self, session: &mut UploadSession) -> AssetstoreResult<()> {
        if let Continuation::DocumentStore { chunk_id } = session.continuation() {
            self.collection.delete_chunks(chunk_id).await?;
        }
        session.set_continuation(Continuation::None);
        Ok(())
    }

    #[instrument(skip(self, file), fields(file_id = %file.id))]
    async fn open_for_read(
        &self,
        file: &File,
        range: Option<ByteRange>,
    ) -> AssetstoreResult<ByteStream> {
        let Some(chunk_id) = Self::sequence_of(file)? else {
            return Ok(futures::stream::empty().boxed());
        };
        let (start, end) = range.unwrap_or(ByteRange::from(0)).clamp(file.size);
        let collection = self.collection.clone();
        let chunk_size = self.chunk_size;

        let stream: ByteStream = async_stream::try_stream! {
            let mut position = start;
            while position < end {
                let n = position / chunk_size;
                let chunk = collection.find_chunk(&chunk_id, n).await?.ok_or_else(|| {
                    StorageError::new(StorageErrorKind::NotFound(format!(
                        "chunk {} of {}",
                        n, chunk_id
                    )))
                })?;
                let chunk_start = n * chunk_size;
                let from = (position - chunk_start) as usize;
                let to = ((end - chunk_start) as usize).min(chunk.data.len());
                if from >= to {
                    Err::<(), _>(StorageError::new(StorageErrorKind::FileRead(format!(
                        "chunk {} of {} is shorter than expected",
                        n, chunk_id
                    ))))?;
                }
                position = chunk_start + to as u64;
                yield chunk.data.slice(from..to);
            }
        }
        .boxed();
        Ok(stream)
    }

    #[instrument(skip(self, file), fields(file_id = %file.id))]
    async fn delete_bytes(&self, file: &File) -> AssetstoreResult<()> {
        if let Some(chunk_id) = Self::sequence_of(file)? {
            let removed = self.collection.delete_chunks(&chunk_id).await?;
            info!(chunk_id = %chunk_id, removed, "Deleted chunk sequence");
        }
        Ok(())
    }

    async fn bytes_exist(&self, file: &File) -> AssetstoreResult<bool> {
        match Self::sequence_of(file)? {
            None => Ok(true),
            Some(chunk_id) => Ok(self.collection.count_chunks(&chunk_id).await? > 0),
        }
    }
}
