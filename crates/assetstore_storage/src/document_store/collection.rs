//! Chunk collection seam for the document store.

use assetstore_core::{Capacity, DocumentStoreConfig};
use assetstore_error::AssetstoreResult;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;

/// One fixed-size slice of a file's bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkDocument {
    /// Chunk sequence the document belongs to
    pub uuid: String,
    /// 0-based position in the sequence
    pub n: u64,
    /// Payload, at most the adapter's chunk size
    pub data: Bytes,
}

/// Collection of chunk documents in one database.
#[async_trait]
pub trait ChunkCollection: Send + Sync {
    /// Check that the database answers.
    async fn ping(&self) -> AssetstoreResult<()>;

    /// Insert a new chunk.
    async fn insert_chunk(&self, chunk: ChunkDocument) -> AssetstoreResult<()>;

    /// Overwrite chunk `(uuid, n)`, inserting it if missing.
    async fn replace_chunk(&self, chunk: ChunkDocument) -> AssetstoreResult<()>;

    /// Load chunk `(uuid, n)`.
    async fn find_chunk(&self, uuid: &str, n: u64) -> AssetstoreResult<Option<ChunkDocument>>;

    /// Number of chunks in a sequence.
    async fn count_chunks(&self, uuid: &str) -> AssetstoreResult<u64>;

    /// Remove every chunk of a sequence, returning how many were removed.
    async fn delete_chunks(&self, uuid: &str) -> AssetstoreResult<u64>;

    /// Storage figures, when the database can report them.
    async fn stats(&self) -> AssetstoreResult<Option<Capacity>>;
}

/// Opens chunk collections for a database configuration.
#[async_trait]
pub trait DocumentStoreConnector: Send + Sync {
    /// Collection bound to the configured database.
    async fn connect(&self, config: &DocumentStoreConfig)
    -> AssetstoreResult<Arc<dyn ChunkCollection>>;
}
