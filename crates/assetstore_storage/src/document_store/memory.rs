//! In-memory document store keyed by database name.

use super::collection::{ChunkCollection, ChunkDocument, DocumentStoreConnector};
use assetstore_core::{Capacity, DocumentStoreConfig};
use assetstore_error::{AssetstoreResult, BackendUnavailableError, ConflictError};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

type Chunks = BTreeMap<(String, u64), Bytes>;

/// In-memory document store.
///
/// Every database is a map of `(uuid, n)` to chunk data. A store can be
/// marked unavailable to exercise degraded paths.
#[derive(Debug, Clone)]
pub struct InMemoryDocumentStore {
    databases: Arc<RwLock<HashMap<String, Chunks>>>,
    available: Arc<AtomicBool>,
    capacity: Arc<RwLock<Option<Capacity>>>,
    write_latency_ms: Arc<AtomicU64>,
}

impl Default for InMemoryDocumentStore {
    fn default() -> Self {
        Self {
            databases: Arc::default(),
            available: Arc::new(AtomicBool::new(true)),
            capacity: Arc::default(),
            write_latency_ms: Arc::default(),
        }
    }
}

impl InMemoryDocumentStore {
    /// Create a store with no databases.
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the database going down or coming back.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Delay every chunk write by `latency`.
    pub fn set_write_latency(&self, latency: Duration) {
        self.write_latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    /// Figures reported by `stats`.
    pub async fn set_capacity(&self, capacity: Option<Capacity>) {
        *self.capacity.write().await = capacity;
    }

    /// Total chunk documents in a database.
    pub async fn chunk_count(&self, db: &str) -> usize {
        self.databases
            .read()
            .await
            .get(db)
            .map(|chunks| chunks.len())
            .unwrap_or(0)
    }

    /// Collection bound to one database.
    pub fn collection(&self, db: &str) -> InMemoryChunkCollection {
        InMemoryChunkCollection {
            store: self.clone(),
            db: db.to_string(),
        }
    }
}

#[async_trait]
impl DocumentStoreConnector for InMemoryDocumentStore {
    async fn connect(
        &self,
        config: &DocumentStoreConfig,
    ) -> AssetstoreResult<Arc<dyn ChunkCollection>> {
        Ok(Arc::new(self.collection(&config.db)))
    }
}

/// [`ChunkCollection`] over one database of an [`InMemoryDocumentStore`].
#[derive(Debug, Clone)]
pub struct InMemoryChunkCollection {
    store: InMemoryDocumentStore,
    db: String,
}

impl InMemoryChunkCollection {
    fn check_available(&self) -> AssetstoreResult<()> {
        if self.store.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(BackendUnavailableError::new(
                "document store",
                format!("database \"{}\" is unreachable", self.db),
            )
            .into())
        }
    }

    async fn write_delay(&self) {
        let ms = self.store.write_latency_ms.load(Ordering::SeqCst);
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }
}

#[async_trait]
impl ChunkCollection for InMemoryChunkCollection {
    async fn ping(&self) -> AssetstoreResult<()> {
        self.check_available()
    }

    async fn insert_chunk(&self, chunk: ChunkDocument) -> AssetstoreResult<()> {
        self.check_available()?;
        self.write_delay().await;
        let mut databases = self.store.databases.write().await;
        let chunks = databases.entry(self.db.clone()).or_default();
        let key = (chunk.uuid, chunk.n);
        if chunks.contains_key(&key) {
            return Err(ConflictError::new(format!(
                "Chunk {} of {} already exists",
                key.1, key.0
            ))
            .into());
        }
        chunks.insert(key, chunk.data);
        Ok(())
    }

    async fn replace_chunk(&self, chunk: ChunkDocument) -> AssetstoreResult<()> {
        self.check_available()?;
        self.write_delay().await;
        self.store
            .databases
            .write()
            .await
            .entry(self.db.clone())
            .or_default()
            .insert((chunk.uuid, chunk.n), chunk.data);
        Ok(())
    }

    async fn find_chunk(&self, uuid: &str, n: u64) -> AssetstoreResult<Option<ChunkDocument>> {
        self.check_available()?;
        Ok(self
            .store
            .databases
            .read()
            .await
            .get(&self.db)
            .and_then(|chunks| chunks.get(&(uuid.to_string(), n)))
            .map(|data| ChunkDocument {
                uuid: uuid.to_string(),
                n,
                data: data.clone(),
            }))
    }

    async fn count_chunks(&self, uuid: &str) -> AssetstoreResult<u64> {
        self.check_available()?;
        Ok(self
            .store
            .databases
            .read()
            .await
            .get(&self.db)
            .map(|chunks| chunks.keys().filter(|(id, _)| id == uuid).count() as u64)
            .unwrap_or(0))
    }

    async fn delete_chunks(&self, uuid: &str) -> AssetstoreResult<u64> {
        self.check_available()?;
        let mut databases = self.store.databases.write().await;
        let Some(chunks) = databases.get_mut(&self.db) else {
            return Ok(0);
        };
        let before = chunks.len();
        chunks.retain(|(id, _), _| id != uuid);
        let removed = (before - chunks.len()) as u64;
        debug!(db = %self.db, uuid, removed, "Deleted chunk sequence");
        Ok(removed)
    }

    async fn stats(&self) -> AssetstoreResult<Option<Capacity>> {
        self.check_available()?;
        Ok(*self.store.capacity.read().await)
    }
}
