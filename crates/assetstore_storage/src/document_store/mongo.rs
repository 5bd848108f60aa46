//! MongoDB chunk collections.
//!
//! Chunks live in the `chunk` collection of the configured database as
//! `{uuid, n, data}` documents, with a unique index on `(uuid, n)`.

use super::collection::{ChunkCollection, ChunkDocument, DocumentStoreConnector};
use assetstore_core::{Capacity, DocumentStoreConfig};
use assetstore_error::{
    AssetstoreError, AssetstoreResult, BackendUnavailableError, StorageError, StorageErrorKind,
};
use async_trait::async_trait;
use bytes::Bytes;
use mongodb::bson::{Binary, Bson, Document, doc, spec::BinarySubtype};
use mongodb::error::ErrorKind;
use mongodb::options::{ClientOptions, IndexOptions};
use mongodb::{Client, Collection, Database, IndexModel};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

const BACKEND: &str = "document store";
const CHUNKS: &str = "chunk";
const DEFAULT_HOSTS: &str = "mongodb://localhost:27017";

#[derive(Debug, Serialize, Deserialize)]
struct StoredChunk {
    uuid: String,
    n: i64,
    data: Binary,
}

impl From<ChunkDocument> for StoredChunk {
    fn from(chunk: ChunkDocument) -> Self {
        Self {
            uuid: chunk.uuid,
            n: chunk.n as i64,
            data: Binary {
                subtype: BinarySubtype::Generic,
                bytes: chunk.data.to_vec(),
            },
        }
    }
}

impl From<StoredChunk> for ChunkDocument {
    fn from(stored: StoredChunk) -> Self {
        Self {
            uuid: stored.uuid,
            n: stored.n.max(0) as u64,
            data: Bytes::from(stored.data.bytes),
        }
    }
}

/// Connector opening MongoDB databases.
///
/// `hosts` may be a full `mongodb://` connection string or a bare
/// comma-separated host list; `replica_set` overrides any set name in it.
#[derive(Debug, Clone)]
pub struct MongoDocumentStoreConnector {
    server_selection_timeout: Duration,
}

impl MongoDocumentStoreConnector {
    /// Connector giving up on server selection after `timeout`.
    pub fn new(timeout: Duration) -> Self {
        Self {
            server_selection_timeout: timeout,
        }
    }
}

#[async_trait]
impl DocumentStoreConnector for MongoDocumentStoreConnector {
    #[instrument(skip(self, config), fields(db = %config.db))]
    async fn connect(
        &self,
        config: &DocumentStoreConfig,
    ) -> AssetstoreResult<Arc<dyn ChunkCollection>> {
        let uri = connection_uri(config.hosts.as_deref());
        let mut options = ClientOptions::parse(&uri).await.map_err(|e| {
            AssetstoreError::from(BackendUnavailableError::new(
                BACKEND,
                format!("Invalid hosts {}: {}", uri, e),
            ))
        })?;
        if let Some(replica_set) = config.replica_set.as_ref().filter(|r| !r.is_empty()) {
            options.repl_set_name = Some(replica_set.clone());
        }
        options.server_selection_timeout = Some(self.server_selection_timeout);
        options.app_name = Some("assetstore".to_string());

        let client = Client::with_options(options).map_err(mongo_error)?;
        let database = client.database(&config.db);
        debug!(hosts = %uri, "Opened document store client");
        Ok(Arc::new(MongoChunkCollection {
            chunks: database.collection(CHUNKS),
            database,
        }))
    }
}

/// [`ChunkCollection`] backed by a MongoDB collection.
#[derive(Debug, Clone)]
pub struct MongoChunkCollection {
    database: Database,
    chunks: Collection<StoredChunk>,
}

impl MongoChunkCollection {
    async fn ensure_index(&self) -> AssetstoreResult<()> {
        let index = IndexModel::builder()
            .keys(doc! { "uuid": 1, "n": 1 })
            .options(IndexOptions::builder().unique(true).build())
            .build();
        self.chunks.create_index(index).await.map_err(mongo_error)?;
        Ok(())
    }
}

#[async_trait]
impl ChunkCollection for MongoChunkCollection {
    async fn ping(&self) -> AssetstoreResult<()> {
        self.database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(mongo_error)?;
        self.ensure_index().await
    }

    async fn insert_chunk(&self, chunk: ChunkDocument) -> AssetstoreResult<()> {
        self.chunks
            .insert_one(StoredChunk::from(chunk))
            .await
            .map_err(mongo_error)?;
        Ok(())
    }

    async fn replace_chunk(&self, chunk: ChunkDocument) -> AssetstoreResult<()> {
        let filter = doc! { "uuid": chunk.uuid.as_str(), "n": (chunk.n as i64) };
        self.chunks
            .replace_one(filter, StoredChunk::from(chunk))
            .upsert(true)
            .await
            .map_err(mongo_error)?;
        Ok(())
    }

    async fn find_chunk(&self, uuid: &str, n: u64) -> AssetstoreResult<Option<ChunkDocument>> {
        let found = self
            .chunks
            .find_one(doc! { "uuid": uuid, "n": (n as i64) })
            .await
            .map_err(mongo_error)?;
        Ok(found.map(ChunkDocument::from))
    }

    async fn count_chunks(&self, uuid: &str) -> AssetstoreResult<u64> {
        self.chunks
            .count_documents(doc! { "uuid": uuid })
            .await
            .map_err(mongo_error)
    }

    async fn delete_chunks(&self, uuid: &str) -> AssetstoreResult<u64> {
        let result = self
            .chunks
            .delete_many(doc! { "uuid": uuid })
            .await
            .map_err(mongo_error)?;
        Ok(result.deleted_count)
    }

    async fn stats(&self) -> AssetstoreResult<Option<Capacity>> {
        let stats = self
            .database
            .run_command(doc! { "dbStats": 1 })
            .await
            .map_err(mongo_error)?;
        Ok(capacity_from_stats(&stats))
    }
}

/// Connection string for a `hosts` setting.
fn connection_uri(hosts: Option<&str>) -> String {
    match hosts.map(str::trim).filter(|h| !h.is_empty()) {
        None => DEFAULT_HOSTS.to_string(),
        Some(hosts) if hosts.starts_with("mongodb://") || hosts.starts_with("mongodb+srv://") => {
            hosts.to_string()
        }
        Some(hosts) => format!("mongodb://{}", hosts),
    }
}

/// Filesystem figures from a `dbStats` reply (MongoDB 4.4 and later).
fn capacity_from_stats(stats: &Document) -> Option<Capacity> {
    let number = |key: &str| match stats.get(key)? {
        Bson::Double(v) if *v >= 0.0 => Some(*v as u64),
        Bson::Int64(v) => u64::try_from(*v).ok(),
        Bson::Int32(v) => u64::try_from(*v).ok(),
        _ => None,
    };
    let total = number("fsTotalSize")?;
    let used = number("fsUsedSize")?;
    Some(Capacity::known(total, total.saturating_sub(used)))
}

fn mongo_error(e: mongodb::error::Error) -> AssetstoreError {
    match e.kind.as_ref() {
        ErrorKind::ServerSelection { .. } | ErrorKind::Io(_) => {
            BackendUnavailableError::new(BACKEND, e.to_string()).into()
        }
        _ => StorageError::new(StorageErrorKind::UnexpectedResponse(e.to_string())).into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_uri_accepts_bare_host_lists() {
        assert_eq!(connection_uri(None), "mongodb://localhost:27017");
        assert_eq!(connection_uri(Some("  ")), "mongodb://localhost:27017");
        assert_eq!(
            connection_uri(Some("db1:27017,db2:27017")),
            "mongodb://db1:27017,db2:27017"
        );
        assert_eq!(
            connection_uri(Some("mongodb+srv://cluster.example.com")),
            "mongodb+srv://cluster.example.com"
        );
    }

    #[test]
    fn test_capacity_from_db_stats() {
        let stats = doc! { "db": "assetstore", "fsTotalSize": 1000.0, "fsUsedSize": 250_i64 };
        assert_eq!(capacity_from_stats(&stats), Some(Capacity::known(1000, 750)));

        let old_server = doc! { "db": "assetstore", "dataSize": 12 };
        assert_eq!(capacity_from_stats(&old_server), None);
    }

    #[test]
    fn test_chunk_documents_keep_their_bytes() {
        let stored = StoredChunk::from(ChunkDocument {
            uuid: "abc".to_string(),
            n: 3,
            data: Bytes::from_static(b"\x00\x01tail"),
        });
        assert_eq!(stored.n, 3);
        assert_eq!(stored.data.subtype, BinarySubtype::Generic);

        let back = ChunkDocument::from(stored);
        assert_eq!(back.n, 3);
        assert_eq!(back.data.as_ref(), b"\x00\x01tail");
    }

    #[tokio::test]
    async fn test_unreachable_server_is_unavailable() {
        let connector = MongoDocumentStoreConnector::new(Duration::from_millis(100));
        let mut config = DocumentStoreConfig::new("assetstore_test");
        // Nothing listens on the discard port
        config.hosts = Some("127.0.0.1:9".to_string());
        let collection = connector.connect(&config).await.unwrap();

        let err = collection.ping().await.unwrap_err();
        assert!(err.is_backend_unavailable());
    }
}
