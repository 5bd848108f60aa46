//! Shared fixtures for the engine tests.
//!
//! Every harness owns a temp directory for filesystem roots, an in-memory
//! object store and an in-memory document store, all wired into one registry.

#![allow(dead_code)]

use assetstore::{
    AdapterFactory, AssetstoreRegistry, FileService, InMemoryDocumentStore, InMemoryMetadataStore,
    InMemoryObjectStore, UploadRequest, UploadService,
};
use assetstore_core::{
    Assetstore, AssetstoreConfig, AssetstoreId, AssetstoreSettings, DocumentStoreConfig,
    DocumentStoreSettings, File, FileId, FilesystemConfig, FilesystemSettings, NewAssetstore,
    ObjectStoreConfig, ObjectStoreSettings, ProbeSettings, UploadSettings,
};
use assetstore_storage::ObjectStoreConnector;
use bytes::Bytes;
use futures::TryStreamExt;
use std::sync::Arc;
use tempfile::TempDir;

pub struct Harness {
    pub metadata: Arc<InMemoryMetadataStore>,
    pub registry: Arc<AssetstoreRegistry>,
    pub uploads: Arc<UploadService>,
    pub files: FileService,
    pub objects: InMemoryObjectStore,
    pub documents: InMemoryDocumentStore,
    pub temp: TempDir,
}

/// Small chunks so that every upload spans several of them.
pub fn settings() -> AssetstoreSettings {
    AssetstoreSettings {
        probe: ProbeSettings {
            timeout_ms: 200,
            retries: 1,
            retry_delay_ms: 1,
        },
        filesystem: FilesystemSettings { chunk_size: 5 },
        object_store: ObjectStoreSettings {
            chunk_length: 8,
            ..ObjectStoreSettings::default()
        },
        document_store: DocumentStoreSettings { chunk_size: 4 },
        upload: UploadSettings::default(),
    }
}

impl Harness {
    pub fn new() -> Self {
        Self::with_object_connector(|objects| Arc::new(objects) as Arc<dyn ObjectStoreConnector>)
    }

    /// Harness whose object stores are reached through `connector`, which
    /// receives the shared in-memory store to wrap.
    pub fn with_object_connector(
        connector: impl FnOnce(InMemoryObjectStore) -> Arc<dyn ObjectStoreConnector>,
    ) -> Self {
        let metadata = Arc::new(InMemoryMetadataStore::new());
        let objects = InMemoryObjectStore::new();
        let documents = InMemoryDocumentStore::new();
        let factory = AdapterFactory::new(settings())
            .with_object_connector(connector(objects.clone()))
            .with_document_connector(Arc::new(documents.clone()));
        let registry = Arc::new(AssetstoreRegistry::new(metadata.clone(), factory));
        let uploads = Arc::new(UploadService::new(registry.clone()));
        let files = FileService::new(registry.clone());
        Self {
            metadata,
            registry,
            uploads,
            files,
            objects,
            documents,
            temp: TempDir::new().unwrap(),
        }
    }

    pub fn root(&self, name: &str) -> std::path::PathBuf {
        self.temp.path().join(name)
    }

    pub async fn filesystem(&self, name: &str) -> Assetstore {
        let config = AssetstoreConfig::Filesystem(FilesystemConfig::new(self.root(name)));
        self.registry
            .create(NewAssetstore::new(name, config))
            .await
            .unwrap()
    }

    pub async fn object_store(&self, name: &str, bucket: &str) -> Assetstore {
        self.objects.create_bucket(bucket).await;
        let mut config = ObjectStoreConfig::new(bucket);
        config.prefix = "assets".to_string();
        config.access_key_id = Some("someKey".to_string());
        config.secret = Some("someSecret".to_string());
        self.registry
            .create(NewAssetstore::new(name, AssetstoreConfig::ObjectStore(config)))
            .await
            .unwrap()
    }

    pub async fn document_store(&self, name: &str, db: &str) -> Assetstore {
        let config = AssetstoreConfig::DocumentStore(DocumentStoreConfig::new(db));
        self.registry
            .create(NewAssetstore::new(name, config))
            .await
            .unwrap()
    }

    /// Relay `data` through the engine into an Assetstore.
    pub async fn upload(&self, name: &str, data: &[u8], store: AssetstoreId) -> File {
        self.uploads
            .upload_from_reader(
                UploadRequest::new(name, data.len() as u64).assetstore(store),
                data,
            )
            .await
            .unwrap()
    }

    pub async fn read(&self, file_id: FileId) -> Vec<u8> {
        let chunks: Vec<Bytes> = self
            .files
            .read(file_id, None)
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        chunks.concat()
    }
}

pub fn sha512_hex(data: &[u8]) -> String {
    use sha2::{Digest, Sha512};
    hex::encode(Sha512::digest(data))
}
