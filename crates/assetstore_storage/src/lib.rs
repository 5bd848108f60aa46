//! Storage backends for the assetstore abstraction.
//!
//! Three [`AssetstoreAdapter`](assetstore_interface::AssetstoreAdapter)
//! implementations keep file bytes apart from file metadata:
//!
//! - **Filesystem**: content-addressable files under a root directory
//! - **Object store**: S3-compatible buckets, with pre-signed requests so
//!   clients can upload and download without relaying through the server
//! - **Document store**: fixed-size chunk documents in a MongoDB database
//!
//! [`AdapterFactory`] picks the adapter for an Assetstore record.
//!
//! # Example
//!
//! ```rust
//! use assetstore_core::{
//!     Assetstore, AssetstoreConfig, AssetstoreSettings, ChunkPayload, FilesystemConfig,
//!     UploadSession, UploadState,
//! };
//! use assetstore_storage::AdapterFactory;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AssetstoreConfig::Filesystem(FilesystemConfig::new("/tmp/assetstore"));
//! let factory = AdapterFactory::new(AssetstoreSettings::default());
//! factory.validate(&config).await?;
//!
//! let store = Assetstore::new("Local", config);
//! let adapter = factory.adapter(&store).await?;
//!
//! let mut session = UploadSession::new("hello.txt", 5, store.id);
//! adapter.initiate_upload(&mut session).await?;
//! session.set_state(UploadState::Receiving);
//! adapter.write_chunk(&mut session, &ChunkPayload::from(b"hello".to_vec())).await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod document_store;
mod factory;
pub mod filesystem;
pub mod object_store;
mod probe;

pub use document_store::{
    ChunkCollection, ChunkDocument, DocumentStoreAdapter, DocumentStoreConnector,
    InMemoryChunkCollection, InMemoryDocumentStore, MongoChunkCollection,
    MongoDocumentStoreConnector,
};
pub use factory::AdapterFactory;
pub use filesystem::FilesystemAdapter;
pub use object_store::{
    HttpObjectStoreClient, HttpObjectStoreConnector, InMemoryBucket, InMemoryObjectStore,
    ObjectListing, ObjectStoreAdapter, ObjectStoreClient, ObjectStoreConnector, ObjectSummary,
    Presigner,
};
pub use probe::probe;
