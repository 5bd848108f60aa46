//! Pluggable storage backends for file records.
//!
//! File metadata lives in a [`MetadataStore`]; the bytes live in an
//! Assetstore: a local filesystem, an S3-compatible object store or a
//! document store. The engines in this crate give every backend the same
//! semantics:
//!
//! - [`AssetstoreRegistry`] tracks configured backends and the current one
//! - [`UploadService`] runs resumable chunked uploads
//! - [`FileService`] downloads, reads and deletes files
//! - [`FileMover`] migrates bytes between backends
//! - [`Importer`] binds data already present in a backend
//! - [`IntegrityScanner`] finds records whose bytes have vanished
//!
//! # Example
//!
//! ```rust
//! use assetstore::{
//!     AdapterFactory, AssetstoreRegistry, InMemoryMetadataStore, UploadRequest, UploadService,
//! };
//! use assetstore_core::{AssetstoreConfig, AssetstoreSettings, FilesystemConfig, NewAssetstore};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = Arc::new(AssetstoreRegistry::new(
//!     Arc::new(InMemoryMetadataStore::new()),
//!     AdapterFactory::new(AssetstoreSettings::default()),
//! ));
//! let config = AssetstoreConfig::Filesystem(FilesystemConfig::new("/tmp/assetstore"));
//! registry.create(NewAssetstore::new("Local", config)).await?;
//!
//! let uploads = UploadService::new(registry.clone());
//! let file = uploads
//!     .upload_from_reader(UploadRequest::new("hello.txt", 5), &b"hello"[..])
//!     .await?;
//! assert_eq!(file.size, 5);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod files;
mod importer;
mod mover;
mod registry;
mod scanner;
mod upload;

pub use files::{Download, FileService};
pub use importer::{
    ImportOptions, ImportOptionsBuilder, ImportOptionsBuilderError, ImportRecord, ImportStream,
    Importer, sanitize_name,
};
pub use mover::FileMover;
pub use registry::AssetstoreRegistry;
pub use scanner::{IntegrityScanner, InvalidFile, InvalidFileStream, InvalidReason};
pub use upload::{FinalizedUpload, UploadRequest, UploadService, UploadStart};

pub use assetstore_error::{AssetstoreError, AssetstoreErrorKind, AssetstoreResult};
pub use assetstore_interface::{
    AssetstoreAdapter, ByteStream, InMemoryMetadataStore, MetadataStore, MoveDecision, MoveHook,
    NoProgress, ProgressReporter, RecordingProgress,
};
pub use assetstore_storage::{AdapterFactory, InMemoryDocumentStore, InMemoryObjectStore};
