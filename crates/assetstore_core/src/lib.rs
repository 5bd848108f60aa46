//! Core data types for the assetstore abstraction.
//!
//! The types here describe configured backends ([`Assetstore`]), logical
//! file records ([`File`]) and in-flight uploads ([`UploadSession`]), plus
//! the request descriptors handed to clients that talk to an object store
//! directly.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod assetstore;
mod file;
mod hierarchy;
mod ids;
mod request;
mod settings;
pub mod telemetry;
mod upload;

pub use assetstore::{
    Assetstore, AssetstoreConfig, AssetstoreType, AssetstoreUpdate, Capacity,
    DocumentStoreConfig, FilesystemConfig, NewAssetstore, ObjectStoreConfig,
};
pub use file::{BackendRef, File, FileFilter};
pub use hierarchy::{Folder, FolderParent, ImportDestination, Item, UploadParent, User};
pub use ids::{AssetstoreId, FileId, FolderId, ItemId, UploadId, UserId};
pub use request::{ByteRange, ContentDisposition, DirectUpload, HttpMethod, RequestDescriptor};
pub use settings::{
    AssetstoreSettings, DocumentStoreSettings, FilesystemSettings, ObjectStoreSettings,
    ProbeSettings, UploadSettings,
};
pub use upload::{
    ChunkPayload, Continuation, ObjectStoreContinuation, OffsetReply, PartRecord, PartRequest,
    UploadSession, UploadState,
};
