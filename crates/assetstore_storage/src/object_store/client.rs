//! Object-store client seam.
//!
//! The adapter talks to buckets through [`ObjectStoreClient`], so tests can
//! swap the HTTP client for an in-memory bucket.

use assetstore_core::{ByteRange, ObjectStoreConfig, ObjectStoreSettings, PartRecord};
use assetstore_error::AssetstoreResult;
use assetstore_interface::ByteStream;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;

/// One object in a listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectSummary {
    /// Full key
    pub key: String,
    /// Size in bytes
    pub size: u64,
}

/// Result of listing a prefix with a delimiter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectListing {
    /// Objects directly under the prefix
    pub objects: Vec<ObjectSummary>,
    /// Sub-prefixes ending in the delimiter
    pub common_prefixes: Vec<String>,
}

/// Operations the object-store adapter needs from a bucket.
#[async_trait]
pub trait ObjectStoreClient: Send + Sync {
    /// Check that the bucket answers.
    async fn ping(&self) -> AssetstoreResult<()>;

    /// Store a whole object.
    async fn put_object(&self, key: &str, body: Bytes) -> AssetstoreResult<()>;

    /// Stream an object, optionally restricted to a range.
    async fn get_object(&self, key: &str, range: Option<ByteRange>) -> AssetstoreResult<ByteStream>;

    /// Size of an object, or `None` when it does not exist.
    async fn head_object(&self, key: &str) -> AssetstoreResult<Option<u64>>;

    /// Remove an object. Missing objects are not an error.
    async fn delete_object(&self, key: &str) -> AssetstoreResult<()>;

    /// List objects and sub-prefixes under `prefix`.
    async fn list_objects(&self, prefix: &str, delimiter: &str) -> AssetstoreResult<ObjectListing>;

    /// Start a multipart upload and return its id.
    async fn create_multipart(&self, key: &str) -> AssetstoreResult<String>;

    /// Upload one part and return its ETag.
    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: u32,
        body: Bytes,
    ) -> AssetstoreResult<String>;

    /// Assemble the uploaded parts into the final object.
    async fn complete_multipart(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[PartRecord],
    ) -> AssetstoreResult<()>;

    /// Discard a multipart upload and its parts.
    async fn abort_multipart(&self, key: &str, upload_id: &str) -> AssetstoreResult<()>;
}

/// Opens clients for a bucket configuration.
#[async_trait]
pub trait ObjectStoreConnector: Send + Sync {
    /// Client bound to the configured bucket.
    async fn connect(
        &self,
        config: &ObjectStoreConfig,
        settings: &ObjectStoreSettings,
    ) -> AssetstoreResult<Arc<dyn ObjectStoreClient>>;
}
