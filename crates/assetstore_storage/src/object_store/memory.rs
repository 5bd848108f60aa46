//! In-memory object store for tests and embedding.
//!
//! Buckets are BTreeMaps of key to bytes so listings come back in key order.
//! All data is lost when the store is dropped.

use super::client::{
    ObjectListing, ObjectStoreClient, ObjectStoreConnector, ObjectSummary,
};
use assetstore_core::{ByteRange, ObjectStoreConfig, ObjectStoreSettings, PartRecord};
use assetstore_error::{
    AssetstoreResult, BackendUnavailableError, NotFoundError, StorageError, StorageErrorKind,
};
use assetstore_interface::ByteStream;
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::RwLock;
use tracing::debug;

type Bucket = BTreeMap<String, Bytes>;

#[derive(Debug, Clone)]
struct Multipart {
    bucket: String,
    key: String,
    parts: BTreeMap<u32, Bytes>,
}

/// In-memory object store holding any number of buckets.
///
/// # Example
/// ```
/// use assetstore_storage::InMemoryObjectStore;
///
/// #[tokio::main]
/// async fn main() {
///     let store = InMemoryObjectStore::new();
///     store.create_bucket("bucketname").await;
///     store.put("bucketname", "foo/bar/test", b"abc".to_vec()).await.unwrap();
///     assert_eq!(store.get("bucketname", "foo/bar/test").await.unwrap(), b"abc".to_vec());
/// }
/// ```
#[derive(Debug, Clone)]
pub struct InMemoryObjectStore {
    buckets: Arc<RwLock<HashMap<String, Bucket>>>,
    multiparts: Arc<RwLock<HashMap<String, Multipart>>>,
    available: Arc<AtomicBool>,
    failures: Arc<AtomicUsize>,
}

impl Default for InMemoryObjectStore {
    fn default() -> Self {
        Self {
            buckets: Arc::default(),
            multiparts: Arc::default(),
            available: Arc::new(AtomicBool::new(true)),
            failures: Arc::default(),
        }
    }
}

impl InMemoryObjectStore {
    /// Create a store with no buckets.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty bucket if it does not exist.
    pub async fn create_bucket(&self, bucket: &str) {
        self.buckets
            .write()
            .await
            .entry(bucket.to_string())
            .or_default();
    }

    /// Simulate the store going down or coming back.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Fail the next `count` bucket operations as unreachable, then recover.
    pub fn fail_next(&self, count: usize) {
        self.failures.store(count, Ordering::SeqCst);
    }

    /// Store an object directly, as a client uploading with a presigned URL would.
    pub async fn put(&self, bucket: &str, key: &str, body: impl Into<Bytes>) -> AssetstoreResult<()> {
        self.client(bucket).put_object(key, body.into()).await
    }

    /// Read a whole object, if present.
    pub async fn get(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.buckets
            .read()
            .await
            .get(bucket)
            .and_then(|b| b.get(key))
            .map(|bytes| bytes.to_vec())
    }

    /// Keys stored in a bucket.
    pub async fn keys(&self, bucket: &str) -> Vec<String> {
        self.buckets
            .read()
            .await
            .get(bucket)
            .map(|b| b.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of multipart uploads not yet completed or aborted.
    pub async fn pending_multiparts(&self) -> usize {
        self.multiparts.read().await.len()
    }

    /// Upload a part directly, as a client holding a presigned part URL would.
    pub async fn put_part(
        &self,
        upload_id: &str,
        part_number: u32,
        body: impl Into<Bytes>,
    ) -> AssetstoreResult<String> {
        let key = {
            let multiparts = self.multiparts.read().await;
            let upload = multiparts
                .get(upload_id)
                .ok_or_else(|| NotFoundError::new(format!("Multipart upload not found: {}", upload_id)))?;
            (upload.bucket.clone(), upload.key.clone())
        };
        self.client(&key.0)
            .upload_part(&key.1, upload_id, part_number, body.into())
            .await
    }

    /// Client bound to one bucket.
    pub fn client(&self, bucket: &str) -> InMemoryBucket {
        InMemoryBucket {
            store: self.clone(),
            bucket: bucket.to_string(),
        }
    }
}

#[async_trait]
impl ObjectStoreConnector for InMemoryObjectStore {
    async fn connect(
        &self,
        config: &ObjectStoreConfig,
        _settings: &ObjectStoreSettings,
    ) -> AssetstoreResult<Arc<dyn ObjectStoreClient>> {
        Ok(Arc::new(self.client(&config.bucket)))
    }
}

/// [`ObjectStoreClient`] over one bucket of an [`InMemoryObjectStore`].
#[derive(Debug, Clone)]
pub struct InMemoryBucket {
    store: InMemoryObjectStore,
    bucket: String,
}

impl InMemoryBucket {
    fn check_available(&self) -> AssetstoreResult<()> {
        let blip = self
            .store
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if self.store.available.load(Ordering::SeqCst) && !blip {
            Ok(())
        } else {
            Err(BackendUnavailableError::new(
                "object store",
                format!("bucket \"{}\" is unreachable", self.bucket),
            )
            .into())
        }
    }

    fn missing_bucket(&self) -> StorageError {
        StorageError::new(StorageErrorKind::NotFound(format!(
            "bucket \"{}\"",
            self.bucket
        )))
    }
}

#[async_trait]
impl ObjectStoreClient for InMemoryBucket {
    async fn ping(&self) -> AssetstoreResult<()> {
        self.check_available()?;
        if self.store.buckets.read().await.contains_key(&self.bucket) {
            Ok(())
        } else {
            Err(self.missing_bucket().into())
        }
    }

    async fn put_object(&self, key: &str, body: Bytes) -> AssetstoreResult<()> {
        self.check_available()?;
        let mut buckets = self.store.buckets.write().await;
        let bucket = buckets
            .get_mut(&self.bucket)
            .ok_or_else(|| self.missing_bucket())?;
        debug!(bucket = %self.bucket, key, size = body.len(), "Stored object");
        bucket.insert(key.to_string(), body);
        Ok(())
    }

    async fn get_object(&self, key: &str, range: Option<ByteRange>) -> AssetstoreResult<ByteStream> {
        self.check_available()?;
        let body = self
            .store
            .buckets
            .read()
            .await
            .get(&self.bucket)
            .and_then(|b| b.get(key).cloned())
            .ok_or_else(|| StorageError::new(StorageErrorKind::NotFound(key.to_string())))?;
        let (start, end) = range.unwrap_or(ByteRange::from(0)).clamp(body.len() as u64);
        let slice = body.slice(start as usize..end as usize);
        Ok(futures::stream::once(async move { Ok(slice) }).boxed())
    }

    async fn head_object(&self, key: &str) -> AssetstoreResult<Option<u64>> {
        self.check_available()?;
        Ok(self
            .store
            .buckets
            .read()
            .await
            .get(&self.bucket)
            .and_then(|b| b.get(key))
            .map(|body| body.len() as u64))
    }

    async fn delete_object(&self, key: &str) -> AssetstoreResult<()> {
        self.check_available()?;
        if let Some(bucket) = self.store.buckets.write().await.get_mut(&self.bucket) {
            bucket.remove(key);
        }
        Ok(())
    }

    async fn list_objects(&self, prefix: &str, delimiter: &str) -> AssetstoreResult<ObjectListing> {
        self.check_available()?;
        let buckets = self.store.buckets.read().await;
        let bucket = buckets.get(&self.bucket).ok_or_else(|| self.missing_bucket())?;

        let mut listing = ObjectListing::default();
        for (key, body) in bucket.range(prefix.to_string()..) {
            let Some(rest) = key.strip_prefix(prefix) else {
                break;
            };
            match rest.find(delimiter).filter(|_| !delimiter.is_empty()) {
                Some(index) => {
                    let common = format!("{}{}", prefix, &rest[..index + delimiter.len()]);
                    if listing.common_prefixes.last() != Some(&common) {
                        listing.common_prefixes.push(common);
                    }
                }
                None => listing.objects.push(ObjectSummary {
                    key: key.clone(),
                    size: body.len() as u64,
                }),
            }
        }
        Ok(listing)
    }

    async fn create_multipart(&self, key: &str) -> AssetstoreResult<String> {
        self.check_available()?;
        if !self.store.buckets.read().await.contains_key(&self.bucket) {
            return Err(self.missing_bucket().into());
        }
        let upload_id = uuid::Uuid::new_v4().simple().to_string();
        self.store.multiparts.write().await.insert(
            upload_id.clone(),
            Multipart {
                bucket: self.bucket.clone(),
                key: key.to_string(),
                parts: BTreeMap::new(),
            },
        );
        debug!(bucket = %self.bucket, key, upload_id = %upload_id, "Created multipart upload");
        Ok(upload_id)
    }

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: u32,
        body: Bytes,
    ) -> AssetstoreResult<String> {
        self.check_available()?;
        let mut multiparts = self.store.multiparts.write().await;
        let upload = multiparts
            .get_mut(upload_id)
            .filter(|u| u.key == key)
            .ok_or_else(|| NotFoundError::new(format!("Multipart upload not found: {}", upload_id)))?;
        let etag = format!("\"{}-{}\"", upload_id, part_number);
        upload.parts.insert(part_number, body);
        Ok(etag)
    }

    async fn complete_multipart(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[PartRecord],
    ) -> AssetstoreResult<()> {
        self.check_available()?;
        let upload = self
            .store
            .multiparts
            .write()
            .await
            .remove(upload_id)
            .filter(|u| u.key == key)
            .ok_or_else(|| NotFoundError::new(format!("Multipart upload not found: {}", upload_id)))?;

        let mut body = Vec::new();
        for part in parts {
            let bytes = upload.parts.get(&part.part_number).ok_or_else(|| {
                StorageError::new(StorageErrorKind::UnexpectedResponse(format!(
                    "part {} of {} was never uploaded",
                    part.part_number, upload_id
                )))
            })?;
            body.extend_from_slice(bytes);
        }
        self.put_object(key, Bytes::from(body)).await
    }

    async fn abort_multipart(&self, _key: &str, upload_id: &str) -> AssetstoreResult<()> {
        self.check_available()?;
        self.store.multiparts.write().await.remove(upload_id);
        Ok(())
    }
}
