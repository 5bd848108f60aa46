//! Object-store assetstore adapter.
//!
//! Uploads run in one of two modes, decided by the first chunk:
//!
//! - **Direct**: the client sends the bytes to the bucket itself using
//!   pre-signed request descriptors. Small uploads are one PUT; uploads
//!   larger than the chunk length are a multipart sequence the client
//!   initiates, feeds part by part and completes.
//! - **Relay**: raw bytes arrive through the engine (server-side uploads and
//!   moves). The adapter buffers them and issues the PUT or multipart calls
//!   through its [`ObjectStoreClient`].
//!
//! Keys are `{prefix}/{uuid}`; a file's relpath is `/{bucket}/{key}`.

mod client;
mod http;
mod memory;
mod presign;
mod xml;

pub use client::{ObjectListing, ObjectStoreClient, ObjectStoreConnector, ObjectSummary};
pub use http::{HttpObjectStoreClient, HttpObjectStoreConnector};
pub use memory::{InMemoryBucket, InMemoryObjectStore};
pub use presign::Presigner;

use crate::probe::probe;
use assetstore_core::{
    Assetstore, AssetstoreConfig, BackendRef, ByteRange, Capacity, ChunkPayload,
    ContentDisposition, Continuation, DirectUpload, File, HttpMethod, ObjectStoreConfig,
    ObjectStoreContinuation, ObjectStoreSettings, OffsetReply, PartRecord, ProbeSettings,
    RequestDescriptor, UploadSession,
};
use assetstore_error::{
    AssetstoreResult, NotFoundError, StateError, StateErrorKind, ValidationError,
};
use assetstore_interface::{
    AssetstoreAdapter, ByteStream, FinalizedBytes, NamespaceEntry, NamespaceKind,
};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

const DELIMITER: &str = "/";

/// Object-store backend.
pub struct ObjectStoreAdapter {
    assetstore: Assetstore,
    config: ObjectStoreConfig,
    settings: ObjectStoreSettings,
    presigner: Presigner,
    client: Arc<dyn ObjectStoreClient>,
    probe: ProbeSettings,
}

impl ObjectStoreAdapter {
    /// Create an adapter for an object-store Assetstore.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] if the Assetstore is not an object-store
    /// one or its service endpoint is invalid.
    pub fn new(
        assetstore: Assetstore,
        client: Arc<dyn ObjectStoreClient>,
        settings: ObjectStoreSettings,
        probe: ProbeSettings,
    ) -> AssetstoreResult<Self> {
        let config = match &assetstore.config {
            AssetstoreConfig::ObjectStore(config) => config.clone(),
            _ => {
                return Err(ValidationError::new(format!(
                    "Assetstore {} is not an object store assetstore.",
                    assetstore.name
                ))
                .into());
            }
        };
        let presigner = Presigner::new(&config, &settings)?;
        Ok(Self {
            assetstore,
            config,
            settings,
            presigner,
            client,
            probe,
        })
    }

    /// Check the bucket name and service endpoint without contacting the store.
    pub fn check_config(
        config: &ObjectStoreConfig,
        settings: &ObjectStoreSettings,
    ) -> AssetstoreResult<()> {
        if config.bucket.trim().is_empty() {
            return Err(ValidationError::field("bucket", "Bucket must not be empty.").into());
        }
        Presigner::new(config, settings)?;
        Ok(())
    }

    /// Check the configuration, then prove the bucket is writable by opening
    /// and aborting a multipart upload.
    #[instrument(skip(config, settings, client), fields(bucket = %config.bucket))]
    pub async fn validate(
        config: &ObjectStoreConfig,
        settings: &ObjectStoreSettings,
        client: &dyn ObjectStoreClient,
    ) -> AssetstoreResult<()> {
        Self::check_config(config, settings)?;

        let key = key_under(config.normalized_prefix(), "test");
        let unwritable = || {
            ValidationError::field(
                "bucket",
                format!("Unable to write into bucket \"{}\".", config.bucket),
            )
        };
        let upload_id = client.create_multipart(&key).await.map_err(|e| {
            warn!(error = %e, "Bucket write test failed");
            unwritable()
        })?;
        if let Err(e) = client.abort_multipart(&key, &upload_id).await {
            warn!(error = %e, "Failed to abort bucket write test");
        }
        Ok(())
    }

    fn new_key(&self) -> String {
        key_under(
            self.config.normalized_prefix(),
            &uuid::Uuid::new_v4().to_string(),
        )
    }

    fn relpath(&self, key: &str) -> String {
        format!("/{}/{}", self.config.bucket, key)
    }

    fn put_request(&self, key: &str) -> AssetstoreResult<RequestDescriptor> {
        self.presigner
            .presign(HttpMethod::Put, key, &[], &[("x-amz-acl", "private")])
    }

    fn key_of(file: &File) -> AssetstoreResult<Option<&str>> {
        match &file.backend {
            BackendRef::Empty => Ok(None),
            BackendRef::ObjectKey { key, .. } => Ok(Some(key.as_str())),
            other => Err(ValidationError::new(format!(
                "File {} has a {} reference, not an object key.",
                file.name,
                other.tag()
            ))
            .into()),
        }
    }

    /// Upload the first `chunk_length` buffered bytes as the next part.
    async fn flush_part(&self, cont: &mut ObjectStoreContinuation, length: usize) -> AssetstoreResult<()> {
        let upload_id = match &cont.multipart_id {
            Some(id) => id.clone(),
            None => {
                let id = self.client.create_multipart(&cont.key).await?;
                cont.multipart_id = Some(id.clone());
                id
            }
        };
        let part_number = cont.parts.len() as u32 + 1;
        let body = Bytes::copy_from_slice(&cont.buffer[..length]);
        let etag = self
            .client
            .upload_part(&cont.key, &upload_id, part_number, body)
            .await?;
        cont.buffer.drain(..length);
        cont.parts.push(PartRecord {
            part_number,
            size: length as u64,
            etag,
        });
        debug!(part_number, size = length, "Relayed part to object store");
        Ok(())
    }
}

fn key_under(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", prefix, name)
    }
}

fn continuation(session: &UploadSession) -> AssetstoreResult<&ObjectStoreContinuation> {
    match session.continuation() {
        Continuation::ObjectStore(cont) => Ok(cont),
        _ => Err(StateError::new(StateErrorKind::ContinuationMismatch(
            "object_store".to_string(),
        ))
        .into()),
    }
}

fn continuation_mut(session: &mut UploadSession) -> AssetstoreResult<&mut ObjectStoreContinuation> {
    match session.continuation_mut() {
        Continuation::ObjectStore(cont) => Ok(cont),
        _ => Err(StateError::new(StateErrorKind::ContinuationMismatch(
            "object_store".to_string(),
        ))
        .into()),
    }
}

fn last_segment(path: &str) -> String {
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .to_string()
}

#[async_trait]
impl AssetstoreAdapter for ObjectStoreAdapter {
    fn assetstore(&self) -> &Assetstore {
        &self.assetstore
    }

    fn chunk_size(&self) -> u64 {
        self.settings.chunk_length
    }

    fn import_noun(&self) -> &'static str {
        "Keys"
    }

    #[instrument(skip(self), fields(bucket = %self.config.bucket))]
    async fn ping(&self) -> AssetstoreResult<()> {
        let client = self.client.clone();
        probe(&self.assetstore.name, &self.probe, || {
            let client = client.clone();
            async move { client.ping().await }
        })
        .await
    }

    async fn capacity_info(&self) -> AssetstoreResult<Capacity> {
        Ok(Capacity::unknown())
    }

    #[instrument(skip(self, session), fields(upload_id = %session.id(), size = session.size()))]
    async fn initiate_upload(&self, session: &mut UploadSession) -> AssetstoreResult<()> {
        let key = self.new_key();
        let chunked = *session.size() > self.settings.chunk_length;
        let request = if chunked {
            self.presigner.presign(
                HttpMethod::Post,
                &key,
                &[("uploads", String::new())],
                &[("x-amz-acl", "private")],
            )?
        } else {
            self.put_request(&key)?
        };

        debug!(key = %key, chunked, "Prepared object store upload");
        session.set_direct(Some(DirectUpload {
            chunked,
            chunk_length: self.settings.chunk_length,
            request,
        }));
        session.set_continuation(Continuation::ObjectStore(ObjectStoreContinuation {
            key,
            chunked,
            ..Default::default()
        }));
        Ok(())
    }

    #[instrument(skip(self, session, payload), fields(upload_id = %session.id(), offset = session.received(), length = payload.len()))]
    async fn write_chunk(
        &self,
        session: &mut UploadSession,
        payload: &ChunkPayload,
    ) -> AssetstoreResult<Option<RequestDescriptor>> {
        match payload {
            ChunkPayload::Part(part) => {
                let cont = continuation_mut(session)?;
                if !cont.chunked || cont.relay {
                    return Err(ValidationError::field(
                        "chunk",
                        "Part requests are only valid for chunked direct-to-object uploads.",
                    )
                    .into());
                }
                if cont
                    .multipart_id
                    .as_ref()
                    .is_some_and(|id| id != &part.upload_id)
                {
                    return Err(ValidationError::field(
                        "chunk",
                        format!("Unexpected multipart upload id {}.", part.upload_id),
                    )
                    .into());
                }
                cont.multipart_id = Some(part.upload_id.clone());
                let request = self.presigner.presign(
                    HttpMethod::Put,
                    &cont.key,
                    &[
                        ("partNumber", part.part_number.to_string()),
                        ("uploadId", part.upload_id.clone()),
                    ],
                    &[],
                )?;
                Ok(Some(request))
            }
            ChunkPayload::Bytes(bytes) => {
                let chunk_length = self.settings.chunk_length.max(1) as usize;
                let cont = continuation_mut(session)?;
                if !cont.relay && cont.multipart_id.is_some() {
                    return Err(ValidationError::field(
                        "chunk",
                        "Raw bytes cannot follow part requests in the same upload.",
                    )
                    .into());
                }
                cont.relay = true;
                let before = cont.buffer.len();
                let parts_before = cont.parts.len();
                cont.buffer.extend_from_slice(bytes);

                if cont.chunked {
                    while cont.buffer.len() >= chunk_length {
                        if let Err(e) = self.flush_part(cont, chunk_length).await {
                            if cont.parts.len() == parts_before {
                                cont.buffer.truncate(before);
                            }
                            return Err(e);
                        }
                    }
                }
                Ok(None)
            }
        }
    }

    async fn request_offset(&self, session: &UploadSession) -> AssetstoreResult<OffsetReply> {
        let cont = continuation(session)?;
        if cont.relay {
            return Ok(OffsetReply::Received(*session.received()));
        }
        if cont.chunked {
            return Err(ValidationError::new(
                "You should not call requestOffset on a chunked direct-to-object upload.",
            )
            .into());
        }
        Ok(OffsetReply::Request(self.put_request(&cont.key)?))
    }

    async fn confirm_received(&self, session: &UploadSession) -> AssetstoreResult<u64> {
        let cont = continuation(session)?;
        if cont.relay {
            return Ok(*session.received());
        }
        // Parts go straight to the store and the client completes them
        if cont.chunked {
            return Ok(*session.size());
        }
        Ok(self.client.head_object(&cont.key).await?.unwrap_or(0))
    }

    #[instrument(skip(self, session, _sha512), fields(upload_id = %session.id()))]
    async fn finalize_upload(
        &self,
        session: &mut UploadSession,
        _sha512: Option<&str>,
    ) -> AssetstoreResult<FinalizedBytes> {
        let chunk_length = self.settings.chunk_length.max(1) as usize;
        let cont = continuation_mut(session)?;
        let mut finalize_request = None;

        if cont.relay {
            if cont.multipart_id.is_none() {
                let body = Bytes::from(std::mem::take(&mut cont.buffer));
                self.client.put_object(&cont.key, body).await?;
            } else {
                while !cont.buffer.is_empty() {
                    let length = cont.buffer.len().min(chunk_length);
                    self.flush_part(cont, length).await?;
                }
                let upload_id = cont.multipart_id.clone().unwrap_or_default();
                self.client
                    .complete_multipart(&cont.key, &upload_id, &cont.parts)
                    .await?;
            }
        } else if cont.chunked {
            let Some(upload_id) = cont.multipart_id.clone() else {
                return Err(ValidationError::new(
                    "No parts were requested for this multipart upload.",
                )
                .into());
            };
            finalize_request = Some(self.presigner.presign(
                HttpMethod::Post,
                &cont.key,
                &[("uploadId", upload_id)],
                &[],
            )?);
        }

        let key = cont.key.clone();
        info!(key = %key, "Finalized object store upload");
        Ok(FinalizedBytes {
            backend: BackendRef::ObjectKey {
                relpath: Some(self.relpath(&key)),
                key,
            },
            finalize_request,
        })
    }

    #[instrument(skip(self, session), fields(upload_id = %session.id()))]
    async fn cancel_upload(&self, session: &mut UploadSession) -> AssetstoreResult<()> {
        if let Continuation::ObjectStore(cont) = session.continuation() {
            if let Some(upload_id) = &cont.multipart_id {
                self.client.abort_multipart(&cont.key, upload_id).await?;
                debug!(key = %cont.key, "Aborted multipart upload");
            } else if !cont.chunked {
                if let Err(e) = self.client.delete_object(&cont.key).await {
                    warn!(key = %cont.key, error = %e, "Failed to remove cancelled upload object");
                }
            }
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
        match Self::key_of(file)? {
            None => Ok(futures::stream::empty().boxed()),
            Some(key) => self.client.get_object(key, range).await,
        }
    }

    async fn download_url(
        &self,
        file: &File,
        disposition: ContentDisposition,
    ) -> AssetstoreResult<Option<String>> {
        let Some(key) = Self::key_of(file)? else {
            return Ok(None);
        };
        let query = match disposition {
            ContentDisposition::Inline => vec![(
                "response-content-disposition",
                disposition.header_value(&file.name),
            )],
            ContentDisposition::Attachment => Vec::new(),
        };
        let request = self.presigner.presign(HttpMethod::Get, key, &query, &[])?;
        Ok(Some(request.url))
    }

    #[instrument(skip(self, file), fields(file_id = %file.id))]
    async fn delete_bytes(&self, file: &File) -> AssetstoreResult<()> {
        if let Some(key) = Self::key_of(file)? {
            self.client.delete_object(key).await?;
            info!(key, "Deleted object");
        }
        Ok(())
    }

    async fn bytes_exist(&self, file: &File) -> AssetstoreResult<bool> {
        match Self::key_of(file)? {
            None => Ok(true),
            Some(key) => Ok(self.client.head_object(key).await?.is_some()),
        }
    }

    #[instrument(skip(self))]
    async fn stat_namespace(&self, path: &str) -> AssetstoreResult<NamespaceEntry> {
        let path = path.trim_matches('/');
        if path.is_empty() {
            return Ok(NamespaceEntry {
                name: String::new(),
                path: String::new(),
                kind: NamespaceKind::Directory,
            });
        }
        if let Some(size) = self.client.head_object(path).await? {
            return Ok(NamespaceEntry {
                name: last_segment(path),
                path: path.to_string(),
                kind: NamespaceKind::File {
                    size,
                    backend: BackendRef::ObjectKey {
                        key: path.to_string(),
                        relpath: None,
                    },
                },
            });
        }
        let listing = self
            .client
            .list_objects(&format!("{}/", path), DELIMITER)
            .await?;
        if listing.objects.is_empty() && listing.common_prefixes.is_empty() {
            return Err(NotFoundError::new(format!("Not found: {}.", path)).into());
        }
        Ok(NamespaceEntry {
            name: last_segment(path),
            path: path.to_string(),
            kind: NamespaceKind::Directory,
        })
    }

    #[instrument(skip(self))]
    async fn list_namespace(&self, path: &str) -> AssetstoreResult<Vec<NamespaceEntry>> {
        let path = path.trim_matches('/');
        let prefix = if path.is_empty() {
            String::new()
        } else {
            format!("{}/", path)
        };
        let listing = self.client.list_objects(&prefix, DELIMITER).await?;

        let mut entries: Vec<NamespaceEntry> = listing
            .common_prefixes
            .iter()
            .map(|common| {
                let child = common.trim_end_matches('/');
                NamespaceEntry {
                    name: last_segment(child),
                    path: child.to_string(),
                    kind: NamespaceKind::Directory,
                }
            })
            .collect();
        // Zero-byte "folder" markers end in the delimiter
        entries.extend(
            listing
                .objects
                .into_iter()
                .filter(|object| !object.key.ends_with('/'))
                .map(|object| NamespaceEntry {
                    name: last_segment(&object.key),
                    path: object.key.clone(),
                    kind: NamespaceKind::File {
                        size: object.size,
                        backend: BackendRef::ObjectKey {
                            key: object.key,
                            relpath: None,
                        },
                    },
                }),
        );
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }
}
