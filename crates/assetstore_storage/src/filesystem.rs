//! Filesystem assetstore adapter.
//!
//! Uploads are written to `{root}/temp/{upload_id}` and moved on finalize to
//! a content-addressable location `{root}/{sha[0:2]}/{sha[2:4]}/{sha}`, so
//! identical content is stored once.
//!
//! # Example Structure
//!
//! ```text
//! /var/assetstore/
//! ├── temp/
//! │   └── 0b6c...        (in-flight upload)
//! ├── ab/
//! │   └── cd/
//! │       └── abcdef...  (finalized file, named by its sha-512)
//! ```

use crate::probe::probe;
use assetstore_core::{
    Assetstore, AssetstoreConfig, BackendRef, ByteRange, Capacity, ChunkPayload, Continuation,
    File, FilesystemConfig, OffsetReply, ProbeSettings, RequestDescriptor, UploadSession,
};
use assetstore_error::{
    AssetstoreError, AssetstoreResult, NotFoundError, StateError, StateErrorKind, StorageError,
    StorageErrorKind, ValidationError,
};
use assetstore_interface::{
    AssetstoreAdapter, ByteStream, FinalizedBytes, NamespaceEntry, NamespaceKind,
};
use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio_util::io::ReaderStream;

/// Name of the directory holding in-flight uploads.
const TEMP_DIR: &str = "temp";

/// Filesystem backend.
pub struct FilesystemAdapter {
    assetstore: Assetstore,
    root: PathBuf,
    perms: u32,
    chunk_size: u64,
    probe: ProbeSettings,
}

impl FilesystemAdapter {
    /// Create an adapter for a filesystem Assetstore.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] if the Assetstore is not a filesystem one.
    pub fn new(
        assetstore: Assetstore,
        chunk_size: u64,
        probe: ProbeSettings,
    ) -> AssetstoreResult<Self> {
        let config = match &assetstore.config {
            AssetstoreConfig::Filesystem(config) => config.clone(),
            _ => {
                return Err(ValidationError::new(format!(
                    "Assetstore {} is not a filesystem assetstore.",
                    assetstore.name
                ))
                .into());
            }
        };
        Ok(Self {
            assetstore,
            root: config.root,
            perms: config.perms,
            chunk_size,
            probe,
        })
    }

    /// Check permission bits and make sure the root exists and is writable.
    #[tracing::instrument(skip(config), fields(root = %config.root.display()))]
    pub async fn validate(config: &FilesystemConfig) -> AssetstoreResult<()> {
        FilesystemConfig::check_perms(config.perms)?;

        let temp = config.root.join(TEMP_DIR);
        tokio::fs::create_dir_all(&temp).await.map_err(|e| {
            ValidationError::field(
                "root",
                format!("Could not make directory \"{}\": {}", temp.display(), e),
            )
        })?;

        let marker = temp.join(format!(".write-test-{}", uuid::Uuid::new_v4()));
        tokio::fs::write(&marker, b"").await.map_err(|e| {
            ValidationError::field(
                "root",
                format!("Unable to write into directory \"{}\": {}", temp.display(), e),
            )
        })?;
        if let Err(e) = tokio::fs::remove_file(&marker).await {
            tracing::warn!(path = %marker.display(), error = %e, "Failed to remove write test file");
        }
        Ok(())
    }

    /// Content-addressable path of a checksum, relative to the root.
    ///
    /// Structure: `{hash[0:2]}/{hash[2:4]}/{hash}`
    fn relative_path(sha512: &str) -> AssetstoreResult<PathBuf> {
        if sha512.len() < 4 || !sha512.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ValidationError::field("sha512", "Checksum must be a hex digest.").into());
        }
        Ok(PathBuf::from(&sha512[0..2])
            .join(&sha512[2..4])
            .join(sha512))
    }

    /// Absolute location of a file's bytes. Imported files carry absolute paths.
    fn resolve(&self, file: &File) -> AssetstoreResult<Option<PathBuf>> {
        match &file.backend {
            BackendRef::Empty => Ok(None),
            BackendRef::Path { path } if path.is_absolute() => Ok(Some(path.clone())),
            BackendRef::Path { path } => Ok(Some(self.root.join(path))),
            other => Err(ValidationError::new(format!(
                "File {} has a {} reference, not a filesystem path.",
                file.name,
                other.tag()
            ))
            .into()),
        }
    }

    fn temp_path(session: &UploadSession) -> AssetstoreResult<PathBuf> {
        match session.continuation() {
            Continuation::Filesystem { temp_path } => Ok(temp_path.clone()),
            _ => Err(StateError::new(StateErrorKind::ContinuationMismatch(
                "filesystem".to_string(),
            ))
            .into()),
        }
    }

    async fn entry(path: &Path) -> AssetstoreResult<Option<NamespaceEntry>> {
        let metadata = match tokio::fs::metadata(path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(StorageError::new(StorageErrorKind::FileRead(format!(
                    "{}: {}",
                    path.display(),
                    e
                )))
                .into());
            }
        };
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        let kind = if metadata.is_dir() {
            NamespaceKind::Directory
        } else if metadata.is_file() {
            NamespaceKind::File {
                size: metadata.len(),
                backend: BackendRef::Path {
                    path: path.to_path_buf(),
                },
            }
        } else {
            return Ok(None);
        };
        Ok(Some(NamespaceEntry {
            name,
            path: path.display().to_string(),
            kind,
        }))
    }
}

fn write_error(path: &Path, e: std::io::Error) -> StorageError {
    StorageError::new(StorageErrorKind::FileWrite(format!(
        "{}: {}",
        path.display(),
        e
    )))
}

fn read_error(path: &Path, e: std::io::Error) -> StorageError {
    if e.kind() == std::io::ErrorKind::NotFound {
        StorageError::new(StorageErrorKind::NotFound(path.display().to_string()))
    } else {
        StorageError::new(StorageErrorKind::FileRead(format!(
            "{}: {}",
            path.display(),
            e
        )))
    }
}

#[async_trait]
impl AssetstoreAdapter for FilesystemAdapter {
    fn assetstore(&self) -> &Assetstore {
        &self.assetstore
    }

    fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    #[tracing::instrument(skip(self), fields(root = %self.root.display()))]
    async fn ping(&self) -> AssetstoreResult<()> {
        let root = self.root.clone();
        probe(&self.assetstore.name, &self.probe, || {
            let root = root.clone();
            async move {
                let metadata = tokio::fs::metadata(&root)
                    .await
                    .map_err(|e| read_error(&root, e))?;
                if !metadata.is_dir() {
                    return Err(NotFoundError::new(format!(
                        "{} is not a directory",
                        root.display()
                    ))
                    .into());
                }
                Ok::<(), AssetstoreError>(())
            }
        })
        .await
    }

    #[tracing::instrument(skip(self), fields(root = %self.root.display()))]
    async fn capacity_info(&self) -> AssetstoreResult<Capacity> {
        let root = self.root.clone();
        let stat = tokio::task::spawn_blocking(move || rustix::fs::statvfs(root.as_path()))
            .await
            .map_err(|e| {
                StorageError::new(StorageErrorKind::FileRead(format!("statvfs task failed: {}", e)))
            })?;
        match stat {
            Ok(stat) => Ok(Capacity::known(
                stat.f_frsize * stat.f_blocks,
                stat.f_frsize * stat.f_bavail,
            )),
            Err(e) => {
                tracing::warn!(error = %e, "Unable to stat filesystem root");
                Ok(Capacity::unknown())
            }
        }
    }

    #[tracing::instrument(skip(self, session), fields(upload_id = %session.id(), size = session.size()))]
    async fn initiate_upload(&self, session: &mut UploadSession) -> AssetstoreResult<()> {
        let temp_dir = self.root.join(TEMP_DIR);
        tokio::fs::create_dir_all(&temp_dir).await.map_err(|e| {
            StorageError::new(StorageErrorKind::DirectoryCreation(format!(
                "{}: {}",
                temp_dir.display(),
                e
            )))
        })?;

        let temp_path = temp_dir.join(session.id().to_string());
        tokio::fs::File::create(&temp_path)
            .await
            .map_err(|e| write_error(&temp_path, e))?;

        tracing::debug!(path = %temp_path.display(), "Created upload temp file");
        session.set_continuation(Continuation::Filesystem { temp_path });
        Ok(())
    }

    #[tracing::instrument(skip(self, session, payload), fields(upload_id = %session.id(), offset = session.received(), length = payload.len()))]
    async fn write_chunk(
        &self,
        session: &mut UploadSession,
        payload: &ChunkPayload,
    ) -> AssetstoreResult<Option<RequestDescriptor>> {
        let bytes = match payload {
            ChunkPayload::Bytes(bytes) => bytes,
            ChunkPayload::Part(_) => {
                return Err(ValidationError::field(
                    "chunk",
                    "Part requests are only valid for direct-to-object uploads.",
                )
                .into());
            }
        };
        let temp_path = Self::temp_path(session)?;
        let offset = *session.received();

        let mut handle = tokio::fs::OpenOptions::new()
            .write(true)
            .open(&temp_path)
            .await
            .map_err(|e| write_error(&temp_path, e))?;

        // Drop anything past the accepted offset before writing
        handle
            .set_len(offset)
            .await
            .map_err(|e| write_error(&temp_path, e))?;
        handle
            .seek(std::io::SeekFrom::Start(offset))
            .await
            .map_err(|e| write_error(&temp_path, e))?;

        let written = async {
            handle.write_all(bytes).await?;
            handle.flush().await
        }
        .await;

        if let Err(e) = written {
            if let Err(truncate) = handle.set_len(offset).await {
                tracing::warn!(error = %truncate, "Failed to truncate temp file after write error");
            }
            return Err(write_error(&temp_path, e).into());
        }

        tracing::debug!("Wrote chunk to temp file");
        Ok(None)
    }

    async fn request_offset(&self, session: &UploadSession) -> AssetstoreResult<OffsetReply> {
        Ok(OffsetReply::Received(*session.received()))
    }

    async fn confirm_received(&self, session: &UploadSession) -> AssetstoreResult<u64> {
        let temp_path = Self::temp_path(session)?;
        let metadata = tokio::fs::metadata(&temp_path)
            .await
            .map_err(|e| read_error(&temp_path, e))?;
        Ok(metadata.len())
    }

    #[tracing::instrument(skip(self, session, sha512), fields(upload_id = %session.id()))]
    async fn finalize_upload(
        &self,
        session: &mut UploadSession,
        sha512: Option<&str>,
    ) -> AssetstoreResult<FinalizedBytes> {
        let temp_path = Self::temp_path(session)?;
        let sha512 = sha512.ok_or_else(|| {
            ValidationError::field("sha512", "Filesystem uploads require a checksum.")
        })?;
        let relative = Self::relative_path(sha512)?;
        let path = self.root.join(&relative);

        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            tracing::debug!(path = %path.display(), "Content already stored, discarding temp file");
            tokio::fs::remove_file(&temp_path)
                .await
                .map_err(|e| write_error(&temp_path, e))?;
        } else {
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    StorageError::new(StorageErrorKind::DirectoryCreation(format!(
                        "{}: {}",
                        parent.display(),
                        e
                    )))
                })?;
            }
            tokio::fs::rename(&temp_path, &path).await.map_err(|e| {
                StorageError::new(StorageErrorKind::FileWrite(format!(
                    "rename {} to {}: {}",
                    temp_path.display(),
                    path.display(),
                    e
                )))
            })?;

            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                tokio::fs::set_permissions(&path, std::fs::Permissions::from_mode(self.perms))
                    .await
                    .map_err(|e| {
                        StorageError::new(StorageErrorKind::PermissionDenied(format!(
                            "{}: {}",
                            path.display(),
                            e
                        )))
                    })?;
            }
        }

        tracing::info!(path = %path.display(), "Finalized filesystem upload");
        Ok(FinalizedBytes::stored(BackendRef::Path { path: relative }))
    }

    #[tracing::instrument(skip(self, session), fields(upload_id = %session.id()))]
    async fn cancel_upload(&self, session: &mut UploadSession) -> AssetstoreResult<()> {
        if let Continuation::Filesystem { temp_path } = session.continuation() {
            match tokio::fs::remove_file(temp_path).await {
                Ok(()) => tracing::debug!(path = %temp_path.display(), "Removed temp file"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(write_error(temp_path, e).into()),
            }
        }
        session.set_continuation(Continuation::None);
        Ok(())
    }

    #[tracing::instrument(skip(self, file), fields(file_id = %file.id))]
    async fn open_for_read(
        &self,
        file: &File,
        range: Option<ByteRange>,
    ) -> AssetstoreResult<ByteStream> {
        let path = match self.resolve(file)? {
            Some(path) => path,
            None => return Ok(futures::stream::empty().boxed()),
        };

        let mut handle = tokio::fs::File::open(&path)
            .await
            .map_err(|e| read_error(&path, e))?;
        let size = handle
            .metadata()
            .await
            .map_err(|e| read_error(&path, e))?
            .len();
        let (start, end) = range.unwrap_or(ByteRange::from(0)).clamp(size);
        handle
            .seek(std::io::SeekFrom::Start(start))
            .await
            .map_err(|e| read_error(&path, e))?;

        let error_path = path.clone();
        Ok(ReaderStream::new(handle.take(end - start))
            .map_err(move |e| AssetstoreError::from(read_error(&error_path, e)))
            .boxed())
    }

    #[tracing::instrument(skip(self, file), fields(file_id = %file.id))]
    async fn delete_bytes(&self, file: &File) -> AssetstoreResult<()> {
        let Some(path) = self.resolve(file)? else {
            return Ok(());
        };
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                tracing::info!(path = %path.display(), "Deleted file bytes");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "File bytes already gone");
                Ok(())
            }
            Err(e) => Err(write_error(&path, e).into()),
        }
    }

    async fn bytes_exist(&self, file: &File) -> AssetstoreResult<bool> {
        match self.resolve(file)? {
            None => Ok(true),
            Some(path) => Ok(tokio::fs::try_exists(&path).await.unwrap_or(false)),
        }
    }

    #[tracing::instrument(skip(self))]
    async fn stat_namespace(&self, path: &str) -> AssetstoreResult<NamespaceEntry> {
        Self::entry(Path::new(path))
            .await?
            .ok_or_else(|| NotFoundError::new(format!("Not found: {}.", path)).into())
    }

    #[tracing::instrument(skip(self))]
    async fn list_namespace(&self, path: &str) -> AssetstoreResult<Vec<NamespaceEntry>> {
        let dir = Path::new(path);
        let mut reader = tokio::fs::read_dir(dir).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                NotFoundError::new(format!("Not found: {}.", path)).into()
            } else {
                AssetstoreError::from(read_error(dir, e))
            }
        })?;

        let mut entries = Vec::new();
        while let Some(child) = reader.next_entry().await.map_err(|e| read_error(dir, e))? {
            if let Some(entry) = Self::entry(&child.path()).await? {
                entries.push(entry);
            }
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }
}
