//! Moving file bytes between Assetstores.

use crate::{UploadService, UploadStart};
use assetstore_core::{AssetstoreId, ChunkPayload, File, FileId, UploadId};
use assetstore_error::{AssetstoreResult, ConflictError, StateError, StateErrorKind};
use assetstore_interface::{MoveDecision, MoveHook, ProgressReporter};
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Copies a file's bytes into another Assetstore and repoints the record.
///
/// The destination is driven through a relay upload that replaces the file's
/// contents, so the record switches Assetstore and backend reference in one
/// write once every byte has landed. Until then the file keeps its original
/// bytes.
#[derive(Clone)]
pub struct FileMover {
    uploads: Arc<UploadService>,
    hooks: Vec<Arc<dyn MoveHook>>,
}

impl FileMover {
    /// Mover driving uploads through `uploads`.
    pub fn new(uploads: Arc<UploadService>) -> Self {
        Self {
            uploads,
            hooks: Vec::new(),
        }
    }

    /// Consult `hook` before every move.
    pub fn with_hook(mut self, hook: Arc<dyn MoveHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    /// Move a file to `destination`.
    ///
    /// Progress reports cumulative bytes against the file size. Triggering
    /// `cancel` abandons the destination upload and leaves the file as it was.
    #[instrument(skip(self, progress, cancel), fields(file = %file_id, destination = %destination))]
    pub async fn move_file(
        &self,
        file_id: FileId,
        destination: AssetstoreId,
        progress: &dyn ProgressReporter,
        cancel: &CancellationToken,
    ) -> AssetstoreResult<File> {
        let registry = self.uploads.registry();
        let file = registry.metadata().load_file(file_id).await?;
        if file.assetstore_id == destination {
            debug!("File already in destination");
            return Ok(file);
        }

        let target = registry.load(destination).await?;
        for hook in &self.hooks {
            if let MoveDecision::Deny(reason) = hook.check(&file, &target) {
                return Err(ConflictError::new(format!(
                    "File {} could not be moved to assetstore {}: {}",
                    file.name, target.name, reason
                ))
                .into());
            }
        }

        let session = match self
            .uploads
            .replace_contents(file.id, file.size, Some(destination))
            .await?
        {
            UploadStart::Complete(moved) => {
                progress.update(0, 0, &moved.name);
                info!(name = %moved.name, "Moved empty file");
                return Ok(moved);
            }
            UploadStart::Receiving(session) => session,
        };
        let upload_id = *session.id();
        let chunk_size = registry.adapter(&target).await?.chunk_size().max(1) as usize;

        let moved = async {
            self.copy(&file, upload_id, chunk_size, progress, cancel)
                .await?;
            Ok(self.uploads.finalize(upload_id).await?.file)
        }
        .await;

        match moved {
            Ok(moved) => {
                info!(name = %moved.name, assetstore = %target.name, "Moved file");
                Ok(moved)
            }
            Err(e) => {
                if let Err(cancel_error) = self.uploads.cancel(upload_id).await {
                    warn!(
                        upload = %upload_id,
                        error = %cancel_error,
                        "Unable to discard destination upload"
                    );
                }
                Err(e)
            }
        }
    }

    async fn copy(
        &self,
        file: &File,
        upload_id: UploadId,
        chunk_size: usize,
        progress: &dyn ProgressReporter,
        cancel: &CancellationToken,
    ) -> AssetstoreResult<()> {
        let registry = self.uploads.registry();
        let source = registry.load(file.assetstore_id).await?;
        let reader = registry.require_adapter(&source).await?;

        let mut stream = reader.open_for_read(file, None).await?;
        let mut buffer = BytesMut::new();
        let mut offset = 0u64;

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(StateError::new(StateErrorKind::Cancelled(format!(
                        "move of {}",
                        file.name
                    )))
                    .into());
                }
                next = stream.next() => next,
            };
            let done = match next {
                Some(chunk) => {
                    buffer.extend_from_slice(&chunk?);
                    false
                }
                None => true,
            };

            while buffer.len() >= chunk_size || (done && !buffer.is_empty()) {
                let take = buffer.len().min(chunk_size);
                let chunk: Bytes = buffer.split_to(take).freeze();
                self.uploads
                    .write_chunk(upload_id, offset, ChunkPayload::Bytes(chunk))
                    .await?;
                offset += take as u64;
                progress.update(offset, file.size, &file.name);
            }
            if done {
                break;
            }
        }

        if offset != file.size {
            return Err(StateError::new(StateErrorKind::Incomplete {
                received: offset,
                size: file.size,
            })
            .into());
        }
        Ok(())
    }
}
