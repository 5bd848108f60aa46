//! Downloads, reads and deletes of file records.

use crate::AssetstoreRegistry;
use assetstore_core::{ByteRange, ContentDisposition, File, FileFilter, FileId};
use assetstore_error::AssetstoreResult;
use assetstore_interface::{AssetstoreAdapter, ByteStream};
use futures::StreamExt;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// How a download is served.
pub enum Download {
    /// Send the client to a backend URL
    Redirect(String),
    /// Stream the bytes through the caller
    Stream {
        /// File contents, restricted to the requested range
        stream: ByteStream,
        /// Bytes the stream yields
        length: u64,
        /// `Content-Disposition` header value
        disposition: String,
    },
}

impl std::fmt::Debug for Download {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Download::Redirect(url) => f.debug_tuple("Redirect").field(url).finish(),
            Download::Stream {
                length,
                disposition,
                ..
            } => f
                .debug_struct("Stream")
                .field("length", length)
                .field("disposition", disposition)
                .finish_non_exhaustive(),
        }
    }
}

/// Serves and removes file bytes through the owning Assetstore's adapter.
#[derive(Clone)]
pub struct FileService {
    registry: Arc<AssetstoreRegistry>,
}

impl FileService {
    /// Service backed by a registry.
    pub fn new(registry: Arc<AssetstoreRegistry>) -> Self {
        Self { registry }
    }

    /// Download a file.
    ///
    /// Whole-file downloads redirect when the backend can serve the bytes
    /// itself; ranged downloads always stream.
    #[instrument(skip(self), fields(file = %file_id))]
    pub async fn download(
        &self,
        file_id: FileId,
        range: Option<ByteRange>,
        disposition: ContentDisposition,
    ) -> AssetstoreResult<Download> {
        let file = self.registry.metadata().load_file(file_id).await?;
        let store = self.registry.load(file.assetstore_id).await?;
        let adapter = self.registry.require_adapter(&store).await?;

        if range.is_none()
            && let Some(url) = adapter.download_url(&file, disposition).await?
        {
            debug!("Redirecting download");
            return Ok(Download::Redirect(url));
        }

        let (start, end) = range.unwrap_or(ByteRange::from(0)).clamp(file.size);
        let stream = open_range(adapter.as_ref(), &file, range).await?;
        Ok(Download::Stream {
            stream,
            length: end - start,
            disposition: disposition.header_value(&file.name),
        })
    }

    /// Stream a file's bytes.
    #[instrument(skip(self), fields(file = %file_id))]
    pub async fn read(
        &self,
        file_id: FileId,
        range: Option<ByteRange>,
    ) -> AssetstoreResult<ByteStream> {
        let file = self.registry.metadata().load_file(file_id).await?;
        let store = self.registry.load(file.assetstore_id).await?;
        let adapter = self.registry.require_adapter(&store).await?;
        open_range(adapter.as_ref(), &file, range).await
    }

    /// Delete a file record and, unless imported or shared, its bytes.
    ///
    /// Imported and zero-byte files never touch the backend, so they can be
    /// deleted while it is unreachable.
    #[instrument(skip(self), fields(file = %file_id))]
    pub async fn delete(&self, file_id: FileId) -> AssetstoreResult<()> {
        let metadata = self.registry.metadata();
        let file = metadata.load_file(file_id).await?;

        release_bytes(&self.registry, &file, Some(file.id)).await?;
        metadata.remove_file(file.id).await?;

        if let Some(item_id) = file.item_id {
            match metadata.load_item(item_id).await {
                Ok(mut item) => {
                    item.size = item.size.saturating_sub(file.size);
                    metadata.update_item(&item).await?;
                }
                Err(e) => warn!(item = %item_id, error = %e, "Owning item is gone"),
            }
        }

        info!(name = %file.name, imported = file.imported, "Deleted file");
        Ok(())
    }
}

/// Open `range` of a file, skipping the backend when the range is empty.
async fn open_range(
    adapter: &dyn AssetstoreAdapter,
    file: &File,
    range: Option<ByteRange>,
) -> AssetstoreResult<ByteStream> {
    match range {
        Some(range) if range.is_empty_for(file.size) => {
            debug!(start = range.start, "Empty range requested");
            Ok(futures::stream::empty().boxed())
        }
        _ => adapter.open_for_read(file, range).await,
    }
}

/// Delete the bytes behind `file` unless they must be kept.
///
/// Bytes survive when the file was imported, has no bytes, or when any record
/// other than `ignore` still references the same location.
pub(crate) async fn release_bytes(
    registry: &AssetstoreRegistry,
    file: &File,
    ignore: Option<FileId>,
) -> AssetstoreResult<()> {
    if file.imported || file.backend.is_empty() {
        return Ok(());
    }

    let sharing = registry
        .metadata()
        .list_files(
            &FileFilter::default()
                .assetstore(file.assetstore_id)
                .backend(file.backend.clone()),
        )
        .await?;
    if sharing.iter().any(|other| Some(other.id) != ignore) {
        debug!(name = %file.name, "Bytes still referenced, keeping them");
        return Ok(());
    }

    let adapter = registry.adapter_for(file.assetstore_id).await?;
    adapter.delete_bytes(file).await
}
