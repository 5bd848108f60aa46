//! Audit of file records whose bytes have vanished.

use crate::AssetstoreRegistry;
use assetstore_core::{AssetstoreId, File, FileFilter};
use assetstore_error::AssetstoreResult;
use assetstore_interface::ProgressReporter;
use async_stream::try_stream;
use futures::stream::{BoxStream, StreamExt};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Why a file failed the audit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum InvalidReason {
    /// The backend reference no longer resolves
    #[display("missing")]
    Missing,
    /// The backend failed to answer for this file
    #[display("unchecked")]
    Unchecked,
}

/// A file whose bytes could not be found.
#[derive(Debug, Clone, PartialEq)]
pub struct InvalidFile {
    /// The offending record
    pub file: File,
    /// What is wrong with it
    pub reason: InvalidReason,
}

/// Stream of audit findings.
pub type InvalidFileStream = BoxStream<'static, AssetstoreResult<InvalidFile>>;

/// Read-only integrity audit of an Assetstore.
#[derive(Clone)]
pub struct IntegrityScanner {
    registry: Arc<AssetstoreRegistry>,
}

impl IntegrityScanner {
    /// Scanner backed by a registry.
    pub fn new(registry: Arc<AssetstoreRegistry>) -> Self {
        Self { registry }
    }

    /// Lazily yield the files of an Assetstore whose bytes are gone.
    ///
    /// Candidates are the records matching `filter` at the time the scan
    /// starts; the Assetstore criterion of the filter is always overridden.
    /// Zero-byte files are always valid. A file the backend fails to answer
    /// for is reported as [`InvalidReason::Unchecked`] and the scan goes on.
    /// Progress counts checked candidates.
    pub fn find_invalid_files(
        &self,
        assetstore_id: AssetstoreId,
        filter: FileFilter,
        progress: Arc<dyn ProgressReporter>,
    ) -> InvalidFileStream {
        let registry = self.registry.clone();
        try_stream! {
            let store = registry.load(assetstore_id).await?;
            let adapter = registry.require_adapter(&store).await?;
            let candidates = registry
                .metadata()
                .list_files(&filter.assetstore(assetstore_id))
                .await?;
            let total = candidates.len() as u64;
            let mut missing = 0u64;
            let mut unchecked = 0u64;
            progress.update(0, total, &store.name);

            for (checked, file) in candidates.into_iter().enumerate() {
                let reason = if file.size == 0 || file.backend.is_empty() {
                    None
                } else {
                    match adapter.bytes_exist(&file).await {
                        Ok(true) => None,
                        Ok(false) => {
                            debug!(file = %file.id, name = %file.name, "Bytes missing");
                            missing += 1;
                            Some(InvalidReason::Missing)
                        }
                        Err(e) => {
                            warn!(file = %file.id, name = %file.name, error = %e, "Unable to check bytes");
                            unchecked += 1;
                            Some(InvalidReason::Unchecked)
                        }
                    }
                };
                progress.update(checked as u64 + 1, total, &file.name);
                if let Some(reason) = reason {
                    yield InvalidFile { file, reason };
                }
            }
            info!(assetstore = %store.name, total, missing, unchecked, "Integrity scan finished");
        }
        .boxed()
    }
}
