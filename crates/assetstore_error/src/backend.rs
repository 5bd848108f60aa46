//! Unreachable storage backends.

/// The backend behind an Assetstore did not answer.
///
/// Listing and describing Assetstores never raise this; byte operations
/// (upload, download, delete, move, import, scan) do.
///
/// ```
/// use assetstore_error::BackendUnavailableError;
///
/// let err = BackendUnavailableError::new("Replica Set", "no reachable members");
/// assert_eq!(err.backend, "Replica Set");
/// assert!(err.to_string().starts_with("Replica Set is unavailable: no reachable"));
/// ```
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("{} is unavailable: {} ({}:{})", backend, message, file, line)]
pub struct BackendUnavailableError {
    /// Assetstore name, or the bucket/database when no name is known.
    pub backend: String,
    /// Driver-reported cause.
    pub message: String,
    /// Source line of the caller.
    pub line: u32,
    /// Source file of the caller.
    pub file: &'static str,
}

impl BackendUnavailableError {
    /// Report `backend` as unreachable, located at the caller.
    #[track_caller]
    pub fn new(backend: impl Into<String>, message: impl Into<String>) -> Self {
        let caller = std::panic::Location::caller();
        Self {
            backend: backend.into(),
            message: message.into(),
            line: caller.line(),
            file: caller.file(),
        }
    }
}
