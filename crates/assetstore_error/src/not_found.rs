//! Lookups that came back empty.

/// A path, prefix, Assetstore, File or upload session that does not exist.
///
/// ```
/// use assetstore_error::NotFoundError;
///
/// let err = NotFoundError::new("Not found: /nonexistent/dir.");
/// assert_eq!(err.message, "Not found: /nonexistent/dir.");
/// ```
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("{} ({}:{})", message, file, line)]
pub struct NotFoundError {
    /// What was looked for.
    pub message: String,
    /// Source line of the caller.
    pub line: u32,
    /// Source file of the caller.
    pub file: &'static str,
}

impl NotFoundError {
    /// Report a missing resource, located at the caller.
    #[track_caller]
    pub fn new(message: impl Into<String>) -> Self {
        let caller = std::panic::Location::caller();
        Self {
            message: message.into(),
            line: caller.line(),
            file: caller.file(),
        }
    }
}
