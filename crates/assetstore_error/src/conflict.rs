//! Requests that clash with what already exists.

/// Deleting a non-empty Assetstore, reusing an Assetstore name, or a move
/// vetoed by a policy hook.
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("Conflict: {} ({}:{})", message, file, line)]
pub struct ConflictError {
    /// Description of the clash.
    pub message: String,
    /// Source line of the caller.
    pub line: u32,
    /// Source file of the caller.
    pub file: &'static str,
}

impl ConflictError {
    /// Report a conflict located at the caller.
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
