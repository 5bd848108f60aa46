//! Upload state machine violations.

/// Specific protocol violations of the chunked upload state machine.
#[derive(Debug, Clone, PartialEq, Eq, Hash, derive_more::Display)]
pub enum StateErrorKind {
    /// Chunk offset does not match the bytes received so far
    #[display("Chunk offset {} does not match received byte count {}", offset, received)]
    WrongOffset {
        /// Offset supplied by the caller
        offset: u64,
        /// Bytes received so far
        received: u64,
    },
    /// Chunk would grow the upload past its declared size
    #[display("Chunk of {} bytes exceeds the {} bytes remaining", length, remaining)]
    ChunkExceedsSize {
        /// Length of the rejected chunk
        length: u64,
        /// Bytes still expected
        remaining: u64,
    },
    /// Finalize was requested before every byte arrived
    #[display("Upload incomplete: received {} of {} bytes", received, size)]
    Incomplete {
        /// Bytes received so far
        received: u64,
        /// Declared size
        size: u64,
    },
    /// The operation is not legal in the session's current state
    #[display("Cannot {} an upload in state {}", operation, state)]
    InvalidState {
        /// Operation attempted
        operation: String,
        /// Current state of the session
        state: String,
    },
    /// Another writer holds the session
    #[display("Upload {} is busy with another chunk write", _0)]
    Busy(String),
    /// The operation was cancelled by an external signal
    #[display("Operation cancelled: {}", _0)]
    Cancelled(String),
    /// The session continuation belongs to another backend
    #[display("Upload continuation does not belong to a {} assetstore", _0)]
    ContinuationMismatch(String),
}

impl StateErrorKind {
    /// Stable machine-checkable reason code.
    pub fn code(&self) -> &'static str {
        match self {
            StateErrorKind::WrongOffset { .. } => "wrong_offset",
            StateErrorKind::ChunkExceedsSize { .. } => "chunk_exceeds_size",
            StateErrorKind::Incomplete { .. } => "upload_incomplete",
            StateErrorKind::InvalidState { .. } => "invalid_state",
            StateErrorKind::Busy(_) => "upload_busy",
            StateErrorKind::Cancelled(_) => "cancelled",
            StateErrorKind::ContinuationMismatch(_) => "continuation_mismatch",
        }
    }
}

/// Upload protocol error with location tracking.
///
/// # Examples
///
/// ```
/// use assetstore_error::{StateError, StateErrorKind};
///
/// let err = StateError::new(StateErrorKind::WrongOffset { offset: 3, received: 5 });
/// assert_eq!(err.code(), "wrong_offset");
/// ```
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("State Error: {} at line {} in {}", kind, line, file)]
pub struct StateError {
    /// The kind of violation
    pub kind: StateErrorKind,
    /// Line number where error was created
    pub line: u32,
    /// File where error was created
    pub file: &'static str,
}

impl StateError {
    /// Create a new state error with automatic location tracking.
    #[track_caller]
    pub fn new(kind: StateErrorKind) -> Self {
        let location = std::panic::Location::caller();
        Self {
            kind,
            line: location.line(),
            file: location.file(),
        }
    }

    /// Stable reason code of the underlying kind.
    pub fn code(&self) -> &'static str {
        self.kind.code()
    }
}
