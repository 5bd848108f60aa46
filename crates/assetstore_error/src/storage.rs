//! Errors raised while moving bytes in and out of an Assetstore backend.

/// What went wrong while touching backend bytes.
///
/// The payload names the path, key or chunk involved, plus any cause the
/// backend reported.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StorageErrorKind {
    /// A content-addressed or temporary directory could not be made.
    DirectoryCreation(String),
    /// Bytes could not be written to the backend.
    FileWrite(String),
    /// Bytes could not be read back.
    FileRead(String),
    /// The referenced path, key or chunk set does not exist.
    NotFound(String),
    /// The backend refused access.
    PermissionDenied(String),
    /// The backend replied in a way the driver does not understand.
    UnexpectedResponse(String),
}

impl StorageErrorKind {
    /// Short name of the failed operation, used as the message prefix.
    pub fn operation(&self) -> &'static str {
        match self {
            Self::DirectoryCreation(_) => "mkdir",
            Self::FileWrite(_) => "write",
            Self::FileRead(_) => "read",
            Self::NotFound(_) => "lookup",
            Self::PermissionDenied(_) => "access",
            Self::UnexpectedResponse(_) => "request",
        }
    }

    /// The path, key or backend message carried by this kind.
    pub fn detail(&self) -> &str {
        match self {
            Self::DirectoryCreation(s)
            | Self::FileWrite(s)
            | Self::FileRead(s)
            | Self::NotFound(s)
            | Self::PermissionDenied(s)
            | Self::UnexpectedResponse(s) => s,
        }
    }
}

impl std::fmt::Display for StorageErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(what) => write!(f, "lookup failed, no bytes at {what}"),
            Self::PermissionDenied(what) => write!(f, "access denied: {what}"),
            other => write!(f, "{} failed: {}", other.operation(), other.detail()),
        }
    }
}

/// A backend byte operation failed.
///
/// ```
/// use assetstore_error::{StorageError, StorageErrorKind};
///
/// let err = StorageError::new(StorageErrorKind::NotFound("ab/cd/abcd".into()));
/// assert_eq!(err.kind.operation(), "lookup");
/// assert!(err.to_string().contains("no bytes at ab/cd/abcd"));
/// ```
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("Storage: {} ({}:{})", kind, file, line)]
pub struct StorageError {
    /// Which operation failed, and on what.
    pub kind: StorageErrorKind,
    /// Source line of the caller.
    pub line: u32,
    /// Source file of the caller.
    pub file: &'static str,
}

impl StorageError {
    /// Wrap `kind`, recording the caller's location.
    #[track_caller]
    pub fn new(kind: StorageErrorKind) -> Self {
        let caller = std::panic::Location::caller();
        Self {
            kind,
            line: caller.line(),
            file: caller.file(),
        }
    }
}
