//! Top-level error wrapper types.

use crate::{
    BackendUnavailableError, ConfigError, ConflictError, NotFoundError, StateError, StorageError,
    ValidationError,
};

/// Every failure an assetstore operation can report.
///
/// # Examples
///
/// ```
/// use assetstore_error::{AssetstoreError, ConflictError};
///
/// let err: AssetstoreError = ConflictError::new("duplicate name").into();
/// assert!(format!("{}", err).contains("Conflict"));
/// ```
#[derive(Debug, derive_more::From, derive_more::Display, derive_more::Error)]
pub enum AssetstoreErrorKind {
    /// Bad configuration or bad protocol usage
    #[from(ValidationError)]
    Validation(ValidationError),
    /// Referenced resource does not exist
    #[from(NotFoundError)]
    NotFound(NotFoundError),
    /// Operation conflicts with existing state
    #[from(ConflictError)]
    Conflict(ConflictError),
    /// Backend could not be reached
    #[from(BackendUnavailableError)]
    BackendUnavailable(BackendUnavailableError),
    /// Upload state machine violation
    #[from(StateError)]
    State(StateError),
    /// Local storage I/O failure
    #[from(StorageError)]
    Storage(StorageError),
    /// Settings could not be loaded
    #[from(ConfigError)]
    Config(ConfigError),
}

/// Assetstore error with kind discrimination.
///
/// # Examples
///
/// ```
/// use assetstore_error::{AssetstoreResult, ValidationError};
///
/// fn check_perms() -> AssetstoreResult<()> {
///     Err(ValidationError::field("perms", "File permissions must be an octal integer."))?
/// }
///
/// let err = check_perms().unwrap_err();
/// assert_eq!(err.field(), Some("perms"));
/// ```
#[derive(Debug, derive_more::Display, derive_more::Error)]
#[display("Assetstore Error: {}", _0)]
pub struct AssetstoreError(Box<AssetstoreErrorKind>);

impl AssetstoreError {
    /// Create a new error from a kind.
    pub fn new(kind: AssetstoreErrorKind) -> Self {
        Self(Box::new(kind))
    }

    /// Get the error kind.
    pub fn kind(&self) -> &AssetstoreErrorKind {
        &self.0
    }

    /// Offending field of a validation failure, if any.
    pub fn field(&self) -> Option<&str> {
        match self.kind() {
            AssetstoreErrorKind::Validation(e) => e.field.as_deref(),
            _ => None,
        }
    }

    /// Stable reason code of an upload protocol violation, if any.
    pub fn reason_code(&self) -> Option<&'static str> {
        match self.kind() {
            AssetstoreErrorKind::State(e) => Some(e.code()),
            _ => None,
        }
    }

    /// Whether the failure is a backend connectivity problem.
    pub fn is_backend_unavailable(&self) -> bool {
        matches!(self.kind(), AssetstoreErrorKind::BackendUnavailable(_))
    }

    /// Whether the failure is a missing resource.
    pub fn is_not_found(&self) -> bool {
        matches!(self.kind(), AssetstoreErrorKind::NotFound(_))
    }
}

// Generic From implementation for any type that converts to AssetstoreErrorKind
impl<T> From<T> for AssetstoreError
where
    T: Into<AssetstoreErrorKind>,
{
    fn from(err: T) -> Self {
        Self::new(err.into())
    }
}

/// Result type for assetstore operations.
pub type AssetstoreResult<T> = std::result::Result<T, AssetstoreError>;
