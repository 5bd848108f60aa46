//! Rejected administrative input and upload protocol misuse.

/// Bad input or an out-of-protocol request.
///
/// Administrative failures carry the name of the offending field. Protocol
/// misuse, such as an offset query on a chunked direct upload, has none.
///
/// ```
/// use assetstore_error::ValidationError;
///
/// let err = ValidationError::field("bucket", "Bucket must not be empty.");
/// assert_eq!(err.field.as_deref(), Some("bucket"));
/// assert!(err.to_string().starts_with("Invalid bucket: Bucket must not be empty."));
/// ```
#[derive(Debug, Clone, derive_more::Error)]
pub struct ValidationError {
    /// Field the caller should fix, if any.
    pub field: Option<String>,
    /// What is wrong.
    pub message: String,
    /// Source line of the caller.
    pub line: u32,
    /// Source file of the caller.
    pub file: &'static str,
}

impl ValidationError {
    #[track_caller]
    fn located(field: Option<String>, message: String) -> Self {
        let caller = std::panic::Location::caller();
        Self {
            field,
            message,
            line: caller.line(),
            file: caller.file(),
        }
    }

    /// A rejection not tied to one field.
    #[track_caller]
    pub fn new(message: impl Into<String>) -> Self {
        Self::located(None, message.into())
    }

    /// A rejection of `field`.
    #[track_caller]
    pub fn field(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::located(Some(field.into()), message.into())
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.field {
            Some(field) => write!(f, "Invalid {field}: ")?,
            None => f.write_str("Invalid request: ")?,
        }
        write!(f, "{} ({}:{})", self.message, self.file, self.line)
    }
}
