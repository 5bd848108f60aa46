//! Shared error taxonomy for the assetstore crates.
//!
//! Each failure category is a small struct that captures the caller's
//! `file:line` through `#[track_caller]`. Categories with several
//! variants pair the struct with a `*Kind` enum. Everything converts into
//! [`AssetstoreError`], whose accessors expose the machine-readable reason
//! code and offending field used by callers.
//!
//! ```
//! use assetstore_error::{AssetstoreResult, NotFoundError};
//!
//! fn lookup(name: &str) -> AssetstoreResult<u32> {
//!     Err(NotFoundError::new(format!("Assetstore {name}")))?
//! }
//!
//! let err = lookup("Archive").unwrap_err();
//! assert!(err.is_not_found());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod config;
mod conflict;
mod error;
mod not_found;
mod state;
mod storage;
mod validation;

pub use backend::BackendUnavailableError;
pub use config::{ConfigError, ConfigStage};
pub use conflict::ConflictError;
pub use error::{AssetstoreError, AssetstoreErrorKind, AssetstoreResult};
pub use not_found::NotFoundError;
pub use state::{StateError, StateErrorKind};
pub use storage::{StorageError, StorageErrorKind};
pub use validation::ValidationError;
