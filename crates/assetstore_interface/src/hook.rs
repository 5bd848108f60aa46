//! Veto hooks consulted before a file changes backend.

use assetstore_core::{Assetstore, File};

/// Outcome of a move check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveDecision {
    /// Let the move proceed
    Allow,
    /// Refuse the move with a reason shown to the caller
    Deny(String),
}

/// Synchronous check run before a file is moved to another Assetstore.
pub trait MoveHook: Send + Sync {
    /// Decide whether `file` may move to `destination`.
    fn check(&self, file: &File, destination: &Assetstore) -> MoveDecision;
}

impl<F> MoveHook for F
where
    F: Fn(&File, &Assetstore) -> MoveDecision + Send + Sync,
{
    fn check(&self, file: &File, destination: &Assetstore) -> MoveDecision {
        self(file, destination)
    }
}
