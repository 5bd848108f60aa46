//! Trait definitions for the assetstore abstraction.
//!
//! This crate defines the seams between the engines and their
//! collaborators: backend adapters, the metadata store, progress reporting
//! and move veto hooks.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod adapter;
mod hook;
mod memory;
mod metadata;
mod progress;

pub use adapter::{AssetstoreAdapter, ByteStream, FinalizedBytes, NamespaceEntry, NamespaceKind};
pub use hook::{MoveDecision, MoveHook};
pub use memory::InMemoryMetadataStore;
pub use metadata::MetadataStore;
pub use progress::{NoProgress, ProgressReporter, ProgressUpdate, RecordingProgress};
