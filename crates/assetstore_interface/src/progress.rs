//! Progress reporting for long-running operations.

use std::sync::{Arc, Mutex};

/// Receives `{current, total}` updates from moves, imports and scans.
pub trait ProgressReporter: Send + Sync {
    /// Report progress. `total` is zero when unknown.
    fn update(&self, current: u64, total: u64, message: &str);
}

/// Discards every update.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn update(&self, _current: u64, _total: u64, _message: &str) {}
}

/// One recorded progress update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressUpdate {
    /// Units done
    pub current: u64,
    /// Units expected
    pub total: u64,
    /// Free-form message
    pub message: String,
}

/// Keeps every update, for inspection after the operation.
#[derive(Debug, Clone, Default)]
pub struct RecordingProgress {
    updates: Arc<Mutex<Vec<ProgressUpdate>>>,
}

impl RecordingProgress {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Updates received so far.
    pub fn updates(&self) -> Vec<ProgressUpdate> {
        self.updates
            .lock()
            .map(|updates| updates.clone())
            .unwrap_or_default()
    }

    /// Most recent update.
    pub fn last(&self) -> Option<ProgressUpdate> {
        self.updates().pop()
    }
}

impl ProgressReporter for RecordingProgress {
    fn update(&self, current: u64, total: u64, message: &str) {
        if let Ok(mut updates) = self.updates.lock() {
            updates.push(ProgressUpdate {
                current,
                total,
                message: message.to_string(),
            });
        }
    }
}
