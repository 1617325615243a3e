use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::IngestError;

/// Options for ingestion.
#[derive(Debug, Clone)]
pub struct IngestOptions {
    /// Maximum decompressed size of a single archive entry (default: 256 MiB).
    pub max_entry_size: u64,
    /// Maximum number of entries in one archive (default: 100 000).
    pub max_entries: usize,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            max_entry_size: 256 * 1024 * 1024,
            max_entries: 100_000,
        }
    }
}

impl IngestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_entry_size(mut self, bytes: u64) -> Self {
        self.max_entry_size = bytes;
        self
    }

    pub fn with_max_entries(mut self, entries: usize) -> Self {
        self.max_entries = entries;
        self
    }
}

/// Cooperative cancellation flag, checked between stages and entries.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// Fail with [`IngestError::Cancelled`] once cancellation was requested.
    pub fn check(&self) -> Result<(), IngestError> {
        if self.is_cancelled() {
            Err(IngestError::Cancelled)
        } else {
            Ok(())
        }
    }
}
