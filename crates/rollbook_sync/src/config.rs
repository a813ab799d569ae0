//! Synchronizer configuration.

/// Configuration for sync passes.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Maximum number of records per `push_batch` call. A pass always
    /// drains the full pending set, in as many batches as needed.
    pub push_batch_size: usize,
}

impl SyncConfig {
    /// Creates the default configuration.
    pub fn new() -> Self {
        Self {
            push_batch_size: 200,
        }
    }

    /// Sets the push batch size (minimum 1).
    pub fn with_push_batch_size(mut self, size: usize) -> Self {
        self.push_batch_size = size.max(1);
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}
