//! Store configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Options for opening a local store.
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Path of the store file. `None` keeps the store in memory.
    pub path: Option<PathBuf>,
    /// How long a writer waits for the single-writer lock before the
    /// attempt fails with a write conflict.
    pub write_lock_timeout: Duration,
}

impl StoreOptions {
    /// Options for an in-memory store.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            write_lock_timeout: Duration::from_secs(5),
        }
    }

    /// Options for a file-backed store.
    pub fn at_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::in_memory()
        }
    }

    /// Sets the writer lock timeout.
    pub fn with_write_lock_timeout(mut self, timeout: Duration) -> Self {
        self.write_lock_timeout = timeout;
        self
    }
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self::in_memory()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder() {
        let options = StoreOptions::at_path("/tmp/rollbook.db")
            .with_write_lock_timeout(Duration::from_millis(50));
        assert!(options.path.is_some());
        assert_eq!(options.write_lock_timeout, Duration::from_millis(50));
    }

    #[test]
    fn default_is_in_memory() {
        assert!(StoreOptions::default().path.is_none());
    }
}
