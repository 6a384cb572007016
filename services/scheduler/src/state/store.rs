//! Durable blob storage for state snapshots.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use bytes::Bytes;
use parking_lot::RwLock;
use thiserror::Error;
use tracing::debug;

/// Errors from state store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("state store unavailable: {0}")]
    Unavailable(String),
}

/// Holds the latest snapshot blob under a single key.
///
/// Implementations only need last-writer-wins semantics.
pub trait StateStore: Send + Sync {
    fn store(&self, blob: &[u8]) -> Result<(), StoreError>;

    /// The latest blob, or `None` if nothing was ever stored.
    fn load(&self) -> Result<Option<Bytes>, StoreError>;
}

/// In-memory state store (for testing).
#[derive(Default)]
pub struct MemoryStateStore {
    blob: RwLock<Option<Bytes>>,
    writes: AtomicUsize,
    fail_writes: AtomicBool,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store pre-loaded with a blob.
    pub fn with_blob(blob: impl Into<Bytes>) -> Self {
        let store = Self::new();
        *store.blob.write() = Some(blob.into());
        store
    }

    /// Makes every subsequent write fail.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of successful writes.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn blob(&self) -> Option<Bytes> {
        self.blob.read().clone()
    }
}

impl StateStore for MemoryStateStore {
    fn store(&self, blob: &[u8]) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(
                "memory store configured to fail writes".to_string(),
            ));
        }
        *self.blob.write() = Some(Bytes::copy_from_slice(blob));
        self.writes.fetch_add(1, Ordering::SeqCst);
        debug!(bytes = blob.len(), "Stored state blob");
        Ok(())
    }

    fn load(&self) -> Result<Option<Bytes>, StoreError> {
        Ok(self.blob.read().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_write_wins() {
        let store = MemoryStateStore::new();
        assert!(store.load().unwrap().is_none());

        store.store(b"one").unwrap();
        store.store(b"two").unwrap();
        assert_eq!(store.load().unwrap().as_deref(), Some(&b"two"[..]));
        assert_eq!(store.write_count(), 2);
    }

    #[test]
    fn test_failing_writes_keep_previous_blob() {
        let store = MemoryStateStore::with_blob(&b"kept"[..]);
        store.set_fail_writes(true);
        assert!(matches!(store.store(b"lost"), Err(StoreError::Unavailable(_))));
        assert_eq!(store.blob().as_deref(), Some(&b"kept"[..]));
        assert_eq!(store.write_count(), 0);
    }
}
