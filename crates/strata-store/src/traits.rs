use crate::error::StoreResult;

/// Keyed record store.
///
/// All implementations must satisfy these invariants:
/// - The store never interprets record contents; it is a plain key-value store.
/// - `put` on an existing key replaces the record.
/// - Concurrent reads are safe; writes are serialized by the backend.
/// - All I/O errors are propagated, never silently ignored.
pub trait RecordStore: Send + Sync {
    /// Read the record stored under `key`.
    ///
    /// Returns `Ok(None)` if no record exists.
    /// Returns `Err` on I/O failure or data corruption.
    fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Store `bytes` under `key`, replacing any existing record.
    fn put(&self, key: &str, bytes: &[u8]) -> StoreResult<()>;

    /// Check whether a record exists.
    fn exists(&self, key: &str) -> StoreResult<bool>;

    /// Delete a record. Returns `true` if it existed.
    fn delete(&self, key: &str) -> StoreResult<bool>;

    /// All stored keys, sorted.
    fn keys(&self) -> StoreResult<Vec<String>>;

    /// Read several records.
    ///
    /// Default implementation calls `get()` for each key.
    fn get_batch(&self, keys: &[&str]) -> StoreResult<Vec<Option<Vec<u8>>>> {
        keys.iter().map(|key| self.get(key)).collect()
    }
}
