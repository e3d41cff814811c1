use crate::batch::WriteBatch;
use crate::error::StoreResult;

/// Read side of a byte-oriented key-value store.
///
/// Implemented by real backends and by read-only [`Overlay`](crate::Overlay)
/// views stacked on top of them.
pub trait KvRead {
    /// Returns `Ok(None)` if the key does not exist.
    fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>>;

    /// Read several keys at once, in order.
    ///
    /// Default implementation calls `get()` for each key. Backends may
    /// override for fewer I/O round-trips.
    fn get_many(&self, keys: &[Vec<u8>]) -> StoreResult<Vec<Option<Vec<u8>>>> {
        keys.iter().map(|key| self.get(key)).collect()
    }

    fn contains(&self, key: &[u8]) -> StoreResult<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// All entries whose key starts with `prefix`, in key order.
    fn scan_prefix(&self, prefix: &[u8]) -> StoreResult<Vec<(Vec<u8>, Vec<u8>)>>;
}

/// A persistent key-value store with atomic batch writes.
///
/// Every mutation goes through [`KvStore::write`]: either the whole batch
/// lands or none of it does.
pub trait KvStore: KvRead + Send + Sync {
    fn write(&self, batch: WriteBatch) -> StoreResult<()>;
}
