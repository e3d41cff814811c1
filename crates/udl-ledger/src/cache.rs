use std::num::NonZeroUsize;
use std::sync::Mutex;

use lru::LruCache;
use udl_types::{Hash, Unit};

use crate::error::{LedgerError, LedgerResult};

/// Decoded canonical units by hash.
///
/// Entries are dropped when their unit is reverted, so a hit is always a
/// unit the store still holds.
pub struct UnitCache {
    inner: Option<Mutex<LruCache<Hash, Unit>>>,
}

impl UnitCache {
    /// A capacity of zero disables caching.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: NonZeroUsize::new(capacity).map(|cap| Mutex::new(LruCache::new(cap))),
        }
    }

    pub fn get(&self, hash: &Hash) -> LedgerResult<Option<Unit>> {
        let Some(inner) = &self.inner else {
            return Ok(None);
        };
        let mut cache = inner.lock().map_err(|_| LedgerError::Poisoned)?;
        Ok(cache.get(hash).cloned())
    }

    pub fn insert(&self, unit: Unit) -> LedgerResult<()> {
        if let Some(inner) = &self.inner {
            let mut cache = inner.lock().map_err(|_| LedgerError::Poisoned)?;
            cache.put(unit.hash(), unit);
        }
        Ok(())
    }

    pub fn remove(&self, hash: &Hash) -> LedgerResult<()> {
        if let Some(inner) = &self.inner {
            let mut cache = inner.lock().map_err(|_| LedgerError::Poisoned)?;
            cache.pop(hash);
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.inner
            .as_ref()
            .and_then(|inner| inner.lock().ok().map(|c| c.len()))
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
