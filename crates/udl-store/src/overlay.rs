use std::collections::BTreeMap;

use crate::batch::UndoLog;
use crate::error::StoreResult;
use crate::traits::KvRead;

/// Read-only view of a store with some keys replaced.
///
/// Used to look at the ledger as it was before some canonical units were
/// applied: stacking their undo logs from newest to oldest yields the state
/// below the oldest of them, without touching the store.
pub struct Overlay<'a, R: KvRead + ?Sized> {
    base: &'a R,
    changes: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
}

impl<'a, R: KvRead + ?Sized> Overlay<'a, R> {
    pub fn new(base: &'a R) -> Self {
        Self {
            base,
            changes: BTreeMap::new(),
        }
    }

    /// Rewind the keys touched by `undo`. Apply logs newest first.
    pub fn rewind(&mut self, undo: &UndoLog) {
        for (key, prior) in undo.entries() {
            self.changes.insert(key.clone(), prior.clone());
        }
    }

    pub fn set(&mut self, key: Vec<u8>, value: Option<Vec<u8>>) {
        self.changes.insert(key, value);
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

impl<R: KvRead + ?Sized> KvRead for Overlay<'_, R> {
    fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        match self.changes.get(key) {
            Some(value) => Ok(value.clone()),
            None => self.base.get(key),
        }
    }

    fn scan_prefix(&self, prefix: &[u8]) -> StoreResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> =
            self.base.scan_prefix(prefix)?.into_iter().collect();
        for (key, value) in self
            .changes
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
        {
            match value {
                Some(v) => {
                    merged.insert(key.clone(), v.clone());
                }
                None => {
                    merged.remove(key);
                }
            }
        }
        Ok(merged.into_iter().collect())
    }
}
