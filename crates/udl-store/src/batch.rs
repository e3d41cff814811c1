//! Atomic write batches and the undo journal.
//!
//! A [`JournaledBatch`] collects writes against a reader and remembers, for
//! every key it touches, the value that key held before. Finishing it yields
//! the forward [`WriteBatch`] and an [`UndoLog`] that restores the prior
//! state when written back.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use udl_crypto::codec;

use crate::error::StoreResult;
use crate::traits::KvRead;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BatchOp {
    Put { key: Vec<u8>, value: Vec<u8> },
    Delete { key: Vec<u8> },
}

impl BatchOp {
    pub fn key(&self) -> &[u8] {
        match self {
            BatchOp::Put { key, .. } | BatchOp::Delete { key } => key,
        }
    }
}

/// Ordered list of mutations applied atomically by [`KvStore::write`](crate::KvStore::write).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WriteBatch {
    ops: Vec<BatchOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.ops.push(BatchOp::Put { key, value });
    }

    pub fn delete(&mut self, key: Vec<u8>) {
        self.ops.push(BatchOp::Delete { key });
    }

    pub fn put_encoded<T: Serialize + ?Sized>(&mut self, key: Vec<u8>, value: &T) -> StoreResult<()> {
        self.put(key, codec::encode(value)?);
        Ok(())
    }

    /// Append every operation of `other` after this batch's own.
    pub fn extend(&mut self, other: WriteBatch) {
        self.ops.extend(other.ops);
    }

    pub fn ops(&self) -> &[BatchOp] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<BatchOp> {
        self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Prior values of every key a batch overwrote. `None` means the key did
/// not exist.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UndoLog {
    entries: Vec<(Vec<u8>, Option<Vec<u8>>)>,
}

impl UndoLog {
    pub fn entries(&self) -> &[(Vec<u8>, Option<Vec<u8>>)] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// A batch that puts every key back to its recorded prior value.
    pub fn restore_batch(&self) -> WriteBatch {
        let mut batch = WriteBatch::new();
        for (key, prior) in &self.entries {
            match prior {
                Some(value) => batch.put(key.clone(), value.clone()),
                None => batch.delete(key.clone()),
            }
        }
        batch
    }
}

/// Write batch that journals prior values as it goes.
///
/// Reads through [`JournaledBatch::get`] see the batch's own pending writes.
pub struct JournaledBatch<'a, R: KvRead + ?Sized> {
    reader: &'a R,
    pending: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
    prior: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
}

impl<'a, R: KvRead + ?Sized> JournaledBatch<'a, R> {
    pub fn new(reader: &'a R) -> Self {
        Self {
            reader,
            pending: BTreeMap::new(),
            prior: BTreeMap::new(),
        }
    }

    pub fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        match self.pending.get(key) {
            Some(value) => Ok(value.clone()),
            None => self.reader.get(key),
        }
    }

    pub fn put(&mut self, key: Vec<u8>, value: Vec<u8>) -> StoreResult<()> {
        self.record_prior(&key)?;
        self.pending.insert(key, Some(value));
        Ok(())
    }

    pub fn put_encoded<T: Serialize + ?Sized>(&mut self, key: Vec<u8>, value: &T) -> StoreResult<()> {
        let bytes = codec::encode(value)?;
        self.put(key, bytes)
    }

    pub fn delete(&mut self, key: Vec<u8>) -> StoreResult<()> {
        self.record_prior(&key)?;
        self.pending.insert(key, None);
        Ok(())
    }

    fn record_prior(&mut self, key: &[u8]) -> StoreResult<()> {
        if !self.prior.contains_key(key) {
            let value = self.reader.get(key)?;
            self.prior.insert(key.to_vec(), value);
        }
        Ok(())
    }

    /// The forward batch and the journal that reverses it. Writes that leave
    /// a key unchanged are dropped from both.
    pub fn finish(self) -> (WriteBatch, UndoLog) {
        let mut batch = WriteBatch::new();
        let mut undo = UndoLog::default();
        for (key, value) in self.pending {
            let prior = self.prior.get(&key).cloned().flatten();
            if prior == value {
                continue;
            }
            match value {
                Some(v) => batch.put(key.clone(), v),
                None => batch.delete(key.clone()),
            }
            undo.entries.push((key, prior));
        }
        (batch, undo)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryKvStore;
    use crate::traits::KvStore;

    fn seeded() -> InMemoryKvStore {
        let store = InMemoryKvStore::new();
        let mut batch = WriteBatch::new();
        batch.put(b"a".to_vec(), b"1".to_vec());
        batch.put(b"b".to_vec(), b"2".to_vec());
        store.write(batch).unwrap();
        store
    }

    #[test]
    fn journal_restores_prior_state() {
        let store = seeded();
        let before = store.snapshot().unwrap();

        let mut journaled = JournaledBatch::new(&store);
        journaled.put(b"a".to_vec(), b"10".to_vec()).unwrap();
        journaled.delete(b"b".to_vec()).unwrap();
        journaled.put(b"c".to_vec(), b"3".to_vec()).unwrap();
        let (batch, undo) = journaled.finish();
        store.write(batch).unwrap();

        assert_eq!(store.get(b"a").unwrap(), Some(b"10".to_vec()));
        assert_eq!(store.get(b"b").unwrap(), None);
        assert_eq!(store.get(b"c").unwrap(), Some(b"3".to_vec()));

        store.write(undo.restore_batch()).unwrap();
        assert_eq!(store.snapshot().unwrap(), before);
    }

    #[test]
    fn first_prior_value_wins() {
        let store = seeded();
        let mut journaled = JournaledBatch::new(&store);
        journaled.put(b"a".to_vec(), b"x".to_vec()).unwrap();
        journaled.put(b"a".to_vec(), b"y".to_vec()).unwrap();
        assert_eq!(journaled.get(b"a").unwrap(), Some(b"y".to_vec()));
        let (batch, undo) = journaled.finish();
        assert_eq!(batch.len(), 1);
        assert_eq!(undo.entries(), &[(b"a".to_vec(), Some(b"1".to_vec()))]);
    }

    #[test]
    fn no_op_writes_are_dropped() {
        let store = seeded();
        let mut journaled = JournaledBatch::new(&store);
        journaled.put(b"a".to_vec(), b"1".to_vec()).unwrap();
        journaled.put(b"z".to_vec(), b"0".to_vec()).unwrap();
        journaled.delete(b"z".to_vec()).unwrap();
        let (batch, undo) = journaled.finish();
        assert!(batch.is_empty());
        assert!(undo.is_empty());
    }
}
