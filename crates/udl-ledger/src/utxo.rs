//! Unspent-output accounting.
//!
//! [`UtxoSet`] reads the persisted output set through any [`KvRead`], which
//! may be the store itself or an [`Overlay`](udl_store::Overlay) showing an
//! earlier state. [`UtxoView`] is the in-memory working set a unit is
//! validated and applied against; nothing it holds is visible to others until
//! its changes are written.

use std::collections::{BTreeMap, BTreeSet};

use udl_store::{schema, JournaledBatch, KvRead, KvStore, StoreError, StoreResult};
use udl_types::{script, Address, AssetId, OutPoint, Transaction, TypeResult, Utxo};

/// Working set of outputs: what was fetched, and what it has become.
///
/// `None` means "known not to exist", which is distinct from an out-point the
/// view never looked at.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UtxoView {
    base: BTreeMap<OutPoint, Option<Utxo>>,
    current: BTreeMap<OutPoint, Option<Utxo>>,
    spent: BTreeMap<OutPoint, Utxo>,
}

impl UtxoView {
    pub fn new() -> Self {
        Self::default()
    }

    fn seed(&mut self, out_point: OutPoint, utxo: Option<Utxo>) {
        self.base.insert(out_point, utxo.clone());
        self.current.insert(out_point, utxo);
    }

    /// The unspent output at `out_point`, if the view holds one.
    pub fn get(&self, out_point: &OutPoint) -> Option<&Utxo> {
        self.current.get(out_point).and_then(Option::as_ref)
    }

    /// Whether the view has an answer for `out_point`, found or not.
    pub fn is_fetched(&self, out_point: &OutPoint) -> bool {
        self.current.contains_key(out_point)
    }

    /// Record a newly created output.
    pub fn add(&mut self, out_point: OutPoint, utxo: Utxo) {
        self.base.entry(out_point).or_insert(None);
        self.current.insert(out_point, Some(utxo));
    }

    /// Consume an output, returning it if it was unspent.
    pub fn spend(&mut self, out_point: &OutPoint) -> Option<Utxo> {
        let utxo = self.current.get_mut(out_point)?.take()?;
        self.spent.insert(*out_point, utxo.clone());
        Some(utxo)
    }

    /// An output this view consumed.
    pub fn spent(&self, out_point: &OutPoint) -> Option<&Utxo> {
        self.spent.get(out_point)
    }

    /// Unspent outputs currently held.
    pub fn unspent(&self) -> impl Iterator<Item = (&OutPoint, &Utxo)> {
        self.current
            .iter()
            .filter_map(|(op, utxo)| utxo.as_ref().map(|u| (op, u)))
    }

    /// Out-points whose state differs from when they were fetched, with the
    /// before and after values.
    pub fn changes(&self) -> impl Iterator<Item = (&OutPoint, Option<&Utxo>, Option<&Utxo>)> {
        self.current.iter().filter_map(|(op, after)| {
            let before = self.base.get(op).and_then(Option::as_ref);
            let after = after.as_ref();
            (before != after).then_some((op, before, after))
        })
    }

    /// Spend the transaction's inputs and add its outputs, in memory only.
    ///
    /// No checks are made; validation happens before this is called.
    pub fn apply_transaction(&mut self, tx: &Transaction) -> TypeResult<()> {
        let tx_hash = tx.hash()?;
        for (message_index, payment) in tx.payments() {
            for input in &payment.inputs {
                if let Some(op) = &input.previous_out_point {
                    self.spend(op);
                }
            }
            for (out_index, output) in payment.outputs.iter().enumerate() {
                self.add(
                    OutPoint::new(tx_hash, message_index, out_index as u32),
                    Utxo::from(output),
                );
            }
        }
        Ok(())
    }

    /// Stage every change, with its index entries, into `batch`.
    pub fn stage<B: KvRead + ?Sized>(&self, batch: &mut JournaledBatch<'_, B>) -> StoreResult<()> {
        for (op, before, after) in self.changes() {
            match (before, after) {
                (_, Some(utxo)) => {
                    batch.put_encoded(schema::utxo(op), utxo)?;
                    if let Some(owner) = script::owner(&utxo.lock_script) {
                        batch.put(schema::address_utxo(&owner, op), Vec::new())?;
                    }
                    batch.put(schema::asset_utxo(&utxo.asset.asset_id, op), Vec::new())?;
                }
                (Some(utxo), None) => {
                    batch.delete(schema::utxo(op))?;
                    if let Some(owner) = script::owner(&utxo.lock_script) {
                        batch.delete(schema::address_utxo(&owner, op))?;
                    }
                    batch.delete(schema::asset_utxo(&utxo.asset.asset_id, op))?;
                }
                (None, None) => {}
            }
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_empty()
    }
}

/// The persisted output set with its address and asset indices.
pub struct UtxoSet<'a, R: KvRead + ?Sized> {
    reader: &'a R,
}

impl<'a, R: KvRead + ?Sized> UtxoSet<'a, R> {
    pub fn new(reader: &'a R) -> Self {
        Self { reader }
    }

    pub fn get(&self, out_point: &OutPoint) -> StoreResult<Option<Utxo>> {
        schema::get_decoded(self.reader, &schema::utxo(out_point))
    }

    /// Fetch every requested out-point in one batched read.
    pub fn fetch_view(&self, needed: impl IntoIterator<Item = OutPoint>) -> StoreResult<UtxoView> {
        let mut view = UtxoView::new();
        self.fetch_into(&mut view, needed)?;
        Ok(view)
    }

    /// Add the out-points `view` does not know yet.
    pub fn fetch_into(
        &self,
        view: &mut UtxoView,
        needed: impl IntoIterator<Item = OutPoint>,
    ) -> StoreResult<()> {
        let wanted: Vec<OutPoint> = needed
            .into_iter()
            .filter(|op| !view.is_fetched(op))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if wanted.is_empty() {
            return Ok(());
        }
        let keys: Vec<Vec<u8>> = wanted.iter().map(schema::utxo).collect();
        let values = self.reader.get_many(&keys)?;
        for ((op, key), value) in wanted.into_iter().zip(&keys).zip(values) {
            let utxo = match value {
                Some(bytes) => Some(schema::decode_record(key, &bytes)?),
                None => None,
            };
            view.seed(op, utxo);
        }
        Ok(())
    }

    /// The view produced by applying `transactions` in order to this state.
    pub fn view_after(&self, transactions: &[Transaction]) -> crate::LedgerResult<UtxoView> {
        let mut view =
            self.fetch_view(transactions.iter().flat_map(|tx| tx.spent_out_points()))?;
        for tx in transactions {
            view.apply_transaction(tx)?;
        }
        Ok(view)
    }

    fn indexed_outputs(&self, prefix: &[u8]) -> StoreResult<Vec<(OutPoint, Utxo)>> {
        let out_points: Vec<OutPoint> = self
            .reader
            .scan_prefix(prefix)?
            .into_iter()
            .filter_map(|(key, _)| schema::out_point_suffix(&key))
            .collect();
        let keys: Vec<Vec<u8>> = out_points.iter().map(schema::utxo).collect();
        let values = self.reader.get_many(&keys)?;

        let mut outputs = Vec::with_capacity(out_points.len());
        for ((op, key), value) in out_points.into_iter().zip(&keys).zip(values) {
            let bytes = value.ok_or_else(|| StoreError::Corrupt {
                key: hex::encode(key),
                reason: "index entry without output".into(),
            })?;
            outputs.push((op, schema::decode_record(key, &bytes)?));
        }
        Ok(outputs)
    }

    pub fn address_outputs(&self, address: &Address) -> StoreResult<Vec<(OutPoint, Utxo)>> {
        self.indexed_outputs(&schema::address_utxos(address))
    }

    pub fn asset_outputs(&self, asset: &AssetId) -> StoreResult<Vec<(OutPoint, Utxo)>> {
        self.indexed_outputs(&schema::asset_utxos(asset))
    }

    pub fn balance(&self, address: &Address, asset: &AssetId) -> StoreResult<u64> {
        Ok(self
            .address_outputs(address)?
            .iter()
            .filter(|(_, utxo)| &utxo.asset.asset_id == asset)
            .fold(0u64, |sum, (_, utxo)| sum.saturating_add(utxo.amount)))
    }

    /// Balance of every asset the address holds.
    pub fn list_tokens(&self, address: &Address) -> StoreResult<BTreeMap<AssetId, u64>> {
        let mut tokens = BTreeMap::new();
        for (_, utxo) in self.address_outputs(address)? {
            let total: &mut u64 = tokens.entry(utxo.asset.asset_id).or_default();
            *total = total.saturating_add(utxo.amount);
        }
        Ok(tokens)
    }
}

impl<S: KvStore + ?Sized> UtxoSet<'_, S> {
    /// Write the view's changes in one atomic batch.
    pub fn commit(&self, view: &UtxoView) -> StoreResult<()> {
        let mut batch = JournaledBatch::new(self.reader);
        view.stage(&mut batch)?;
        let (batch, _) = batch.finish();
        self.reader.write(batch)
    }
}
