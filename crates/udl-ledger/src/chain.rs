//! Canonical chain state in the key-value store.
//!
//! Every canonical apply is one atomic batch: header, number and canonical
//! indices, body, transactions, output changes, contracts, configuration,
//! head pointers and an undo record that reverses all of it. Finalizing a
//! unit drops the undo records at and below it, which is what makes it
//! irreversible.

use serde::{Deserialize, Serialize};
use tracing::debug;
use udl_crypto::SignatureVerifier;
use udl_dag::{CanonicalChain, ChainTip, Promotion};
use udl_store::{
    schema, HeadKind, JournaledBatch, KvRead, KvStore, Property, UndoLog, WriteBatch,
};
use udl_types::{
    script, Address, AssetId, ChainIndex, GlobalProperty, Hash, Header, Message, Transaction,
    Unit,
};

use crate::cache::UnitCache;
use crate::config::LedgerConfig;
use crate::error::{LedgerError, LedgerResult, ValidationError};
use crate::utxo::{UtxoSet, UtxoView};
use crate::validator::UnitValidator;

/// Where a stored transaction lives.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxLookup {
    pub unit_hash: Hash,
    pub number: ChainIndex,
    /// Position within the unit body.
    pub index: u32,
}

/// Undo journal of one canonical apply, ordered across assets by `seq`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub(crate) struct UndoRecord {
    pub seq: u64,
    pub log: UndoLog,
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

pub(crate) fn unit_number<R: KvRead + ?Sized>(
    reader: &R,
    hash: &Hash,
) -> LedgerResult<Option<ChainIndex>> {
    Ok(schema::get_decoded(reader, &schema::hash_to_number(hash))?)
}

pub(crate) fn canonical_hash<R: KvRead + ?Sized>(
    reader: &R,
    asset: &AssetId,
    index: u64,
) -> LedgerResult<Option<Hash>> {
    Ok(schema::get_decoded(reader, &schema::canonical(asset, index))?)
}

pub(crate) fn head<R: KvRead + ?Sized>(
    reader: &R,
    kind: HeadKind,
    asset: &AssetId,
) -> LedgerResult<Option<Hash>> {
    Ok(schema::get_decoded(reader, &schema::head(kind, asset))?)
}

pub(crate) fn tip<R: KvRead + ?Sized>(
    reader: &R,
    kind: HeadKind,
    asset: &AssetId,
) -> LedgerResult<Option<ChainTip>> {
    let Some(hash) = head(reader, kind, asset)? else {
        return Ok(None);
    };
    let number = unit_number(reader, &hash)?
        .ok_or_else(|| LedgerError::Corrupt(format!("head {hash} has no number")))?;
    Ok(Some(ChainTip::new(hash, number.index)))
}

pub(crate) fn primary_asset<R: KvRead + ?Sized>(reader: &R) -> LedgerResult<Option<AssetId>> {
    Ok(schema::get_decoded(
        reader,
        &schema::property(Property::PrimaryAsset),
    )?)
}

/// Every asset with a canonical chain.
pub(crate) fn assets<R: KvRead + ?Sized>(reader: &R) -> LedgerResult<Vec<AssetId>> {
    let prefix = schema::heads(HeadKind::Unit);
    reader
        .scan_prefix(&prefix)?
        .into_iter()
        .map(|(key, _)| {
            AssetId::from_slice(&key[prefix.len()..]).map_err(LedgerError::from)
        })
        .collect()
}

pub(crate) fn global_property<R: KvRead + ?Sized>(
    reader: &R,
    fallback: &GlobalProperty,
) -> LedgerResult<GlobalProperty> {
    Ok(
        schema::get_decoded(reader, &schema::property(Property::Global))?
            .unwrap_or_else(|| fallback.clone()),
    )
}

pub(crate) fn read_header<R: KvRead + ?Sized>(
    reader: &R,
    hash: &Hash,
) -> LedgerResult<Option<Header>> {
    let Some(number) = unit_number(reader, hash)? else {
        return Ok(None);
    };
    let key = schema::header(&number.asset_id, number.index, hash);
    let header = schema::get_decoded::<Header, _>(reader, &key)?
        .ok_or_else(|| LedgerError::Corrupt(format!("unit {hash} has a number but no header")))?;
    Ok(Some(header))
}

pub(crate) fn read_transactions<R: KvRead + ?Sized>(
    reader: &R,
    hash: &Hash,
) -> LedgerResult<Option<Vec<Transaction>>> {
    let Some(tx_hashes) = schema::get_decoded::<Vec<Hash>, _>(reader, &schema::body(hash))? else {
        return Ok(None);
    };
    let keys: Vec<Vec<u8>> = tx_hashes.iter().map(schema::transaction).collect();
    let mut transactions = Vec::with_capacity(keys.len());
    for (key, value) in keys.iter().zip(reader.get_many(&keys)?) {
        let bytes = value.ok_or_else(|| {
            LedgerError::Corrupt(format!("body of {hash} references a missing transaction"))
        })?;
        transactions.push(schema::decode_record(key, &bytes)?);
    }
    Ok(Some(transactions))
}

pub(crate) fn read_unit<R: KvRead + ?Sized>(reader: &R, hash: &Hash) -> LedgerResult<Option<Unit>> {
    let Some(header) = read_header(reader, hash)? else {
        return Ok(None);
    };
    let transactions = read_transactions(reader, hash)?
        .ok_or_else(|| LedgerError::Corrupt(format!("unit {hash} has no body")))?;
    let unit = Unit::new(header, transactions)?;
    if unit.hash() != *hash {
        return Err(LedgerError::Corrupt(format!(
            "unit stored under {hash} hashes to {}",
            unit.hash()
        )));
    }
    Ok(Some(unit))
}

pub(crate) fn undo_record<R: KvRead + ?Sized>(reader: &R, hash: &Hash) -> LedgerResult<UndoRecord> {
    schema::get_decoded(reader, &schema::undo(hash))?
        .ok_or_else(|| LedgerError::Corrupt(format!("no undo record for canonical unit {hash}")))
}

/// Canonical units above the stable head, oldest first.
pub(crate) fn pending_canonical<R: KvRead + ?Sized>(
    reader: &R,
    asset: &AssetId,
) -> LedgerResult<Vec<Hash>> {
    let (Some(head), Some(stable)) = (
        tip(reader, HeadKind::Unit, asset)?,
        tip(reader, HeadKind::Stable, asset)?,
    ) else {
        return Ok(Vec::new());
    };
    (stable.index + 1..=head.index)
        .map(|index| {
            canonical_hash(reader, asset, index)?.ok_or_else(|| {
                LedgerError::Corrupt(format!("canonical chain of {asset} has a gap at {index}"))
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Writes
// ---------------------------------------------------------------------------

/// Addresses a transaction touches: output owners and owners of what it
/// spends.
fn tx_addresses(tx: &Transaction, view: &UtxoView) -> Vec<Address> {
    let mut addresses: Vec<Address> = tx
        .payments()
        .flat_map(|(_, p)| {
            let spent = p
                .inputs
                .iter()
                .filter_map(|i| i.previous_out_point)
                .filter_map(|op| view.spent(&op).map(|u| u.lock_script.clone()));
            let created = p.outputs.iter().map(|o| o.lock_script.clone());
            spent.chain(created).collect::<Vec<_>>()
        })
        .filter_map(|lock| script::owner(&lock))
        .collect();
    addresses.sort();
    addresses.dedup();
    addresses
}

/// Stage everything that makes `unit` canonical on top of `reader`.
///
/// `view` is the output view validation produced for the unit.
pub(crate) fn stage_unit<R: KvRead + ?Sized>(
    reader: &R,
    unit: &Unit,
    view: &UtxoView,
) -> LedgerResult<(WriteBatch, UndoLog)> {
    let hash = unit.hash();
    let number = unit.number();
    let asset = number.asset_id;
    let mut batch = JournaledBatch::new(reader);

    batch.put_encoded(schema::header(&asset, number.index, &hash), unit.header())?;
    batch.put_encoded(schema::hash_to_number(&hash), &number)?;
    batch.put_encoded(schema::canonical(&asset, number.index), &hash)?;

    let mut tx_hashes = Vec::with_capacity(unit.transactions().len());
    for (position, tx) in unit.transactions().iter().enumerate() {
        let tx_hash = tx.hash()?;
        tx_hashes.push(tx_hash);
        batch.put_encoded(schema::transaction(&tx_hash), tx)?;
        batch.put_encoded(
            schema::tx_lookup(&tx_hash),
            &TxLookup {
                unit_hash: hash,
                number,
                index: position as u32,
            },
        )?;
        for address in tx_addresses(tx, view) {
            batch.put(schema::address_tx(&address, &tx_hash), Vec::new())?;
        }
        for message in &tx.messages {
            match message {
                Message::Payment(_) | Message::ContractInvoke(_) | Message::Text(_) => {}
                Message::ContractTemplateDeploy(template) => {
                    batch.put_encoded(schema::contract_template(&tx_hash), template)?;
                }
                Message::ContractDeploy(deploy) => {
                    batch.put_encoded(schema::contract(&deploy.contract_id), deploy)?;
                }
                Message::ConfigUpdate(config) => {
                    if let Some(global) = &config.global_property {
                        batch.put_encoded(schema::property(Property::Global), global)?;
                    }
                    for entry in &config.entries {
                        if entry.is_delete {
                            batch.delete(schema::config(&entry.key))?;
                        } else {
                            batch.put(schema::config(&entry.key), entry.value.clone())?;
                        }
                    }
                }
            }
        }
    }
    batch.put_encoded(schema::body(&hash), &tx_hashes)?;

    view.stage(&mut batch)?;

    for kind in [HeadKind::Header, HeadKind::Unit, HeadKind::Fast] {
        batch.put_encoded(schema::head(kind, &asset), &hash)?;
    }
    let primary = schema::property(Property::PrimaryAsset);
    if number.index == 0 && batch.get(&primary)?.is_none() {
        batch.put_encoded(primary, &asset)?;
    }

    Ok(batch.finish())
}

// ---------------------------------------------------------------------------
// ChainState
// ---------------------------------------------------------------------------

/// The store seen as a canonical chain by the fork engine.
pub(crate) struct ChainState<'a> {
    pub store: &'a dyn KvStore,
    pub verifier: &'a dyn SignatureVerifier,
    pub config: &'a LedgerConfig,
    pub cache: &'a UnitCache,
}

impl ChainState<'_> {
    /// Make `unit` canonical in one atomic write, with its undo record.
    pub fn apply(&self, unit: &Unit, view: &UtxoView) -> LedgerResult<()> {
        let hash = unit.hash();
        let (mut batch, log) = stage_unit(self.store, unit, view)?;
        let seq = schema::get_decoded::<u64, _>(
            self.store,
            &schema::property(Property::ApplySequence),
        )?
        .map_or(0, |seq| seq + 1);
        batch.put_encoded(schema::undo(&hash), &UndoRecord { seq, log })?;
        batch.put_encoded(schema::property(Property::ApplySequence), &seq)?;
        let ops = batch.len();
        self.store.write(batch)?;
        debug!(
            unit = %hash.short_hex(),
            number = %unit.number(),
            ops,
            "applied unit"
        );
        Ok(())
    }
}

impl CanonicalChain for ChainState<'_> {
    type Error = LedgerError;

    fn canonical_head(&self, asset: &AssetId) -> LedgerResult<Option<ChainTip>> {
        tip(self.store, HeadKind::Unit, asset)
    }

    fn stable_head(&self, asset: &AssetId) -> LedgerResult<Option<ChainTip>> {
        tip(self.store, HeadKind::Stable, asset)
    }

    fn is_canonical(&self, asset: &AssetId, index: u64, hash: &Hash) -> LedgerResult<bool> {
        Ok(canonical_hash(self.store, asset, index)? == Some(*hash))
    }

    fn promote(&mut self, unit: &Unit) -> LedgerResult<Promotion> {
        let global = global_property(self.store, &self.config.genesis_global_property)?;
        let validator = UnitValidator::new(self.verifier, &global, self.config.max_extra_size);
        match validator.validate_unit(unit, false, &UtxoSet::new(self.store)) {
            Ok(validation) => {
                self.apply(unit, &validation.view)?;
                Ok(Promotion::Applied)
            }
            Err(ValidationError::Storage(e)) => Err(e.into()),
            Err(e) => Ok(Promotion::Rejected(e.to_string())),
        }
    }

    fn revert(&mut self, unit: &Unit) -> LedgerResult<()> {
        let hash = unit.hash();
        let record = undo_record(self.store, &hash)?;
        let mut batch = record.log.restore_batch();
        batch.delete(schema::undo(&hash));
        self.store.write(batch)?;
        self.cache.remove(&hash)?;
        debug!(unit = %hash.short_hex(), number = %unit.number(), "reverted unit");
        Ok(())
    }

    fn finalize(&mut self, unit: &Unit) -> LedgerResult<()> {
        let asset = unit.asset_id();
        let hash = unit.hash();
        if !self.is_canonical(&asset, unit.index(), &hash)? {
            return Err(LedgerError::Corrupt(format!(
                "finalizing non-canonical unit {hash}"
            )));
        }
        let start = match self.stable_head(&asset)? {
            Some(stable) if stable.index >= unit.index() => return Ok(()),
            Some(stable) => stable.index + 1,
            None => 0,
        };

        let mut batch = WriteBatch::new();
        for index in start..=unit.index() {
            if let Some(h) = canonical_hash(self.store, &asset, index)? {
                batch.delete(schema::undo(&h));
            }
        }
        batch.put_encoded(schema::head(HeadKind::Stable, &asset), &hash)?;
        self.store.write(batch)?;
        debug!(unit = %hash.short_hex(), number = %unit.number(), "unit is stable");
        Ok(())
    }
}
