//! Key layout of the ledger's persisted state.
//!
//! Every key starts with one [`Prefix`] byte. Integers inside keys are
//! big-endian so that prefix scans return entries in numeric order.

use serde::de::DeserializeOwned;
use udl_crypto::codec;
use udl_types::{Address, AssetId, Hash, OutPoint};

use crate::error::{StoreError, StoreResult};
use crate::traits::KvRead;

#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Prefix {
    /// `(asset, index, hash)` → `Header`
    Header = 0x01,
    /// `hash` → `ChainIndex`
    HashToNumber = 0x02,
    /// `(asset, index)` → canonical `Hash`
    Canonical = 0x03,
    /// `unit hash` → transaction hashes of the unit body
    Body = 0x04,
    /// `tx hash` → `TxLookup`
    TxLookup = 0x05,
    /// `tx hash` → `Transaction`
    Transaction = 0x06,
    /// `(head kind, asset)` → `Hash`
    Head = 0x07,
    /// `out point` → `Utxo`
    Utxo = 0x08,
    /// `(address, out point)` → empty
    AddressUtxo = 0x09,
    /// `(asset, out point)` → empty
    AssetUtxo = 0x0a,
    /// `(address, tx hash)` → empty
    AddressTx = 0x0b,
    /// `unit hash` → `UndoLog`
    Undo = 0x0c,
    /// singleton properties, see [`Property`]
    Property = 0x0d,
    /// `tx hash` → `ContractTemplatePayload`
    ContractTemplate = 0x0e,
    /// `contract address` → `ContractDeployPayload`
    Contract = 0x0f,
    /// `config key` → raw value
    Config = 0x10,
}

/// Mutable head pointers kept per asset.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HeadKind {
    /// Newest canonical header.
    Header = 0x01,
    /// Newest canonical unit with its body.
    Unit = 0x02,
    /// Newest unit known to fast sync.
    Fast = 0x03,
    /// Newest irreversible unit.
    Stable = 0x04,
}

#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Property {
    Global = 0x01,
    Schedule = 0x02,
    /// Asset of the designated genesis unit.
    PrimaryAsset = 0x03,
    /// Monotonic counter ordering undo records across assets.
    ApplySequence = 0x04,
}

fn key(prefix: Prefix, parts: &[&[u8]]) -> Vec<u8> {
    let len = 1 + parts.iter().map(|p| p.len()).sum::<usize>();
    let mut key = Vec::with_capacity(len);
    key.push(prefix as u8);
    for part in parts {
        key.extend_from_slice(part);
    }
    key
}

pub fn header(asset: &AssetId, index: u64, hash: &Hash) -> Vec<u8> {
    key(
        Prefix::Header,
        &[asset.as_bytes(), &index.to_be_bytes(), hash.as_bytes()],
    )
}

/// Prefix of every header stored at one height, canonical or not.
pub fn headers_at(asset: &AssetId, index: u64) -> Vec<u8> {
    key(Prefix::Header, &[asset.as_bytes(), &index.to_be_bytes()])
}

pub fn hash_to_number(hash: &Hash) -> Vec<u8> {
    key(Prefix::HashToNumber, &[hash.as_bytes()])
}

pub fn canonical(asset: &AssetId, index: u64) -> Vec<u8> {
    key(Prefix::Canonical, &[asset.as_bytes(), &index.to_be_bytes()])
}

pub fn body(hash: &Hash) -> Vec<u8> {
    key(Prefix::Body, &[hash.as_bytes()])
}

pub fn tx_lookup(tx_hash: &Hash) -> Vec<u8> {
    key(Prefix::TxLookup, &[tx_hash.as_bytes()])
}

pub fn transaction(tx_hash: &Hash) -> Vec<u8> {
    key(Prefix::Transaction, &[tx_hash.as_bytes()])
}

pub fn head(kind: HeadKind, asset: &AssetId) -> Vec<u8> {
    key(Prefix::Head, &[&[kind as u8], asset.as_bytes()])
}

/// Prefix of every head pointer of one kind, across assets.
pub fn heads(kind: HeadKind) -> Vec<u8> {
    key(Prefix::Head, &[&[kind as u8]])
}

pub fn out_point_bytes(out_point: &OutPoint) -> [u8; 40] {
    let mut bytes = [0u8; 40];
    bytes[..32].copy_from_slice(out_point.tx_hash.as_bytes());
    bytes[32..36].copy_from_slice(&out_point.message_index.to_be_bytes());
    bytes[36..].copy_from_slice(&out_point.out_index.to_be_bytes());
    bytes
}

/// Parse the trailing 40 bytes of an index key back into an out point.
pub fn out_point_suffix(key: &[u8]) -> Option<OutPoint> {
    let start = key.len().checked_sub(40)?;
    let bytes = &key[start..];
    let tx_hash: [u8; 32] = bytes[..32].try_into().ok()?;
    let message_index = u32::from_be_bytes(bytes[32..36].try_into().ok()?);
    let out_index = u32::from_be_bytes(bytes[36..].try_into().ok()?);
    Some(OutPoint::new(Hash::from_digest(tx_hash), message_index, out_index))
}

/// Parse the trailing 32 bytes of an index key back into a hash.
pub fn hash_suffix(key: &[u8]) -> Option<Hash> {
    let start = key.len().checked_sub(32)?;
    let bytes: [u8; 32] = key[start..].try_into().ok()?;
    Some(Hash::from_digest(bytes))
}

pub fn utxo(out_point: &OutPoint) -> Vec<u8> {
    key(Prefix::Utxo, &[&out_point_bytes(out_point)])
}

pub fn address_utxo(address: &Address, out_point: &OutPoint) -> Vec<u8> {
    key(
        Prefix::AddressUtxo,
        &[address.as_bytes(), &out_point_bytes(out_point)],
    )
}

pub fn address_utxos(address: &Address) -> Vec<u8> {
    key(Prefix::AddressUtxo, &[address.as_bytes()])
}

pub fn asset_utxo(asset: &AssetId, out_point: &OutPoint) -> Vec<u8> {
    key(Prefix::AssetUtxo, &[asset.as_bytes(), &out_point_bytes(out_point)])
}

pub fn asset_utxos(asset: &AssetId) -> Vec<u8> {
    key(Prefix::AssetUtxo, &[asset.as_bytes()])
}

pub fn address_tx(address: &Address, tx_hash: &Hash) -> Vec<u8> {
    key(Prefix::AddressTx, &[address.as_bytes(), tx_hash.as_bytes()])
}

pub fn address_txs(address: &Address) -> Vec<u8> {
    key(Prefix::AddressTx, &[address.as_bytes()])
}

pub fn undo(hash: &Hash) -> Vec<u8> {
    key(Prefix::Undo, &[hash.as_bytes()])
}

pub fn property(property: Property) -> Vec<u8> {
    key(Prefix::Property, &[&[property as u8]])
}

pub fn contract_template(tx_hash: &Hash) -> Vec<u8> {
    key(Prefix::ContractTemplate, &[tx_hash.as_bytes()])
}

pub fn contract(contract_id: &Address) -> Vec<u8> {
    key(Prefix::Contract, &[contract_id.as_bytes()])
}

pub fn config(name: &str) -> Vec<u8> {
    key(Prefix::Config, &[name.as_bytes()])
}

/// Read and decode one record. Undecodable bytes are reported as corruption.
pub fn get_decoded<T: DeserializeOwned, R: KvRead + ?Sized>(
    reader: &R,
    key: &[u8],
) -> StoreResult<Option<T>> {
    match reader.get(key)? {
        Some(bytes) => decode_record(key, &bytes).map(Some),
        None => Ok(None),
    }
}

pub fn decode_record<T: DeserializeOwned>(key: &[u8], bytes: &[u8]) -> StoreResult<T> {
    codec::decode(bytes).map_err(|e| StoreError::Corrupt {
        key: hex::encode(key),
        reason: e.to_string(),
    })
}
