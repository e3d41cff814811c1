//! The canonical-chain seam between the fork engine and persistent state.

use std::cmp::Ordering;

use udl_types::{AssetId, Hash, Unit};

use crate::error::DagError;

/// Tip of a branch: its newest unit and that unit's height.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChainTip {
    pub hash: Hash,
    pub index: u64,
}

impl ChainTip {
    pub fn new(hash: Hash, index: u64) -> Self {
        Self { hash, index }
    }

    pub fn of(unit: &Unit) -> Self {
        Self::new(unit.hash(), unit.index())
    }

    /// Fork-choice order: the greater height wins, and on equal heights the
    /// lexicographically smaller hash wins. `Greater` means `self` is chosen.
    pub fn fork_choice(&self, other: &ChainTip) -> Ordering {
        self.index
            .cmp(&other.index)
            .then_with(|| other.hash.cmp(&self.hash))
    }
}

/// Result of asking the chain to apply one pending unit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Promotion {
    Applied,
    /// The unit failed validation against the chain state it was applied on.
    Rejected(String),
}

/// The canonical chain as seen by the fork engine.
///
/// Every canonical unit above an asset's stable head is also held by the
/// [`MemDag`](crate::MemDag); everything at or below it lives only behind
/// this trait. Each method applies its change atomically.
pub trait CanonicalChain {
    type Error: From<DagError>;

    fn canonical_head(&self, asset: &AssetId) -> Result<Option<ChainTip>, Self::Error>;

    fn stable_head(&self, asset: &AssetId) -> Result<Option<ChainTip>, Self::Error>;

    /// Whether `hash` is the canonical unit at `index` on `asset`.
    fn is_canonical(&self, asset: &AssetId, index: u64, hash: &Hash)
        -> Result<bool, Self::Error>;

    /// Validate and apply `unit` on top of the current canonical head.
    fn promote(&mut self, unit: &Unit) -> Result<Promotion, Self::Error>;

    /// Undo `unit`, which must be the current canonical head.
    fn revert(&mut self, unit: &Unit) -> Result<(), Self::Error>;

    /// Make `unit`, already canonical, the new stable head.
    fn finalize(&mut self, unit: &Unit) -> Result<(), Self::Error>;
}

/// A canonical head that moved during a switch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeadChange {
    pub asset_id: AssetId,
    pub old: ChainTip,
    pub new: ChainTip,
    pub reverted: usize,
    pub applied: usize,
}
