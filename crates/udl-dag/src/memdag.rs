//! The MemDag: pending units and fork resolution.
//!
//! [`MemDag`] holds every unit that has passed validation without reaching
//! quorum, indexed by hash and by `(asset, chain parent)`. It decides when an
//! asset's canonical head should move to another branch and drives the move
//! through a [`CanonicalChain`].
//!
//! # Invariants
//!
//! - Every canonical unit above an asset's stable head is held here.
//! - Every saved unit's parents were known when it was saved.
//! - Only branches rooted at the asset's stable head are eligible.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

use tracing::{debug, info, warn};
use udl_types::{AssetId, Hash, Unit};

use crate::chain::{CanonicalChain, ChainTip, HeadChange, Promotion};
use crate::error::{DagError, DagResult};

/// Default depth below the canonical head beyond which forks are dropped and
/// pending canonical units become stable.
pub const DEFAULT_RETENTION_DEPTH: u64 = 15;

/// Outcome of moving an asset's canonical head to a branch tip.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Reorg {
    pub reverted: usize,
    pub applied: usize,
    /// The unit that failed promotion and why. It was dropped together with
    /// its descendants.
    pub rejected: Option<(Hash, String)>,
}

#[derive(Debug)]
pub struct MemDag {
    /// All pending units, keyed by hash.
    nodes: HashMap<Hash, Unit>,
    /// Forward-edge index: (asset, chain parent) -> children.
    children: BTreeMap<(AssetId, Hash), BTreeSet<Hash>>,
    /// Pending units per asset.
    assets: BTreeMap<AssetId, BTreeSet<Hash>>,
    retention_depth: u64,
}

impl Default for MemDag {
    fn default() -> Self {
        Self::new(DEFAULT_RETENTION_DEPTH)
    }
}

impl MemDag {
    pub fn new(retention_depth: u64) -> Self {
        Self {
            nodes: HashMap::new(),
            children: BTreeMap::new(),
            assets: BTreeMap::new(),
            retention_depth,
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn retention_depth(&self) -> u64 {
        self.retention_depth
    }

    // ---------------------------------------------------------------
    // Membership
    // ---------------------------------------------------------------

    /// Insert a pending unit.
    ///
    /// Every parent must already be pending or satisfy `is_known` (i.e. be
    /// in the canonical store); otherwise the unit is an orphan.
    pub fn save(&mut self, unit: Unit, is_known: impl Fn(&Hash) -> bool) -> DagResult<()> {
        let hash = unit.hash();
        if self.nodes.contains_key(&hash) {
            return Err(DagError::Duplicate(hash));
        }
        for parent in &unit.header().parent_hashes {
            if !self.nodes.contains_key(parent) && !is_known(parent) {
                return Err(DagError::Orphan {
                    unit: hash,
                    parent: *parent,
                });
            }
        }

        let asset = unit.asset_id();
        if let Some(parent) = unit.parent() {
            self.children
                .entry((asset, *parent))
                .or_default()
                .insert(hash);
        }
        self.assets.entry(asset).or_default().insert(hash);

        debug!(
            unit = %hash.short_hex(),
            number = %unit.number(),
            pending = self.nodes.len() + 1,
            "saved pending unit"
        );
        self.nodes.insert(hash, unit);
        Ok(())
    }

    pub fn exists(&self, hash: &Hash) -> bool {
        self.nodes.contains_key(hash)
    }

    pub fn get(&self, hash: &Hash) -> Option<&Unit> {
        self.nodes.get(hash)
    }

    /// Assets that currently have pending units.
    pub fn assets(&self) -> Vec<AssetId> {
        self.assets.keys().copied().collect()
    }

    /// Pending units of one asset, ordered by height then hash.
    pub fn units(&self, asset: &AssetId) -> Vec<&Unit> {
        let mut units: Vec<&Unit> = self
            .assets
            .get(asset)
            .into_iter()
            .flatten()
            .filter_map(|h| self.nodes.get(h))
            .collect();
        units.sort_by_key(|u| (u.index(), u.hash()));
        units
    }

    /// Pending units of `asset` at height `index`.
    pub fn units_at(&self, asset: &AssetId, index: u64) -> Vec<&Unit> {
        self.units(asset)
            .into_iter()
            .filter(|u| u.index() == index)
            .collect()
    }

    pub fn children(&self, asset: &AssetId, parent: &Hash) -> Vec<Hash> {
        self.children
            .get(&(*asset, *parent))
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Pending units of `asset` with no pending child on the same chain.
    pub fn leaves(&self, asset: &AssetId) -> Vec<Hash> {
        self.assets
            .get(asset)
            .into_iter()
            .flatten()
            .filter(|h| {
                self.children
                    .get(&(*asset, **h))
                    .map_or(true, |c| c.is_empty())
            })
            .copied()
            .collect()
    }

    // ---------------------------------------------------------------
    // Branch walks
    // ---------------------------------------------------------------

    /// Pending ancestors of `tip` on its own chain plus `tip`, oldest first.
    pub fn branch(&self, tip: &Hash) -> Vec<Hash> {
        let mut path = Vec::new();
        let Some(asset) = self.nodes.get(tip).map(Unit::asset_id) else {
            return path;
        };
        let mut current = *tip;
        while let Some(unit) = self.nodes.get(&current) {
            if unit.asset_id() != asset {
                break;
            }
            path.push(current);
            match unit.parent() {
                Some(parent) => current = *parent,
                None => break,
            }
        }
        path.reverse();
        path
    }

    /// The first non-pending unit below `tip` on its chain: the unit the
    /// pending branch grows from.
    pub fn branch_root(&self, tip: &Hash) -> Option<Hash> {
        let oldest = *self.branch(tip).first()?;
        self.nodes.get(&oldest)?.parent().copied()
    }

    /// Every pending unit descending from `hash` on `asset`'s chain.
    pub fn descendants(&self, asset: &AssetId, hash: &Hash) -> BTreeSet<Hash> {
        let mut found = BTreeSet::new();
        let mut queue = VecDeque::from([*hash]);
        while let Some(current) = queue.pop_front() {
            if let Some(children) = self.children.get(&(*asset, current)) {
                for child in children {
                    if found.insert(*child) {
                        queue.push_back(*child);
                    }
                }
            }
        }
        found
    }

    // ---------------------------------------------------------------
    // Removal
    // ---------------------------------------------------------------

    fn remove(&mut self, hash: &Hash) -> Option<Unit> {
        let unit = self.nodes.remove(hash)?;
        let asset = unit.asset_id();
        if let Some(parent) = unit.parent() {
            let key = (asset, *parent);
            if let Some(siblings) = self.children.get_mut(&key) {
                siblings.remove(hash);
                if siblings.is_empty() {
                    self.children.remove(&key);
                }
            }
        }
        if let Some(set) = self.assets.get_mut(&asset) {
            set.remove(hash);
            if set.is_empty() {
                self.assets.remove(&asset);
            }
        }
        Some(unit)
    }

    /// Drop `hash` and all of its pending descendants.
    pub fn remove_subtree(&mut self, hash: &Hash) -> Vec<Hash> {
        let Some(asset) = self.nodes.get(hash).map(Unit::asset_id) else {
            return Vec::new();
        };
        let mut doomed: Vec<Hash> = self.descendants(&asset, hash).into_iter().collect();
        doomed.push(*hash);
        for h in &doomed {
            self.remove(h);
        }
        doomed
    }

    /// Keep only the pending units of `asset` that descend from `confirmed`.
    ///
    /// `confirmed` itself, its pending ancestors and every branch forking at
    /// or below its height are removed. Returns the number of units removed.
    pub fn prune(&mut self, asset: &AssetId, confirmed: &Hash) -> usize {
        let keep = self.descendants(asset, confirmed);
        let doomed: Vec<Hash> = self
            .assets
            .get(asset)
            .into_iter()
            .flatten()
            .filter(|h| !keep.contains(h))
            .copied()
            .collect();
        for h in &doomed {
            self.remove(h);
        }
        if !doomed.is_empty() {
            debug!(
                asset = %asset.short_hex(),
                confirmed = %confirmed.short_hex(),
                removed = doomed.len(),
                kept = keep.len(),
                "pruned pending units"
            );
        }
        doomed.len()
    }

    // ---------------------------------------------------------------
    // Fork resolution
    // ---------------------------------------------------------------

    /// Re-evaluate every asset with pending units and move canonical heads
    /// to the winning branches.
    ///
    /// A unit that fails promotion is dropped with its descendants and the
    /// choice is made again. Afterwards, canonical units deeper than the
    /// retention depth are finalized and forks below them are dropped.
    /// Without newly eligible branches nothing changes.
    pub fn switch_main_chain<C: CanonicalChain>(
        &mut self,
        chain: &mut C,
    ) -> Result<Vec<HeadChange>, C::Error> {
        let mut changes = Vec::new();
        for asset in self.assets() {
            if let Some(change) = self.switch_asset(&asset, chain)? {
                changes.push(change);
            }
            self.enforce_retention(&asset, chain)?;
        }
        Ok(changes)
    }

    fn switch_asset<C: CanonicalChain>(
        &mut self,
        asset: &AssetId,
        chain: &mut C,
    ) -> Result<Option<HeadChange>, C::Error> {
        let Some(original) = chain.canonical_head(asset)? else {
            return Ok(None);
        };
        let mut reverted = 0;
        let mut applied = 0;

        loop {
            let head = chain
                .canonical_head(asset)?
                .ok_or(DagError::MissingHead(*asset))?;
            let best = self.best_tip(asset, head, chain)?;
            if best.hash == head.hash {
                break;
            }
            let reorg = self.reorganize(head, &best.hash, chain)?;
            reverted += reorg.reverted;
            applied += reorg.applied;
        }

        let head = chain
            .canonical_head(asset)?
            .ok_or(DagError::MissingHead(*asset))?;
        if head == original {
            return Ok(None);
        }
        info!(
            asset = %asset.short_hex(),
            from = %original.hash.short_hex(),
            to = %head.hash.short_hex(),
            index = head.index,
            reverted,
            applied,
            "switched main chain"
        );
        Ok(Some(HeadChange {
            asset_id: *asset,
            old: original,
            new: head,
            reverted,
            applied,
        }))
    }

    /// The preferred tip among the current head and every pending leaf whose
    /// branch grows from the stable head.
    fn best_tip<C: CanonicalChain>(
        &self,
        asset: &AssetId,
        head: ChainTip,
        chain: &C,
    ) -> Result<ChainTip, C::Error> {
        let Some(stable) = chain.stable_head(asset)? else {
            return Ok(head);
        };
        let mut best = head;
        for leaf in self.leaves(asset) {
            if self.branch_root(&leaf) != Some(stable.hash) {
                continue;
            }
            let Some(unit) = self.nodes.get(&leaf) else {
                continue;
            };
            let tip = ChainTip::of(unit);
            if tip.fork_choice(&best) == Ordering::Greater {
                best = tip;
            }
        }
        Ok(best)
    }

    /// Make the branch ending at `tip` canonical regardless of fork choice.
    ///
    /// Used when a quorum-signed unit extends a non-canonical branch.
    pub fn adopt<C: CanonicalChain>(&mut self, tip: &Hash, chain: &mut C) -> Result<Reorg, C::Error> {
        let asset = self
            .nodes
            .get(tip)
            .map(Unit::asset_id)
            .ok_or(DagError::MissingUnit(*tip))?;
        let head = chain
            .canonical_head(&asset)?
            .ok_or(DagError::MissingHead(asset))?;
        if head.hash == *tip {
            return Ok(Reorg::default());
        }
        self.reorganize(head, tip, chain)
    }

    /// Revert the canonical chain from `head` down to the fork point with
    /// `tip`'s branch, then promote that branch unit by unit.
    fn reorganize<C: CanonicalChain>(
        &mut self,
        head: ChainTip,
        tip: &Hash,
        chain: &mut C,
    ) -> Result<Reorg, C::Error> {
        let branch = self.branch(tip);
        let mut fork = self
            .branch_root(tip)
            .ok_or(DagError::BrokenChain(*tip))?;
        let mut start = 0;
        for (i, hash) in branch.iter().enumerate() {
            let unit = self.nodes.get(hash).ok_or(DagError::MissingUnit(*hash))?;
            if !chain.is_canonical(&unit.asset_id(), unit.index(), hash)? {
                break;
            }
            fork = *hash;
            start = i + 1;
        }

        let mut reorg = Reorg::default();
        let mut current = head.hash;
        while current != fork {
            let unit = self
                .nodes
                .get(&current)
                .ok_or(DagError::MissingUnit(current))?;
            chain.revert(unit)?;
            reorg.reverted += 1;
            current = *unit.parent().ok_or(DagError::BrokenChain(current))?;
        }

        for hash in &branch[start..] {
            let unit = self.nodes.get(hash).ok_or(DagError::MissingUnit(*hash))?;
            match chain.promote(unit)? {
                Promotion::Applied => reorg.applied += 1,
                Promotion::Rejected(reason) => {
                    let dropped = self.remove_subtree(hash);
                    warn!(
                        unit = %hash.short_hex(),
                        dropped = dropped.len(),
                        %reason,
                        "discarded branch that failed promotion"
                    );
                    reorg.rejected = Some((*hash, reason));
                    break;
                }
            }
        }
        Ok(reorg)
    }

    /// Finalize canonical units deeper than the retention depth and drop
    /// every fork below the new stable head.
    fn enforce_retention<C: CanonicalChain>(
        &mut self,
        asset: &AssetId,
        chain: &mut C,
    ) -> Result<(), C::Error> {
        let (Some(head), Some(stable)) = (chain.canonical_head(asset)?, chain.stable_head(asset)?)
        else {
            return Ok(());
        };
        if head.index <= stable.index + self.retention_depth {
            return Ok(());
        }
        let target = head.index - self.retention_depth;

        let mut path = Vec::new();
        let mut current = head.hash;
        while current != stable.hash {
            let unit = self
                .nodes
                .get(&current)
                .ok_or(DagError::MissingUnit(current))?;
            path.push(current);
            current = *unit.parent().ok_or(DagError::BrokenChain(current))?;
        }
        path.reverse();

        let mut last = None;
        for hash in path {
            let unit = self.nodes.get(&hash).ok_or(DagError::MissingUnit(hash))?;
            if unit.index() > target {
                break;
            }
            chain.finalize(unit)?;
            last = Some(hash);
        }
        if let Some(stable) = last {
            let removed = self.prune(asset, &stable);
            info!(
                asset = %asset.short_hex(),
                stable = %stable.short_hex(),
                index = target,
                removed,
                "finalized units beyond retention depth"
            );
        }
        Ok(())
    }
}
