//! The ledger façade: atomic commit, fork handling and queries.
//!
//! A [`Ledger`] owns one `RwLock` over its pending state. Every mutation
//! (commit, batch insert, main-chain switch, UTXO writes, schedule updates)
//! holds the write lock from the first read to the last write, and every
//! query holds the read lock. Share a ledger between threads through
//! `Arc<Ledger>`.
//!
//! Head changes are queued under the write lock and delivered once it is
//! released, so a subscriber may query the ledger before draining its
//! stream.
//!
//! # Views
//!
//! Canonical state above an asset's stable head is reversible. Output and
//! wallet queries answer from the *stable* state by default, obtained by
//! rewinding the undo records of every pending canonical unit in an
//! [`Overlay`]; the `*_with_pending` variants read the canonical head
//! directly.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, info, warn};
use udl_crypto::{Ed25519Verifier, SignatureVerifier};
use udl_dag::{CanonicalChain, ChainTip, HeadChange, MemDag};
use udl_store::{
    schema, BatchOp, HeadKind, InMemoryKvStore, KvRead, KvStore, Overlay, WriteBatch,
};
use udl_types::{
    Address, AssetId, ChainIndex, ContractDeployPayload, ContractTemplatePayload, Hash, Header,
    OutPoint, Transaction, Unit, Utxo,
};

use crate::cache::UnitCache;
use crate::chain::{self, ChainState, TxLookup};
use crate::config::LedgerConfig;
use crate::error::{InsertBatchError, LedgerError, LedgerResult};
use crate::events::{HeadFeed, HeadStream};
use crate::utxo::{UtxoSet, UtxoView};
use crate::validator::{UnitState, UnitValidator};

/// Store state as seen from some point of the chain.
pub(crate) type StateView<'a> = Overlay<'a, dyn KvStore>;

/// What `commit` did with a unit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommitOutcome {
    pub hash: Hash,
    /// `Validated` units are canonical and stable; `AuthorSignaturePassed`
    /// units are pending and canonical only if their branch won.
    pub state: UnitState,
    /// The unit's asset head after the commit.
    pub head: Option<ChainTip>,
    /// Every head that moved, in publication order.
    pub changes: Vec<HeadChange>,
}

/// The head pointers of one asset.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HeadHashes {
    pub header: Option<Hash>,
    pub unit: Option<Hash>,
    pub fast: Option<Hash>,
    pub stable: Option<Hash>,
}

struct LedgerState {
    memdag: MemDag,
}

/// Outcome of placing one unit before the main chain is re-evaluated.
struct Placement {
    state: UnitState,
    reverted: usize,
    applied: usize,
    failure: Option<LedgerError>,
}

impl Placement {
    fn settled(state: UnitState) -> Self {
        Self {
            state,
            reverted: 0,
            applied: 0,
            failure: None,
        }
    }
}

pub struct Ledger {
    store: Arc<dyn KvStore>,
    verifier: Arc<dyn SignatureVerifier>,
    config: LedgerConfig,
    state: RwLock<LedgerState>,
    cache: UnitCache,
    feed: HeadFeed,
}

impl Ledger {
    /// Open a ledger over `store`.
    ///
    /// Canonical units above each asset's stable head are reloaded into the
    /// MemDag. Pending side branches do not survive a restart.
    pub fn new(
        store: Arc<dyn KvStore>,
        verifier: Arc<dyn SignatureVerifier>,
        config: LedgerConfig,
    ) -> LedgerResult<Self> {
        let mut memdag = MemDag::new(config.retention_depth);
        for asset in chain::assets(store.as_ref())? {
            for hash in chain::pending_canonical(store.as_ref(), &asset)? {
                let unit = chain::read_unit(store.as_ref(), &hash)?.ok_or_else(|| {
                    LedgerError::Corrupt(format!("canonical unit {hash} is missing"))
                })?;
                memdag.save(unit, |_| true)?;
            }
        }
        info!(
            pending = memdag.len(),
            retention_depth = config.retention_depth,
            "ledger opened"
        );
        Ok(Self {
            store,
            verifier,
            cache: UnitCache::new(config.unit_cache_capacity),
            feed: HeadFeed::new(config.event_capacity),
            state: RwLock::new(LedgerState { memdag }),
            config,
        })
    }

    /// A ledger over a fresh in-memory store with Ed25519 verification.
    pub fn in_memory(config: LedgerConfig) -> LedgerResult<Self> {
        Self::new(
            Arc::new(InMemoryKvStore::new()),
            Arc::new(Ed25519Verifier),
            config,
        )
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    fn read_state(&self) -> LedgerResult<RwLockReadGuard<'_, LedgerState>> {
        self.state.read().map_err(|_| LedgerError::Poisoned)
    }

    fn write_state(&self) -> LedgerResult<RwLockWriteGuard<'_, LedgerState>> {
        self.state.write().map_err(|_| LedgerError::Poisoned)
    }

    fn chain(&self) -> ChainState<'_> {
        ChainState {
            store: self.store.as_ref(),
            verifier: self.verifier.as_ref(),
            config: &self.config,
            cache: &self.cache,
        }
    }

    /// Run `f` against the canonical store under the read lock.
    pub(crate) fn read_store<T>(
        &self,
        f: impl FnOnce(&dyn KvStore) -> LedgerResult<T>,
    ) -> LedgerResult<T> {
        let _state = self.read_state()?;
        f(self.store.as_ref())
    }

    /// Run `f` against the canonical store under the write lock.
    pub(crate) fn write_store<T>(
        &self,
        f: impl FnOnce(&dyn KvStore) -> LedgerResult<T>,
    ) -> LedgerResult<T> {
        let _state = self.write_state()?;
        f(self.store.as_ref())
    }

    // ---------------------------------------------------------------
    // Commit
    // ---------------------------------------------------------------

    /// Validate and commit one unit.
    ///
    /// Validation failures leave no effect. A quorum-validated unit becomes
    /// canonical and stable, reorganizing onto its branch if needed; an
    /// author-signed unit joins the MemDag. The main chain is re-evaluated
    /// afterwards in both cases.
    ///
    /// Head changes are delivered to subscribers after the write lock is
    /// released.
    pub fn commit(&self, unit: Unit) -> LedgerResult<CommitOutcome> {
        let outcome = {
            let mut state = self.write_state()?;
            self.commit_locked(&mut state, unit)
        };
        self.feed.flush()?;
        outcome
    }

    /// Commit a parent chain of units in order.
    ///
    /// Each unit must extend the one before it. The batch stops at the first
    /// unit that breaks continuity or fails to commit; the units committed
    /// before it stay committed and their count is reported.
    pub fn insert_batch(&self, units: Vec<Unit>) -> Result<usize, InsertBatchError> {
        let total = units.len();
        let result = self.insert_batch_locked(units);
        let applied = match &result {
            Ok(applied) => *applied,
            Err(err) => err.applied,
        };
        if let Err(source) = self.feed.flush() {
            return Err(InsertBatchError { applied, source });
        }
        match &result {
            Ok(_) => debug!(applied, "batch inserted"),
            Err(err) => warn!(applied, total, error = %err.source, "batch insert stopped"),
        }
        result
    }

    fn insert_batch_locked(&self, units: Vec<Unit>) -> Result<usize, InsertBatchError> {
        let mut state = self.write_state().map_err(|source| InsertBatchError {
            applied: 0,
            source,
        })?;
        let mut applied = 0;
        let mut previous: Option<(ChainIndex, Hash)> = None;
        for (position, unit) in units.into_iter().enumerate() {
            if let Some((number, hash)) = previous {
                if let Some(reason) = discontinuity(&number, &hash, &unit) {
                    return Err(InsertBatchError {
                        applied,
                        source: LedgerError::Continuity { position, reason },
                    });
                }
            }
            previous = Some((unit.number(), unit.hash()));
            if let Err(source) = self.commit_locked(&mut state, unit) {
                return Err(InsertBatchError { applied, source });
            }
            applied += 1;
        }
        Ok(applied)
    }

    /// Re-evaluate fork choice for every asset with pending units.
    pub fn switch_main_chain(&self) -> LedgerResult<Vec<HeadChange>> {
        let changes = {
            let mut state = self.write_state()?;
            let mut chain = self.chain();
            let changes = state.memdag.switch_main_chain(&mut chain)?;
            for change in &changes {
                self.feed.enqueue(change.clone())?;
            }
            changes
        };
        self.feed.flush()?;
        Ok(changes)
    }

    fn commit_locked(&self, state: &mut LedgerState, unit: Unit) -> LedgerResult<CommitOutcome> {
        let store = self.store.as_ref();
        let hash = unit.hash();
        let asset = unit.asset_id();
        let index = unit.index();

        if state.memdag.exists(&hash) || chain::unit_number(store, &hash)?.is_some() {
            return Err(LedgerError::Duplicate(hash));
        }
        for parent in &unit.header().parent_hashes {
            if !state.memdag.exists(parent) && chain::unit_number(store, parent)?.is_none() {
                return Err(LedgerError::Orphan {
                    unit: hash,
                    parent: *parent,
                });
            }
        }

        let mut chain = self.chain();
        let old = chain.canonical_head(&asset)?;
        let (placement, mut changes) = match self.settle(state, &mut chain, unit) {
            Ok(settled) => settled,
            Err(err) => {
                if state.memdag.exists(&hash) && !chain.is_canonical(&asset, index, &hash)? {
                    state.memdag.remove_subtree(&hash);
                    warn!(unit = %hash.short_hex(), error = %err, "dropped unit after failed commit");
                }
                return Err(err);
            }
        };
        let head = chain.canonical_head(&asset)?;

        let (mut reverted, mut applied) = (placement.reverted, placement.applied);
        changes.retain(|change| {
            if change.asset_id != asset {
                return true;
            }
            reverted += change.reverted;
            applied += change.applied;
            false
        });
        if let Some(new) = head.filter(|new| old != Some(*new)) {
            changes.insert(
                0,
                HeadChange {
                    asset_id: asset,
                    old: old.unwrap_or_else(|| ChainTip::new(Hash::null(), 0)),
                    new,
                    reverted,
                    applied,
                },
            );
        }
        for change in &changes {
            self.feed.enqueue(change.clone())?;
        }

        if let Some(err) = placement.failure {
            return Err(err);
        }
        debug!(
            unit = %hash.short_hex(),
            state = ?placement.state,
            head = ?head.map(|h| h.index),
            "committed unit"
        );
        Ok(CommitOutcome {
            hash,
            state: placement.state,
            head,
            changes,
        })
    }

    /// Place `unit` and re-run fork choice.
    fn settle(
        &self,
        state: &mut LedgerState,
        chain: &mut ChainState<'_>,
        unit: Unit,
    ) -> LedgerResult<(Placement, Vec<HeadChange>)> {
        let placement = if unit.index() == 0 {
            self.start_chain(chain, &unit)?
        } else {
            self.place(state, chain, unit)?
        };
        let changes = state.memdag.switch_main_chain(chain)?;
        Ok((placement, changes))
    }

    /// Commit the first unit of an asset's chain.
    ///
    /// The designated genesis (the very first root, with no parents) is
    /// accepted without signature checks; every later root needs a quorum.
    /// Either way it is stable immediately.
    fn start_chain(&self, chain: &mut ChainState<'_>, unit: &Unit) -> LedgerResult<Placement> {
        let store = self.store.as_ref();
        let hash = unit.hash();
        let asset = unit.asset_id();
        if chain.canonical_head(&asset)?.is_some() {
            return Err(LedgerError::StaleFork(hash));
        }
        let is_genesis =
            chain::primary_asset(store)?.is_none() && unit.header().parent_hashes.is_empty();

        let global = chain::global_property(store, &self.config.genesis_global_property)?;
        let validator =
            UnitValidator::new(self.verifier.as_ref(), &global, self.config.max_extra_size);
        let validation = validator
            .validate_unit(unit, is_genesis, &UtxoSet::new(store))
            .map_err(|e| LedgerError::invalid(hash, e))?;
        if validation.state != UnitState::Validated {
            return Err(LedgerError::Signature {
                unit: hash,
                reason: "the first unit of an asset needs a witness quorum".into(),
            });
        }

        chain.apply(unit, &validation.view)?;
        chain.finalize(unit)?;
        info!(
            asset = %asset.short_hex(),
            unit = %hash.short_hex(),
            genesis = is_genesis,
            "asset chain started"
        );
        Ok(Placement::settled(UnitState::Validated))
    }

    /// Validate a unit on its branch and record it.
    fn place(
        &self,
        state: &mut LedgerState,
        chain: &mut ChainState<'_>,
        unit: Unit,
    ) -> LedgerResult<Placement> {
        let store = self.store.as_ref();
        let hash = unit.hash();
        let asset = unit.asset_id();

        let parent = *unit.parent().ok_or_else(|| LedgerError::Structural {
            unit: hash,
            reason: "unit above height 0 has no parent".into(),
        })?;
        let parent_number = match state.memdag.get(&parent) {
            Some(p) => p.number(),
            None => chain::unit_number(store, &parent)?
                .ok_or(LedgerError::Orphan { unit: hash, parent })?,
        };
        if parent_number.asset_id != asset || parent_number.index + 1 != unit.index() {
            return Err(LedgerError::Structural {
                unit: hash,
                reason: format!(
                    "{} does not extend its chain parent at {parent_number}",
                    unit.number()
                ),
            });
        }

        let validation = {
            let base = self.branch_state(state, &asset, &parent, &hash)?;
            let global = chain::global_property(&base, &self.config.genesis_global_property)?;
            let validator =
                UnitValidator::new(self.verifier.as_ref(), &global, self.config.max_extra_size);
            validator
                .validate_unit(&unit, false, &UtxoSet::new(&base))
                .map_err(|e| LedgerError::invalid(hash, e))?
        };

        state.memdag.save(unit.clone(), |_| true)?;
        if validation.state != UnitState::Validated {
            return Ok(Placement::settled(validation.state));
        }

        let reorg = state.memdag.adopt(&hash, chain)?;
        let mut placement = Placement {
            state: UnitState::Validated,
            reverted: reorg.reverted,
            applied: reorg.applied,
            failure: None,
        };
        if let Some((rejected, reason)) = reorg.rejected {
            warn!(
                unit = %hash.short_hex(),
                rejected = %rejected.short_hex(),
                %reason,
                "quorum unit's branch failed promotion"
            );
            placement.failure = Some(LedgerError::Transaction {
                unit: hash,
                reason: format!("branch unit {rejected} failed promotion: {reason}"),
            });
            return Ok(placement);
        }

        chain.finalize(&unit)?;
        let removed = state.memdag.prune(&asset, &hash);
        info!(
            unit = %hash.short_hex(),
            number = %unit.number(),
            removed,
            "quorum unit is stable"
        );
        Ok(placement)
    }

    /// The store as it would be with `parent` as the asset's head.
    ///
    /// Canonical units above the fork point are rewound through their undo
    /// records, and the pending branch up to `parent` is replayed on top.
    /// Only `asset`'s own chain is rewound.
    fn branch_state(
        &self,
        state: &LedgerState,
        asset: &AssetId,
        parent: &Hash,
        unit: &Hash,
    ) -> LedgerResult<StateView<'_>> {
        let store = self.store.as_ref();
        let mut overlay = Overlay::new(store);
        let head = chain::tip(store, HeadKind::Unit, asset)?
            .ok_or_else(|| LedgerError::Corrupt(format!("asset {asset} has no head")))?;
        if *parent == head.hash {
            return Ok(overlay);
        }
        let stable = chain::tip(store, HeadKind::Stable, asset)?
            .ok_or_else(|| LedgerError::Corrupt(format!("asset {asset} has no stable head")))?;

        let path = state.memdag.branch(parent);
        let (fork, replay) = if path.is_empty() {
            let number = chain::unit_number(store, parent)?.ok_or(LedgerError::Orphan {
                unit: *unit,
                parent: *parent,
            })?;
            (number.index, Vec::new())
        } else {
            let mut fork = state
                .memdag
                .branch_root(parent)
                .ok_or_else(|| LedgerError::Corrupt(format!("branch of {parent} has no root")))?;
            let mut start = 0;
            for (i, h) in path.iter().enumerate() {
                let index = state.memdag.get(h).map(Unit::index).unwrap_or_default();
                if chain::canonical_hash(store, asset, index)? != Some(*h) {
                    break;
                }
                fork = *h;
                start = i + 1;
            }
            let index = chain::unit_number(store, &fork)?
                .map(|n| n.index)
                .ok_or(LedgerError::StaleFork(*unit))?;
            (index, path[start..].to_vec())
        };
        if fork < stable.index {
            return Err(LedgerError::StaleFork(*unit));
        }

        for index in (fork + 1..=head.index).rev() {
            let hash = chain::canonical_hash(store, asset, index)?.ok_or_else(|| {
                LedgerError::Corrupt(format!("canonical chain of {asset} has a gap at {index}"))
            })?;
            overlay.rewind(&chain::undo_record(store, &hash)?.log);
        }
        for hash in replay {
            let pending = state
                .memdag
                .get(&hash)
                .ok_or_else(|| LedgerError::Corrupt(format!("pending unit {hash} vanished")))?;
            let view = UtxoSet::new(&overlay).view_after(pending.transactions())?;
            let (batch, _) = chain::stage_unit(&overlay, pending, &view)?;
            for op in batch.into_ops() {
                match op {
                    BatchOp::Put { key, value } => overlay.set(key, Some(value)),
                    BatchOp::Delete { key } => overlay.set(key, None),
                }
            }
        }
        debug!(
            unit = %unit.short_hex(),
            fork,
            head = head.index,
            "validating against side branch"
        );
        Ok(overlay)
    }

    /// The store with every pending canonical unit of every asset undone.
    fn stable_state(&self) -> LedgerResult<StateView<'_>> {
        let store = self.store.as_ref();
        let mut records = Vec::new();
        for asset in chain::assets(store)? {
            for hash in chain::pending_canonical(store, &asset)? {
                records.push(chain::undo_record(store, &hash)?);
            }
        }
        records.sort_by(|a, b| b.seq.cmp(&a.seq));
        let mut overlay = Overlay::new(store);
        for record in &records {
            overlay.rewind(&record.log);
        }
        Ok(overlay)
    }

    fn read_view<T>(
        &self,
        stable: bool,
        f: impl FnOnce(&StateView<'_>) -> LedgerResult<T>,
    ) -> LedgerResult<T> {
        let _state = self.read_state()?;
        let view = if stable {
            self.stable_state()?
        } else {
            Overlay::new(self.store.as_ref())
        };
        f(&view)
    }

    // ---------------------------------------------------------------
    // Units
    // ---------------------------------------------------------------

    pub fn primary_asset(&self) -> LedgerResult<Option<AssetId>> {
        self.read_store(|store| chain::primary_asset(store))
    }

    /// Head unit of the primary asset.
    pub fn current_unit(&self) -> LedgerResult<Option<Unit>> {
        match self.primary_asset()? {
            Some(asset) => self.current_unit_of(&asset),
            None => Ok(None),
        }
    }

    pub fn current_unit_of(&self, asset: &AssetId) -> LedgerResult<Option<Unit>> {
        let _state = self.read_state()?;
        match chain::head(self.store.as_ref(), HeadKind::Unit, asset)? {
            Some(hash) => self.load_unit(&hash),
            None => Ok(None),
        }
    }

    pub fn current_header(&self) -> LedgerResult<Option<Header>> {
        Ok(self.current_unit()?.map(|u| u.into_parts().0))
    }

    fn load_unit(&self, hash: &Hash) -> LedgerResult<Option<Unit>> {
        if let Some(unit) = self.cache.get(hash)? {
            return Ok(Some(unit));
        }
        let unit = chain::read_unit(self.store.as_ref(), hash)?;
        if let Some(unit) = &unit {
            self.cache.insert(unit.clone())?;
        }
        Ok(unit)
    }

    /// A pending or canonical unit.
    pub fn get_unit_by_hash(&self, hash: &Hash) -> LedgerResult<Option<Unit>> {
        let state = self.read_state()?;
        if let Some(unit) = state.memdag.get(hash) {
            return Ok(Some(unit.clone()));
        }
        self.load_unit(hash)
    }

    /// The canonical unit at `number`.
    pub fn get_unit_by_number(&self, number: &ChainIndex) -> LedgerResult<Option<Unit>> {
        let _state = self.read_state()?;
        match chain::canonical_hash(self.store.as_ref(), &number.asset_id, number.index)? {
            Some(hash) => self.load_unit(&hash),
            None => Ok(None),
        }
    }

    pub fn get_header_by_hash(&self, hash: &Hash) -> LedgerResult<Option<Header>> {
        let state = self.read_state()?;
        if let Some(unit) = state.memdag.get(hash) {
            return Ok(Some(unit.header().clone()));
        }
        chain::read_header(self.store.as_ref(), hash)
    }

    pub fn get_header_by_number(&self, number: &ChainIndex) -> LedgerResult<Option<Header>> {
        self.read_store(|store| {
            match chain::canonical_hash(store, &number.asset_id, number.index)? {
                Some(hash) => chain::read_header(store, &hash),
                None => Ok(None),
            }
        })
    }

    pub fn has_unit(&self, hash: &Hash) -> LedgerResult<bool> {
        Ok(self.get_unit_number(hash)?.is_some())
    }

    pub fn get_unit_number(&self, hash: &Hash) -> LedgerResult<Option<ChainIndex>> {
        let state = self.read_state()?;
        if let Some(unit) = state.memdag.get(hash) {
            return Ok(Some(unit.number()));
        }
        chain::unit_number(self.store.as_ref(), hash)
    }

    pub fn get_canonical_hash(&self, asset: &AssetId, index: u64) -> LedgerResult<Option<Hash>> {
        self.read_store(|store| chain::canonical_hash(store, asset, index))
    }

    /// Up to `max` ancestors of `hash` on its own chain, newest first.
    pub fn get_unit_hashes_from_hash(&self, hash: &Hash, max: usize) -> LedgerResult<Vec<Hash>> {
        let state = self.read_state()?;
        let store = self.store.as_ref();
        let mut hashes = Vec::new();
        let mut current = *hash;
        while hashes.len() < max {
            let parent = match state.memdag.get(&current) {
                Some(unit) => unit.parent().copied(),
                None => match chain::read_header(store, &current)? {
                    Some(header) => header.parent().copied(),
                    None => None,
                },
            };
            let Some(parent) = parent else {
                break;
            };
            hashes.push(parent);
            current = parent;
        }
        Ok(hashes)
    }

    pub fn get_transactions_by_hash(&self, hash: &Hash) -> LedgerResult<Option<Vec<Transaction>>> {
        let state = self.read_state()?;
        if let Some(unit) = state.memdag.get(hash) {
            return Ok(Some(unit.transactions().to_vec()));
        }
        chain::read_transactions(self.store.as_ref(), hash)
    }

    /// A canonical transaction and where it lives.
    pub fn get_transaction(&self, tx_hash: &Hash) -> LedgerResult<Option<(Transaction, TxLookup)>> {
        self.read_store(|store| {
            let tx_key = schema::transaction(tx_hash);
            let Some(tx) = schema::get_decoded::<Transaction, _>(store, &tx_key)? else {
                return Ok(None);
            };
            let lookup = schema::get_decoded::<TxLookup, _>(store, &schema::tx_lookup(tx_hash))?
                .ok_or_else(|| {
                    LedgerError::Corrupt(format!("transaction {tx_hash} has no lookup entry"))
                })?;
            Ok(Some((tx, lookup)))
        })
    }

    pub fn head_hashes(&self, asset: &AssetId) -> LedgerResult<HeadHashes> {
        self.read_store(|store| {
            Ok(HeadHashes {
                header: chain::head(store, HeadKind::Header, asset)?,
                unit: chain::head(store, HeadKind::Unit, asset)?,
                fast: chain::head(store, HeadKind::Fast, asset)?,
                stable: chain::head(store, HeadKind::Stable, asset)?,
            })
        })
    }

    pub fn pending_count(&self) -> LedgerResult<usize> {
        Ok(self.read_state()?.memdag.len())
    }

    pub fn is_pending(&self, hash: &Hash) -> LedgerResult<bool> {
        Ok(self.read_state()?.memdag.exists(hash))
    }

    // ---------------------------------------------------------------
    // Outputs and wallets
    // ---------------------------------------------------------------

    pub fn get_utxo_entry(&self, out_point: &OutPoint) -> LedgerResult<Option<Utxo>> {
        self.read_view(true, |view| Ok(UtxoSet::new(view).get(out_point)?))
    }

    pub fn get_utxo_entry_with_pending(&self, out_point: &OutPoint) -> LedgerResult<Option<Utxo>> {
        self.read_view(false, |view| Ok(UtxoSet::new(view).get(out_point)?))
    }

    /// The stable outputs `tx` spends, fetched in one batch.
    pub fn get_utxo_view(&self, tx: &Transaction) -> LedgerResult<UtxoView> {
        self.read_view(true, |view| {
            Ok(UtxoSet::new(view).fetch_view(tx.spent_out_points())?)
        })
    }

    /// Write a view's changes straight to the store in one batch.
    pub fn save_utxo_view(&self, view: &UtxoView) -> LedgerResult<()> {
        self.write_store(|store| Ok(UtxoSet::new(store).commit(view)?))
    }

    pub fn get_addr_outputs(&self, address: &Address) -> LedgerResult<Vec<(OutPoint, Utxo)>> {
        self.read_view(true, |view| Ok(UtxoSet::new(view).address_outputs(address)?))
    }

    pub fn get_addr_outputs_with_pending(
        &self,
        address: &Address,
    ) -> LedgerResult<Vec<(OutPoint, Utxo)>> {
        self.read_view(false, |view| Ok(UtxoSet::new(view).address_outputs(address)?))
    }

    pub fn get_asset_outputs(&self, asset: &AssetId) -> LedgerResult<Vec<(OutPoint, Utxo)>> {
        self.read_view(true, |view| Ok(UtxoSet::new(view).asset_outputs(asset)?))
    }

    /// Stable transactions that pay or spend from `address`.
    pub fn get_addr_transactions(&self, address: &Address) -> LedgerResult<Vec<Transaction>> {
        self.read_view(true, |view| {
            let mut transactions = Vec::new();
            for (key, _) in view.scan_prefix(&schema::address_txs(address))? {
                let tx_hash = schema::hash_suffix(&key).ok_or_else(|| {
                    LedgerError::Corrupt(format!("malformed address index key {}", hex::encode(&key)))
                })?;
                let tx = schema::get_decoded::<Transaction, _>(view, &schema::transaction(&tx_hash))?
                    .ok_or_else(|| {
                        LedgerError::Corrupt(format!("address index references missing {tx_hash}"))
                    })?;
                transactions.push(tx);
            }
            Ok(transactions)
        })
    }

    pub fn wallet_balance(&self, address: &Address, asset: &AssetId) -> LedgerResult<u64> {
        self.read_view(true, |view| Ok(UtxoSet::new(view).balance(address, asset)?))
    }

    pub fn wallet_balance_with_pending(
        &self,
        address: &Address,
        asset: &AssetId,
    ) -> LedgerResult<u64> {
        self.read_view(false, |view| Ok(UtxoSet::new(view).balance(address, asset)?))
    }

    pub fn wallet_tokens(&self, address: &Address) -> LedgerResult<BTreeMap<AssetId, u64>> {
        self.read_view(true, |view| Ok(UtxoSet::new(view).list_tokens(address)?))
    }

    pub fn wallet_tokens_with_pending(
        &self,
        address: &Address,
    ) -> LedgerResult<BTreeMap<AssetId, u64>> {
        self.read_view(false, |view| Ok(UtxoSet::new(view).list_tokens(address)?))
    }

    // ---------------------------------------------------------------
    // Contracts and configuration
    // ---------------------------------------------------------------

    pub fn get_contract(&self, contract_id: &Address) -> LedgerResult<Option<ContractDeployPayload>> {
        self.read_store(|store| Ok(schema::get_decoded(store, &schema::contract(contract_id))?))
    }

    /// Template deployed by the transaction `tx_hash`.
    pub fn get_contract_template(
        &self,
        tx_hash: &Hash,
    ) -> LedgerResult<Option<ContractTemplatePayload>> {
        self.read_store(|store| {
            Ok(schema::get_decoded(store, &schema::contract_template(tx_hash))?)
        })
    }

    pub fn get_config(&self, key: &str) -> LedgerResult<Option<Vec<u8>>> {
        self.read_store(|store| Ok(store.get(&schema::config(key))?))
    }

    // ---------------------------------------------------------------
    // Chain-head feed
    // ---------------------------------------------------------------

    /// Receive every canonical head change from now on.
    ///
    /// The ledger blocks while this subscriber's queue is full; drop the
    /// receiver to unsubscribe.
    pub fn subscribe(&self) -> LedgerResult<HeadStream> {
        self.feed.subscribe()
    }

    /// End every head stream.
    pub fn close_feed(&self) -> LedgerResult<()> {
        self.feed.close()
    }

    /// Store a value outside any unit, e.g. collaborator-supplied state.
    pub(crate) fn put_property<T: serde::Serialize>(
        &self,
        key: Vec<u8>,
        value: &T,
    ) -> LedgerResult<()> {
        self.write_store(|store| {
            let mut batch = WriteBatch::new();
            batch.put_encoded(key, value)?;
            Ok(store.write(batch)?)
        })
    }
}

/// Why `next` cannot follow the unit `hash` at `number` in a batch.
fn discontinuity(number: &ChainIndex, hash: &Hash, next: &Unit) -> Option<String> {
    if next.asset_id() != number.asset_id {
        Some(format!("asset changes from {number} to {}", next.number()))
    } else if next.index() != number.index + 1 {
        Some(format!("{} does not follow {number}", next.number()))
    } else if next.parent() != Some(hash) {
        Some(format!("{} does not reference {hash}", next.hash()))
    } else {
        None
    }
}

impl std::fmt::Debug for Ledger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ledger")
            .field("config", &self.config)
            .field("cached_units", &self.cache.len())
            .field("subscribers", &self.feed.subscriber_count().ok())
            .finish_non_exhaustive()
    }
}
