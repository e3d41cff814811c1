//! Unit validation state machine.
//!
//! A unit starts `NotValidated` and leaves [`UnitValidator::validate_unit`]
//! either rejected with a [`ValidationError`] (whose [`state`] names the
//! failed stage) or accepted as `AuthorSignaturePassed` or `Validated`
//! together with the output view it produces.
//!
//! [`state`]: ValidationError::state

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::debug;
use udl_crypto::SignatureVerifier;
use udl_store::KvRead;
use udl_types::{script, Address, AssetId, GlobalProperty, Transaction, Unit, UnlockScript};

use crate::error::ValidationError;
use crate::utxo::{UtxoSet, UtxoView};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnitState {
    NotValidated,
    InvalidSize,
    InvalidSignature,
    InvalidTransaction,
    /// Author signature valid, witness quorum not reached.
    AuthorSignaturePassed,
    /// Quorum of mediator witnesses reached, or the designated genesis.
    Validated,
}

impl UnitState {
    pub fn is_committable(self) -> bool {
        matches!(self, UnitState::AuthorSignaturePassed | UnitState::Validated)
    }
}

/// An accepted unit's state and the outputs after applying it.
#[derive(Debug)]
pub struct Validation {
    pub state: UnitState,
    pub view: UtxoView,
}

/// Checks one unit against a mediator set and an output set.
pub struct UnitValidator<'a> {
    verifier: &'a dyn SignatureVerifier,
    global: &'a GlobalProperty,
    max_extra_size: usize,
}

impl<'a> UnitValidator<'a> {
    pub fn new(
        verifier: &'a dyn SignatureVerifier,
        global: &'a GlobalProperty,
        max_extra_size: usize,
    ) -> Self {
        Self {
            verifier,
            global,
            max_extra_size,
        }
    }

    /// Run every stage in order. `is_genesis` skips the signature stage.
    pub fn validate_unit<R: KvRead + ?Sized>(
        &self,
        unit: &Unit,
        is_genesis: bool,
        utxos: &UtxoSet<'_, R>,
    ) -> Result<Validation, ValidationError> {
        self.check_structure(unit)?;
        let state = if is_genesis {
            UnitState::Validated
        } else {
            self.check_signatures(unit)?
        };
        let view = self.check_transactions(unit, utxos)?;
        debug!(
            unit = %unit.hash().short_hex(),
            number = %unit.number(),
            ?state,
            txs = unit.transactions().len(),
            "unit validated"
        );
        Ok(Validation { state, view })
    }

    pub fn check_structure(&self, unit: &Unit) -> Result<(), ValidationError> {
        let header = unit.header();
        let malformed = |e: udl_types::TypeError| ValidationError::Malformed(e.to_string());

        let actual = Unit::encoded_size(header, unit.transactions()).map_err(malformed)?;
        if actual != unit.declared_size() {
            return Err(ValidationError::InvalidSize {
                declared: unit.declared_size(),
                actual,
            });
        }
        if header.extra.len() > self.max_extra_size {
            return Err(ValidationError::Malformed(format!(
                "extra is {} bytes, limit is {}",
                header.extra.len(),
                self.max_extra_size
            )));
        }
        if unit.index() > 0 && header.parent_hashes.is_empty() {
            return Err(ValidationError::Malformed(
                "unit above height 0 has no parent".into(),
            ));
        }
        if !header.asset_ids.contains(&unit.asset_id()) {
            return Err(ValidationError::Malformed(
                "header does not list its own asset".into(),
            ));
        }
        let tx_root = Unit::compute_tx_root(unit.transactions()).map_err(malformed)?;
        if tx_root != header.tx_root {
            return Err(ValidationError::Malformed("transaction root mismatch".into()));
        }
        let mut seen = HashSet::with_capacity(unit.transactions().len());
        for tx in unit.transactions() {
            let tx_hash = tx.hash().map_err(malformed)?;
            if !seen.insert(tx_hash) {
                return Err(ValidationError::Malformed(format!(
                    "transaction {tx_hash} appears twice"
                )));
            }
        }
        Ok(())
    }

    /// Verify the author, then count valid witnesses from distinct active
    /// mediators against the threshold.
    pub fn check_signatures(&self, unit: &Unit) -> Result<UnitState, ValidationError> {
        let header = unit.header();
        let author = &header.author;
        if author.public_key.is_empty() || author.signature.is_empty() {
            return Err(ValidationError::InvalidSignature("unsigned unit".into()));
        }
        if Address::from_public_key(&author.public_key) != author.address {
            return Err(ValidationError::InvalidSignature(
                "author address does not match its key".into(),
            ));
        }
        if !self.global.is_open() {
            match self.global.mediator(&author.address) {
                Some(m) if m.public_key == author.public_key => {}
                Some(_) => {
                    return Err(ValidationError::InvalidSignature(
                        "author key differs from the registered mediator key".into(),
                    ))
                }
                None => {
                    return Err(ValidationError::InvalidSignature(format!(
                        "author {} is not an active mediator",
                        author.address.short_hex()
                    )))
                }
            }
        }

        let signing_hash = header
            .signing_hash()
            .map_err(|e| ValidationError::Malformed(e.to_string()))?;
        let message = signing_hash.as_bytes();
        if !self
            .verifier
            .verify(&author.public_key, message, &author.signature)
        {
            return Err(ValidationError::InvalidSignature(
                "author signature does not verify".into(),
            ));
        }

        let mut signers = HashSet::new();
        for witness in &header.witnesses {
            let Some(mediator) = self.global.mediator(&witness.address) else {
                continue;
            };
            if mediator.public_key == witness.public_key
                && self
                    .verifier
                    .verify(&witness.public_key, message, &witness.signature)
            {
                signers.insert(witness.address);
            }
        }

        let threshold = self.global.threshold as usize;
        if threshold > 0 && signers.len() >= threshold {
            Ok(UnitState::Validated)
        } else {
            Ok(UnitState::AuthorSignaturePassed)
        }
    }

    /// Check every transaction against the outputs visible through `utxos`,
    /// fetching all inputs of the unit in one read.
    pub fn check_transactions<R: KvRead + ?Sized>(
        &self,
        unit: &Unit,
        utxos: &UtxoSet<'_, R>,
    ) -> Result<UtxoView, ValidationError> {
        let transactions = unit.transactions();
        let mut view =
            utxos.fetch_view(transactions.iter().flat_map(Transaction::spent_out_points))?;
        let mut consumed = HashSet::new();

        for (position, tx) in transactions.iter().enumerate() {
            let tx_hash = tx
                .hash()
                .map_err(|e| ValidationError::Malformed(e.to_string()))?;
            let signing_hash = tx
                .signing_hash()
                .map_err(|e| ValidationError::Malformed(e.to_string()))?;
            let coinbase = position == 0 && tx.is_coinbase();

            let mut inputs: BTreeMap<AssetId, u64> = BTreeMap::new();
            let mut outputs: BTreeMap<AssetId, u64> = BTreeMap::new();

            for (message_index, payment) in tx.payments() {
                let is_coinbase_message = coinbase && message_index == 0;
                for input in &payment.inputs {
                    let Some(op) = input.previous_out_point else {
                        if is_coinbase_message {
                            continue;
                        }
                        return Err(ValidationError::tx(tx_hash, "misplaced coinbase input"));
                    };
                    if !consumed.insert(op) {
                        return Err(ValidationError::tx(
                            tx_hash,
                            format!("{op} is spent twice in the unit"),
                        ));
                    }
                    let utxo = view.get(&op).ok_or_else(|| {
                        ValidationError::tx(tx_hash, format!("{op} is missing or spent"))
                    })?;
                    self.check_unlock(tx_hash, &utxo.lock_script, &input.signature_script, &signing_hash)?;
                    add_value(&mut inputs, utxo.asset.asset_id, utxo.amount, tx_hash)?;
                }
                if is_coinbase_message {
                    continue;
                }
                for output in &payment.outputs {
                    add_value(&mut outputs, output.asset.asset_id, output.value, tx_hash)?;
                }
            }

            for (asset, spent) in &outputs {
                let available = inputs.get(asset).copied().unwrap_or(0);
                if available < *spent {
                    return Err(ValidationError::tx(
                        tx_hash,
                        format!("outputs of {asset} exceed inputs: {spent} > {available}"),
                    ));
                }
            }

            view.apply_transaction(tx)
                .map_err(|e| ValidationError::Malformed(e.to_string()))?;
        }
        Ok(view)
    }

    fn check_unlock(
        &self,
        tx_hash: udl_types::Hash,
        lock_script: &[u8],
        signature_script: &[u8],
        signing_hash: &udl_types::Hash,
    ) -> Result<(), ValidationError> {
        let owner = script::owner(lock_script)
            .ok_or_else(|| ValidationError::tx(tx_hash, "unsupported lock script"))?;
        let unlock = UnlockScript::from_bytes(signature_script)
            .map_err(|_| ValidationError::tx(tx_hash, "malformed unlock script"))?;
        if Address::from_public_key(&unlock.public_key) != owner {
            return Err(ValidationError::tx(tx_hash, "unlock key does not own the output"));
        }
        if !self
            .verifier
            .verify(&unlock.public_key, signing_hash.as_bytes(), &unlock.signature)
        {
            return Err(ValidationError::tx(tx_hash, "unlock signature does not verify"));
        }
        Ok(())
    }
}

fn add_value(
    totals: &mut BTreeMap<AssetId, u64>,
    asset: AssetId,
    value: u64,
    tx_hash: udl_types::Hash,
) -> Result<(), ValidationError> {
    let total = totals.entry(asset).or_default();
    *total = total
        .checked_add(value)
        .ok_or_else(|| ValidationError::tx(tx_hash, "value overflow"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use udl_crypto::{Ed25519Verifier, SigningKey};
    use udl_store::InMemoryKvStore;
    use udl_types::{
        Asset, ChainIndex, Hash, Header, Input, MediatorInfo, Message, OutPoint, Output,
        PaymentPayload,
    };

    fn ptn() -> Asset {
        Asset::new(AssetId::from_symbol("PTN"))
    }

    fn key(seed: u8) -> SigningKey {
        SigningKey::from_bytes([seed; 32])
    }

    fn address_of(key: &SigningKey) -> Address {
        Address::from_public_key(key.verifying_key().as_bytes())
    }

    fn mediators(keys: &[&SigningKey], threshold: u32) -> GlobalProperty {
        GlobalProperty::new(
            keys.iter()
                .enumerate()
                .map(|(i, k)| {
                    MediatorInfo::from_public_key(k.verifying_key().as_bytes().to_vec(), format!("node-{i}"))
                })
                .collect(),
            threshold,
        )
    }

    fn payment(inputs: Vec<Input>, outputs: Vec<(u64, Address)>) -> Transaction {
        Transaction::new(
            vec![Message::Payment(PaymentPayload {
                inputs,
                outputs: outputs
                    .into_iter()
                    .map(|(value, to)| Output {
                        value,
                        lock_script: to.lock_script(),
                        asset: ptn(),
                    })
                    .collect(),
            })],
            0,
        )
    }

    fn signed_spend(owner: &SigningKey, op: OutPoint, outputs: Vec<(u64, Address)>) -> Transaction {
        let mut tx = payment(vec![Input::spend(op)], outputs);
        let signing_hash = tx.signing_hash().unwrap();
        let unlock = UnlockScript {
            public_key: owner.verifying_key().as_bytes().to_vec(),
            signature: owner.sign(signing_hash.as_bytes()).to_bytes().to_vec(),
        };
        if let Message::Payment(p) = &mut tx.messages[0] {
            p.inputs[0].signature_script = unlock.to_bytes().unwrap();
        }
        tx.invalidate_hash();
        tx
    }

    fn build(index: u64, txs: Vec<Transaction>, author: Option<&SigningKey>, witnesses: &[&SigningKey]) -> Unit {
        let parents = if index == 0 { vec![] } else { vec![Hash::from_digest([1; 32])] };
        let mut header = Header::new(ChainIndex::new(ptn().asset_id, index), parents, 0);
        header.tx_root = Unit::compute_tx_root(&txs).unwrap();
        if let Some(author) = author {
            header.sign_author(author).unwrap();
        }
        for w in witnesses {
            header.add_witness(w).unwrap();
        }
        Unit::new(header, txs).unwrap()
    }

    /// A store holding one 100-unit output owned by `owner`.
    fn funded(owner: &SigningKey) -> (InMemoryKvStore, OutPoint) {
        let store = InMemoryKvStore::new();
        let coinbase = payment(vec![Input::coinbase(vec![])], vec![(100, address_of(owner))]);
        let set = UtxoSet::new(&store);
        set.commit(&set.view_after(std::slice::from_ref(&coinbase)).unwrap())
            .unwrap();
        (store, OutPoint::new(coinbase.hash().unwrap(), 0, 0))
    }

    // -----------------------------------------------------------------------
    // Structure
    // -----------------------------------------------------------------------

    #[test]
    fn size_mismatch_is_rejected() {
        let gp = GlobalProperty::default();
        let validator = UnitValidator::new(&Ed25519Verifier, &gp, 32);
        let unit = build(0, vec![], None, &[]);
        let (header, txs) = unit.into_parts();
        let tampered = Unit::from_parts(header, txs, 9999).unwrap();
        let err = validator.check_structure(&tampered).unwrap_err();
        assert_eq!(err.state(), UnitState::InvalidSize);
        assert!(matches!(err, ValidationError::InvalidSize { declared: 9999, .. }));
    }

    #[test]
    fn oversized_extra_is_rejected() {
        let gp = GlobalProperty::default();
        let validator = UnitValidator::new(&Ed25519Verifier, &gp, 4);
        let mut header = Header::new(ChainIndex::new(ptn().asset_id, 0), vec![], 0);
        header.extra = vec![0; 5];
        header.tx_root = Unit::compute_tx_root(&[]).unwrap();
        let unit = Unit::new(header, vec![]).unwrap();
        assert!(matches!(
            validator.check_structure(&unit),
            Err(ValidationError::Malformed(_))
        ));
    }

    #[test]
    fn wrong_tx_root_is_rejected() {
        let gp = GlobalProperty::default();
        let validator = UnitValidator::new(&Ed25519Verifier, &gp, 32);
        let tx = payment(vec![Input::coinbase(vec![])], vec![(1, Address::default())]);
        let header = Header::new(ChainIndex::new(ptn().asset_id, 0), vec![], 0);
        let unit = Unit::new(header, vec![tx]).unwrap();
        assert!(validator.check_structure(&unit).is_err());
    }

    #[test]
    fn repeated_transaction_is_rejected() {
        let gp = GlobalProperty::default();
        let validator = UnitValidator::new(&Ed25519Verifier, &gp, 32);
        let a = payment(vec![Input::coinbase(vec![1])], vec![(1, Address::default())]);
        let b = payment(vec![Input::coinbase(vec![2])], vec![(1, Address::default())]);
        let c = payment(vec![Input::coinbase(vec![3])], vec![(1, Address::default())]);

        let honest = build(0, vec![a.clone(), b.clone(), c.clone()], None, &[]);
        assert!(validator.check_structure(&honest).is_ok());

        let padded = build(0, vec![a, b, c.clone(), c], None, &[]);
        assert_ne!(padded.header().tx_root, honest.header().tx_root);
        let err = validator.check_structure(&padded).unwrap_err();
        assert!(matches!(err, ValidationError::Malformed(ref m) if m.contains("twice")), "{err}");
    }

    // -----------------------------------------------------------------------
    // Signatures
    // -----------------------------------------------------------------------

    #[test]
    fn author_only_passes_below_quorum() {
        let (m1, m2, m3) = (key(1), key(2), key(3));
        let gp = mediators(&[&m1, &m2, &m3], 2);
        let validator = UnitValidator::new(&Ed25519Verifier, &gp, 32);

        let unit = build(1, vec![], Some(&m1), &[&m2]);
        assert_eq!(
            validator.check_signatures(&unit).unwrap(),
            UnitState::AuthorSignaturePassed
        );
        let unit = build(1, vec![], Some(&m1), &[&m2, &m3]);
        assert_eq!(validator.check_signatures(&unit).unwrap(), UnitState::Validated);
    }

    #[test]
    fn repeated_or_foreign_witnesses_do_not_count() {
        let (m1, m2, outsider) = (key(1), key(2), key(9));
        let gp = mediators(&[&m1, &m2], 2);
        let validator = UnitValidator::new(&Ed25519Verifier, &gp, 32);
        let unit = build(1, vec![], Some(&m1), &[&m2, &m2, &outsider]);
        assert_eq!(
            validator.check_signatures(&unit).unwrap(),
            UnitState::AuthorSignaturePassed
        );
    }

    #[test]
    fn non_mediator_author_is_rejected() {
        let (m1, outsider) = (key(1), key(9));
        let gp = mediators(&[&m1], 1);
        let validator = UnitValidator::new(&Ed25519Verifier, &gp, 32);
        let err = validator
            .check_signatures(&build(1, vec![], Some(&outsider), &[]))
            .unwrap_err();
        assert_eq!(err.state(), UnitState::InvalidSignature);
    }

    #[test]
    fn tampered_author_signature_is_rejected() {
        let m1 = key(1);
        let gp = mediators(&[&m1], 1);
        let validator = UnitValidator::new(&Ed25519Verifier, &gp, 32);
        let unit = build(1, vec![], Some(&m1), &[]);
        let (mut header, txs) = unit.into_parts();
        header.author.signature[0] ^= 0xff;
        let unit = Unit::new(header, txs).unwrap();
        assert!(validator.check_signatures(&unit).is_err());
        assert!(validator
            .check_signatures(&build(1, vec![], None, &[]))
            .is_err());
    }

    // -----------------------------------------------------------------------
    // Transactions
    // -----------------------------------------------------------------------

    #[test]
    fn valid_spend_produces_view() {
        let owner = key(5);
        let (store, op) = funded(&owner);
        let gp = GlobalProperty::default();
        let validator = UnitValidator::new(&Ed25519Verifier, &gp, 32);
        let to = Address::from_bytes([7; 20]);
        let unit = build(1, vec![signed_spend(&owner, op, vec![(90, to)])], Some(&owner), &[]);

        let validation = validator
            .validate_unit(&unit, false, &UtxoSet::new(&store))
            .unwrap();
        assert_eq!(validation.state, UnitState::AuthorSignaturePassed);
        assert_eq!(validation.view.get(&op), None);
        assert_eq!(validation.view.unspent().count(), 1);
    }

    #[test]
    fn double_spend_within_unit_is_rejected() {
        let owner = key(5);
        let (store, op) = funded(&owner);
        let gp = GlobalProperty::default();
        let validator = UnitValidator::new(&Ed25519Verifier, &gp, 32);
        let to = Address::from_bytes([7; 20]);
        let unit = build(
            1,
            vec![
                signed_spend(&owner, op, vec![(50, to)]),
                signed_spend(&owner, op, vec![(40, to)]),
            ],
            Some(&owner),
            &[],
        );
        let err = validator
            .check_transactions(&unit, &UtxoSet::new(&store))
            .unwrap_err();
        assert_eq!(err.state(), UnitState::InvalidTransaction);
        assert!(err.to_string().contains("spent twice"));
    }

    #[test]
    fn overspend_and_missing_inputs_are_rejected() {
        let owner = key(5);
        let (store, op) = funded(&owner);
        let gp = GlobalProperty::default();
        let validator = UnitValidator::new(&Ed25519Verifier, &gp, 32);
        let to = Address::from_bytes([7; 20]);
        let set = UtxoSet::new(&store);

        let greedy = build(1, vec![signed_spend(&owner, op, vec![(101, to)])], None, &[]);
        assert!(validator.check_transactions(&greedy, &set).is_err());

        let ghost = OutPoint::new(Hash::from_digest([4; 32]), 0, 0);
        let missing = build(1, vec![signed_spend(&owner, ghost, vec![(1, to)])], None, &[]);
        let err = validator.check_transactions(&missing, &set).unwrap_err();
        assert!(err.to_string().contains("missing or spent"));
    }

    #[test]
    fn foreign_key_cannot_unlock() {
        let (owner, thief) = (key(5), key(6));
        let (store, op) = funded(&owner);
        let gp = GlobalProperty::default();
        let validator = UnitValidator::new(&Ed25519Verifier, &gp, 32);
        let unit = build(1, vec![signed_spend(&thief, op, vec![(10, address_of(&thief))])], None, &[]);
        assert!(validator
            .check_transactions(&unit, &UtxoSet::new(&store))
            .is_err());
    }

    #[test]
    fn coinbase_only_in_first_transaction() {
        let store = InMemoryKvStore::new();
        let gp = GlobalProperty::default();
        let validator = UnitValidator::new(&Ed25519Verifier, &gp, 32);
        let to = Address::from_bytes([7; 20]);
        let mint = || payment(vec![Input::coinbase(vec![])], vec![(10, to)]);

        let ok = build(1, vec![mint()], None, &[]);
        assert!(validator.check_transactions(&ok, &UtxoSet::new(&store)).is_ok());

        let mut second = mint();
        second.lock_time = 1;
        let bad = build(1, vec![mint(), second], None, &[]);
        let err = validator
            .check_transactions(&bad, &UtxoSet::new(&store))
            .unwrap_err();
        assert!(err.to_string().contains("coinbase"));
    }

    #[test]
    fn outputs_created_earlier_in_the_unit_are_spendable() {
        let owner = key(5);
        let store = InMemoryKvStore::new();
        let gp = GlobalProperty::default();
        let validator = UnitValidator::new(&Ed25519Verifier, &gp, 32);
        let mint = payment(vec![Input::coinbase(vec![])], vec![(10, address_of(&owner))]);
        let op = OutPoint::new(mint.hash().unwrap(), 0, 0);
        let spend = signed_spend(&owner, op, vec![(10, Address::from_bytes([7; 20]))]);
        let unit = build(1, vec![mint, spend], None, &[]);
        let view = validator
            .check_transactions(&unit, &UtxoSet::new(&store))
            .unwrap();
        assert_eq!(view.get(&op), None);
    }
}
