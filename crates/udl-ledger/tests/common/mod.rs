#![allow(dead_code)]

use udl_crypto::SigningKey;
use udl_ledger::{Ledger, LedgerConfig};
use udl_types::{
    Address, Asset, AssetId, ChainIndex, GlobalProperty, Hash, Header, Input, MediatorInfo,
    Message, OutPoint, Output, PaymentPayload, Transaction, Unit, UnlockScript,
};

pub fn ptn() -> AssetId {
    AssetId::from_symbol("PTN")
}

pub fn key(seed: u8) -> SigningKey {
    SigningKey::from_bytes([seed; 32])
}

pub fn address_of(key: &SigningKey) -> Address {
    Address::from_public_key(key.verifying_key().as_bytes())
}

/// Three mediators (seeds 1, 2, 3), quorum of two witnesses.
pub struct Net {
    pub mediators: Vec<SigningKey>,
    pub alice: SigningKey,
    pub bob: SigningKey,
}

impl Net {
    pub fn new() -> Self {
        Self {
            mediators: (1..=3).map(key).collect(),
            alice: key(10),
            bob: key(11),
        }
    }

    pub fn global_property(&self) -> GlobalProperty {
        mediator_set(&self.mediators.iter().collect::<Vec<_>>(), 2)
    }

    pub fn config(&self, retention_depth: u64) -> LedgerConfig {
        LedgerConfig {
            retention_depth,
            genesis_global_property: self.global_property(),
            ..Default::default()
        }
    }

    pub fn ledger(&self) -> Ledger {
        Ledger::in_memory(self.config(15)).unwrap()
    }

    /// Genesis paying `amount` to alice.
    pub fn genesis(&self, amount: u64) -> Unit {
        let mint = coinbase(&address_of(&self.alice), amount, b"genesis");
        root(ptn(), vec![mint], Some(&self.mediators[0]), &[])
    }

    /// Author-signed child, below quorum.
    pub fn pending(&self, parent: &Unit, txs: Vec<Transaction>, time: i64) -> Unit {
        child(parent, txs, &self.mediators[0], &[], time)
    }

    /// Child carrying a witness quorum.
    pub fn quorum(&self, parent: &Unit, txs: Vec<Transaction>, time: i64) -> Unit {
        child(
            parent,
            txs,
            &self.mediators[0],
            &[&self.mediators[1], &self.mediators[2]],
            time,
        )
    }

    /// `count` author-signed units extending `parent`, oldest first.
    pub fn branch(&self, parent: &Unit, count: usize, time: i64) -> Vec<Unit> {
        let mut units: Vec<Unit> = Vec::with_capacity(count);
        for _ in 0..count {
            let tip = units.last().unwrap_or(parent).clone();
            units.push(self.pending(&tip, vec![], time));
        }
        units
    }
}

pub fn mediator_set(keys: &[&SigningKey], threshold: u32) -> GlobalProperty {
    GlobalProperty::new(
        keys.iter()
            .enumerate()
            .map(|(i, k)| {
                MediatorInfo::from_public_key(
                    k.verifying_key().as_bytes().to_vec(),
                    format!("node-{i}"),
                )
            })
            .collect(),
        threshold,
    )
}

pub fn payment(inputs: Vec<Input>, outputs: Vec<(u64, Address)>) -> Transaction {
    Transaction::new(
        vec![Message::Payment(PaymentPayload {
            inputs,
            outputs: outputs
                .into_iter()
                .map(|(value, to)| Output {
                    value,
                    lock_script: to.lock_script(),
                    asset: Asset::new(ptn()),
                })
                .collect(),
        })],
        0,
    )
}

/// Newly minted value; `tag` keeps otherwise identical mints apart.
pub fn coinbase(to: &Address, amount: u64, tag: &[u8]) -> Transaction {
    payment(vec![Input::coinbase(tag.to_vec())], vec![(amount, *to)])
}

/// Spend `op`, owned by `owner`, into `outputs`.
pub fn spend(owner: &SigningKey, op: OutPoint, outputs: Vec<(u64, Address)>) -> Transaction {
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

/// First output of the first transaction of `unit`.
pub fn first_output(unit: &Unit) -> OutPoint {
    OutPoint::new(unit.transactions()[0].hash().unwrap(), 0, 0)
}

fn seal(mut header: Header, txs: Vec<Transaction>, author: Option<&SigningKey>, witnesses: &[&SigningKey]) -> Unit {
    header.tx_root = Unit::compute_tx_root(&txs).unwrap();
    if let Some(author) = author {
        header.sign_author(author).unwrap();
    }
    for w in witnesses {
        header.add_witness(w).unwrap();
    }
    Unit::new(header, txs).unwrap()
}

pub fn root(
    asset: AssetId,
    txs: Vec<Transaction>,
    author: Option<&SigningKey>,
    witnesses: &[&SigningKey],
) -> Unit {
    seal(Header::new(ChainIndex::new(asset, 0), vec![], 0), txs, author, witnesses)
}

pub fn child(
    parent: &Unit,
    txs: Vec<Transaction>,
    author: &SigningKey,
    witnesses: &[&SigningKey],
    time: i64,
) -> Unit {
    let header = Header::new(parent.number().next(), vec![parent.hash()], time);
    seal(header, txs, Some(author), witnesses)
}

pub fn hash_of(units: &[Unit]) -> Vec<Hash> {
    units.iter().map(Unit::hash).collect()
}
