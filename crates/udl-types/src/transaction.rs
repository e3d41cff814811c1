use std::fmt;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use udl_crypto::ContentHasher;

use crate::asset::Asset;
use crate::error::TypeResult;
use crate::hash::Hash;
use crate::message::Message;

/// Reference to one output of one message of one transaction.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OutPoint {
    pub tx_hash: Hash,
    pub message_index: u32,
    pub out_index: u32,
}

impl OutPoint {
    pub fn new(tx_hash: Hash, message_index: u32, out_index: u32) -> Self {
        Self {
            tx_hash,
            message_index,
            out_index,
        }
    }
}

impl fmt::Debug for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "OutPoint({}:{}:{})",
            self.tx_hash.short_hex(),
            self.message_index,
            self.out_index
        )
    }
}

impl fmt::Display for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.tx_hash, self.message_index, self.out_index)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Input {
    /// `None` marks a coinbase input that spends nothing.
    pub previous_out_point: Option<OutPoint>,
    /// Unlocking proof, normally an encoded `UnlockScript`.
    pub signature_script: Vec<u8>,
    /// Optional extra data, e.g. a new asset's configuration.
    pub extra: Vec<u8>,
}

impl Input {
    pub fn spend(out_point: OutPoint) -> Self {
        Self {
            previous_out_point: Some(out_point),
            signature_script: Vec::new(),
            extra: Vec::new(),
        }
    }

    pub fn coinbase(extra: Vec<u8>) -> Self {
        Self {
            previous_out_point: None,
            signature_script: Vec::new(),
            extra,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Output {
    pub value: u64,
    pub lock_script: Vec<u8>,
    pub asset: Asset,
}

/// An unspent output, keyed by its [`OutPoint`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utxo {
    pub amount: u64,
    pub asset: Asset,
    pub lock_script: Vec<u8>,
}

impl From<&Output> for Utxo {
    fn from(output: &Output) -> Self {
        Self {
            amount: output.value,
            asset: output.asset,
            lock_script: output.lock_script.clone(),
        }
    }
}

/// An ordered list of messages with a lock time.
///
/// The hash is computed on first use and cached. The cache is not part of the
/// encoding; a decoded transaction recomputes it when asked.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Transaction {
    pub messages: Vec<Message>,
    pub lock_time: u32,
    #[serde(skip)]
    hash: OnceLock<Hash>,
}

impl Transaction {
    pub fn new(messages: Vec<Message>, lock_time: u32) -> Self {
        Self {
            messages,
            lock_time,
            hash: OnceLock::new(),
        }
    }

    /// Cached hash, computed if unset.
    pub fn hash(&self) -> TypeResult<Hash> {
        if let Some(hash) = self.hash.get() {
            return Ok(*hash);
        }
        let hash = self.compute_hash()?;
        let _ = self.hash.set(hash);
        Ok(hash)
    }

    /// Hash recomputed from the current contents, ignoring the cache.
    pub fn compute_hash(&self) -> TypeResult<Hash> {
        let digest =
            ContentHasher::TRANSACTION.hash_encoded(&(&self.messages, self.lock_time))?;
        Ok(Hash::from_digest(digest))
    }

    /// Drop the cached hash after mutating the transaction.
    pub fn invalidate_hash(&mut self) {
        self.hash = OnceLock::new();
    }

    /// Hash covered by unlocking signatures: every input's signature script
    /// is cleared first.
    pub fn signing_hash(&self) -> TypeResult<Hash> {
        let mut messages = self.messages.clone();
        for message in &mut messages {
            if let Message::Payment(payment) = message {
                for input in &mut payment.inputs {
                    input.signature_script.clear();
                }
            }
        }
        let digest =
            ContentHasher::TRANSACTION_SIGNING.hash_encoded(&(&messages, self.lock_time))?;
        Ok(Hash::from_digest(digest))
    }

    /// Payment messages with their message index.
    pub fn payments(&self) -> impl Iterator<Item = (u32, &crate::message::PaymentPayload)> {
        self.messages
            .iter()
            .enumerate()
            .filter_map(|(i, m)| m.as_payment().map(|p| (i as u32, p)))
    }

    /// Out-points spent by this transaction, coinbase inputs excluded.
    pub fn spent_out_points(&self) -> impl Iterator<Item = OutPoint> + '_ {
        self.payments()
            .flat_map(|(_, p)| p.inputs.iter())
            .filter_map(|input| input.previous_out_point)
    }

    /// True when the first message is a coinbase payment.
    pub fn is_coinbase(&self) -> bool {
        matches!(self.messages.first(), Some(Message::Payment(p)) if p.is_coinbase())
    }
}

impl PartialEq for Transaction {
    fn eq(&self, other: &Self) -> bool {
        self.messages == other.messages && self.lock_time == other.lock_time
    }
}

impl Eq for Transaction {}
