use serde::{Deserialize, Serialize};
use udl_crypto::{codec, ContentHasher, MerkleTree, SigningKey};

use crate::address::Address;
use crate::asset::{AssetId, ChainIndex};
use crate::error::TypeResult;
use crate::hash::Hash;
use crate::transaction::Transaction;

/// A signature together with the signer's identity.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authentifier {
    pub address: Address,
    pub public_key: Vec<u8>,
    pub signature: Vec<u8>,
}

impl Authentifier {
    /// Sign `message` with `key`, deriving the address from its public key.
    pub fn sign(key: &SigningKey, message: &Hash) -> Self {
        let public_key = key.verifying_key().as_bytes().to_vec();
        Self {
            address: Address::from_public_key(&public_key),
            signature: key.sign(message.as_bytes()).to_bytes().to_vec(),
            public_key,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    /// The first parent is the previous unit on this unit's own asset chain.
    /// Further parents are cross references to units of any asset.
    pub parent_hashes: Vec<Hash>,
    pub asset_ids: Vec<AssetId>,
    pub author: Authentifier,
    pub witnesses: Vec<Authentifier>,
    pub tx_root: Hash,
    pub number: ChainIndex,
    pub extra: Vec<u8>,
    pub creation_time: i64,
}

impl Header {
    pub fn new(number: ChainIndex, parent_hashes: Vec<Hash>, creation_time: i64) -> Self {
        Self {
            parent_hashes,
            asset_ids: vec![number.asset_id],
            author: Authentifier::default(),
            witnesses: Vec::new(),
            tx_root: Hash::null(),
            number,
            extra: Vec::new(),
            creation_time,
        }
    }

    /// Hash over every header field, signatures included.
    pub fn hash(&self) -> TypeResult<Hash> {
        Ok(Hash::from_digest(ContentHasher::HEADER.hash_encoded(self)?))
    }

    /// Hash signed by the author and witnesses: the header with the author's
    /// signature and all witnesses cleared.
    pub fn signing_hash(&self) -> TypeResult<Hash> {
        let mut unsigned = self.clone();
        unsigned.author.signature.clear();
        unsigned.witnesses.clear();
        Ok(Hash::from_digest(
            ContentHasher::HEADER_SIGNING.hash_encoded(&unsigned)?,
        ))
    }

    pub fn sign_author(&mut self, key: &SigningKey) -> TypeResult<()> {
        let public_key = key.verifying_key().as_bytes().to_vec();
        self.author = Authentifier {
            address: Address::from_public_key(&public_key),
            public_key,
            signature: Vec::new(),
        };
        let signing_hash = self.signing_hash()?;
        self.author = Authentifier::sign(key, &signing_hash);
        Ok(())
    }

    pub fn add_witness(&mut self, key: &SigningKey) -> TypeResult<()> {
        let signing_hash = self.signing_hash()?;
        self.witnesses.push(Authentifier::sign(key, &signing_hash));
        Ok(())
    }

    pub fn asset_id(&self) -> AssetId {
        self.number.asset_id
    }

    pub fn index(&self) -> u64 {
        self.number.index
    }

    /// Previous unit on this unit's own asset chain.
    pub fn parent(&self) -> Option<&Hash> {
        self.parent_hashes.first()
    }

    pub fn contains_parent(&self, hash: &Hash) -> bool {
        self.parent_hashes.contains(hash)
    }
}

/// A header plus its ordered transactions.
///
/// The hash is computed once at construction from the header alone;
/// transactions are covered through the header's transaction root. The
/// declared size travels with the unit and is checked against the real
/// encoding length during validation.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(try_from = "UnitRepr", into = "UnitRepr")]
pub struct Unit {
    header: Header,
    transactions: Vec<Transaction>,
    hash: Hash,
    size: u64,
}

#[derive(Serialize, Deserialize)]
struct UnitRepr {
    header: Header,
    transactions: Vec<Transaction>,
    size: u64,
}

impl TryFrom<UnitRepr> for Unit {
    type Error = crate::error::TypeError;

    fn try_from(repr: UnitRepr) -> Result<Self, Self::Error> {
        Unit::from_parts(repr.header, repr.transactions, repr.size)
    }
}

impl From<Unit> for UnitRepr {
    fn from(unit: Unit) -> Self {
        Self {
            header: unit.header,
            transactions: unit.transactions,
            size: unit.size,
        }
    }
}

impl Unit {
    /// Build a unit, declaring its real encoded size.
    pub fn new(header: Header, transactions: Vec<Transaction>) -> TypeResult<Self> {
        let size = Self::encoded_size(&header, &transactions)?;
        Self::from_parts(header, transactions, size)
    }

    /// Assemble a unit with an externally declared size (e.g. from the wire).
    pub fn from_parts(
        header: Header,
        transactions: Vec<Transaction>,
        size: u64,
    ) -> TypeResult<Self> {
        let hash = header.hash()?;
        Ok(Self {
            header,
            transactions,
            hash,
            size,
        })
    }

    /// Canonical encoding length of a header and its transactions.
    pub fn encoded_size(header: &Header, transactions: &[Transaction]) -> TypeResult<u64> {
        Ok(codec::encoded_len(&(header, transactions))?)
    }

    /// Merkle root over the transaction hashes.
    pub fn compute_tx_root(transactions: &[Transaction]) -> TypeResult<Hash> {
        let leaves = transactions
            .iter()
            .map(|tx| tx.hash().map(|h| *h.as_bytes()))
            .collect::<TypeResult<Vec<_>>>()?;
        Ok(Hash::from_digest(MerkleTree::from_leaves(&leaves).root()))
    }

    pub fn hash(&self) -> Hash {
        self.hash
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn declared_size(&self) -> u64 {
        self.size
    }

    pub fn number(&self) -> ChainIndex {
        self.header.number
    }

    pub fn asset_id(&self) -> AssetId {
        self.header.asset_id()
    }

    pub fn index(&self) -> u64 {
        self.header.index()
    }

    pub fn parent(&self) -> Option<&Hash> {
        self.header.parent()
    }

    pub fn into_parts(self) -> (Header, Vec<Transaction>) {
        (self.header, self.transactions)
    }
}

impl PartialEq for Unit {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash
            && self.size == other.size
            && self.transactions == other.transactions
    }
}

impl Eq for Unit {}
