use udl_dag::DagError;
use udl_store::StoreError;
use udl_types::{Hash, TypeError};

use crate::validator::UnitState;

/// Why a unit failed validation.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("declared size {declared} does not match encoded size {actual}")]
    InvalidSize { declared: u64, actual: u64 },

    #[error("malformed unit: {0}")]
    Malformed(String),

    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    #[error("invalid transaction {tx}: {reason}")]
    InvalidTransaction { tx: Hash, reason: String },

    /// Reading the state to validate against failed.
    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl ValidationError {
    /// The validator state this failure leaves the unit in.
    pub fn state(&self) -> UnitState {
        match self {
            ValidationError::InvalidSize { .. } | ValidationError::Malformed(_) => {
                UnitState::InvalidSize
            }
            ValidationError::InvalidSignature(_) => UnitState::InvalidSignature,
            ValidationError::InvalidTransaction { .. } => UnitState::InvalidTransaction,
            ValidationError::Storage(_) => UnitState::NotValidated,
        }
    }

    pub(crate) fn tx(tx: Hash, reason: impl Into<String>) -> Self {
        ValidationError::InvalidTransaction {
            tx,
            reason: reason.into(),
        }
    }
}

/// Errors surfaced by the ledger façade.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("unit {unit} failed structural checks: {reason}")]
    Structural { unit: Hash, reason: String },

    #[error("unit {unit} failed signature checks: {reason}")]
    Signature { unit: Hash, reason: String },

    #[error("unit {unit} carries an invalid transaction: {reason}")]
    Transaction { unit: Hash, reason: String },

    /// A batch is not a contiguous parent chain.
    #[error("batch is discontinuous at position {position}: {reason}")]
    Continuity { position: usize, reason: String },

    #[error("orphan unit {unit}: parent {parent} is unknown")]
    Orphan { unit: Hash, parent: Hash },

    #[error("unit already exists: {0}")]
    Duplicate(Hash),

    /// The unit extends a branch forking below its asset's stable head.
    #[error("unit {0} extends a fork below the stable head")]
    StaleFork(Hash),

    #[error(transparent)]
    Storage(StoreError),

    /// Persisted state contradicts itself.
    #[error("corrupt ledger state: {0}")]
    Corrupt(String),

    #[error("ledger lock poisoned")]
    Poisoned,

    #[error("not found: {0}")]
    NotFound(String),
}

impl LedgerError {
    /// Corruption and poisoning are not recoverable by the caller.
    pub fn is_fatal(&self) -> bool {
        matches!(self, LedgerError::Corrupt(_) | LedgerError::Poisoned)
    }

    /// True for rejections of the unit itself, as opposed to failures of
    /// the ledger.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            LedgerError::Structural { .. }
                | LedgerError::Signature { .. }
                | LedgerError::Transaction { .. }
                | LedgerError::Orphan { .. }
        )
    }

    /// Attach the offending unit to a validation failure.
    pub fn invalid(unit: Hash, err: ValidationError) -> Self {
        match err {
            ValidationError::InvalidSize { .. } | ValidationError::Malformed(_) => {
                LedgerError::Structural {
                    unit,
                    reason: err.to_string(),
                }
            }
            ValidationError::InvalidSignature(reason) => LedgerError::Signature { unit, reason },
            ValidationError::InvalidTransaction { .. } => LedgerError::Transaction {
                unit,
                reason: err.to_string(),
            },
            ValidationError::Storage(e) => e.into(),
        }
    }
}

impl From<StoreError> for LedgerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Corrupt { .. } => LedgerError::Corrupt(err.to_string()),
            StoreError::Poisoned => LedgerError::Poisoned,
            other => LedgerError::Storage(other),
        }
    }
}

impl From<DagError> for LedgerError {
    fn from(err: DagError) -> Self {
        match err {
            DagError::Duplicate(hash) => LedgerError::Duplicate(hash),
            DagError::Orphan { unit, parent } => LedgerError::Orphan { unit, parent },
            other => LedgerError::Corrupt(other.to_string()),
        }
    }
}

/// Encoding failures of values the ledger itself holds.
impl From<TypeError> for LedgerError {
    fn from(err: TypeError) -> Self {
        LedgerError::Corrupt(err.to_string())
    }
}

/// `insert_batch` stopped early.
#[derive(Debug, thiserror::Error)]
#[error("batch stopped after {applied} units: {source}")]
pub struct InsertBatchError {
    /// Units committed before the failure. They stay committed.
    pub applied: usize,
    #[source]
    pub source: LedgerError,
}

pub type LedgerResult<T> = Result<T, LedgerError>;
