//! Error types for the fork engine.

use udl_types::{AssetId, Hash};

/// Errors that can occur during MemDag operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DagError {
    /// Attempted to save a unit that is already pending.
    #[error("unit already pending: {0:?}")]
    Duplicate(Hash),

    /// A parent reference resolves neither in the store nor in the DAG.
    #[error("orphan unit {unit:?}: parent {parent:?} is unknown")]
    Orphan {
        /// The unit containing the bad reference.
        unit: Hash,
        /// The missing parent.
        parent: Hash,
    },

    /// A canonical unit above the stable head is missing from the DAG.
    #[error("canonical unit {0:?} is not held by the DAG")]
    MissingUnit(Hash),

    /// An asset with pending units has no canonical head.
    #[error("asset {0:?} has no canonical head")]
    MissingHead(AssetId),

    /// A non-genesis unit without a chain parent was reached while walking
    /// a branch.
    #[error("unit {0:?} has no chain parent")]
    BrokenChain(Hash),
}

/// Convenience alias for DAG results.
pub type DagResult<T> = Result<T, DagError>;
