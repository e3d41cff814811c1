//! MemDag fork engine for the unit DAG ledger.
//!
//! Holds units that passed validation but are not yet irreversible, chooses
//! the preferred branch per asset, and drives canonical-chain switches
//! through the [`CanonicalChain`] seam. Branches forking deeper than the
//! retention depth are finalized or discarded.

pub mod chain;
pub mod error;
pub mod memdag;

pub use chain::{CanonicalChain, ChainTip, HeadChange, Promotion};
pub use error::{DagError, DagResult};
pub use memdag::{MemDag, Reorg, DEFAULT_RETENTION_DEPTH};
