//! Ledger core of the unit DAG ledger.
//!
//! This crate ties the data model, the store and the fork engine together.
//! It provides:
//! - `UnitValidator`, the structure / signature / transaction state machine
//! - `UtxoSet` and `UtxoView` for unspent-output accounting with address and
//!   asset indices
//! - `Ledger`, the façade with atomic commit, batch insert, main-chain
//!   switching, stable and pending queries, and mediator accessors
//! - A bounded chain-head feed for subscribers
//!
//! Every canonical apply is one atomic store batch carrying its own undo
//! record, so reorganizations and stable-state reads never recompute
//! reversed transactions.

pub mod cache;
mod chain;
pub mod config;
pub mod error;
pub mod events;
pub mod ledger;
pub mod logging;
mod mediator;
pub mod utxo;
pub mod validator;

pub use chain::TxLookup;
pub use config::LedgerConfig;
pub use error::{InsertBatchError, LedgerError, LedgerResult, ValidationError};
pub use events::{HeadFeed, HeadStream};
pub use ledger::{CommitOutcome, HeadHashes, Ledger};
pub use utxo::{UtxoSet, UtxoView};
pub use validator::{UnitState, UnitValidator, Validation};

pub use udl_dag::{ChainTip, HeadChange};
