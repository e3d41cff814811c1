//! Key-value storage seam for the unit DAG ledger.
//!
//! The ledger never talks to a storage engine directly. It reads through
//! [`KvRead`], writes whole [`WriteBatch`]es through [`KvStore`], and lays
//! out its records with the key builders in [`schema`].
//!
//! # Building blocks
//!
//! - [`InMemoryKvStore`]: `BTreeMap`-backed engine for tests and embedding
//! - [`JournaledBatch`]: a batch that records an [`UndoLog`] of prior values
//! - [`Overlay`]: read-only view with undo logs rewound on top of a store
//!
//! # Design Rules
//!
//! 1. A batch is atomic: every mutation lands or none does.
//! 2. Every canonical change is journaled so it can be reverted exactly.
//! 3. Stored bytes that fail to decode are corruption, never "not found".

pub mod batch;
pub mod error;
pub mod memory;
pub mod overlay;
pub mod schema;
pub mod traits;

pub use batch::{BatchOp, JournaledBatch, UndoLog, WriteBatch};
pub use error::{StoreError, StoreResult};
pub use memory::InMemoryKvStore;
pub use overlay::Overlay;
pub use schema::{HeadKind, Prefix, Property};
pub use traits::{KvRead, KvStore};
