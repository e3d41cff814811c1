//! Data model for the unit DAG ledger.
//!
//! Every type here has a canonical binary encoding (see `udl_crypto::codec`),
//! and every hash is a domain-separated BLAKE3 digest of that encoding.
//!
//! # Key Types
//!
//! - [`Unit`]: the ledger's block, a [`Header`] plus ordered [`Transaction`]s
//! - [`ChainIndex`]: a unit's height on one asset's sub-chain
//! - [`Message`]: closed set of transaction payloads keyed by an application tag
//! - [`OutPoint`] / [`Utxo`]: the key and value of the unspent-output set
//! - [`GlobalProperty`]: the active mediator set and quorum threshold

pub mod address;
pub mod asset;
pub mod error;
pub mod hash;
pub mod message;
pub mod property;
pub mod transaction;
pub mod unit;

pub use address::script::{self, UnlockScript};
pub use address::Address;
pub use asset::{Asset, AssetId, ChainIndex};
pub use error::{TypeError, TypeResult};
pub use hash::Hash;
pub use message::{
    ConfigEntry, ConfigPayload, ContractDeployPayload, ContractInvokePayload,
    ContractTemplatePayload, Message, PaymentPayload, TextPayload,
};
pub use property::{DynamicGlobalProperty, GlobalProperty, MediatorInfo, MediatorSchedule};
pub use transaction::{Input, OutPoint, Output, Transaction, Utxo};
pub use unit::{Authentifier, Header, Unit};
