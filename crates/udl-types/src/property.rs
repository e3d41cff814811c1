use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::asset::ChainIndex;
use crate::hash::Hash;

/// One active mediator as published by the consensus collaborator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediatorInfo {
    pub address: Address,
    /// Key that author and witness signatures must verify against.
    pub public_key: Vec<u8>,
    /// Initial public key share for the threshold scheme. Opaque here.
    pub init_part_pub: Vec<u8>,
    /// Network node descriptor used for peer selection.
    pub node: String,
}

impl MediatorInfo {
    /// Mediator whose address is derived from its public key.
    pub fn from_public_key(public_key: Vec<u8>, node: impl Into<String>) -> Self {
        Self {
            address: Address::from_public_key(&public_key),
            init_part_pub: public_key.clone(),
            public_key,
            node: node.into(),
        }
    }
}

/// The active mediator set and its quorum threshold.
///
/// Replaced wholesale by a committed `ConfigUpdate` message that carries one.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalProperty {
    pub active_mediators: Vec<MediatorInfo>,
    /// Minimum number of distinct witness signatures for quorum.
    pub threshold: u32,
}

impl GlobalProperty {
    pub fn new(active_mediators: Vec<MediatorInfo>, threshold: u32) -> Self {
        Self {
            active_mediators,
            threshold,
        }
    }

    pub fn mediator(&self, address: &Address) -> Option<&MediatorInfo> {
        self.active_mediators.iter().find(|m| &m.address == address)
    }

    pub fn is_active_mediator(&self, address: &Address) -> bool {
        self.mediator(address).is_some()
    }

    pub fn active_mediator_count(&self) -> usize {
        self.active_mediators.len()
    }

    pub fn addresses(&self) -> Vec<Address> {
        self.active_mediators.iter().map(|m| m.address).collect()
    }

    /// True when no mediator set is configured; signatures are then checked
    /// for validity only, not membership.
    pub fn is_open(&self) -> bool {
        self.active_mediators.is_empty()
    }
}

/// Head bookkeeping of the primary asset, derived from its head pointers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DynamicGlobalProperty {
    pub head_unit_number: ChainIndex,
    pub head_unit_hash: Hash,
    pub head_unit_time: i64,
    pub last_stable_unit_number: u64,
}

/// Output of the mediator scheduling collaborator.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediatorSchedule {
    pub current_shuffled_mediators: Vec<Address>,
}
