use serde::{Deserialize, Serialize};
use udl_types::GlobalProperty;

/// Construction-time configuration of a [`Ledger`](crate::Ledger).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Depth below the canonical head beyond which pending units become
    /// stable and older forks are dropped.
    pub retention_depth: u64,
    /// Maximum length of a header's `extra` field in bytes.
    pub max_extra_size: usize,
    /// Number of decoded units kept in the LRU cache. Zero disables it.
    pub unit_cache_capacity: usize,
    /// Queue length of each chain-head subscriber.
    pub event_capacity: usize,
    /// Mediator set used until a `ConfigUpdate` stores one.
    pub genesis_global_property: GlobalProperty,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            retention_depth: udl_dag::DEFAULT_RETENTION_DEPTH,
            max_extra_size: 32,
            unit_cache_capacity: 256,
            event_capacity: 64,
            genesis_global_property: GlobalProperty::default(),
        }
    }
}
