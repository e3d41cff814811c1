//! Mediator set and global property accessors.
//!
//! The `GlobalProperty` in force is the one the latest canonical
//! `ConfigUpdate` stored, or the configured genesis set before any.

use udl_store::{schema, HeadKind, Property};
use udl_types::{Address, DynamicGlobalProperty, GlobalProperty, MediatorSchedule};

use crate::chain;
use crate::error::{LedgerError, LedgerResult};
use crate::ledger::Ledger;

impl Ledger {
    pub fn global_property(&self) -> LedgerResult<GlobalProperty> {
        self.read_store(|store| {
            chain::global_property(store, &self.config().genesis_global_property)
        })
    }

    pub fn active_mediators(&self) -> LedgerResult<Vec<Address>> {
        Ok(self.global_property()?.addresses())
    }

    pub fn active_mediator_count(&self) -> LedgerResult<usize> {
        Ok(self.global_property()?.active_mediator_count())
    }

    /// Witness signatures needed for quorum.
    pub fn cur_threshold(&self) -> LedgerResult<u32> {
        Ok(self.global_property()?.threshold)
    }

    pub fn active_mediator_nodes(&self) -> LedgerResult<Vec<String>> {
        Ok(self
            .global_property()?
            .active_mediators
            .into_iter()
            .map(|m| m.node)
            .collect())
    }

    pub fn active_mediator_node(&self, address: &Address) -> LedgerResult<Option<String>> {
        Ok(self
            .global_property()?
            .mediator(address)
            .map(|m| m.node.clone()))
    }

    pub fn active_mediator_init_pubs(&self) -> LedgerResult<Vec<Vec<u8>>> {
        Ok(self
            .global_property()?
            .active_mediators
            .into_iter()
            .map(|m| m.init_part_pub)
            .collect())
    }

    pub fn is_active_mediator(&self, address: &Address) -> LedgerResult<bool> {
        Ok(self.global_property()?.is_active_mediator(address))
    }

    /// Head bookkeeping of the primary asset, or `None` before genesis.
    pub fn dynamic_global_property(&self) -> LedgerResult<Option<DynamicGlobalProperty>> {
        self.read_store(|store| {
            let Some(asset) = chain::primary_asset(store)? else {
                return Ok(None);
            };
            let head = chain::tip(store, HeadKind::Unit, &asset)?
                .ok_or_else(|| LedgerError::Corrupt(format!("primary asset {asset} has no head")))?;
            let header = chain::read_header(store, &head.hash)?
                .ok_or_else(|| LedgerError::Corrupt(format!("head {} has no header", head.hash)))?;
            let stable = chain::tip(store, HeadKind::Stable, &asset)?.map_or(0, |t| t.index);
            Ok(Some(DynamicGlobalProperty {
                head_unit_number: header.number,
                head_unit_hash: head.hash,
                head_unit_time: header.creation_time,
                last_stable_unit_number: stable,
            }))
        })
    }

    pub fn mediator_schedule(&self) -> LedgerResult<MediatorSchedule> {
        self.read_store(|store| {
            let key = schema::property(Property::Schedule);
            Ok(schema::get_decoded::<MediatorSchedule, _>(store, &key)?.unwrap_or_default())
        })
    }

    /// Store the schedule computed by the consensus layer.
    pub fn set_mediator_schedule(&self, schedule: &MediatorSchedule) -> LedgerResult<()> {
        self.put_property(schema::property(Property::Schedule), schedule)
    }
}
