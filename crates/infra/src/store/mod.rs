//! Inventory Store + History Ledger boundary.
//!
//! Reads are exposed per concern (`InventoryStore`, `HistoryLedger`); the only
//! write path is `InventoryRepository::commit`, which swaps in the new item
//! state and appends its ledger row as one atomic unit.
//!
//! An `ItemChange` can only be built inside this crate, by the engine after a
//! decided custody event has been applied. Backends still re-check every
//! change before writing: the expected version must be exact, the new version
//! must move forward and the item must satisfy its invariants.

pub mod in_memory;
pub mod postgres;

use std::sync::Arc;

use thiserror::Error;

use fieldcrm_core::{AggregateRoot, ExpectedVersion, LocationId, OrderId, TenantId, UserId};
use fieldcrm_inventory::{
    HistoryAction, HistoryEntry, HistoryFilter, InventoryItem, ItemId, NewHistoryEntry,
};

pub use in_memory::InMemoryInventoryRepository;
pub use postgres::PostgresInventoryRepository;

/// Storage failure.
///
/// These are infrastructure errors; domain rejections never reach the store.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Compare-and-swap lost: the item changed since it was read.
    #[error("optimistic concurrency check failed: {0}")]
    Concurrency(String),

    #[error("duplicate serial number: {0}")]
    DuplicateSerial(String),

    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),

    /// The change itself is malformed and was refused before any write.
    #[error("change rejected: {0}")]
    RejectedChange(String),

    #[error("storage backend failure: {0}")]
    Backend(String),
}

/// A decided custody change ready to be made durable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemChange {
    item: InventoryItem,
    expected_version: ExpectedVersion,
    history: Option<NewHistoryEntry>,
}

impl ItemChange {
    /// `item` is the state after the change was applied; `expected_version` is
    /// the version it had when read (`Exact(0)` = must not exist).
    pub(crate) fn new(
        item: InventoryItem,
        expected_version: ExpectedVersion,
        history: Option<NewHistoryEntry>,
    ) -> Self {
        Self {
            item,
            expected_version,
            history,
        }
    }

    pub fn item(&self) -> &InventoryItem {
        &self.item
    }

    pub fn expected_version(&self) -> ExpectedVersion {
        self.expected_version
    }

    /// Ledger row appended alongside, if the change leaves one.
    pub fn history(&self) -> Option<&NewHistoryEntry> {
        self.history.as_ref()
    }

    /// Checks shared by every backend, run before anything is written.
    /// Returns the parts with the expected version resolved to a number.
    pub(crate) fn into_checked(
        self,
        tenant_id: TenantId,
    ) -> Result<(InventoryItem, u64, Option<NewHistoryEntry>), StoreError> {
        let item_id = self.item.id_typed();
        if self.item.tenant_id() != Some(tenant_id) {
            return Err(StoreError::TenantIsolation(format!(
                "item {item_id} does not belong to the committing tenant"
            )));
        }
        let expected = match self.expected_version {
            ExpectedVersion::Exact(v) => v,
            ExpectedVersion::Any => {
                return Err(StoreError::RejectedChange(format!(
                    "item {item_id}: commits need an exact expected version"
                )));
            }
        };
        if self.item.version() <= expected {
            return Err(StoreError::RejectedChange(format!(
                "item {item_id}: version {} does not follow {expected}",
                self.item.version()
            )));
        }
        self.item
            .check_invariants()
            .map_err(|e| StoreError::RejectedChange(format!("item {item_id}: {e}")))?;
        Ok((self.item, expected, self.history))
    }
}

/// Read side of the Inventory Store. All lookups are tenant-scoped.
pub trait InventoryStore: Send + Sync {
    fn get(&self, tenant_id: TenantId, item_id: ItemId) -> Result<Option<InventoryItem>, StoreError>;

    fn get_by_serial(&self, tenant_id: TenantId, serial: &str) -> Result<Option<InventoryItem>, StoreError>;

    /// Items sitting at `location_id` (AVAILABLE or RETURNED).
    fn list_by_location(&self, tenant_id: TenantId, location_id: LocationId) -> Result<Vec<InventoryItem>, StoreError>;

    fn list_by_technician(&self, tenant_id: TenantId, technician_id: UserId) -> Result<Vec<InventoryItem>, StoreError>;

    /// Items whose active assignment is `order_id`.
    fn list_by_order(&self, tenant_id: TenantId, order_id: OrderId) -> Result<Vec<InventoryItem>, StoreError>;

    fn list_by_name(&self, tenant_id: TenantId, name: &str) -> Result<Vec<InventoryItem>, StoreError>;

    /// Items currently locked by a handoff.
    fn list_pending_transfers(&self, tenant_id: TenantId) -> Result<Vec<InventoryItem>, StoreError>;
}

/// Append-only audit trail. Query results are in `(action_date, sequence)` order.
pub trait HistoryLedger: Send + Sync {
    /// Pure insert. The ledger assigns the row id and sequence.
    fn append(&self, tenant_id: TenantId, item_id: ItemId, entry: NewHistoryEntry) -> Result<HistoryEntry, StoreError>;

    fn query_by_item(
        &self,
        tenant_id: TenantId,
        item_id: ItemId,
        filter: &HistoryFilter,
    ) -> Result<Vec<HistoryEntry>, StoreError>;

    fn last_of_type(
        &self,
        tenant_id: TenantId,
        item_id: ItemId,
        action: HistoryAction,
    ) -> Result<Option<HistoryEntry>, StoreError> {
        Ok(self
            .query_by_item(tenant_id, item_id, &HistoryFilter::action(action))?
            .pop())
    }

    fn first_of_type(
        &self,
        tenant_id: TenantId,
        item_id: ItemId,
        action: HistoryAction,
    ) -> Result<Option<HistoryEntry>, StoreError> {
        Ok(self
            .query_by_item(tenant_id, item_id, &HistoryFilter::action(action))?
            .into_iter()
            .next())
    }
}

/// Transactional unit of work over both stores.
pub trait InventoryRepository: InventoryStore + HistoryLedger {
    /// Atomically write `change.item` (only if the stored version still matches
    /// `change.expected_version`) and append `change.history`.
    ///
    /// Either both become visible or neither does. Changes failing
    /// [`ItemChange`]'s own checks are refused with `RejectedChange`.
    fn commit(&self, tenant_id: TenantId, change: ItemChange) -> Result<Option<HistoryEntry>, StoreError>;
}

impl<S> InventoryStore for Arc<S>
where
    S: InventoryStore + ?Sized,
{
    fn get(&self, tenant_id: TenantId, item_id: ItemId) -> Result<Option<InventoryItem>, StoreError> {
        (**self).get(tenant_id, item_id)
    }

    fn get_by_serial(&self, tenant_id: TenantId, serial: &str) -> Result<Option<InventoryItem>, StoreError> {
        (**self).get_by_serial(tenant_id, serial)
    }

    fn list_by_location(&self, tenant_id: TenantId, location_id: LocationId) -> Result<Vec<InventoryItem>, StoreError> {
        (**self).list_by_location(tenant_id, location_id)
    }

    fn list_by_technician(&self, tenant_id: TenantId, technician_id: UserId) -> Result<Vec<InventoryItem>, StoreError> {
        (**self).list_by_technician(tenant_id, technician_id)
    }

    fn list_by_order(&self, tenant_id: TenantId, order_id: OrderId) -> Result<Vec<InventoryItem>, StoreError> {
        (**self).list_by_order(tenant_id, order_id)
    }

    fn list_by_name(&self, tenant_id: TenantId, name: &str) -> Result<Vec<InventoryItem>, StoreError> {
        (**self).list_by_name(tenant_id, name)
    }

    fn list_pending_transfers(&self, tenant_id: TenantId) -> Result<Vec<InventoryItem>, StoreError> {
        (**self).list_pending_transfers(tenant_id)
    }
}

impl<S> HistoryLedger for Arc<S>
where
    S: HistoryLedger + ?Sized,
{
    fn append(&self, tenant_id: TenantId, item_id: ItemId, entry: NewHistoryEntry) -> Result<HistoryEntry, StoreError> {
        (**self).append(tenant_id, item_id, entry)
    }

    fn query_by_item(
        &self,
        tenant_id: TenantId,
        item_id: ItemId,
        filter: &HistoryFilter,
    ) -> Result<Vec<HistoryEntry>, StoreError> {
        (**self).query_by_item(tenant_id, item_id, filter)
    }

    fn last_of_type(
        &self,
        tenant_id: TenantId,
        item_id: ItemId,
        action: HistoryAction,
    ) -> Result<Option<HistoryEntry>, StoreError> {
        (**self).last_of_type(tenant_id, item_id, action)
    }

    fn first_of_type(
        &self,
        tenant_id: TenantId,
        item_id: ItemId,
        action: HistoryAction,
    ) -> Result<Option<HistoryEntry>, StoreError> {
        (**self).first_of_type(tenant_id, item_id, action)
    }
}

impl<S> InventoryRepository for Arc<S>
where
    S: InventoryRepository + ?Sized,
{
    fn commit(&self, tenant_id: TenantId, change: ItemChange) -> Result<Option<HistoryEntry>, StoreError> {
        (**self).commit(tenant_id, change)
    }
}
