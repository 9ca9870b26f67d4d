use std::collections::HashMap;
use std::sync::RwLock;

use uuid::Uuid;

use fieldcrm_core::{AggregateRoot, LocationId, OrderId, TenantId, UserId};
use fieldcrm_inventory::{
    HistoryEntry, HistoryFilter, InventoryItem, ItemId, NewHistoryEntry, sort_chronologically,
};

use super::{HistoryLedger, InventoryRepository, InventoryStore, ItemChange, StoreError};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct ItemKey {
    tenant_id: TenantId,
    item_id: ItemId,
}

#[derive(Debug, Default)]
struct State {
    items: HashMap<ItemKey, InventoryItem>,
    history: HashMap<ItemKey, Vec<HistoryEntry>>,
    sequences: HashMap<TenantId, u64>,
}

impl State {
    fn append(&mut self, tenant_id: TenantId, item_id: ItemId, entry: NewHistoryEntry) -> Result<HistoryEntry, StoreError> {
        let next = self.sequences.get(&tenant_id).copied().unwrap_or(0) + 1;
        let entry = entry
            .into_entry(Uuid::now_v7(), next, tenant_id, item_id)
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        self.sequences.insert(tenant_id, next);
        self.history
            .entry(ItemKey { tenant_id, item_id })
            .or_default()
            .push(entry.clone());
        Ok(entry)
    }

    fn serial_taken(&self, tenant_id: TenantId, item: &InventoryItem) -> bool {
        let Some(serial) = item.serial_number() else {
            return false;
        };
        self.items.iter().any(|(key, existing)| {
            key.tenant_id == tenant_id && key.item_id != item.id_typed() && existing.serial_number() == Some(serial)
        })
    }
}

/// In-memory Inventory Store + History Ledger.
///
/// Intended for tests/dev. One write lock covers the item swap and the ledger
/// append, so a commit is atomic with respect to every reader.
#[derive(Debug, Default)]
pub struct InMemoryInventoryRepository {
    state: RwLock<State>,
}

impl InMemoryInventoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn filter_items(
        &self,
        tenant_id: TenantId,
        pred: impl Fn(&InventoryItem) -> bool,
    ) -> Result<Vec<InventoryItem>, StoreError> {
        let state = self
            .state
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?;

        let mut items: Vec<InventoryItem> = state
            .items
            .iter()
            .filter(|(key, item)| key.tenant_id == tenant_id && pred(item))
            .map(|(_, item)| item.clone())
            .collect();
        items.sort_by_key(|i| (i.created_at(), *i.id_typed().0.as_uuid()));
        Ok(items)
    }
}

impl InventoryStore for InMemoryInventoryRepository {
    fn get(&self, tenant_id: TenantId, item_id: ItemId) -> Result<Option<InventoryItem>, StoreError> {
        let state = self
            .state
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?;
        Ok(state.items.get(&ItemKey { tenant_id, item_id }).cloned())
    }

    fn get_by_serial(&self, tenant_id: TenantId, serial: &str) -> Result<Option<InventoryItem>, StoreError> {
        Ok(self
            .filter_items(tenant_id, |i| i.serial_number() == Some(serial))?
            .into_iter()
            .next())
    }

    fn list_by_location(&self, tenant_id: TenantId, location_id: LocationId) -> Result<Vec<InventoryItem>, StoreError> {
        self.filter_items(tenant_id, |i| i.location_id() == Some(location_id))
    }

    fn list_by_technician(&self, tenant_id: TenantId, technician_id: UserId) -> Result<Vec<InventoryItem>, StoreError> {
        self.filter_items(tenant_id, |i| i.assigned_to_id() == Some(technician_id))
    }

    fn list_by_order(&self, tenant_id: TenantId, order_id: OrderId) -> Result<Vec<InventoryItem>, StoreError> {
        self.filter_items(tenant_id, |i| i.active_assignment().is_some_and(|a| a.order_id == order_id))
    }

    fn list_by_name(&self, tenant_id: TenantId, name: &str) -> Result<Vec<InventoryItem>, StoreError> {
        self.filter_items(tenant_id, |i| i.name() == name)
    }

    fn list_pending_transfers(&self, tenant_id: TenantId) -> Result<Vec<InventoryItem>, StoreError> {
        self.filter_items(tenant_id, |i| i.transfer_pending())
    }
}

impl HistoryLedger for InMemoryInventoryRepository {
    fn append(&self, tenant_id: TenantId, item_id: ItemId, entry: NewHistoryEntry) -> Result<HistoryEntry, StoreError> {
        let mut state = self
            .state
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?;
        state.append(tenant_id, item_id, entry)
    }

    fn query_by_item(
        &self,
        tenant_id: TenantId,
        item_id: ItemId,
        filter: &HistoryFilter,
    ) -> Result<Vec<HistoryEntry>, StoreError> {
        let state = self
            .state
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?;

        let mut entries: Vec<HistoryEntry> = state
            .history
            .get(&ItemKey { tenant_id, item_id })
            .map(|rows| rows.iter().filter(|e| filter.matches(e)).cloned().collect())
            .unwrap_or_default();
        sort_chronologically(&mut entries);
        Ok(entries)
    }
}

impl InventoryRepository for InMemoryInventoryRepository {
    fn commit(&self, tenant_id: TenantId, change: ItemChange) -> Result<Option<HistoryEntry>, StoreError> {
        let (item, expected, history) = change.into_checked(tenant_id)?;

        let key = ItemKey {
            tenant_id,
            item_id: item.id_typed(),
        };

        let mut state = self
            .state
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?;

        let current = state.items.get(&key).map(|i| i.version()).unwrap_or(0);
        if current != expected {
            return Err(StoreError::Concurrency(format!(
                "expected version {expected}, found {current}"
            )));
        }
        if current == 0 && state.serial_taken(tenant_id, &item) {
            return Err(StoreError::DuplicateSerial(
                item.serial_number().unwrap_or_default().to_string(),
            ));
        }

        // History first: a malformed row aborts before the item is written.
        let recorded = match history {
            Some(row) => {
                let appended = state.append(tenant_id, key.item_id, row)?;
                Some(appended)
            }
            None => None,
        };
        state.items.insert(key, item);

        Ok(recorded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use fieldcrm_core::{Aggregate, ExpectedVersion};
    use fieldcrm_inventory::{
        Actor, DeviceCategory, HistoryAction, InventoryCommand, ItemDetails, Operation,
    };

    fn received(tenant_id: TenantId, serial: &str) -> (InventoryItem, NewHistoryEntry) {
        let item_id = ItemId::generate();
        let mut item = InventoryItem::empty(item_id);
        let cmd = InventoryCommand::new(
            tenant_id,
            item_id,
            Actor::warehouse(UserId::new()),
            Operation::Receive {
                details: ItemDetails::device("Decoder", serial, DeviceCategory::Decoder1Way, 100),
                location_id: LocationId::new(),
            },
        );
        let events = item.handle(&cmd).unwrap();
        item.apply(&events[0]);
        let row = NewHistoryEntry::from_event(&events[0], &item).unwrap();
        (item, row)
    }

    #[test]
    fn commit_writes_item_and_history_together() {
        let repo = InMemoryInventoryRepository::new();
        let tenant = TenantId::new();
        let (item, row) = received(tenant, "SN-1");
        let id = item.id_typed();

        let recorded = repo
            .commit(tenant, ItemChange::new(item, ExpectedVersion::Exact(0), Some(row)))
            .unwrap()
            .unwrap();

        assert_eq!(recorded.sequence, 1);
        assert_eq!(recorded.action, HistoryAction::Received);
        assert!(repo.get(tenant, id).unwrap().is_some());
        assert_eq!(repo.query_by_item(tenant, id, &HistoryFilter::default()).unwrap().len(), 1);
    }

    #[test]
    fn stale_version_is_rejected_without_side_effects() {
        let repo = InMemoryInventoryRepository::new();
        let tenant = TenantId::new();
        let (item, row) = received(tenant, "SN-2");
        let id = item.id_typed();
        repo.commit(tenant, ItemChange::new(item.clone(), ExpectedVersion::Exact(0), Some(row.clone())))
            .unwrap();

        let err = repo
            .commit(tenant, ItemChange::new(item, ExpectedVersion::Exact(0), Some(row)))
            .unwrap_err();
        assert!(matches!(err, StoreError::Concurrency(_)));
        assert_eq!(repo.query_by_item(tenant, id, &HistoryFilter::default()).unwrap().len(), 1);
    }

    #[test]
    fn serial_numbers_are_unique_per_tenant() {
        let repo = InMemoryInventoryRepository::new();
        let tenant = TenantId::new();
        let (a, row_a) = received(tenant, "SN-3");
        let (b, row_b) = received(tenant, "SN-3");
        repo.commit(tenant, ItemChange::new(a, ExpectedVersion::Exact(0), Some(row_a)))
            .unwrap();

        let err = repo
            .commit(tenant, ItemChange::new(b, ExpectedVersion::Exact(0), Some(row_b)))
            .unwrap_err();
        assert_eq!(err, StoreError::DuplicateSerial("SN-3".to_string()));

        let other = TenantId::new();
        let (c, row_c) = received(other, "SN-3");
        assert!(
            repo.commit(other, ItemChange::new(c, ExpectedVersion::Exact(0), Some(row_c)))
                .is_ok()
        );
    }

    #[test]
    fn reads_are_tenant_scoped() {
        let repo = InMemoryInventoryRepository::new();
        let tenant = TenantId::new();
        let (item, row) = received(tenant, "SN-4");
        let id = item.id_typed();
        repo.commit(tenant, ItemChange::new(item.clone(), ExpectedVersion::Exact(0), Some(row)))
            .unwrap();

        let other = TenantId::new();
        assert!(repo.get(other, id).unwrap().is_none());
        assert!(repo.get_by_serial(other, "SN-4").unwrap().is_none());
        assert!(repo.query_by_item(other, id, &HistoryFilter::default()).unwrap().is_empty());

        let err = repo
            .commit(other, ItemChange::new(item, ExpectedVersion::Exact(1), None))
            .unwrap_err();
        assert!(matches!(err, StoreError::TenantIsolation(_)));
    }

    #[test]
    fn ledger_sequence_is_per_tenant() {
        let repo = InMemoryInventoryRepository::new();
        let t1 = TenantId::new();
        let t2 = TenantId::new();
        let item = ItemId::generate();
        let row = NewHistoryEntry {
            action: Some(HistoryAction::Received),
            action_date: Some(Utc::now()),
            performed_by_id: Some(UserId::new()),
            ..Default::default()
        };

        assert_eq!(repo.append(t1, item, row.clone()).unwrap().sequence, 1);
        assert_eq!(repo.append(t1, item, row.clone()).unwrap().sequence, 2);
        assert_eq!(repo.append(t2, item, row.clone()).unwrap().sequence, 1);

        let incomplete = NewHistoryEntry::default();
        assert!(matches!(repo.append(t1, item, incomplete), Err(StoreError::Backend(_))));
        assert_eq!(repo.append(t1, item, row).unwrap().sequence, 3);
    }
}
