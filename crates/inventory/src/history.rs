//! Audit ledger records. Rows are created as a side effect of a committed
//! custody change and never updated or deleted.

use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use fieldcrm_core::{DomainError, LocationId, OrderId, TenantId, UserId};

use crate::event::{CustodyChange, InventoryEvent};
use crate::item::{Custodian, InventoryItem, ItemId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HistoryAction {
    Received,
    Issued,
    Returned,
    ReturnedToOperator,
    ReturnedToTechnician,
    Transfer,
    AssignedToOrder,
    CollectedFromClient,
}

impl HistoryAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryAction::Received => "RECEIVED",
            HistoryAction::Issued => "ISSUED",
            HistoryAction::Returned => "RETURNED",
            HistoryAction::ReturnedToOperator => "RETURNED_TO_OPERATOR",
            HistoryAction::ReturnedToTechnician => "RETURNED_TO_TECHNICIAN",
            HistoryAction::Transfer => "TRANSFER",
            HistoryAction::AssignedToOrder => "ASSIGNED_TO_ORDER",
            HistoryAction::CollectedFromClient => "COLLECTED_FROM_CLIENT",
        }
    }
}

impl core::fmt::Display for HistoryAction {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HistoryAction {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RECEIVED" => Ok(HistoryAction::Received),
            "ISSUED" => Ok(HistoryAction::Issued),
            "RETURNED" => Ok(HistoryAction::Returned),
            "RETURNED_TO_OPERATOR" => Ok(HistoryAction::ReturnedToOperator),
            "RETURNED_TO_TECHNICIAN" => Ok(HistoryAction::ReturnedToTechnician),
            "TRANSFER" => Ok(HistoryAction::Transfer),
            "ASSIGNED_TO_ORDER" => Ok(HistoryAction::AssignedToOrder),
            "COLLECTED_FROM_CLIENT" => Ok(HistoryAction::CollectedFromClient),
            other => Err(DomainError::validation(format!("unknown history action: '{other}'"))),
        }
    }
}

/// A ledger row before the ledger has assigned its id and sequence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewHistoryEntry {
    pub action: Option<HistoryAction>,
    pub action_date: Option<DateTime<Utc>>,
    pub performed_by_id: Option<UserId>,
    pub assigned_to_id: Option<UserId>,
    pub assigned_order_id: Option<OrderId>,
    pub from_location_id: Option<LocationId>,
    pub to_location_id: Option<LocationId>,
    pub from_technician_id: Option<UserId>,
    pub quantity: Option<i64>,
    pub notes: Option<String>,
}

impl NewHistoryEntry {
    /// Build the ledger row for a decided event, given the item state after it
    /// was applied. Returns `None` for changes that leave no audit row.
    pub fn from_event(event: &InventoryEvent, item_after: &InventoryItem) -> Option<Self> {
        let action = event.change.history_action()?;
        let mut row = NewHistoryEntry {
            action: Some(action),
            action_date: Some(event.occurred_at),
            performed_by_id: Some(event.performed_by),
            quantity: Some(item_after.quantity()),
            notes: event.notes.clone(),
            ..Default::default()
        };

        match &event.change {
            CustodyChange::Received { location_id, .. } => {
                row.to_location_id = Some(*location_id);
            }
            CustodyChange::CollectedFromClient { order_id, technician_id, .. } => {
                row.assigned_to_id = Some(*technician_id);
                row.assigned_order_id = Some(*order_id);
            }
            CustodyChange::Issued { from_location_id, technician_id } => {
                row.from_location_id = Some(*from_location_id);
                row.assigned_to_id = Some(*technician_id);
            }
            CustodyChange::Returned { technician_id, location_id } => {
                row.from_technician_id = Some(*technician_id);
                row.to_location_id = Some(*location_id);
            }
            CustodyChange::ReturnedToOperator { from_location_id } => {
                row.from_location_id = Some(*from_location_id);
            }
            CustodyChange::AssignedToOrder { order_id, from } => {
                row.assigned_order_id = Some(*order_id);
                row.set_source(*from);
            }
            CustodyChange::RemovedFromOrder { order_id, returned_to } => {
                row.assigned_order_id = Some(*order_id);
                row.set_target(*returned_to);
            }
            CustodyChange::TransferAccepted { from, to } => {
                row.set_source(*from);
                row.set_target(*to);
            }
            CustodyChange::TransferProposed { .. }
            | CustodyChange::TransferRejected { .. }
            | CustodyChange::TransferExpired { .. } => return None,
        }

        Some(row)
    }

    fn set_source(&mut self, from: Custodian) {
        match from {
            Custodian::Technician(t) => self.from_technician_id = Some(t),
            Custodian::Location(l) => self.from_location_id = Some(l),
        }
    }

    fn set_target(&mut self, to: Custodian) {
        match to {
            Custodian::Technician(t) => self.assigned_to_id = Some(t),
            Custodian::Location(l) => self.to_location_id = Some(l),
        }
    }

    /// Seal the row with the identity the ledger assigned at append time.
    pub fn into_entry(
        self,
        id: Uuid,
        sequence: u64,
        tenant_id: TenantId,
        item_id: ItemId,
    ) -> Result<HistoryEntry, DomainError> {
        let action = self
            .action
            .ok_or_else(|| DomainError::validation("history entry requires an action"))?;
        let action_date = self
            .action_date
            .ok_or_else(|| DomainError::validation("history entry requires an action date"))?;
        let performed_by_id = self
            .performed_by_id
            .ok_or_else(|| DomainError::validation("history entry requires a performer"))?;

        Ok(HistoryEntry {
            id,
            sequence,
            tenant_id,
            item_id,
            action,
            action_date,
            performed_by_id,
            assigned_to_id: self.assigned_to_id,
            assigned_order_id: self.assigned_order_id,
            from_location_id: self.from_location_id,
            to_location_id: self.to_location_id,
            from_technician_id: self.from_technician_id,
            quantity: self.quantity,
            notes: self.notes,
        })
    }
}

/// Immutable audit record. Ordered by `(action_date, sequence)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: Uuid,
    /// Per-tenant insertion sequence assigned by the ledger.
    pub sequence: u64,
    pub tenant_id: TenantId,
    pub item_id: ItemId,
    pub action: HistoryAction,
    pub action_date: DateTime<Utc>,
    pub performed_by_id: UserId,
    pub assigned_to_id: Option<UserId>,
    pub assigned_order_id: Option<OrderId>,
    pub from_location_id: Option<LocationId>,
    pub to_location_id: Option<LocationId>,
    pub from_technician_id: Option<UserId>,
    pub quantity: Option<i64>,
    pub notes: Option<String>,
}

impl HistoryEntry {
    pub fn ordering_key(&self) -> (DateTime<Utc>, u64) {
        (self.action_date, self.sequence)
    }
}

/// Optional narrowing of a history query. An empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryFilter {
    pub actions: Option<Vec<HistoryAction>>,
    pub performed_by: Option<UserId>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl HistoryFilter {
    pub fn action(action: HistoryAction) -> Self {
        Self {
            actions: Some(vec![action]),
            ..Default::default()
        }
    }

    pub fn matches(&self, entry: &HistoryEntry) -> bool {
        if let Some(actions) = &self.actions {
            if !actions.contains(&entry.action) {
                return false;
            }
        }
        if let Some(user) = self.performed_by {
            if entry.performed_by_id != user {
                return false;
            }
        }
        if let Some(from) = self.from {
            if entry.action_date < from {
                return false;
            }
        }
        if let Some(to) = self.to {
            if entry.action_date > to {
                return false;
            }
        }
        true
    }
}

/// Sort entries into ledger order.
pub fn sort_chronologically(entries: &mut [HistoryEntry]) {
    entries.sort_by_key(HistoryEntry::ordering_key);
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use fieldcrm_core::Aggregate;

    use crate::actor::Actor;
    use crate::command::{InventoryCommand, Operation};
    use crate::item::{DeviceCategory, ItemDetails};

    fn decide(item: &mut InventoryItem, command: InventoryCommand) -> InventoryEvent {
        let event = item.handle(&command).unwrap().remove(0);
        item.apply(&event);
        event
    }

    fn entry(action: HistoryAction, at: DateTime<Utc>, sequence: u64, by: UserId) -> HistoryEntry {
        NewHistoryEntry {
            action: Some(action),
            action_date: Some(at),
            performed_by_id: Some(by),
            ..Default::default()
        }
        .into_entry(Uuid::now_v7(), sequence, TenantId::new(), ItemId::generate())
        .unwrap()
    }

    #[test]
    fn issue_row_records_source_and_technician() {
        let tenant = TenantId::new();
        let warehouse = Actor::warehouse(UserId::new());
        let technician = UserId::new();
        let location = LocationId::new();
        let item_id = ItemId::generate();
        let mut item = InventoryItem::empty(item_id);
        let details = ItemDetails::device("ONT HG8245", "SN-77", DeviceCategory::Ont, 12_000);

        let received = decide(
            &mut item,
            InventoryCommand::new(tenant, item_id, warehouse, Operation::Receive { details, location_id: location }),
        );
        let row = NewHistoryEntry::from_event(&received, &item).unwrap();
        assert_eq!(row.action, Some(HistoryAction::Received));
        assert_eq!(row.to_location_id, Some(location));
        assert_eq!(row.quantity, Some(1));

        let issued = decide(
            &mut item,
            InventoryCommand::new(tenant, item_id, warehouse, Operation::Issue { technician_id: technician })
                .with_notes("van 4"),
        );
        let row = NewHistoryEntry::from_event(&issued, &item).unwrap();
        assert_eq!(row.action, Some(HistoryAction::Issued));
        assert_eq!(row.from_location_id, Some(location));
        assert_eq!(row.assigned_to_id, Some(technician));
        assert_eq!(row.performed_by_id, Some(warehouse.user_id));
        assert_eq!(row.notes.as_deref(), Some("van 4"));
    }

    #[test]
    fn lock_changes_leave_no_row() {
        let tenant = TenantId::new();
        let warehouse = Actor::warehouse(UserId::new());
        let item_id = ItemId::generate();
        let mut item = InventoryItem::empty(item_id);
        let details = ItemDetails::device("Router AX3000", "SN-88", DeviceCategory::Router, 40_000);
        decide(
            &mut item,
            InventoryCommand::new(tenant, item_id, warehouse, Operation::Receive {
                details,
                location_id: LocationId::new(),
            }),
        );

        let proposed = decide(
            &mut item,
            InventoryCommand::new(tenant, item_id, warehouse, Operation::ProposeTransfer {
                to: Custodian::Location(LocationId::new()),
                expires_at: None,
            }),
        );
        assert!(NewHistoryEntry::from_event(&proposed, &item).is_none());
    }

    #[test]
    fn incomplete_row_cannot_be_sealed() {
        let err = NewHistoryEntry::default()
            .into_entry(Uuid::now_v7(), 1, TenantId::new(), ItemId::generate())
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn filter_narrows_by_action_performer_and_window() {
        let alice = UserId::new();
        let bob = UserId::new();
        let now = Utc::now();
        let issued = entry(HistoryAction::Issued, now, 1, alice);
        let returned = entry(HistoryAction::Returned, now + Duration::hours(2), 2, bob);

        assert!(HistoryFilter::default().matches(&issued));
        assert!(HistoryFilter::action(HistoryAction::Issued).matches(&issued));
        assert!(!HistoryFilter::action(HistoryAction::Issued).matches(&returned));

        let by_bob = HistoryFilter {
            performed_by: Some(bob),
            ..Default::default()
        };
        assert!(!by_bob.matches(&issued));
        assert!(by_bob.matches(&returned));

        let first_hour = HistoryFilter {
            from: Some(now),
            to: Some(now + Duration::hours(1)),
            ..Default::default()
        };
        assert!(first_hour.matches(&issued));
        assert!(!first_hour.matches(&returned));
    }

    #[test]
    fn same_instant_rows_sort_by_sequence() {
        let user = UserId::new();
        let now = Utc::now();
        let mut entries = vec![
            entry(HistoryAction::Returned, now, 7, user),
            entry(HistoryAction::Received, now - Duration::minutes(5), 9, user),
            entry(HistoryAction::Issued, now, 3, user),
        ];
        sort_chronologically(&mut entries);

        let actions: Vec<_> = entries.iter().map(|e| e.action).collect();
        assert_eq!(
            actions,
            vec![HistoryAction::Received, HistoryAction::Issued, HistoryAction::Returned]
        );
    }

    #[test]
    fn action_names_round_trip_through_from_str() {
        for action in [HistoryAction::ReturnedToTechnician, HistoryAction::CollectedFromClient] {
            assert_eq!(action.as_str().parse::<HistoryAction>().unwrap(), action);
        }
        assert!("LOST".parse::<HistoryAction>().is_err());
    }
}
