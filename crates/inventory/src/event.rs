use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use fieldcrm_core::{LocationId, OrderId, TenantId, UserId};
use fieldcrm_events::Event;

use crate::history::HistoryAction;
use crate::item::{Custodian, ItemDetails, ItemId};

/// A decided custody change for one item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryEvent {
    pub tenant_id: TenantId,
    pub item_id: ItemId,
    pub performed_by: UserId,
    pub occurred_at: DateTime<Utc>,
    pub notes: Option<String>,
    pub change: CustodyChange,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CustodyChange {
    Received {
        details: ItemDetails,
        location_id: LocationId,
    },
    CollectedFromClient {
        details: ItemDetails,
        order_id: OrderId,
        technician_id: UserId,
    },
    Issued {
        from_location_id: LocationId,
        technician_id: UserId,
    },
    Returned {
        technician_id: UserId,
        location_id: LocationId,
    },
    ReturnedToOperator {
        from_location_id: LocationId,
    },
    AssignedToOrder {
        order_id: OrderId,
        from: Custodian,
    },
    RemovedFromOrder {
        order_id: OrderId,
        returned_to: Custodian,
    },
    TransferProposed {
        from: Custodian,
        to: Custodian,
        expires_at: Option<DateTime<Utc>>,
    },
    TransferAccepted {
        from: Custodian,
        to: Custodian,
    },
    TransferRejected {
        from: Custodian,
        to: Custodian,
    },
    TransferExpired {
        from: Custodian,
        to: Custodian,
    },
}

impl CustodyChange {
    /// The audit action this change records, if it leaves a ledger row.
    ///
    /// Proposals, rejections and expiries lock or unlock the item without
    /// moving custody and are not written to the ledger.
    pub fn history_action(&self) -> Option<HistoryAction> {
        match self {
            CustodyChange::Received { .. } => Some(HistoryAction::Received),
            CustodyChange::CollectedFromClient { .. } => Some(HistoryAction::CollectedFromClient),
            CustodyChange::Issued { .. } => Some(HistoryAction::Issued),
            CustodyChange::Returned { .. } => Some(HistoryAction::Returned),
            CustodyChange::ReturnedToOperator { .. } => Some(HistoryAction::ReturnedToOperator),
            CustodyChange::AssignedToOrder { .. } => Some(HistoryAction::AssignedToOrder),
            CustodyChange::RemovedFromOrder { returned_to: Custodian::Technician(_), .. } => {
                Some(HistoryAction::ReturnedToTechnician)
            }
            CustodyChange::RemovedFromOrder { returned_to: Custodian::Location(_), .. } => {
                Some(HistoryAction::Returned)
            }
            CustodyChange::TransferAccepted { .. } => Some(HistoryAction::Transfer),
            CustodyChange::TransferProposed { .. }
            | CustodyChange::TransferRejected { .. }
            | CustodyChange::TransferExpired { .. } => None,
        }
    }
}

impl Event for InventoryEvent {
    fn event_type(&self) -> &'static str {
        match &self.change {
            CustodyChange::Received { .. } => "inventory.item.received",
            CustodyChange::CollectedFromClient { .. } => "inventory.item.collected_from_client",
            CustodyChange::Issued { .. } => "inventory.item.issued",
            CustodyChange::Returned { .. } => "inventory.item.returned",
            CustodyChange::ReturnedToOperator { .. } => "inventory.item.returned_to_operator",
            CustodyChange::AssignedToOrder { .. } => "inventory.item.assigned_to_order",
            CustodyChange::RemovedFromOrder { .. } => "inventory.item.removed_from_order",
            CustodyChange::TransferProposed { .. } => "inventory.item.transfer_proposed",
            CustodyChange::TransferAccepted { .. } => "inventory.item.transfer_accepted",
            CustodyChange::TransferRejected { .. } => "inventory.item.transfer_rejected",
            CustodyChange::TransferExpired { .. } => "inventory.item.transfer_expired",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }
}
