use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use fieldcrm_core::{LocationId, OrderId, TenantId, UserId};

use crate::actor::Actor;
use crate::item::{Custodian, ItemDetails, ItemId};

/// A custody operation requested against one item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryCommand {
    pub tenant_id: TenantId,
    pub item_id: ItemId,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
    pub notes: Option<String>,
    pub operation: Operation,
}

impl InventoryCommand {
    pub fn new(tenant_id: TenantId, item_id: ItemId, actor: Actor, operation: Operation) -> Self {
        Self {
            tenant_id,
            item_id,
            actor,
            occurred_at: Utc::now(),
            notes: None,
            operation,
        }
    }

    pub fn at(mut self, occurred_at: DateTime<Utc>) -> Self {
        self.occurred_at = occurred_at;
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    /// Register a new item in a warehouse.
    Receive {
        details: ItemDetails,
        location_id: LocationId,
    },
    /// Register client hardware picked up during an order.
    CollectFromClient {
        details: ItemDetails,
        order_id: OrderId,
        technician_id: UserId,
    },
    Issue {
        technician_id: UserId,
    },
    /// Back to a warehouse; `None` means the item's home location.
    Return {
        location_id: Option<LocationId>,
    },
    ReturnToOperator,
    AssignToOrder {
        order_id: OrderId,
    },
    RemoveFromOrder {
        order_id: OrderId,
    },
    ProposeTransfer {
        to: Custodian,
        expires_at: Option<DateTime<Utc>>,
    },
    AcceptTransfer,
    RejectTransfer,
    /// Release a lock whose deadline has passed.
    ExpireTransfer,
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Receive { .. } => "receive",
            Operation::CollectFromClient { .. } => "collect_from_client",
            Operation::Issue { .. } => "issue",
            Operation::Return { .. } => "return",
            Operation::ReturnToOperator => "return_to_operator",
            Operation::AssignToOrder { .. } => "assign_to_order",
            Operation::RemoveFromOrder { .. } => "remove_from_order",
            Operation::ProposeTransfer { .. } => "propose_transfer",
            Operation::AcceptTransfer => "accept_transfer",
            Operation::RejectTransfer => "reject_transfer",
            Operation::ExpireTransfer => "expire_transfer",
        }
    }

    /// Operations that create the item rather than act on an existing one.
    pub fn is_creation(&self) -> bool {
        matches!(self, Operation::Receive { .. } | Operation::CollectFromClient { .. })
    }
}
