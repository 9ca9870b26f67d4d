//! State Transition Engine decisions.
//!
//! | From | Operation | To |
//! |---|---|---|
//! | (new) | `Receive` | AVAILABLE(loc) |
//! | (new) | `CollectFromClient` | ASSIGNED(tech) |
//! | AVAILABLE(loc) | `Issue` | ASSIGNED(tech) |
//! | ASSIGNED(tech) / AVAILABLE(loc)* | `AssignToOrder` | ASSIGNED_TO_ORDER |
//! | ASSIGNED_TO_ORDER | `RemoveFromOrder` | back to the owner |
//! | ASSIGNED(tech) | `Return` | AVAILABLE(loc), RETURNED(loc) for collected hardware |
//! | AVAILABLE / RETURNED | `ReturnToOperator` | RETURNED_TO_OPERATOR |
//!
//! `*` privileged callers only. Checks run in a fixed order: existence, tenant,
//! transfer lock, ownership, state, then field validation.

use fieldcrm_core::{Aggregate, DomainError, DomainResult, LocationId, OrderId, TenantId, UserId};

use crate::actor::Actor;
use crate::command::{InventoryCommand, Operation};
use crate::event::{CustodyChange, InventoryEvent};
use crate::item::{
    Custodian, InventoryItem, ItemDetails, ItemId, ItemOrigin, ItemState, OrderAssignment,
};
use crate::transfer::PendingTransfer;

impl Aggregate for InventoryItem {
    type Command = InventoryCommand;
    type Event = InventoryEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        let at = event.occurred_at;
        match &event.change {
            CustodyChange::Received { details, location_id } => {
                self.register(event, details, ItemOrigin::Received);
                self.state = ItemState::Available { location_id: *location_id };
                self.home_location_id = Some(*location_id);
            }
            CustodyChange::CollectedFromClient { details, technician_id, .. } => {
                self.register(event, details, ItemOrigin::CollectedFromClient);
                self.state = ItemState::Assigned { technician_id: *technician_id };
            }
            CustodyChange::Issued { technician_id, .. } => {
                self.state = ItemState::Assigned { technician_id: *technician_id };
            }
            CustodyChange::Returned { location_id, .. } => {
                self.state = match self.origin {
                    ItemOrigin::CollectedFromClient => ItemState::Returned { location_id: *location_id },
                    ItemOrigin::Received => ItemState::Available { location_id: *location_id },
                };
                self.home_location_id = Some(*location_id);
            }
            CustodyChange::ReturnedToOperator { .. } => {
                self.state = ItemState::ReturnedToOperator;
            }
            CustodyChange::AssignedToOrder { order_id, from } => {
                self.state = ItemState::AssignedToOrder { order_id: *order_id, owner: *from };
                self.order_assignments.push(OrderAssignment {
                    order_id: *order_id,
                    assigned_at: at,
                    removed_at: None,
                });
            }
            CustodyChange::RemovedFromOrder { returned_to, .. } => {
                for assignment in self.order_assignments.iter_mut().filter(|a| a.is_active()) {
                    assignment.removed_at = Some(at);
                }
                self.take_custody(*returned_to);
            }
            CustodyChange::TransferProposed { from, to, expires_at } => {
                self.transfer = Some(PendingTransfer {
                    from: *from,
                    to: *to,
                    proposed_by: event.performed_by,
                    proposed_at: at,
                    expires_at: *expires_at,
                });
            }
            CustodyChange::TransferAccepted { to, .. } => {
                self.take_custody(*to);
                self.transfer = None;
            }
            CustodyChange::TransferRejected { .. } | CustodyChange::TransferExpired { .. } => {
                self.transfer = None;
            }
        }

        self.updated_at = Some(at);
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        let change = self.decide(command)?;
        Ok(vec![InventoryEvent {
            tenant_id: command.tenant_id,
            item_id: command.item_id,
            performed_by: command.actor.user_id,
            occurred_at: command.occurred_at,
            notes: command.notes.clone(),
            change,
        }])
    }
}

impl InventoryItem {
    fn register(&mut self, event: &InventoryEvent, details: &ItemDetails, origin: ItemOrigin) {
        self.id = event.item_id;
        self.tenant_id = Some(event.tenant_id);
        self.details = details.clone();
        self.origin = origin;
        self.created_at = Some(event.occurred_at);
        self.created = true;
    }

    fn take_custody(&mut self, custodian: Custodian) {
        if let Custodian::Location(location_id) = custodian {
            self.home_location_id = Some(location_id);
        }
        self.state = custodian.into_state();
    }

    fn decide(&self, cmd: &InventoryCommand) -> DomainResult<CustodyChange> {
        if cmd.operation.is_creation() {
            if self.created {
                return Err(DomainError::validation("item already exists"));
            }
        } else {
            if !self.created {
                return Err(DomainError::not_found());
            }
            self.ensure_tenant(cmd.tenant_id)?;
        }
        self.ensure_item_id(cmd.item_id)?;

        match &cmd.operation {
            Operation::Receive { details, location_id } => {
                self.decide_receive(&cmd.actor, details, *location_id)
            }
            Operation::CollectFromClient { details, order_id, technician_id } => {
                self.decide_collect(&cmd.actor, details, *order_id, *technician_id)
            }
            Operation::Issue { technician_id } => self.decide_issue(&cmd.actor, *technician_id),
            Operation::Return { location_id } => self.decide_return(&cmd.actor, *location_id),
            Operation::ReturnToOperator => self.decide_return_to_operator(&cmd.actor),
            Operation::AssignToOrder { order_id } => self.decide_assign(&cmd.actor, *order_id),
            Operation::RemoveFromOrder { order_id } => self.decide_remove(&cmd.actor, *order_id),
            Operation::ProposeTransfer { to, expires_at } => self.decide_propose(cmd, *to, *expires_at),
            Operation::AcceptTransfer => self.decide_accept(cmd),
            Operation::RejectTransfer => self.decide_reject(cmd),
            Operation::ExpireTransfer => self.decide_expire(cmd),
        }
    }

    fn ensure_tenant(&self, tenant_id: TenantId) -> DomainResult<()> {
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        Ok(())
    }

    fn ensure_item_id(&self, item_id: ItemId) -> DomainResult<()> {
        if self.id != item_id {
            return Err(DomainError::invariant("item_id mismatch"));
        }
        Ok(())
    }

    pub(crate) fn ensure_unlocked(&self) -> DomainResult<()> {
        if self.transfer.is_some() {
            return Err(DomainError::TransferInProgress);
        }
        Ok(())
    }

    pub(crate) fn ensure_privileged(&self, actor: &Actor, operation: &str) -> DomainResult<()> {
        if actor.is_privileged() {
            Ok(())
        } else {
            Err(DomainError::ownership(format!("{operation} requires warehouse or admin role")))
        }
    }

    /// Non-privileged callers must personally hold the item.
    pub(crate) fn ensure_holder(&self, actor: &Actor) -> DomainResult<()> {
        if actor.is_privileged() {
            return Ok(());
        }
        let holder = match self.state {
            ItemState::Assigned { technician_id } => Some(technician_id),
            ItemState::AssignedToOrder { owner: Custodian::Technician(t), .. } => Some(t),
            _ => None,
        };
        if holder == Some(actor.user_id) {
            Ok(())
        } else {
            Err(DomainError::ownership("item is not in the caller's custody"))
        }
    }

    fn not_from_status(&self, operation: &str) -> DomainError {
        DomainError::invalid_transition(format!("cannot {operation} an item in status {}", self.status()))
    }

    fn decide_receive(
        &self,
        actor: &Actor,
        details: &ItemDetails,
        location_id: LocationId,
    ) -> DomainResult<CustodyChange> {
        self.ensure_privileged(actor, "receive")?;
        details.validate()?;
        Ok(CustodyChange::Received {
            details: details.clone(),
            location_id,
        })
    }

    fn decide_collect(
        &self,
        actor: &Actor,
        details: &ItemDetails,
        order_id: OrderId,
        technician_id: UserId,
    ) -> DomainResult<CustodyChange> {
        if !actor.is_privileged() && actor.user_id != technician_id {
            return Err(DomainError::ownership("technicians collect into their own custody only"));
        }
        details.validate()?;
        Ok(CustodyChange::CollectedFromClient {
            details: details.clone(),
            order_id,
            technician_id,
        })
    }

    fn decide_issue(&self, actor: &Actor, technician_id: UserId) -> DomainResult<CustodyChange> {
        self.ensure_unlocked()?;
        self.ensure_privileged(actor, "issue")?;
        match self.state {
            ItemState::Available { location_id } => Ok(CustodyChange::Issued {
                from_location_id: location_id,
                technician_id,
            }),
            _ => Err(self.not_from_status("issue")),
        }
    }

    fn decide_return(&self, actor: &Actor, location_id: Option<LocationId>) -> DomainResult<CustodyChange> {
        self.ensure_unlocked()?;
        self.ensure_holder(actor)?;
        let ItemState::Assigned { technician_id } = self.state else {
            return Err(self.not_from_status("return"));
        };
        let location_id = location_id
            .or(self.home_location_id)
            .ok_or_else(|| DomainError::validation("return location required"))?;
        Ok(CustodyChange::Returned {
            technician_id,
            location_id,
        })
    }

    fn decide_return_to_operator(&self, actor: &Actor) -> DomainResult<CustodyChange> {
        self.ensure_unlocked()?;
        self.ensure_privileged(actor, "return to operator")?;
        match self.state {
            ItemState::Available { location_id } | ItemState::Returned { location_id } => {
                Ok(CustodyChange::ReturnedToOperator {
                    from_location_id: location_id,
                })
            }
            _ => Err(self.not_from_status("return to operator")),
        }
    }

    fn decide_assign(&self, actor: &Actor, order_id: OrderId) -> DomainResult<CustodyChange> {
        self.ensure_unlocked()?;
        self.ensure_holder(actor)?;
        let from = match self.state {
            ItemState::Assigned { technician_id } => Custodian::Technician(technician_id),
            ItemState::Available { location_id } => {
                self.ensure_privileged(actor, "assigning warehouse stock to an order")?;
                Custodian::Location(location_id)
            }
            _ => return Err(self.not_from_status("assign to order")),
        };
        if self.active_assignment().is_some() {
            return Err(DomainError::invariant("item already has an active order assignment"));
        }
        Ok(CustodyChange::AssignedToOrder { order_id, from })
    }

    fn decide_remove(&self, actor: &Actor, order_id: OrderId) -> DomainResult<CustodyChange> {
        self.ensure_unlocked()?;
        self.ensure_holder(actor)?;
        let ItemState::AssignedToOrder { order_id: current, owner } = self.state else {
            return Err(self.not_from_status("remove from order"));
        };
        if current != order_id {
            return Err(DomainError::invalid_transition(format!(
                "item is assigned to order {current}, not {order_id}"
            )));
        }
        Ok(CustodyChange::RemovedFromOrder {
            order_id,
            returned_to: owner,
        })
    }
}
