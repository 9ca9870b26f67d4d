//! Custody command pipeline.
//!
//! ```text
//! InventoryCommand
//!   ↓
//! 1. Load the item (tenant-scoped) and note its version
//!   ↓
//! 2. Decide (pure `Aggregate::handle`, no mutation)
//!   ↓
//! 3. Apply the decided event and build the ledger row
//!   ↓
//! 4. Commit item + ledger row atomically (compare-and-swap on version)
//!   ↓
//! 5. Publish the event on the bus
//! ```
//!
//! A lost compare-and-swap surfaces as `ConcurrentModification`; with
//! `retry_on_conflict` the whole pipeline is re-run once from step 1.

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};

use fieldcrm_core::{Aggregate, AggregateRoot, ExpectedVersion, LocationId, OrderId, TenantId, UserId};
use fieldcrm_events::{EventBus, EventEnvelope};
use fieldcrm_inventory::{
    Actor, Custodian, HistoryAction, HistoryEntry, HistoryFilter, InventoryCommand, InventoryEvent,
    InventoryItem, ItemDetails, ItemId, NewHistoryEntry, Operation, sort_chronologically,
};

use crate::config::InventoryConfig;
use crate::error::InventoryError;
use crate::store::{InventoryRepository, ItemChange};

pub const AGGREGATE_TYPE: &str = "inventory.item";

/// Result of a committed custody change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutcome {
    pub item: InventoryItem,
    /// The ledger row written with the change (`None` for lock-only changes).
    pub history: Option<HistoryEntry>,
}

/// State Transition Engine + Transfer Protocol entry point.
#[derive(Debug)]
pub struct InventoryEngine<R, B> {
    repo: R,
    bus: B,
    config: InventoryConfig,
}

impl<R, B> InventoryEngine<R, B> {
    pub fn new(repo: R, bus: B) -> Self {
        Self::with_config(repo, bus, InventoryConfig::default())
    }

    pub fn with_config(repo: R, bus: B, config: InventoryConfig) -> Self {
        Self { repo, bus, config }
    }

    pub fn config(&self) -> &InventoryConfig {
        &self.config
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    pub fn into_parts(self) -> (R, B) {
        (self.repo, self.bus)
    }
}

impl<R, B> InventoryEngine<R, B>
where
    R: InventoryRepository,
    B: EventBus<EventEnvelope<InventoryEvent>>,
{
    /// Run one custody command through the pipeline.
    #[instrument(
        skip(self, command),
        fields(
            tenant_id = %command.tenant_id.as_uuid(),
            item_id = %command.item_id,
            operation = command.operation.name(),
            actor = %command.actor.user_id
        ),
        err
    )]
    pub fn execute(&self, command: InventoryCommand) -> Result<CommandOutcome, InventoryError> {
        match self.execute_once(&command) {
            Err(err) if err.is_retryable() && self.config.retry_on_conflict => {
                warn!(error = %err, "lost optimistic concurrency race, retrying once");
                self.execute_once(&command)
            }
            other => other,
        }
    }

    fn execute_once(&self, command: &InventoryCommand) -> Result<CommandOutcome, InventoryError> {
        let tenant_id = command.tenant_id;
        let mut item = self
            .repo
            .get(tenant_id, command.item_id)?
            .unwrap_or_else(|| InventoryItem::empty(command.item_id));
        let expected = ExpectedVersion::Exact(item.version());

        let events = item.handle(command).map_err(|err| {
            warn!(error = %err, status = %item.status(), "custody change rejected");
            InventoryError::from(err)
        })?;

        if command.operation.is_creation() {
            self.ensure_serial_free(tenant_id, command)?;
        }

        for event in &events {
            item.apply(event);
        }
        item.check_invariants()?;

        let history = events.iter().find_map(|e| NewHistoryEntry::from_event(e, &item));
        let recorded = self
            .repo
            .commit(tenant_id, ItemChange::new(item.clone(), expected, history))?;

        info!(
            action = recorded.as_ref().map(|h| h.action.as_str()).unwrap_or("none"),
            status = %item.status(),
            version = item.version(),
            "custody change committed"
        );

        self.publish(tenant_id, &item, events);

        Ok(CommandOutcome {
            item,
            history: recorded,
        })
    }

    fn ensure_serial_free(&self, tenant_id: TenantId, command: &InventoryCommand) -> Result<(), InventoryError> {
        let serial = match &command.operation {
            Operation::Receive { details, .. } | Operation::CollectFromClient { details, .. } => {
                details.serial_number.as_deref()
            }
            _ => None,
        };
        if let Some(serial) = serial {
            if self.repo.get_by_serial(tenant_id, serial)?.is_some() {
                return Err(InventoryError::Validation(format!(
                    "serial number already registered: {serial}"
                )));
            }
        }
        Ok(())
    }

    /// Publication happens after commit; a failure here never undoes the change.
    fn publish(&self, tenant_id: TenantId, item: &InventoryItem, events: Vec<InventoryEvent>) {
        for event in events {
            let envelope = EventEnvelope::wrap(tenant_id, item.id_typed().0, AGGREGATE_TYPE, item.version(), event);
            if let Err(err) = self.bus.publish(envelope) {
                warn!(error = ?err, item_id = %item.id_typed(), "failed to publish custody event");
            }
        }
    }

    fn run(
        &self,
        tenant_id: TenantId,
        actor: Actor,
        item_id: ItemId,
        operation: Operation,
    ) -> Result<InventoryItem, InventoryError> {
        self.execute(InventoryCommand::new(tenant_id, item_id, actor, operation))
            .map(|outcome| outcome.item)
    }

    /// Register a new item at a warehouse location.
    pub fn receive(
        &self,
        tenant_id: TenantId,
        actor: Actor,
        details: ItemDetails,
        location_id: LocationId,
    ) -> Result<InventoryItem, InventoryError> {
        self.run(tenant_id, actor, ItemId::generate(), Operation::Receive { details, location_id })
    }

    /// Register client hardware picked up by a technician on an order.
    pub fn collect_from_client(
        &self,
        tenant_id: TenantId,
        actor: Actor,
        details: ItemDetails,
        order_id: OrderId,
        technician_id: UserId,
    ) -> Result<InventoryItem, InventoryError> {
        self.run(
            tenant_id,
            actor,
            ItemId::generate(),
            Operation::CollectFromClient {
                details,
                order_id,
                technician_id,
            },
        )
    }

    pub fn issue(
        &self,
        tenant_id: TenantId,
        actor: Actor,
        item_id: ItemId,
        technician_id: UserId,
    ) -> Result<InventoryItem, InventoryError> {
        self.run(tenant_id, actor, item_id, Operation::Issue { technician_id })
    }

    /// Return technician stock to a warehouse (`None` = the item's home location).
    pub fn return_item(
        &self,
        tenant_id: TenantId,
        actor: Actor,
        item_id: ItemId,
        location_id: Option<LocationId>,
    ) -> Result<InventoryItem, InventoryError> {
        self.run(tenant_id, actor, item_id, Operation::Return { location_id })
    }

    pub fn return_to_operator(
        &self,
        tenant_id: TenantId,
        actor: Actor,
        item_id: ItemId,
    ) -> Result<InventoryItem, InventoryError> {
        self.run(tenant_id, actor, item_id, Operation::ReturnToOperator)
    }

    pub fn assign_to_order(
        &self,
        tenant_id: TenantId,
        actor: Actor,
        item_id: ItemId,
        order_id: OrderId,
    ) -> Result<InventoryItem, InventoryError> {
        self.run(tenant_id, actor, item_id, Operation::AssignToOrder { order_id })
    }

    pub fn remove_from_order(
        &self,
        tenant_id: TenantId,
        actor: Actor,
        item_id: ItemId,
        order_id: OrderId,
    ) -> Result<InventoryItem, InventoryError> {
        self.run(tenant_id, actor, item_id, Operation::RemoveFromOrder { order_id })
    }

    /// Lock the item for a handoff to `to`. The deadline comes from
    /// `transfer_ttl_secs` when configured.
    pub fn propose_transfer(
        &self,
        tenant_id: TenantId,
        actor: Actor,
        item_id: ItemId,
        to: Custodian,
    ) -> Result<InventoryItem, InventoryError> {
        let now = Utc::now();
        let expires_at = self.transfer_deadline(now)?;
        self.execute(InventoryCommand::new(tenant_id, item_id, actor, Operation::ProposeTransfer { to, expires_at }).at(now))
            .map(|outcome| outcome.item)
    }

    pub fn accept_transfer(&self, tenant_id: TenantId, actor: Actor, item_id: ItemId) -> Result<InventoryItem, InventoryError> {
        self.run(tenant_id, actor, item_id, Operation::AcceptTransfer)
    }

    pub fn reject_transfer(&self, tenant_id: TenantId, actor: Actor, item_id: ItemId) -> Result<InventoryItem, InventoryError> {
        self.run(tenant_id, actor, item_id, Operation::RejectTransfer)
    }

    fn transfer_deadline(&self, now: DateTime<Utc>) -> Result<Option<DateTime<Utc>>, InventoryError> {
        let Some(ttl) = self.config.transfer_ttl() else {
            return Ok(None);
        };
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|_| InventoryError::Validation("transfer ttl out of range".to_string()))?;
        Ok(now.checked_add_signed(ttl))
    }

    /// Release every pending transfer of `tenant_id` whose deadline is at or
    /// before `now`. Returns the items that were released.
    ///
    /// Locks resolved concurrently (accepted, rejected or already expired) are
    /// skipped.
    #[instrument(skip(self, actor), fields(tenant_id = %tenant_id.as_uuid()), err)]
    pub fn expire_stale_transfers(
        &self,
        tenant_id: TenantId,
        actor: Actor,
        now: DateTime<Utc>,
    ) -> Result<Vec<ItemId>, InventoryError> {
        let pending = self.repo.list_pending_transfers(tenant_id)?;
        let mut released = Vec::new();

        for item in pending {
            if !item.pending_transfer().is_some_and(|t| t.is_expired(now)) {
                continue;
            }
            let command = InventoryCommand::new(tenant_id, item.id_typed(), actor, Operation::ExpireTransfer)
                .at(now)
                .with_notes("transfer expired");
            match self.execute(command) {
                Ok(_) => released.push(item.id_typed()),
                Err(InventoryError::InvalidStateTransition(_) | InventoryError::ConcurrentModification(_)) => {
                    debug!(item_id = %item.id_typed(), "pending transfer resolved concurrently");
                }
                Err(err) => return Err(err),
            }
        }

        info!(released = released.len(), "expired stale transfers");
        Ok(released)
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id.as_uuid(), item_id = %item_id), err)]
    pub fn get_item(&self, tenant_id: TenantId, item_id: ItemId) -> Result<InventoryItem, InventoryError> {
        self.repo
            .get(tenant_id, item_id)?
            .ok_or(InventoryError::NotFound)
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id.as_uuid()), err)]
    pub fn get_item_by_serial(&self, tenant_id: TenantId, serial: &str) -> Result<InventoryItem, InventoryError> {
        self.repo
            .get_by_serial(tenant_id, serial)?
            .ok_or(InventoryError::NotFound)
    }

    /// Stock held by a warehouse location or a technician.
    #[instrument(skip(self), fields(tenant_id = %tenant_id.as_uuid()), err)]
    pub fn list_stock(&self, tenant_id: TenantId, holder: Custodian) -> Result<Vec<InventoryItem>, InventoryError> {
        let items = match holder {
            Custodian::Location(location_id) => self.repo.list_by_location(tenant_id, location_id)?,
            Custodian::Technician(technician_id) => self.repo.list_by_technician(tenant_id, technician_id)?,
        };
        debug!(count = items.len(), "listed stock");
        Ok(items)
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id.as_uuid(), order_id = %order_id), err)]
    pub fn list_order_items(&self, tenant_id: TenantId, order_id: OrderId) -> Result<Vec<InventoryItem>, InventoryError> {
        Ok(self.repo.list_by_order(tenant_id, order_id)?)
    }

    #[instrument(skip(self, filter), fields(tenant_id = %tenant_id.as_uuid(), item_id = %item_id), err)]
    pub fn get_history(
        &self,
        tenant_id: TenantId,
        item_id: ItemId,
        filter: &HistoryFilter,
    ) -> Result<Vec<HistoryEntry>, InventoryError> {
        if self.repo.get(tenant_id, item_id)?.is_none() {
            return Err(InventoryError::NotFound);
        }
        Ok(self.repo.query_by_item(tenant_id, item_id, filter)?)
    }

    /// Merged history of every item named exactly `name`.
    #[instrument(skip(self, filter), fields(tenant_id = %tenant_id.as_uuid()), err)]
    pub fn history_by_item_name(
        &self,
        tenant_id: TenantId,
        name: &str,
        filter: &HistoryFilter,
    ) -> Result<Vec<HistoryEntry>, InventoryError> {
        let mut entries = Vec::new();
        for item in self.repo.list_by_name(tenant_id, name)? {
            entries.extend(self.repo.query_by_item(tenant_id, item.id_typed(), filter)?);
        }
        sort_chronologically(&mut entries);
        debug!(count = entries.len(), "merged history by item name");
        Ok(entries)
    }

    pub fn last_history_of_type(
        &self,
        tenant_id: TenantId,
        item_id: ItemId,
        action: HistoryAction,
    ) -> Result<Option<HistoryEntry>, InventoryError> {
        Ok(self.repo.last_of_type(tenant_id, item_id, action)?)
    }

    pub fn first_history_of_type(
        &self,
        tenant_id: TenantId,
        item_id: ItemId,
        action: HistoryAction,
    ) -> Result<Option<HistoryEntry>, InventoryError> {
        Ok(self.repo.first_of_type(tenant_id, item_id, action)?)
    }
}
