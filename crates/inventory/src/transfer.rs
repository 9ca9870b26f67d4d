//! Two-phase custody handoff (technician→technician, location→location).
//!
//! `propose` locks the item without moving custody; `accept` moves custody and
//! releases the lock; `reject`/`expire` release the lock and leave custody alone.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use fieldcrm_core::{DomainError, DomainResult, UserId};

use crate::command::InventoryCommand;
use crate::event::CustodyChange;
use crate::item::{Custodian, InventoryItem};

/// The lock held on an item while a handoff is in flight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingTransfer {
    pub from: Custodian,
    pub to: Custodian,
    pub proposed_by: UserId,
    pub proposed_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl PendingTransfer {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|deadline| now >= deadline)
    }
}

impl InventoryItem {
    fn pending_or_err(&self) -> DomainResult<&PendingTransfer> {
        self.transfer
            .as_ref()
            .ok_or_else(|| DomainError::invalid_transition("no pending transfer"))
    }

    pub(crate) fn decide_propose(
        &self,
        cmd: &InventoryCommand,
        to: Custodian,
        expires_at: Option<DateTime<Utc>>,
    ) -> DomainResult<CustodyChange> {
        self.ensure_unlocked()?;
        // Technicians hand over only what they hold; location stock needs privilege.
        self.ensure_holder(&cmd.actor)?;

        let from = self.state.custodian().ok_or_else(|| {
            DomainError::invalid_transition(format!("cannot transfer an item in status {}", self.status()))
        })?;

        if !from.same_kind(&to) {
            return Err(DomainError::invalid_transition(
                "technician stock moves to a technician, warehouse stock to a location",
            ));
        }
        if from == to {
            return Err(DomainError::validation("transfer target is the current holder"));
        }
        if let Some(deadline) = expires_at {
            if deadline <= cmd.occurred_at {
                return Err(DomainError::validation("transfer deadline must be in the future"));
            }
        }

        Ok(CustodyChange::TransferProposed { from, to, expires_at })
    }

    pub(crate) fn decide_accept(&self, cmd: &InventoryCommand) -> DomainResult<CustodyChange> {
        let pending = self.pending_or_err()?;
        if !pending.to.is_represented_by(&cmd.actor) {
            return Err(DomainError::ownership("only the proposed counterparty may accept"));
        }
        if pending.is_expired(cmd.occurred_at) {
            return Err(DomainError::invalid_transition("transfer expired"));
        }
        Ok(CustodyChange::TransferAccepted {
            from: pending.from,
            to: pending.to,
        })
    }

    pub(crate) fn decide_reject(&self, cmd: &InventoryCommand) -> DomainResult<CustodyChange> {
        let pending = self.pending_or_err()?;
        let actor = &cmd.actor;
        let allowed = actor.is_privileged()
            || pending.to.is_represented_by(actor)
            || pending.from.is_represented_by(actor)
            || pending.proposed_by == actor.user_id;
        if !allowed {
            return Err(DomainError::ownership("caller is not a party to this transfer"));
        }
        Ok(CustodyChange::TransferRejected {
            from: pending.from,
            to: pending.to,
        })
    }

    pub(crate) fn decide_expire(&self, cmd: &InventoryCommand) -> DomainResult<CustodyChange> {
        let pending = self.pending_or_err()?;
        self.ensure_privileged(&cmd.actor, "transfer expiry")?;
        if !pending.is_expired(cmd.occurred_at) {
            return Err(DomainError::invalid_transition("transfer has not expired"));
        }
        Ok(CustodyChange::TransferExpired {
            from: pending.from,
            to: pending.to,
        })
    }
}
