use serde::{Deserialize, Serialize};

use fieldcrm_core::UserId;

/// Role of the caller as resolved by the (external) session layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActorRole {
    Technician,
    Warehouse,
    Admin,
}

/// The user performing an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: UserId,
    pub role: ActorRole,
}

impl Actor {
    pub fn new(user_id: UserId, role: ActorRole) -> Self {
        Self { user_id, role }
    }

    pub fn technician(user_id: UserId) -> Self {
        Self::new(user_id, ActorRole::Technician)
    }

    pub fn warehouse(user_id: UserId) -> Self {
        Self::new(user_id, ActorRole::Warehouse)
    }

    pub fn admin(user_id: UserId) -> Self {
        Self::new(user_id, ActorRole::Admin)
    }

    /// Privileged callers skip the ownership check, never the state machine.
    pub fn is_privileged(&self) -> bool {
        matches!(self.role, ActorRole::Warehouse | ActorRole::Admin)
    }
}
