use thiserror::Error;

use fieldcrm_core::DomainError;

use crate::store::StoreError;

/// Error returned by the inventory and settlement services.
///
/// Only `ConcurrentModification` is safe to retry; every other kind is final
/// for the request and should be shown to the operator.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InventoryError {
    #[error("not found")]
    NotFound,

    #[error("ownership violation: {0}")]
    OwnershipViolation(String),

    #[error("invalid state transition: {0}")]
    InvalidStateTransition(String),

    #[error("transfer in progress")]
    TransferInProgress,

    #[error("concurrent modification: {0}")]
    ConcurrentModification(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),

    #[error("storage failure: {0}")]
    Store(String),
}

impl InventoryError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, InventoryError::ConcurrentModification(_))
    }
}

impl From<DomainError> for InventoryError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::NotFound => InventoryError::NotFound,
            DomainError::OwnershipViolation(msg) => InventoryError::OwnershipViolation(msg),
            DomainError::InvalidStateTransition(msg) => InventoryError::InvalidStateTransition(msg),
            DomainError::TransferInProgress => InventoryError::TransferInProgress,
            DomainError::ConcurrentModification(msg) => InventoryError::ConcurrentModification(msg),
            DomainError::Validation(msg) => InventoryError::Validation(msg),
            DomainError::InvariantViolation(msg) => InventoryError::InvariantViolation(msg),
            DomainError::InvalidId(msg) => InventoryError::Validation(msg),
        }
    }
}

impl From<StoreError> for InventoryError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Concurrency(msg) => InventoryError::ConcurrentModification(msg),
            StoreError::DuplicateSerial(serial) => {
                InventoryError::Validation(format!("serial number already registered: {serial}"))
            }
            StoreError::TenantIsolation(msg) => InventoryError::TenantIsolation(msg),
            StoreError::RejectedChange(msg) => InventoryError::InvariantViolation(msg),
            StoreError::Backend(msg) => InventoryError::Store(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_concurrency_is_retryable() {
        assert!(InventoryError::from(StoreError::Concurrency("v2 != v3".into())).is_retryable());
        assert!(InventoryError::from(DomainError::concurrent("stale")).is_retryable());
        assert!(!InventoryError::from(DomainError::TransferInProgress).is_retryable());
        assert!(!InventoryError::from(StoreError::Backend("down".into())).is_retryable());
        assert!(!InventoryError::from(StoreError::RejectedChange("no exact version".into())).is_retryable());
    }

    #[test]
    fn duplicate_serial_surfaces_as_validation() {
        let err = InventoryError::from(StoreError::DuplicateSerial("SN-1".into()));
        match err {
            InventoryError::Validation(msg) => assert!(msg.contains("SN-1")),
            _ => panic!("expected Validation error"),
        }
    }
}
