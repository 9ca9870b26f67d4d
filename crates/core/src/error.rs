//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Every variant is a deterministic, synchronous failure returned to the
/// immediate caller. Storage failures are modelled by the infrastructure layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// The item, order or rate does not exist.
    #[error("not found")]
    NotFound,

    /// The caller does not hold custody rights over the item.
    #[error("ownership violation: {0}")]
    OwnershipViolation(String),

    /// The current status does not permit the requested operation.
    #[error("invalid state transition: {0}")]
    InvalidStateTransition(String),

    /// The item is locked by a pending transfer.
    #[error("transfer in progress")]
    TransferInProgress,

    /// The item changed underneath the caller (optimistic check failed).
    #[error("concurrent modification: {0}")]
    ConcurrentModification(String),

    /// A value failed validation (malformed quantity, missing field, ...).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A domain invariant was violated (tenant or identifier mismatch).
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),
}

impl DomainError {
    pub fn not_found() -> Self {
        Self::NotFound
    }

    pub fn ownership(msg: impl Into<String>) -> Self {
        Self::OwnershipViolation(msg.into())
    }

    pub fn invalid_transition(msg: impl Into<String>) -> Self {
        Self::InvalidStateTransition(msg.into())
    }

    pub fn concurrent(msg: impl Into<String>) -> Self {
        Self::ConcurrentModification(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    /// `ConcurrentModification` is the only kind a caller may retry blindly.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConcurrentModification(_))
    }
}
