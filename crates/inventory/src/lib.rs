//! Warehouse inventory custody domain.
//!
//! Pure, deterministic business rules: which custody changes are legal for an
//! item, what each change does to it, and what audit row it leaves behind.
//! No IO; storage and publication live in `fieldcrm-infra`.

pub mod actor;
pub mod command;
pub mod event;
pub mod history;
pub mod item;
pub mod transfer;
mod transition;

pub use actor::{Actor, ActorRole};
pub use command::{InventoryCommand, Operation};
pub use event::{CustodyChange, InventoryEvent};
pub use history::{HistoryAction, HistoryEntry, HistoryFilter, NewHistoryEntry, sort_chronologically};
pub use item::{
    Custodian, DeviceCategory, InventoryItem, ItemDetails, ItemId, ItemOrigin, ItemState, ItemStatus,
    ItemType, OrderAssignment,
};
pub use transfer::PendingTransfer;
