//! Settlement domain module.
//!
//! Derives the billable work codes for a completed order from its activated
//! services and the rate catalog. Pure and deterministic (no IO, no storage).

pub mod compute;
pub mod order;
pub mod pattern;
pub mod rate;

pub use compute::{SettlementEntry, compute_settlement, compute_settlement_with, settlement_value};
pub use order::{ActivatedService, Order, OrderArena, OrderStatus, OrderType, ServiceType};
pub use pattern::{CodeKind, CodePattern, CodePatternTable, normalize_code};
pub use rate::{RateCatalog, RateDefinition};
