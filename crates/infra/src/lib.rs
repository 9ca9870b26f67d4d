//! Infrastructure layer: storage backends, the custody command pipeline,
//! settlement persistence and configuration.

pub mod config;
pub mod engine;
pub mod error;
pub mod settlement;
pub mod store;


pub use config::{ConfigError, InventoryConfig};
pub use engine::{CommandOutcome, InventoryEngine};
pub use error::InventoryError;
pub use settlement::{
    InMemoryOrderSource, InMemoryRateSource, InMemorySettlementStore, OrderSource, RateSource, SettlementService,
    SettlementStore,
};
pub use store::{
    HistoryLedger, InMemoryInventoryRepository, InventoryRepository, InventoryStore, ItemChange,
    PostgresInventoryRepository, StoreError,
};
