//! Settlement service: loads an order and its tenant's rate catalog, computes
//! the billable lines and stores them, replacing any earlier result.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::{debug, info, instrument, warn};

use fieldcrm_core::{OrderId, TenantId};
use fieldcrm_settlement::{
    CodePatternTable, Order, OrderArena, RateCatalog, SettlementEntry, compute_settlement_with,
};

use crate::error::InventoryError;
use crate::store::StoreError;

pub trait OrderSource: Send + Sync {
    fn order(&self, tenant_id: TenantId, order_id: OrderId) -> Result<Option<Order>, StoreError>;
}

pub trait RateSource: Send + Sync {
    /// The tenant's catalog; an unknown tenant has an empty catalog.
    fn catalog(&self, tenant_id: TenantId) -> Result<RateCatalog, StoreError>;
}

/// Persisted settlement lines, one set per order.
pub trait SettlementStore: Send + Sync {
    /// Drop whatever was stored for the order and store `entries` instead.
    fn replace(&self, tenant_id: TenantId, order_id: OrderId, entries: &[SettlementEntry]) -> Result<(), StoreError>;

    fn entries(&self, tenant_id: TenantId, order_id: OrderId) -> Result<Vec<SettlementEntry>, StoreError>;
}

impl<T: OrderSource + ?Sized> OrderSource for Arc<T> {
    fn order(&self, tenant_id: TenantId, order_id: OrderId) -> Result<Option<Order>, StoreError> {
        (**self).order(tenant_id, order_id)
    }
}

impl<T: RateSource + ?Sized> RateSource for Arc<T> {
    fn catalog(&self, tenant_id: TenantId) -> Result<RateCatalog, StoreError> {
        (**self).catalog(tenant_id)
    }
}

impl<T: SettlementStore + ?Sized> SettlementStore for Arc<T> {
    fn replace(&self, tenant_id: TenantId, order_id: OrderId, entries: &[SettlementEntry]) -> Result<(), StoreError> {
        (**self).replace(tenant_id, order_id, entries)
    }

    fn entries(&self, tenant_id: TenantId, order_id: OrderId) -> Result<Vec<SettlementEntry>, StoreError> {
        (**self).entries(tenant_id, order_id)
    }
}

fn poisoned() -> StoreError {
    StoreError::Backend("settlement lock poisoned".to_string())
}

#[derive(Debug, Default)]
pub struct InMemoryOrderSource {
    arenas: RwLock<HashMap<TenantId, OrderArena>>,
}

impl InMemoryOrderSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite an order under its own tenant.
    pub fn upsert(&self, order: Order) -> Result<(), StoreError> {
        let mut arenas = self.arenas.write().map_err(|_| poisoned())?;
        arenas.entry(order.tenant_id).or_default().insert(order);
        Ok(())
    }

    /// Attempts of the order, oldest first.
    pub fn attempt_chain(&self, tenant_id: TenantId, order_id: OrderId) -> Result<Vec<Order>, InventoryError> {
        let arenas = self.arenas.read().map_err(|_| poisoned())?;
        let arena = arenas.get(&tenant_id).ok_or(InventoryError::NotFound)?;
        let chain = arena.attempt_chain(order_id)?;
        Ok(chain.into_iter().cloned().collect())
    }
}

impl OrderSource for InMemoryOrderSource {
    fn order(&self, tenant_id: TenantId, order_id: OrderId) -> Result<Option<Order>, StoreError> {
        let arenas = self.arenas.read().map_err(|_| poisoned())?;
        Ok(arenas
            .get(&tenant_id)
            .and_then(|arena| arena.get(order_id).ok())
            .cloned())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryRateSource {
    catalogs: RwLock<HashMap<TenantId, RateCatalog>>,
}

impl InMemoryRateSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_catalog(&self, tenant_id: TenantId, catalog: RateCatalog) -> Result<(), StoreError> {
        self.catalogs.write().map_err(|_| poisoned())?.insert(tenant_id, catalog);
        Ok(())
    }
}

impl RateSource for InMemoryRateSource {
    fn catalog(&self, tenant_id: TenantId) -> Result<RateCatalog, StoreError> {
        let catalogs = self.catalogs.read().map_err(|_| poisoned())?;
        Ok(catalogs.get(&tenant_id).cloned().unwrap_or_default())
    }
}

#[derive(Debug, Default)]
pub struct InMemorySettlementStore {
    entries: RwLock<HashMap<(TenantId, OrderId), Vec<SettlementEntry>>>,
}

impl InMemorySettlementStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettlementStore for InMemorySettlementStore {
    fn replace(&self, tenant_id: TenantId, order_id: OrderId, entries: &[SettlementEntry]) -> Result<(), StoreError> {
        let mut stored = self.entries.write().map_err(|_| poisoned())?;
        if entries.is_empty() {
            stored.remove(&(tenant_id, order_id));
        } else {
            stored.insert((tenant_id, order_id), entries.to_vec());
        }
        Ok(())
    }

    fn entries(&self, tenant_id: TenantId, order_id: OrderId) -> Result<Vec<SettlementEntry>, StoreError> {
        let stored = self.entries.read().map_err(|_| poisoned())?;
        Ok(stored.get(&(tenant_id, order_id)).cloned().unwrap_or_default())
    }
}

/// Settlement Computer entry point.
#[derive(Debug)]
pub struct SettlementService<O, R, S> {
    orders: O,
    rates: R,
    store: S,
    table: CodePatternTable,
}

impl<O, R, S> SettlementService<O, R, S>
where
    O: OrderSource,
    R: RateSource,
    S: SettlementStore,
{
    pub fn new(orders: O, rates: R, store: S) -> Self {
        Self::with_table(orders, rates, store, CodePatternTable::v1())
    }

    pub fn with_table(orders: O, rates: R, store: S, table: CodePatternTable) -> Self {
        Self {
            orders,
            rates,
            store,
            table,
        }
    }

    /// Recompute and store the settlement of a completed order.
    #[instrument(skip(self), fields(tenant_id = %tenant_id.as_uuid(), order_id = %order_id), err)]
    pub fn compute_settlement(
        &self,
        tenant_id: TenantId,
        order_id: OrderId,
    ) -> Result<Vec<SettlementEntry>, InventoryError> {
        let order = self
            .orders
            .order(tenant_id, order_id)?
            .ok_or(InventoryError::NotFound)?;

        if order.tenant_id != tenant_id {
            return Err(InventoryError::TenantIsolation(format!(
                "order {order_id} belongs to another tenant"
            )));
        }
        if !order.status.is_completed() {
            warn!(status = ?order.status, "settlement requested for an order that is not completed");
            return Err(InventoryError::InvalidStateTransition(format!(
                "order {order_id} is not completed"
            )));
        }

        let catalog = self.rates.catalog(tenant_id)?;
        let entries = compute_settlement_with(&order, &catalog, &self.table);
        self.store.replace(tenant_id, order_id, &entries)?;

        info!(
            lines = entries.len(),
            table_version = self.table.version(),
            "settlement stored"
        );
        Ok(entries)
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id.as_uuid(), order_id = %order_id), err)]
    pub fn stored_settlement(
        &self,
        tenant_id: TenantId,
        order_id: OrderId,
    ) -> Result<Vec<SettlementEntry>, InventoryError> {
        let entries = self.store.entries(tenant_id, order_id)?;
        debug!(lines = entries.len(), "loaded stored settlement");
        Ok(entries)
    }
}
