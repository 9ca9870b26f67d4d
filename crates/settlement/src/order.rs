use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use fieldcrm_core::{DomainError, DomainResult, OrderId, TenantId};
use fieldcrm_inventory::{DeviceCategory, ItemId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    Installation,
    Service,
    Outage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    Assigned,
    InProgress,
    Completed,
    /// The attempt failed; a follow-up order may retry it.
    NotCompleted,
    Cancelled,
}

impl OrderStatus {
    pub fn is_completed(&self) -> bool {
        matches!(self, OrderStatus::Completed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ServiceType {
    Net,
    Tel,
    Dtv,
    Atv,
}

/// A service switched on at the client during the order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivatedService {
    pub service_type: ServiceType,
    pub device_id: Option<ItemId>,
    pub device_category: Option<DeviceCategory>,
}

impl ActivatedService {
    pub fn new(service_type: ServiceType) -> Self {
        Self {
            service_type,
            device_id: None,
            device_category: None,
        }
    }

    pub fn with_device(mut self, device_id: ItemId, category: DeviceCategory) -> Self {
        self.device_id = Some(device_id);
        self.device_category = Some(category);
        self
    }
}

/// Read-only view of a field order as supplied by the order module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub tenant_id: TenantId,
    pub order_type: OrderType,
    pub status: OrderStatus,
    pub activated_services: Vec<ActivatedService>,
    /// Manually entered riser ("pion") count.
    pub riser_count: u32,
    /// Manually entered trunk ("listwa") count.
    pub trunk_count: u32,
    pub previous_order_id: Option<OrderId>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Order {
    pub fn new(id: OrderId, tenant_id: TenantId, order_type: OrderType) -> Self {
        Self {
            id,
            tenant_id,
            order_type,
            status: OrderStatus::Pending,
            activated_services: Vec::new(),
            riser_count: 0,
            trunk_count: 0,
            previous_order_id: None,
            completed_at: None,
        }
    }

    pub fn with_service(mut self, service: ActivatedService) -> Self {
        self.activated_services.push(service);
        self
    }

    pub fn completed(mut self, at: DateTime<Utc>) -> Self {
        self.status = OrderStatus::Completed;
        self.completed_at = Some(at);
        self
    }

    pub fn retry_of(mut self, previous: OrderId) -> Self {
        self.previous_order_id = Some(previous);
        self
    }
}

/// Orders keyed by id. Attempts reference their predecessor by id only.
#[derive(Debug, Clone, Default)]
pub struct OrderArena {
    orders: HashMap<OrderId, Order>,
}

impl OrderArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, order: Order) -> Option<Order> {
        self.orders.insert(order.id, order)
    }

    pub fn get(&self, id: OrderId) -> DomainResult<&Order> {
        self.orders.get(&id).ok_or(DomainError::NotFound)
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    /// All attempts leading up to `id`, oldest first, ending with `id` itself.
    ///
    /// Stops at a missing predecessor or at the first repeated id.
    pub fn attempt_chain(&self, id: OrderId) -> DomainResult<Vec<&Order>> {
        let mut chain = vec![self.get(id)?];
        let mut seen = HashSet::from([id]);
        let mut cursor = chain[0].previous_order_id;

        while let Some(prev_id) = cursor {
            if !seen.insert(prev_id) {
                break;
            }
            let Some(prev) = self.orders.get(&prev_id) else {
                break;
            };
            chain.push(prev);
            cursor = prev.previous_order_id;
        }

        chain.reverse();
        Ok(chain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(tenant_id: TenantId) -> Order {
        Order::new(OrderId::new(), tenant_id, OrderType::Installation)
    }

    #[test]
    fn attempt_chain_is_oldest_first() {
        let tenant = TenantId::new();
        let first = order(tenant);
        let second = order(tenant).retry_of(first.id);
        let third = order(tenant).retry_of(second.id);
        let ids = [first.id, second.id, third.id];

        let mut arena = OrderArena::new();
        arena.insert(third);
        arena.insert(first);
        arena.insert(second);

        let chain: Vec<OrderId> = arena.attempt_chain(ids[2]).unwrap().iter().map(|o| o.id).collect();
        assert_eq!(chain, ids);
    }

    #[test]
    fn attempt_chain_stops_on_cycles_and_gaps() {
        let tenant = TenantId::new();
        let mut a = order(tenant);
        let b = order(tenant).retry_of(a.id);
        a.previous_order_id = Some(b.id);
        let b_id = b.id;

        let mut arena = OrderArena::new();
        arena.insert(a);
        arena.insert(b);
        assert_eq!(arena.attempt_chain(b_id).unwrap().len(), 2);

        let orphan = order(tenant).retry_of(OrderId::new());
        let orphan_id = orphan.id;
        arena.insert(orphan);
        assert_eq!(arena.attempt_chain(orphan_id).unwrap().len(), 1);
        assert_eq!(arena.attempt_chain(OrderId::new()).unwrap_err(), DomainError::NotFound);
    }
}
