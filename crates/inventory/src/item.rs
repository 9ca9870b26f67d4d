use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use fieldcrm_core::{AggregateId, AggregateRoot, DomainError, DomainResult, LocationId, OrderId, TenantId, UserId};

use crate::actor::Actor;
use crate::transfer::PendingTransfer;

/// Inventory item identifier (tenant-scoped via `tenant_id` on commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub AggregateId);

impl ItemId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }

    pub fn generate() -> Self {
        Self(AggregateId::new())
    }
}

impl core::fmt::Display for ItemId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Serialized device or fungible material lot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemType {
    Device,
    Material,
}

/// Custody status as exposed to callers and persisted in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemStatus {
    Available,
    Assigned,
    AssignedToOrder,
    Returned,
    ReturnedToOperator,
}

/// Device classification. Drives the decoder code in settlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeviceCategory {
    Modem,
    Decoder1Way,
    Decoder2Way,
    Ont,
    Router,
    Amplifier,
    Other,
}

/// How the item entered the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemOrigin {
    /// Delivered by the operator into a warehouse.
    Received,
    /// Picked up from a client's premises by a technician.
    CollectedFromClient,
}

macro_rules! impl_wire_enum {
    ($t:ty, $label:literal, { $($variant:path => $s:literal),+ $(,)? }) => {
        impl $t {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($variant => $s,)+
                }
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $t {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok($variant),)+
                    other => Err(DomainError::validation(format!("unknown {}: '{other}'", $label))),
                }
            }
        }
    };
}

impl_wire_enum!(ItemType, "item type", {
    ItemType::Device => "DEVICE",
    ItemType::Material => "MATERIAL",
});

impl_wire_enum!(ItemStatus, "item status", {
    ItemStatus::Available => "AVAILABLE",
    ItemStatus::Assigned => "ASSIGNED",
    ItemStatus::AssignedToOrder => "ASSIGNED_TO_ORDER",
    ItemStatus::Returned => "RETURNED",
    ItemStatus::ReturnedToOperator => "RETURNED_TO_OPERATOR",
});

impl_wire_enum!(DeviceCategory, "device category", {
    DeviceCategory::Modem => "MODEM",
    DeviceCategory::Decoder1Way => "DECODER_1_WAY",
    DeviceCategory::Decoder2Way => "DECODER_2_WAY",
    DeviceCategory::Ont => "ONT",
    DeviceCategory::Router => "ROUTER",
    DeviceCategory::Amplifier => "AMPLIFIER",
    DeviceCategory::Other => "OTHER",
});

/// A party that can hold an item: a technician or a warehouse location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Custodian {
    Technician(UserId),
    Location(LocationId),
}

impl Custodian {
    pub(crate) fn same_kind(&self, other: &Custodian) -> bool {
        matches!(
            (self, other),
            (Custodian::Technician(_), Custodian::Technician(_))
                | (Custodian::Location(_), Custodian::Location(_))
        )
    }

    /// Whether `actor` may act on behalf of this custodian.
    ///
    /// A technician is only ever represented by themselves; locations are
    /// represented by warehouse staff and admins.
    pub fn is_represented_by(&self, actor: &Actor) -> bool {
        match self {
            Custodian::Technician(t) => *t == actor.user_id,
            Custodian::Location(_) => actor.is_privileged(),
        }
    }

    /// The state an item lands in when this custodian takes it.
    pub(crate) fn into_state(self) -> ItemState {
        match self {
            Custodian::Technician(technician_id) => ItemState::Assigned { technician_id },
            Custodian::Location(location_id) => ItemState::Available { location_id },
        }
    }
}

/// Current custody of an item. Exactly one holder at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemState {
    Available {
        location_id: LocationId,
    },
    Assigned {
        technician_id: UserId,
    },
    /// Installed on (or reserved for) an order. `owner` gets it back when it
    /// is removed from the order.
    AssignedToOrder {
        order_id: OrderId,
        owner: Custodian,
    },
    /// Back in a warehouse but not reusable (collected client hardware).
    Returned {
        location_id: LocationId,
    },
    ReturnedToOperator,
}

impl ItemState {
    pub fn status(&self) -> ItemStatus {
        match self {
            ItemState::Available { .. } => ItemStatus::Available,
            ItemState::Assigned { .. } => ItemStatus::Assigned,
            ItemState::AssignedToOrder { .. } => ItemStatus::AssignedToOrder,
            ItemState::Returned { .. } => ItemStatus::Returned,
            ItemState::ReturnedToOperator => ItemStatus::ReturnedToOperator,
        }
    }

    pub fn location_id(&self) -> Option<LocationId> {
        match self {
            ItemState::Available { location_id } | ItemState::Returned { location_id } => {
                Some(*location_id)
            }
            _ => None,
        }
    }

    pub fn assigned_to_id(&self) -> Option<UserId> {
        match self {
            ItemState::Assigned { technician_id } => Some(*technician_id),
            _ => None,
        }
    }

    /// The holder as a custodian, for the two states a handoff can start from.
    pub fn custodian(&self) -> Option<Custodian> {
        match self {
            ItemState::Assigned { technician_id } => Some(Custodian::Technician(*technician_id)),
            ItemState::Available { location_id } => Some(Custodian::Location(*location_id)),
            _ => None,
        }
    }

    pub fn order_id(&self) -> Option<OrderId> {
        match self {
            ItemState::AssignedToOrder { order_id, .. } => Some(*order_id),
            _ => None,
        }
    }
}

/// Descriptive attributes supplied when an item enters the system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemDetails {
    pub item_type: ItemType,
    pub name: String,
    pub category: Option<DeviceCategory>,
    pub serial_number: Option<String>,
    /// Catalog code of a material.
    pub index: Option<String>,
    pub quantity: i64,
    /// Unit price in the smallest currency unit.
    pub price: u64,
}

impl ItemDetails {
    pub fn device(name: impl Into<String>, serial_number: impl Into<String>, category: DeviceCategory, price: u64) -> Self {
        Self {
            item_type: ItemType::Device,
            name: name.into(),
            category: Some(category),
            serial_number: Some(serial_number.into()),
            index: None,
            quantity: 1,
            price,
        }
    }

    pub fn material(name: impl Into<String>, index: impl Into<String>, quantity: i64, price: u64) -> Self {
        Self {
            item_type: ItemType::Material,
            name: name.into(),
            category: None,
            serial_number: None,
            index: Some(index.into()),
            quantity,
            price,
        }
    }

    pub fn validate(&self) -> DomainResult<()> {
        if self.name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        match self.item_type {
            ItemType::Device => {
                let serial = self.serial_number.as_deref().map(str::trim).unwrap_or_default();
                if serial.is_empty() {
                    return Err(DomainError::validation("device requires a serial number"));
                }
                if self.quantity != 1 {
                    return Err(DomainError::validation("device quantity must be 1"));
                }
            }
            ItemType::Material => {
                if self.serial_number.is_some() {
                    return Err(DomainError::validation("material cannot carry a serial number"));
                }
                if self.category.is_some() {
                    return Err(DomainError::validation("material cannot carry a device category"));
                }
                if self.quantity < 0 {
                    return Err(DomainError::validation("material quantity cannot be negative"));
                }
            }
        }
        Ok(())
    }
}

/// One stint of the item on an order. Never removed, only closed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderAssignment {
    pub order_id: OrderId,
    pub assigned_at: DateTime<Utc>,
    pub removed_at: Option<DateTime<Utc>>,
}

impl OrderAssignment {
    pub fn is_active(&self) -> bool {
        self.removed_at.is_none()
    }
}

/// Aggregate root: InventoryItem.
///
/// Fields are private; state only moves through [`fieldcrm_core::Aggregate::apply`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryItem {
    pub(crate) id: ItemId,
    pub(crate) tenant_id: Option<TenantId>,
    pub(crate) details: ItemDetails,
    pub(crate) state: ItemState,
    pub(crate) origin: ItemOrigin,
    pub(crate) home_location_id: Option<LocationId>,
    pub(crate) transfer: Option<PendingTransfer>,
    pub(crate) order_assignments: Vec<OrderAssignment>,
    pub(crate) created_at: Option<DateTime<Utc>>,
    pub(crate) updated_at: Option<DateTime<Utc>>,
    pub(crate) version: u64,
    pub(crate) created: bool,
}

impl InventoryItem {
    /// Not-yet-received instance used to decide `Receive`/`CollectFromClient`.
    ///
    /// Until `created` is set the state has no custody meaning.
    pub fn empty(id: ItemId) -> Self {
        Self {
            id,
            tenant_id: None,
            details: ItemDetails {
                item_type: ItemType::Material,
                name: String::new(),
                category: None,
                serial_number: None,
                index: None,
                quantity: 0,
                price: 0,
            },
            state: ItemState::ReturnedToOperator,
            origin: ItemOrigin::Received,
            home_location_id: None,
            transfer: None,
            order_assignments: Vec::new(),
            created_at: None,
            updated_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> ItemId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn details(&self) -> &ItemDetails {
        &self.details
    }

    pub fn item_type(&self) -> ItemType {
        self.details.item_type
    }

    pub fn name(&self) -> &str {
        &self.details.name
    }

    pub fn serial_number(&self) -> Option<&str> {
        self.details.serial_number.as_deref()
    }

    pub fn quantity(&self) -> i64 {
        self.details.quantity
    }

    pub fn state(&self) -> &ItemState {
        &self.state
    }

    pub fn status(&self) -> ItemStatus {
        self.state.status()
    }

    pub fn location_id(&self) -> Option<LocationId> {
        self.state.location_id()
    }

    pub fn assigned_to_id(&self) -> Option<UserId> {
        self.state.assigned_to_id()
    }

    pub fn origin(&self) -> ItemOrigin {
        self.origin
    }

    pub fn home_location_id(&self) -> Option<LocationId> {
        self.home_location_id
    }

    pub fn transfer_pending(&self) -> bool {
        self.transfer.is_some()
    }

    pub fn pending_transfer(&self) -> Option<&PendingTransfer> {
        self.transfer.as_ref()
    }

    pub fn order_assignments(&self) -> &[OrderAssignment] {
        &self.order_assignments
    }

    pub fn active_assignment(&self) -> Option<&OrderAssignment> {
        self.order_assignments.iter().find(|a| a.is_active())
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    /// Check the custody invariants that must hold after every transition.
    pub fn check_invariants(&self) -> DomainResult<()> {
        let active = self.order_assignments.iter().filter(|a| a.is_active()).count();
        if active > 1 {
            return Err(DomainError::invariant("more than one active order assignment"));
        }
        match (&self.state, self.active_assignment()) {
            (ItemState::AssignedToOrder { order_id, .. }, Some(a)) if a.order_id == *order_id => {}
            (ItemState::AssignedToOrder { .. }, _) => {
                return Err(DomainError::invariant("order custody without a matching active assignment"));
            }
            (_, Some(_)) => {
                return Err(DomainError::invariant("active assignment outside order custody"));
            }
            _ => {}
        }
        if self.details.item_type == ItemType::Device && self.details.quantity != 1 {
            return Err(DomainError::invariant("device quantity must be 1"));
        }
        Ok(())
    }
}

impl AggregateRoot for InventoryItem {
    type Id = ItemId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}
