use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use fieldcrm_core::{AggregateId, TenantId};

use crate::Event;

/// A committed event as it travels over the bus.
///
/// `sequence_number` is the aggregate version produced by the commit, so
/// consumers can discard duplicates and detect gaps per aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope<E> {
    event_id: Uuid,
    tenant_id: TenantId,
    aggregate_id: AggregateId,
    aggregate_type: String,
    event_type: String,
    schema_version: u32,
    sequence_number: u64,
    occurred_at: DateTime<Utc>,
    payload: E,
}

impl<E: Event> EventEnvelope<E> {
    /// Stamp a decided event with its stream coordinates. Type name, schema
    /// version and business time come from the event itself.
    pub fn wrap(
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        sequence_number: u64,
        payload: E,
    ) -> Self {
        Self {
            event_id: Uuid::now_v7(),
            tenant_id,
            aggregate_id,
            aggregate_type: aggregate_type.into(),
            event_type: payload.event_type().to_string(),
            schema_version: payload.version(),
            sequence_number,
            occurred_at: payload.occurred_at(),
            payload,
        }
    }
}

impl<E> EventEnvelope<E> {
    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub fn aggregate_id(&self) -> AggregateId {
        self.aggregate_id
    }

    pub fn aggregate_type(&self) -> &str {
        &self.aggregate_type
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn schema_version(&self) -> u32 {
        self.schema_version
    }

    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }

    pub fn into_payload(self) -> E {
        self.payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    struct Stocked {
        at: DateTime<Utc>,
    }

    impl Event for Stocked {
        fn event_type(&self) -> &'static str {
            "inventory.item.received"
        }

        fn version(&self) -> u32 {
            2
        }

        fn occurred_at(&self) -> DateTime<Utc> {
            self.at
        }
    }

    #[test]
    fn wrap_copies_event_metadata() {
        let at = Utc::now();
        let tenant = TenantId::new();
        let aggregate = AggregateId::new();
        let envelope = EventEnvelope::wrap(tenant, aggregate, "inventory.item", 4, Stocked { at });

        assert_eq!(envelope.tenant_id(), tenant);
        assert_eq!(envelope.aggregate_id(), aggregate);
        assert_eq!(envelope.event_type(), "inventory.item.received");
        assert_eq!(envelope.schema_version(), 2);
        assert_eq!(envelope.sequence_number(), 4);
        assert_eq!(envelope.occurred_at(), at);
        assert_eq!(envelope.into_payload(), Stocked { at });
    }

    #[test]
    fn each_wrap_gets_a_fresh_event_id() {
        let at = Utc::now();
        let tenant = TenantId::new();
        let aggregate = AggregateId::new();
        let a = EventEnvelope::wrap(tenant, aggregate, "inventory.item", 1, Stocked { at });
        let b = EventEnvelope::wrap(tenant, aggregate, "inventory.item", 1, Stocked { at });
        assert_ne!(a.event_id(), b.event_id());
    }
}
