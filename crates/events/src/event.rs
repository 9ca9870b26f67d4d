use chrono::{DateTime, Utc};

/// A domain-agnostic event.
///
/// Events are immutable facts with a stable type name and a schema version.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable event name (e.g. "inventory.item.issued").
    fn event_type(&self) -> &'static str;

    /// Schema version for this event type.
    fn version(&self) -> u32;

    /// When the event occurred (business time).
    fn occurred_at(&self) -> DateTime<Utc>;
}
