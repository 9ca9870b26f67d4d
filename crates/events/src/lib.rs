//! Event primitives: the `Event` contract, tenant-scoped envelopes and the
//! pub/sub bus used to notify consumers about committed custody changes.

pub mod bus;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
