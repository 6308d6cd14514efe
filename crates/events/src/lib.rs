//! Event plumbing shared by the ledger domain and its infrastructure.
//!
//! - [`Event`]: facts emitted by aggregates
//! - [`Command`]: intent routed to one aggregate
//! - [`EventEnvelope`]: stream metadata wrapped around a committed event
//! - [`EventBus`]: fan-out of committed events to subscribers

pub mod bus;
pub mod command;
pub mod envelope;
pub mod event;
pub mod handler;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use command::Command;
pub use envelope::EventEnvelope;
pub use event::Event;
pub use handler::execute;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
