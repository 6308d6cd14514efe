//! Append-only event store boundary.
//!
//! Stores and loads per-aggregate event streams without making any storage
//! assumptions beyond ordering and optimistic concurrency.

pub mod in_memory;
pub mod r#trait;

pub use in_memory::InMemoryEventStore;
pub use r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};
