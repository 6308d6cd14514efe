//! Infrastructure layer: event store, dispatch, the serialized ledger facade,
//! payouts and settings.

pub mod command_dispatcher;
pub mod event_store;
pub mod payout;
pub mod portal;
pub mod settings;


pub use command_dispatcher::{CommandDispatcher, DispatchError};
pub use event_store::{EventStore, EventStoreError, InMemoryEventStore, StoredEvent};
pub use payout::{InMemoryTreasury, Payout, PayoutError, PayoutSink};
pub use portal::{Deployment, InMemoryBus, InMemoryPortal, JobPortal, PortalError};
pub use settings::{Settings, SettingsError};
