//! Command execution pipeline (application-level orchestration).
//!
//! ```text
//! Command
//!   ↓
//! 1. Load events from store
//!   ↓
//! 2. Rehydrate aggregate (apply historical events to rebuild state)
//!   ↓
//! 3. Handle command (pure decision logic, produces events)
//!   ↓
//! 4. Persist events to store (append-only, optimistic concurrency check)
//!   ↓
//! 5. Publish events to bus
//! ```
//!
//! This module contains no IO itself; it composes the `EventStore` and
//! `EventBus` traits.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use thiserror::Error;
use uuid::Uuid;

use jobportal_core::{Aggregate, AggregateId, ExpectedVersion};
use jobportal_events::{EventBus, EventEnvelope};

use crate::event_store::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

/// Dispatch failure, parameterized by the aggregate's own rejection type.
#[derive(Debug, Error)]
pub enum DispatchError<E> {
    /// The aggregate refused the command. Nothing was appended.
    #[error("command rejected: {0}")]
    Rejected(E),
    /// Optimistic concurrency failure (the stream moved since it was loaded).
    #[error("concurrency conflict: {0}")]
    Concurrency(String),
    /// Historical payloads could not be turned back into aggregate events.
    #[error("failed to deserialize stored event: {0}")]
    Deserialize(String),
    /// Persisting to the event store failed.
    #[error("event store failure: {0}")]
    Store(EventStoreError),
    /// Publication failed after a successful append. `committed` holds the
    /// durable events so callers can still report the outcome.
    #[error("event publication failed: {reason}")]
    Publish {
        reason: String,
        committed: Vec<StoredEvent>,
    },
}

impl<E> DispatchError<E> {
    pub fn is_conflict(&self) -> bool {
        matches!(self, DispatchError::Concurrency(_))
    }
}

impl<E> From<EventStoreError> for DispatchError<E> {
    fn from(value: EventStoreError) -> Self {
        match value {
            EventStoreError::Concurrency(msg) => DispatchError::Concurrency(msg),
            other => DispatchError::Store(other),
        }
    }
}

/// Reusable command execution engine for event-sourced aggregates.
///
/// ## Execution Guarantees
///
/// - **Atomicity**: the decided batch is appended whole or not at all, and
///   nothing is published unless the append succeeded
/// - **Isolation**: each command operates on a single aggregate stream
/// - **Concurrency**: the append expects the exact version that was loaded;
///   a concurrent writer turns into `DispatchError::Concurrency`
///
/// If publication fails after a successful append the error is returned
/// together with the persisted events: callers must not re-run the command.
///
/// Aggregates used here must be deterministic and side-effect free, and must
/// bump their version by one per applied event.
#[derive(Debug)]
pub struct CommandDispatcher<S, B> {
    store: S,
    bus: B,
}

impl<S, B> CommandDispatcher<S, B> {
    pub fn new(store: S, bus: B) -> Self {
        Self { store, bus }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn into_parts(self) -> (S, B) {
        (self.store, self.bus)
    }
}

impl<S, B> CommandDispatcher<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Dispatch a command through the full event-sourcing pipeline.
    ///
    /// `make_aggregate` builds the empty aggregate that history is replayed
    /// into. Returns the committed events with their assigned sequence
    /// numbers. An aggregate that decides no events commits nothing.
    pub fn dispatch<A>(
        &self,
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        command: &A::Command,
        make_aggregate: impl FnOnce(AggregateId) -> A,
    ) -> Result<Vec<StoredEvent>, DispatchError<A::Error>>
    where
        A: Aggregate,
        A::Event: jobportal_events::Event + Serialize + DeserializeOwned,
    {
        // 1) + 2) Load history and rehydrate
        let (aggregate, expected) = self.rehydrate(aggregate_id, make_aggregate)?;

        // 3) Decide events (no mutation)
        let decided = aggregate.handle(command).map_err(DispatchError::Rejected)?;
        if decided.is_empty() {
            return Ok(vec![]);
        }

        // 4) Persist (append-only, optimistic)
        let aggregate_type = aggregate_type.into();
        let uncommitted = decided
            .iter()
            .map(|ev| {
                UncommittedEvent::from_typed(
                    aggregate_id,
                    aggregate_type.clone(),
                    Uuid::now_v7(),
                    ev,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        let committed = self.store.append(uncommitted, expected)?;

        // 5) Publish committed events (after append)
        let failed = committed
            .iter()
            .find_map(|stored| self.bus.publish(stored.to_envelope()).err());
        if let Some(e) = failed {
            return Err(DispatchError::Publish {
                reason: format!("{e:?}"),
                committed,
            });
        }

        Ok(committed)
    }

    /// Rebuild the current state of an aggregate without handling anything.
    pub fn load<A>(
        &self,
        aggregate_id: AggregateId,
        make_aggregate: impl FnOnce(AggregateId) -> A,
    ) -> Result<A, DispatchError<A::Error>>
    where
        A: Aggregate,
        A::Event: DeserializeOwned,
    {
        self.rehydrate(aggregate_id, make_aggregate)
            .map(|(aggregate, _)| aggregate)
    }

    /// The committed stream of one aggregate, in sequence order.
    pub fn history(&self, aggregate_id: AggregateId) -> Result<Vec<StoredEvent>, EventStoreError> {
        self.store.load_stream(aggregate_id)
    }

    fn rehydrate<A>(
        &self,
        aggregate_id: AggregateId,
        make_aggregate: impl FnOnce(AggregateId) -> A,
    ) -> Result<(A, ExpectedVersion), DispatchError<A::Error>>
    where
        A: Aggregate,
        A::Event: DeserializeOwned,
    {
        let history = self.store.load_stream(aggregate_id)?;
        validate_loaded_stream(aggregate_id, &history)?;
        let expected = ExpectedVersion::Exact(stream_version(&history));

        let mut aggregate = make_aggregate(aggregate_id);
        apply_history(&mut aggregate, history)?;

        Ok((aggregate, expected))
    }
}

fn stream_version(stream: &[StoredEvent]) -> u64 {
    stream.last().map(|e| e.sequence_number).unwrap_or(0)
}

fn validate_loaded_stream<E>(
    aggregate_id: AggregateId,
    stream: &[StoredEvent],
) -> Result<(), DispatchError<E>> {
    // Sequence numbers must start at 1 and have no gaps: the ledger reads
    // them as its logical clock.
    for (idx, e) in stream.iter().enumerate() {
        if e.aggregate_id != aggregate_id {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(format!(
                "loaded stream contains wrong aggregate_id at index {idx}"
            ))));
        }
        let expected = idx as u64 + 1;
        if e.sequence_number != expected {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(format!(
                "unexpected sequence_number in loaded stream (expected={expected}, found={})",
                e.sequence_number
            ))));
        }
    }
    Ok(())
}

fn apply_history<A>(aggregate: &mut A, history: Vec<StoredEvent>) -> Result<(), DispatchError<A::Error>>
where
    A: Aggregate,
    A::Event: DeserializeOwned,
{
    for stored in history {
        let ev: A::Event = serde_json::from_value(stored.payload)
            .map_err(|e| DispatchError::Deserialize(e.to_string()))?;
        aggregate.apply(&ev);
    }

    Ok(())
}
