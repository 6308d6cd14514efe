/// Execute an aggregate command in place (no IO, no persistence).
///
/// 1. **Decide**: `aggregate.handle(command)` produces events without mutating
/// 2. **Evolve**: each event is applied in order
///
/// Used by domain tests and benches. Persisted execution goes through the
/// infrastructure dispatcher, which adds optimistic concurrency and publication.
pub fn execute<A>(aggregate: &mut A, command: &A::Command) -> Result<Vec<A::Event>, A::Error>
where
    A: jobportal_core::Aggregate,
{
    let events = A::handle(aggregate, command)?;
    for ev in &events {
        A::apply(aggregate, ev);
    }
    Ok(events)
}
