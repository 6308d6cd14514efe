use jobportal_core::AggregateId;

/// A command targets a specific aggregate.
///
/// Commands represent **intent** ("post a job paying 10"). They are transient;
/// the events they produce are what gets persisted. A rejected command leaves
/// no trace in the stream.
///
/// Each command operates on exactly one aggregate, which is the transaction
/// boundary: everything a command decides is appended in a single batch or
/// not at all.
pub trait Command: Clone + core::fmt::Debug + Send + Sync + 'static {
    fn target_aggregate_id(&self) -> AggregateId;
}
