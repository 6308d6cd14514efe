//! Entity trait: identity + continuity across state changes.

/// Entity marker + minimal interface.
///
/// Job records are entities: a record keeps its id while its status moves
/// through the lifecycle.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;
}
