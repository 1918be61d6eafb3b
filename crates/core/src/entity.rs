//! Entity trait: identity + continuity across state changes.

/// Entity marker + minimal interface.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;

    /// Identity that owns the entity; every store query is scoped to it.
    fn owner_id(&self) -> crate::OwnerId;

    fn is_owned_by(&self, owner_id: crate::OwnerId) -> bool {
        self.owner_id() == owner_id
    }
}
