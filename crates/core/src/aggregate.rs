//! Aggregate root trait.

use crate::entity::Entity;

/// An entity that owns a consistency boundary.
///
/// Children of an aggregate (for example an order's line items) are created,
/// persisted and removed together with their root and are never addressed on
/// their own.
pub trait AggregateRoot: Entity {
    /// Child entities or values owned by this root.
    type Child;

    /// Owned children, in their natural order.
    fn children(&self) -> &[Self::Child];
}
