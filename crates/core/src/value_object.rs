//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects carry no identity of their own: two instances with the same
/// attributes are interchangeable. A product number or a date range is a value
/// object; a product or an order is an entity.
///
/// Implementors are immutable. "Changing" one means building a new value, as
/// `ProductNumber::next_after` does.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
