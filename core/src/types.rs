//! Shared primitive types used across the entire engine.

/// A customer identifier as issued by the shop platform.
pub type CustomerId = i64;

/// A store (tenant) identifier. Every aggregate query is scoped to one store.
pub type StoreId = i64;

/// An order identifier.
pub type OrderId = i64;
