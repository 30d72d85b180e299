//! Product catalog domain.
//!
//! Catalog entries as the kiosk sells them: a product number, a type that
//! decides whether stock is counted, a selling status, a name and a price.
//! Deterministic logic only (no IO, no HTTP, no storage).

pub mod number;
pub mod product;

pub use number::ProductNumber;
pub use product::{MAX_PRICE, Product, ProductSellingStatus, ProductType};
