//! Kiosk orders domain module.
//!
//! Builds the order aggregate from resolved catalog products. Pure,
//! deterministic logic (no IO, no HTTP, no storage); the workflow that checks
//! stock and persists orders lives in `kiosk-infra`.

pub mod order;

pub use order::{Order, OrderLineItem, OrderStatus};
