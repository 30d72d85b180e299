//! Inventory domain module.
//!
//! Stock counters for stock-tracked products and the all-or-nothing deduction
//! rule applied when an order is placed. Pure logic; locking and persistence
//! are the store's concern (`kiosk-infra`).

pub mod stock;

pub use stock::{InsufficientStock, StockRecord, StockRequirements, plan_deduction};
