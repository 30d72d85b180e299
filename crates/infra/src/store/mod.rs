//! Storage boundary for the kiosk: catalog, stock ledger, orders and mail
//! history.
//!
//! Both implementations provide every trait from one handle so that the stock
//! deduction and the order insert can share a transaction.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use r#trait::{Catalog, MailHistoryStore, OrderStore, OrderTransaction, StockLedger, StoreError};
