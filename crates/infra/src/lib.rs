//! Infrastructure layer: stores, order placement, statistics, config, external
//! services.

pub mod catalog;
pub mod config;
pub mod external;
pub mod order_workflow;
pub mod statistics;
pub mod store;

pub use catalog::{CatalogError, CatalogService, ProductRegistration, ProductResponse};
pub use config::{ConfigError, KioskConfig, StoreBackend};
pub use order_workflow::{OrderResponse, OrderWorkflow, WorkflowError, WorkflowStage};
pub use statistics::{OrderStatisticsService, StatisticsError};
