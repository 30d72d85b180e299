//! Service wiring for the HTTP layer.
//!
//! Every service is built over trait objects so the same router runs on the
//! in-memory store and on Postgres.

use std::sync::Arc;

use tracing::info;

use kiosk_infra::external::mail::{LoggingMailSendClient, MailSendClient, MailService};
use kiosk_infra::store::{Catalog, InMemoryStore, MailHistoryStore, OrderStore, PostgresStore, StoreError};
use kiosk_infra::{CatalogService, KioskConfig, OrderStatisticsService, OrderWorkflow, StoreBackend};

pub type SharedCatalog = Arc<dyn Catalog>;
pub type SharedOrders = Arc<dyn OrderStore>;
pub type SharedMailClient = Arc<dyn MailSendClient>;
pub type SharedMailHistory = Arc<dyn MailHistoryStore>;

pub struct AppServices {
    pub orders: OrderWorkflow<SharedCatalog, SharedOrders>,
    pub catalog: CatalogService<SharedCatalog>,
    pub statistics: OrderStatisticsService<SharedOrders, SharedMailClient, SharedMailHistory>,
}

impl AppServices {
    /// Wires every service to one store handle and the given mail client.
    pub fn new<S>(store: Arc<S>, mail_client: SharedMailClient, statistics_sender: &str) -> Self
    where
        S: Catalog + OrderStore + MailHistoryStore + 'static,
    {
        let catalog: SharedCatalog = store.clone();
        let orders: SharedOrders = store.clone();
        let history: SharedMailHistory = store;

        Self {
            orders: OrderWorkflow::new(catalog.clone(), orders.clone()),
            catalog: CatalogService::new(catalog),
            statistics: OrderStatisticsService::new(
                orders,
                MailService::new(mail_client, history),
                statistics_sender,
            ),
        }
    }

    /// Wires every service to `store`, delivering mail to the log.
    pub fn with_store<S>(store: Arc<S>, statistics_sender: &str) -> Self
    where
        S: Catalog + OrderStore + MailHistoryStore + 'static,
    {
        Self::new(store, Arc::new(LoggingMailSendClient), statistics_sender)
    }
}

/// Builds the services selected by `config`.
///
/// For Postgres this connects the pool and creates missing tables.
pub async fn build_services(config: &KioskConfig) -> Result<AppServices, StoreError> {
    match &config.store {
        StoreBackend::InMemory => {
            info!("using in-memory store");
            Ok(AppServices::with_store(
                Arc::new(InMemoryStore::new()),
                &config.statistics_sender,
            ))
        }
        StoreBackend::Postgres {
            database_url,
            max_connections,
        } => {
            info!(max_connections, "using postgres store");
            let store = PostgresStore::connect(database_url, *max_connections).await?;
            store.ensure_schema().await?;
            Ok(AppServices::with_store(Arc::new(store), &config.statistics_sender))
        }
    }
}
