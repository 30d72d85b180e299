//! Order placement (application-level orchestration).
//!
//! `OrderWorkflow` turns a list of requested product numbers into a persisted
//! order. Stock deduction and the order insert share one store transaction, so
//! an order either exists together with its stock deduction or not at all.
//!
//! ## Workflow
//!
//! ```text
//! product numbers (duplicates = quantity)
//!   ↓
//! RESOLVING       catalog lookup, re-expanded in request order; unknown numbers dropped;
//!                 order priced (a total above MAX_PRICE is rejected here)
//!   ↓
//! STOCK_CHECKING  tally stock-tracked products, lock + check + deduct in the transaction
//!   ↓
//! PERSISTING      insert the order, commit
//!   ↓
//! COMMITTED       OrderResponse
//!
//! any failure → ABORTED (transaction dropped, nothing applied)
//! ```
//!
//! Requests are not deduplicated: retrying a failed request is a new attempt
//! against whatever stock is available at that point.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{Span, debug, info, instrument, warn};

use kiosk_core::{DomainError, OrderId};
use kiosk_inventory::{InsufficientStock, StockRequirements};
use kiosk_products::{Product, ProductNumber};
use kiosk_sales::Order;

use crate::catalog::ProductResponse;
use crate::store::{Catalog, OrderStore, StoreError};

/// Stage of one order placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowStage {
    Resolving,
    StockChecking,
    Persisting,
    Committed,
    Aborted,
}

impl fmt::Display for WorkflowStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Resolving => "RESOLVING",
            Self::StockChecking => "STOCK_CHECKING",
            Self::Persisting => "PERSISTING",
            Self::Committed => "COMMITTED",
            Self::Aborted => "ABORTED",
        })
    }
}

#[derive(Debug, Error)]
pub enum WorkflowError {
    /// A stock-tracked product is short; no stock was changed.
    #[error(transparent)]
    InsufficientStock(InsufficientStock),

    /// The resolved products do not form a valid order (total overflow).
    /// Nothing was locked or written.
    #[error(transparent)]
    InvalidOrder(DomainError),

    /// The store failed; the transaction was rolled back.
    #[error("order placement failed during {stage}: {source}")]
    Persistence {
        stage: WorkflowStage,
        #[source]
        source: StoreError,
    },
}

impl WorkflowError {
    fn at(stage: WorkflowStage) -> impl FnOnce(StoreError) -> Self {
        move |source| match source {
            StoreError::InsufficientStock(short) => Self::InsufficientStock(short),
            source => Self::Persistence { stage, source },
        }
    }

    pub fn stage(&self) -> WorkflowStage {
        match self {
            Self::InvalidOrder(_) => WorkflowStage::Resolving,
            Self::InsufficientStock(_) => WorkflowStage::StockChecking,
            Self::Persistence { stage, .. } => *stage,
        }
    }
}

/// Placed order as returned to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub id: OrderId,
    pub total_price: u64,
    pub registered_date_time: DateTime<Utc>,
    pub products: Vec<ProductResponse>,
}

impl From<&Order> for OrderResponse {
    fn from(order: &Order) -> Self {
        Self {
            id: order.id_typed(),
            total_price: order.total_price(),
            registered_date_time: order.registered_at(),
            products: order.products().map(ProductResponse::from).collect(),
        }
    }
}

/// Places orders against a catalog and an order store.
///
/// Both handles are injected by the process bootstrap; the workflow keeps no
/// state of its own, so one instance serves any number of concurrent requests.
pub struct OrderWorkflow<C, S> {
    catalog: C,
    orders: S,
}

impl<C, S> OrderWorkflow<C, S>
where
    C: Catalog,
    S: OrderStore,
{
    pub fn new(catalog: C, orders: S) -> Self {
        Self { catalog, orders }
    }

    /// Places one order.
    ///
    /// `registered_at` is the caller's notion of "now". Fails with
    /// [`WorkflowError::InsufficientStock`] when any stock-tracked product is
    /// short, in which case no stock is touched and no order is written.
    #[instrument(
        skip(self, product_numbers),
        fields(requested = product_numbers.len(), order_id = tracing::field::Empty)
    )]
    pub async fn create_order(
        &self,
        product_numbers: &[ProductNumber],
        registered_at: DateTime<Utc>,
    ) -> Result<OrderResponse, WorkflowError> {
        let result = self.place(product_numbers, registered_at).await;
        if let Err(err) = &result {
            warn!(stage = %WorkflowStage::Aborted, failed_at = %err.stage(), error = %err, "order aborted");
        }
        result
    }

    async fn place(
        &self,
        product_numbers: &[ProductNumber],
        registered_at: DateTime<Utc>,
    ) -> Result<OrderResponse, WorkflowError> {
        debug!(stage = %WorkflowStage::Resolving);
        let products = self.resolve(product_numbers).await?;
        let required = StockRequirements::from_products(&products);
        let order = Order::create(OrderId::new(), products, registered_at)
            .map_err(WorkflowError::InvalidOrder)?;
        Span::current().record("order_id", tracing::field::display(order.id_typed()));

        debug!(stage = %WorkflowStage::StockChecking, resolved = order.line_items().len());
        let mut tx = self
            .orders
            .begin()
            .await
            .map_err(WorkflowError::at(WorkflowStage::StockChecking))?;
        if !required.is_empty() {
            tx.deduct_if_sufficient(&required)
                .await
                .map_err(WorkflowError::at(WorkflowStage::StockChecking))?;
        }

        debug!(stage = %WorkflowStage::Persisting);
        tx.insert_order(&order)
            .await
            .map_err(WorkflowError::at(WorkflowStage::Persisting))?;
        tx.commit()
            .await
            .map_err(WorkflowError::at(WorkflowStage::Persisting))?;

        info!(
            stage = %WorkflowStage::Committed,
            status = order.status().label(),
            total_price = order.total_price(),
            lines = order.line_items().len(),
            "order placed"
        );
        Ok(OrderResponse::from(&order))
    }

    /// Looks every distinct number up once, then re-expands in request order.
    async fn resolve(&self, product_numbers: &[ProductNumber]) -> Result<Vec<Product>, WorkflowError> {
        let mut distinct = product_numbers.to_vec();
        distinct.sort();
        distinct.dedup();

        let found = self
            .catalog
            .find_by_product_numbers(&distinct)
            .await
            .map_err(WorkflowError::at(WorkflowStage::Resolving))?;

        let mut products = Vec::with_capacity(product_numbers.len());
        for number in product_numbers {
            match found.get(number) {
                Some(product) => products.push(product.clone()),
                None => debug!(product_number = %number, "unknown product number dropped"),
            }
        }
        Ok(products)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::TimeZone;
    use kiosk_core::DateRange;
    use kiosk_inventory::StockRecord;
    use kiosk_products::{ProductSellingStatus, ProductType};
    use kiosk_sales::OrderStatus;

    use crate::store::{InMemoryStore, OrderTransaction, StockLedger};

    fn test_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 3, 20, 10, 0, 0).unwrap()
    }

    fn numbers(values: &[&str]) -> Vec<ProductNumber> {
        values.iter().map(|v| ProductNumber::from(*v)).collect()
    }

    fn test_product(number: &str, product_type: ProductType, price: u64) -> Product {
        Product::new(
            ProductNumber::from(number),
            product_type,
            ProductSellingStatus::Selling,
            "menu item",
            price,
        )
        .unwrap()
    }

    async fn seeded_store(products: &[(&str, ProductType, u64)], stock: &[(&str, u64)]) -> Arc<InMemoryStore> {
        let store = Arc::new(InMemoryStore::new());
        for (number, product_type, price) in products {
            store
                .insert_product(test_product(number, *product_type, *price))
                .await
                .unwrap();
        }
        for (number, quantity) in stock {
            store
                .save_stock(StockRecord::new(ProductNumber::from(*number), *quantity))
                .await
                .unwrap();
        }
        store
    }

    fn workflow(store: &Arc<InMemoryStore>) -> OrderWorkflow<Arc<InMemoryStore>, Arc<InMemoryStore>> {
        OrderWorkflow::new(store.clone(), store.clone())
    }

    async fn quantity(store: &InMemoryStore, number: &str) -> Option<u64> {
        store.stock_quantity(&ProductNumber::from(number)).await.unwrap()
    }

    #[tokio::test]
    async fn handmade_order_totals_product_prices() {
        let store = seeded_store(
            &[
                ("001", ProductType::Handmade, 1000),
                ("002", ProductType::Handmade, 3000),
                ("003", ProductType::Handmade, 5000),
            ],
            &[],
        )
        .await;

        let response = workflow(&store)
            .create_order(&numbers(&["003", "002"]), test_time())
            .await
            .unwrap();

        assert_eq!(response.total_price, 8000);
        assert_eq!(response.registered_date_time, test_time());
        let ordered: Vec<&str> = response.products.iter().map(|p| p.product_number.as_str()).collect();
        assert_eq!(ordered, vec!["003", "002"]);
    }

    #[tokio::test]
    async fn duplicate_numbers_become_separate_lines() {
        let store = seeded_store(&[("001", ProductType::Handmade, 1000)], &[]).await;

        let response = workflow(&store)
            .create_order(&numbers(&["001", "001"]), test_time())
            .await
            .unwrap();

        assert_eq!(response.total_price, 2000);
        assert_eq!(response.products.len(), 2);
    }

    #[tokio::test]
    async fn stock_tracked_products_deduct_stock() {
        let store = seeded_store(
            &[
                ("001", ProductType::Bottle, 1000),
                ("002", ProductType::Bakery, 3000),
                ("003", ProductType::Handmade, 5000),
            ],
            &[("001", 2), ("002", 2)],
        )
        .await;

        let response = workflow(&store)
            .create_order(&numbers(&["001", "001", "002", "003"]), test_time())
            .await
            .unwrap();

        assert_eq!(response.total_price, 10000);
        assert_eq!(response.products.len(), 4);
        assert_eq!(quantity(&store, "001").await, Some(0));
        assert_eq!(quantity(&store, "002").await, Some(1));

        let stored = store.find_order(response.id).await.unwrap().unwrap();
        assert_eq!(stored.status(), OrderStatus::Init);
        assert_eq!(stored.total_price(), 10000);
    }

    #[tokio::test]
    async fn insufficient_stock_fails_without_side_effects() {
        let store = seeded_store(
            &[
                ("001", ProductType::Bottle, 1000),
                ("002", ProductType::Bakery, 3000),
                ("003", ProductType::Handmade, 5000),
            ],
            &[("001", 1), ("002", 2)],
        )
        .await;

        let err = workflow(&store)
            .create_order(&numbers(&["001", "001", "002", "003"]), test_time())
            .await
            .unwrap_err();

        match err {
            WorkflowError::InsufficientStock(short) => {
                assert_eq!(short.product_number.as_str(), "001");
                assert_eq!(short.required, 2);
                assert_eq!(short.available, 1);
            }
            other => panic!("expected InsufficientStock, got {other:?}"),
        }
        assert_eq!(quantity(&store, "001").await, Some(1));
        assert_eq!(quantity(&store, "002").await, Some(2));
        assert_eq!(store.order_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn stock_tracked_product_without_stock_record_is_short() {
        let store = seeded_store(&[("001", ProductType::Bottle, 1000)], &[]).await;

        let err = workflow(&store)
            .create_order(&numbers(&["001"]), test_time())
            .await
            .unwrap_err();

        assert!(matches!(err, WorkflowError::InsufficientStock(ref s) if s.available == 0));
    }

    #[tokio::test]
    async fn unknown_numbers_are_dropped() {
        let store = seeded_store(&[("001", ProductType::Handmade, 1000)], &[]).await;

        let response = workflow(&store)
            .create_order(&numbers(&["404", "001", "999"]), test_time())
            .await
            .unwrap();

        assert_eq!(response.products.len(), 1);
        assert_eq!(response.total_price, 1000);
    }

    #[tokio::test]
    async fn overflowing_total_is_rejected_before_touching_stock() {
        let store = seeded_store(
            &[
                ("001", ProductType::Handmade, kiosk_products::MAX_PRICE),
                ("002", ProductType::Bottle, 1000),
            ],
            &[("002", 5)],
        )
        .await;

        let err = workflow(&store)
            .create_order(&numbers(&["001", "001", "001", "002"]), test_time())
            .await
            .unwrap_err();

        assert!(matches!(err, WorkflowError::InvalidOrder(DomainError::InvariantViolation(_))));
        assert_eq!(err.stage(), WorkflowStage::Resolving);
        assert_eq!(quantity(&store, "002").await, Some(5));
        assert_eq!(store.order_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn total_may_reach_but_not_pass_the_price_ceiling() {
        let half = kiosk_products::MAX_PRICE / 2;
        let store = seeded_store(&[("001", ProductType::Handmade, half)], &[]).await;

        let response = workflow(&store)
            .create_order(&numbers(&["001", "001"]), test_time())
            .await
            .unwrap();
        assert_eq!(response.total_price, 2 * half);

        let err = workflow(&store)
            .create_order(&numbers(&["001", "001", "001"]), test_time())
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidOrder(_)));
    }

    /// In-memory sink for formatted log lines.
    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn aborted_order_is_logged_once() {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_max_level(tracing::Level::WARN)
            .with_writer(move || writer.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let store = seeded_store(&[("001", ProductType::Bottle, 1000)], &[("001", 0)]).await;
        workflow(&store)
            .create_order(&numbers(&["001"]), test_time())
            .await
            .unwrap_err();

        let text = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        let reported: Vec<&str> = text
            .lines()
            .filter(|line| line.contains("WARN") || line.contains("ERROR"))
            .collect();
        assert_eq!(reported.len(), 1, "{text}");
        assert!(reported[0].contains("order aborted"));
    }

    #[tokio::test]
    async fn orders_are_queryable_by_registration_day() {
        let store = seeded_store(&[("001", ProductType::Handmade, 1000)], &[]).await;
        workflow(&store)
            .create_order(&numbers(&["001"]), test_time())
            .await
            .unwrap();

        let range = DateRange::day(test_time().date_naive());
        let found = store.find_orders_by(range, OrderStatus::Init).await.unwrap();

        assert_eq!(found.len(), 1);
    }

    /// Store whose transactions deduct normally but fail to insert the order.
    struct FailingInsertStore(Arc<InMemoryStore>);

    struct FailingInsertTransaction<'a>(Box<dyn OrderTransaction + 'a>);

    #[async_trait::async_trait]
    impl OrderTransaction for FailingInsertTransaction<'_> {
        async fn deduct_if_sufficient(&mut self, required: &StockRequirements) -> Result<(), StoreError> {
            self.0.deduct_if_sufficient(required).await
        }

        async fn insert_order(&mut self, _order: &Order) -> Result<(), StoreError> {
            Err(StoreError::Backend("disk full".to_string()))
        }

        async fn commit(self: Box<Self>) -> Result<(), StoreError> {
            let FailingInsertTransaction(inner) = *self;
            inner.commit().await
        }
    }

    #[async_trait::async_trait]
    impl OrderStore for FailingInsertStore {
        async fn begin<'a>(&'a self) -> Result<Box<dyn OrderTransaction + 'a>, StoreError> {
            Ok(Box::new(FailingInsertTransaction(self.0.begin().await?)))
        }

        async fn find_orders_by(
            &self,
            range: DateRange,
            status: OrderStatus,
        ) -> Result<Vec<Order>, StoreError> {
            self.0.find_orders_by(range, status).await
        }

        async fn find_order(&self, id: OrderId) -> Result<Option<Order>, StoreError> {
            self.0.find_order(id).await
        }
    }

    #[tokio::test]
    async fn persistence_failure_rolls_back_stock_deduction() {
        let store = seeded_store(&[("001", ProductType::Bottle, 1000)], &[("001", 3)]).await;
        let workflow = OrderWorkflow::new(store.clone(), FailingInsertStore(store.clone()));

        let err = workflow
            .create_order(&numbers(&["001", "001"]), test_time())
            .await
            .unwrap_err();

        match err {
            WorkflowError::Persistence { stage, source: StoreError::Backend(msg) } => {
                assert_eq!(stage, WorkflowStage::Persisting);
                assert_eq!(msg, "disk full");
            }
            other => panic!("expected Persistence error, got {other:?}"),
        }
        assert_eq!(quantity(&store, "001").await, Some(3));
        assert_eq!(store.order_count().unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_orders_never_oversell() {
        let store = seeded_store(&[("001", ProductType::Bottle, 1000)], &[("001", 5)]).await;
        let workflow = Arc::new(workflow(&store));

        let attempts: Vec<_> = (0..20)
            .map(|_| {
                let workflow = workflow.clone();
                tokio::spawn(async move {
                    workflow.create_order(&numbers(&["001"]), test_time()).await
                })
            })
            .collect();

        let mut placed = 0;
        let mut short = 0;
        for attempt in attempts {
            match attempt.await.unwrap() {
                Ok(_) => placed += 1,
                Err(WorkflowError::InsufficientStock(_)) => short += 1,
                Err(other) => panic!("unexpected error: {other:?}"),
            }
        }

        assert_eq!(placed, 5);
        assert_eq!(short, 15);
        assert_eq!(quantity(&store, "001").await, Some(0));
        assert_eq!(store.order_count().unwrap(), 5);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn overlapping_multi_product_orders_do_not_deadlock() {
        let store = seeded_store(
            &[("001", ProductType::Bottle, 1000), ("002", ProductType::Bakery, 2000)],
            &[("001", 50), ("002", 50)],
        )
        .await;
        let workflow = Arc::new(workflow(&store));

        let attempts: Vec<_> = (0..40)
            .map(|i| {
                let workflow = workflow.clone();
                let request = if i % 2 == 0 { numbers(&["001", "002"]) } else { numbers(&["002", "001"]) };
                tokio::spawn(async move { workflow.create_order(&request, test_time()).await })
            })
            .collect();

        let finished = tokio::time::timeout(std::time::Duration::from_secs(10), async {
            for attempt in attempts {
                attempt.await.unwrap().unwrap();
            }
        })
        .await;

        assert!(finished.is_ok(), "orders deadlocked");
        assert_eq!(quantity(&store, "001").await, Some(10));
        assert_eq!(quantity(&store, "002").await, Some(10));
    }
}
