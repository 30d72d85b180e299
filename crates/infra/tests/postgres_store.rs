//! Postgres store tests.
//!
//! Run against a scratch database by setting `DATABASE_URL`; without it every
//! test returns early. Each test uses its own product-number prefix so tests
//! can share one schema.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use kiosk_core::DateRange;
use kiosk_infra::store::{Catalog, OrderStore, PostgresStore, StockLedger, StoreError};
use kiosk_infra::{OrderWorkflow, WorkflowError};
use kiosk_inventory::StockRecord;
use kiosk_products::{Product, ProductNumber, ProductSellingStatus, ProductType};
use kiosk_sales::OrderStatus;

async fn test_store() -> Option<Arc<PostgresStore>> {
    let url = std::env::var("DATABASE_URL").ok()?;
    let store = PostgresStore::connect(&url, 8).await.unwrap();
    store.ensure_schema().await.unwrap();
    Some(Arc::new(store))
}

fn prefixed(prefix: &str, n: &str) -> ProductNumber {
    ProductNumber::new(format!("{prefix}-{n}"))
}

fn unique_prefix() -> String {
    uuid::Uuid::now_v7().simple().to_string()
}

async fn seed(
    store: &PostgresStore,
    prefix: &str,
    products: &[(&str, ProductType, u64)],
    stock: &[(&str, u64)],
) {
    for (n, product_type, price) in products {
        let product = Product::new(
            prefixed(prefix, n),
            *product_type,
            ProductSellingStatus::Selling,
            "menu item",
            *price,
        )
        .unwrap();
        store.insert_product(product).await.unwrap();
    }
    for (n, quantity) in stock {
        store
            .save_stock(StockRecord::new(prefixed(prefix, n), *quantity))
            .await
            .unwrap();
    }
}

async fn quantity(store: &PostgresStore, number: &ProductNumber) -> u64 {
    store.find_stocks(std::slice::from_ref(number)).await.unwrap()[0].quantity()
}

#[tokio::test]
async fn order_with_stock_tracked_products_deducts_and_persists() {
    let Some(store) = test_store().await else { return };
    let p = unique_prefix();
    seed(
        &store,
        &p,
        &[
            ("001", ProductType::Bottle, 1000),
            ("002", ProductType::Bakery, 3000),
            ("003", ProductType::Handmade, 5000),
        ],
        &[("001", 2), ("002", 2)],
    )
    .await;
    let workflow = OrderWorkflow::new(store.clone(), store.clone());
    let at = Utc.with_ymd_and_hms(2023, 3, 20, 10, 0, 0).unwrap();

    let request = vec![
        prefixed(&p, "001"),
        prefixed(&p, "001"),
        prefixed(&p, "002"),
        prefixed(&p, "003"),
    ];
    let response = workflow.create_order(&request, at).await.unwrap();

    assert_eq!(response.total_price, 10000);
    assert_eq!(quantity(&store, &prefixed(&p, "001")).await, 0);
    assert_eq!(quantity(&store, &prefixed(&p, "002")).await, 1);

    let stored = store.find_order(response.id).await.unwrap().unwrap();
    assert_eq!(stored.status(), OrderStatus::Init);
    assert_eq!(stored.line_items().len(), 4);
    assert_eq!(stored.line_items()[2].product().product_number(), &prefixed(&p, "002"));

    let day = store
        .find_orders_by(DateRange::day(at.date_naive()), OrderStatus::Init)
        .await
        .unwrap();
    assert!(day.iter().any(|o| o.id_typed() == response.id));
}

#[tokio::test]
async fn insufficient_stock_rolls_back_every_product() {
    let Some(store) = test_store().await else { return };
    let p = unique_prefix();
    seed(
        &store,
        &p,
        &[("001", ProductType::Bottle, 1000), ("002", ProductType::Bakery, 3000)],
        &[("001", 5), ("002", 1)],
    )
    .await;
    let workflow = OrderWorkflow::new(store.clone(), store.clone());

    let request = vec![prefixed(&p, "001"), prefixed(&p, "002"), prefixed(&p, "002")];
    let err = workflow.create_order(&request, Utc::now()).await.unwrap_err();

    assert!(matches!(err, WorkflowError::InsufficientStock(_)));
    assert_eq!(quantity(&store, &prefixed(&p, "001")).await, 5);
    assert_eq!(quantity(&store, &prefixed(&p, "002")).await, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_orders_never_oversell() {
    let Some(store) = test_store().await else { return };
    let p = unique_prefix();
    seed(&store, &p, &[("001", ProductType::Bottle, 1000)], &[("001", 3)]).await;
    let workflow = Arc::new(OrderWorkflow::new(store.clone(), store.clone()));

    let tasks: Vec<_> = (0..10)
        .map(|_| {
            let workflow = workflow.clone();
            let request = vec![prefixed(&p, "001")];
            tokio::spawn(async move { workflow.create_order(&request, Utc::now()).await })
        })
        .collect();

    let mut placed = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => placed += 1,
            Err(WorkflowError::InsufficientStock(_)) => {}
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }

    assert_eq!(placed, 3);
    assert_eq!(quantity(&store, &prefixed(&p, "001")).await, 0);
}

#[tokio::test]
async fn duplicate_product_number_is_a_conflict() {
    let Some(store) = test_store().await else { return };
    let p = unique_prefix();
    seed(&store, &p, &[("001", ProductType::Handmade, 1000)], &[]).await;

    let duplicate = Product::new(
        prefixed(&p, "001"),
        ProductType::Handmade,
        ProductSellingStatus::Hold,
        "again",
        1000,
    )
    .unwrap();
    let err = store.insert_product(duplicate).await.unwrap_err();

    assert!(matches!(err, StoreError::Conflict(_)));
}
