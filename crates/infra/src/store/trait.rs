use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use kiosk_core::{DateRange, OrderId};
use kiosk_inventory::{InsufficientStock, StockRecord, StockRequirements};
use kiosk_products::{Product, ProductNumber, ProductSellingStatus};
use kiosk_sales::{Order, OrderStatus};

use crate::external::mail::MailSendHistory;

/// Store operation error.
///
/// Infrastructure failures (locking, constraints, connectivity) plus the one
/// business outcome a store decides on its own: a stock deduction that cannot
/// be covered.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A stock deduction was rejected; nothing was changed.
    #[error(transparent)]
    InsufficientStock(#[from] InsufficientStock),

    /// A uniqueness rule was violated (duplicate product number, order id).
    #[error("conflict: {0}")]
    Conflict(String),

    /// The transaction could not proceed (serialization failure, deadlock,
    /// misuse of a transaction handle).
    #[error("transaction failed: {0}")]
    Transaction(String),

    /// The backend failed (connectivity, poisoned locks, unexpected SQL errors).
    #[error("storage backend error: {0}")]
    Backend(String),

    /// Stored data could not be mapped back into the domain model.
    #[error("corrupt stored data: {0}")]
    Corrupt(String),
}

/// Read access to the product catalog, plus registration.
#[async_trait::async_trait]
pub trait Catalog: Send + Sync {
    /// Products for every distinct number that exists. Unknown numbers are
    /// simply absent; the map carries no ordering.
    async fn find_by_product_numbers(
        &self,
        numbers: &[ProductNumber],
    ) -> Result<HashMap<ProductNumber, Product>, StoreError>;

    /// Products in any of `statuses`, ordered by product number.
    async fn find_by_selling_statuses(
        &self,
        statuses: &[ProductSellingStatus],
    ) -> Result<Vec<Product>, StoreError>;

    /// Number of the most recently registered product.
    async fn latest_product_number(&self) -> Result<Option<ProductNumber>, StoreError>;

    /// Registers a product. A taken product number is a `Conflict`.
    async fn insert_product(&self, product: Product) -> Result<(), StoreError>;
}

/// Stock counters keyed by product number.
#[async_trait::async_trait]
pub trait StockLedger: Send + Sync {
    /// Creates or overwrites a stock record (administrative).
    async fn save_stock(&self, record: StockRecord) -> Result<(), StoreError>;

    /// Records for the given numbers that exist, ordered by product number.
    async fn find_stocks(&self, numbers: &[ProductNumber]) -> Result<Vec<StockRecord>, StoreError>;

    /// Checks and deducts every requirement in one transaction of its own.
    ///
    /// All-or-nothing: fails with [`StoreError::InsufficientStock`] and leaves
    /// every record untouched if any requirement cannot be covered.
    async fn deduct_if_sufficient(&self, required: &StockRequirements) -> Result<(), StoreError>;
}

/// One unit of work spanning the stock deduction and the order insert.
///
/// Dropping a transaction without calling [`OrderTransaction::commit`] rolls
/// everything back and releases the stock rows it locked.
#[async_trait::async_trait]
pub trait OrderTransaction: Send {
    /// Locks the required stock rows in ascending product-number order,
    /// checks them and stages the deduction.
    ///
    /// Rows stay locked until commit or drop, so concurrent transactions over
    /// overlapping products serialize here while disjoint ones do not touch
    /// each other. May be called at most once per transaction.
    async fn deduct_if_sufficient(&mut self, required: &StockRequirements) -> Result<(), StoreError>;

    /// Stages an order together with its line items.
    async fn insert_order(&mut self, order: &Order) -> Result<(), StoreError>;

    /// Makes every staged change visible at once.
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

/// Order persistence.
#[async_trait::async_trait]
pub trait OrderStore: Send + Sync {
    async fn begin<'a>(&'a self) -> Result<Box<dyn OrderTransaction + 'a>, StoreError>;

    /// Orders registered within `range` (half-open) with the given status,
    /// oldest first.
    async fn find_orders_by(
        &self,
        range: DateRange,
        status: OrderStatus,
    ) -> Result<Vec<Order>, StoreError>;

    async fn find_order(&self, id: OrderId) -> Result<Option<Order>, StoreError>;
}

/// Record of delivered mails.
#[async_trait::async_trait]
pub trait MailHistoryStore: Send + Sync {
    async fn save_history(&self, history: MailSendHistory) -> Result<(), StoreError>;

    /// Every recorded delivery, oldest first.
    async fn find_all_history(&self) -> Result<Vec<MailSendHistory>, StoreError>;
}

#[async_trait::async_trait]
impl<S> Catalog for Arc<S>
where
    S: Catalog + ?Sized,
{
    async fn find_by_product_numbers(
        &self,
        numbers: &[ProductNumber],
    ) -> Result<HashMap<ProductNumber, Product>, StoreError> {
        (**self).find_by_product_numbers(numbers).await
    }

    async fn find_by_selling_statuses(
        &self,
        statuses: &[ProductSellingStatus],
    ) -> Result<Vec<Product>, StoreError> {
        (**self).find_by_selling_statuses(statuses).await
    }

    async fn latest_product_number(&self) -> Result<Option<ProductNumber>, StoreError> {
        (**self).latest_product_number().await
    }

    async fn insert_product(&self, product: Product) -> Result<(), StoreError> {
        (**self).insert_product(product).await
    }
}

#[async_trait::async_trait]
impl<S> StockLedger for Arc<S>
where
    S: StockLedger + ?Sized,
{
    async fn save_stock(&self, record: StockRecord) -> Result<(), StoreError> {
        (**self).save_stock(record).await
    }

    async fn find_stocks(&self, numbers: &[ProductNumber]) -> Result<Vec<StockRecord>, StoreError> {
        (**self).find_stocks(numbers).await
    }

    async fn deduct_if_sufficient(&self, required: &StockRequirements) -> Result<(), StoreError> {
        (**self).deduct_if_sufficient(required).await
    }
}

#[async_trait::async_trait]
impl<S> OrderStore for Arc<S>
where
    S: OrderStore + ?Sized,
{
    async fn begin<'a>(&'a self) -> Result<Box<dyn OrderTransaction + 'a>, StoreError> {
        (**self).begin().await
    }

    async fn find_orders_by(
        &self,
        range: DateRange,
        status: OrderStatus,
    ) -> Result<Vec<Order>, StoreError> {
        (**self).find_orders_by(range, status).await
    }

    async fn find_order(&self, id: OrderId) -> Result<Option<Order>, StoreError> {
        (**self).find_order(id).await
    }
}

#[async_trait::async_trait]
impl<S> MailHistoryStore for Arc<S>
where
    S: MailHistoryStore + ?Sized,
{
    async fn save_history(&self, history: MailSendHistory) -> Result<(), StoreError> {
        (**self).save_history(history).await
    }

    async fn find_all_history(&self) -> Result<Vec<MailSendHistory>, StoreError> {
        (**self).find_all_history().await
    }
}
