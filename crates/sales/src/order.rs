use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use kiosk_core::{AggregateRoot, DomainError, DomainResult, Entity, OrderId};
use kiosk_products::{MAX_PRICE, Product};

/// Order status lifecycle. Placing an order only ever produces `Init`; later
/// transitions happen in payment and fulfilment processes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Init,
    Canceled,
    PaymentCompleted,
    PaymentFailed,
    Received,
    Completed,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 6] = [
        Self::Init,
        Self::Canceled,
        Self::PaymentCompleted,
        Self::PaymentFailed,
        Self::Received,
        Self::Completed,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::Init => "Order created",
            Self::Canceled => "Order canceled",
            Self::PaymentCompleted => "Payment completed",
            Self::PaymentFailed => "Payment failed",
            Self::Received => "Order received",
            Self::Completed => "Order completed",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Init => "INIT",
            Self::Canceled => "CANCELED",
            Self::PaymentCompleted => "PAYMENT_COMPLETED",
            Self::PaymentFailed => "PAYMENT_FAILED",
            Self::Received => "RECEIVED",
            Self::Completed => "COMPLETED",
        }
    }
}

impl FromStr for OrderStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| DomainError::validation(format!("unknown order status {s:?}")))
    }
}

/// One resolved product occurrence within an order.
///
/// Quantity is expressed by repetition: ordering the same product twice gives
/// two line items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderLineItem {
    line_no: u32,
    product: Product,
}

impl OrderLineItem {
    /// 1-based position within the order.
    pub fn line_no(&self) -> u32 {
        self.line_no
    }

    pub fn product(&self) -> &Product {
        &self.product
    }
}

/// Aggregate root: Order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    id: OrderId,
    status: OrderStatus,
    total_price: u64,
    registered_at: DateTime<Utc>,
    line_items: Vec<OrderLineItem>,
}

impl Order {
    /// Builds a freshly placed order (status `Init`).
    ///
    /// One line item per product, in input order; the total counts every
    /// occurrence. An empty product list yields an empty order with a zero
    /// total. Rejecting empty requests is up to the caller.
    pub fn create(
        id: OrderId,
        products: Vec<Product>,
        registered_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        Self::new(id, OrderStatus::Init, products, registered_at)
    }

    /// Builds an order in an arbitrary status.
    ///
    /// Fails with `InvariantViolation` when the total exceeds [`MAX_PRICE`],
    /// the largest amount a stored order can carry.
    pub fn new(
        id: OrderId,
        status: OrderStatus,
        products: Vec<Product>,
        registered_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let total_price = products
            .iter()
            .try_fold(0u64, |total, product| total.checked_add(product.price()))
            .filter(|total| *total <= MAX_PRICE)
            .ok_or_else(|| DomainError::invariant("order total overflows"))?;
        let line_items = products
            .into_iter()
            .zip(1u32..)
            .map(|(product, line_no)| OrderLineItem { line_no, product })
            .collect();

        Ok(Self {
            id,
            status,
            total_price,
            registered_at,
            line_items,
        })
    }

    /// Rebuilds a persisted order. The stored total is kept as is and line
    /// items are ordered by their line number.
    pub fn restore(
        id: OrderId,
        status: OrderStatus,
        total_price: u64,
        registered_at: DateTime<Utc>,
        lines: Vec<(u32, Product)>,
    ) -> Self {
        let mut line_items: Vec<OrderLineItem> = lines
            .into_iter()
            .map(|(line_no, product)| OrderLineItem { line_no, product })
            .collect();
        line_items.sort_by_key(OrderLineItem::line_no);

        Self {
            id,
            status,
            total_price,
            registered_at,
            line_items,
        }
    }

    pub fn id_typed(&self) -> OrderId {
        self.id
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn total_price(&self) -> u64 {
        self.total_price
    }

    pub fn registered_at(&self) -> DateTime<Utc> {
        self.registered_at
    }

    pub fn line_items(&self) -> &[OrderLineItem] {
        &self.line_items
    }

    pub fn products(&self) -> impl Iterator<Item = &Product> {
        self.line_items.iter().map(OrderLineItem::product)
    }
}

impl Entity for Order {
    type Id = OrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl AggregateRoot for Order {
    type Child = OrderLineItem;

    fn children(&self) -> &[Self::Child] {
        &self.line_items
    }
}
