//! Postgres-backed store implementation.
//!
//! One pool serves every store trait. Order placement runs in a single
//! transaction: stock rows are locked with `SELECT ... FOR UPDATE` in
//! ascending product-number order, checked, updated, and the order with its
//! line items is inserted before the commit.
//!
//! ## Error Mapping
//!
//! SQLx errors are mapped to `StoreError` as follows:
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError | Scenario |
//! |------------|----------------------|------------|----------|
//! | Database (unique violation) | `23505` | `Conflict` | Duplicate product number or order id |
//! | Database (serialization failure) | `40001` | `Transaction` | Concurrent transaction conflict |
//! | Database (deadlock detected) | `40P01` | `Transaction` | Lock cycle broken by Postgres |
//! | Database (foreign key / check) | `23503` / `23514` | `Backend` | Line item for unknown product, negative quantity |
//! | Database (other) | Any other | `Backend` | Other database errors |
//! | PoolClosed / RowNotFound / Other | N/A | `Backend` | Connectivity, unexpected results |

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{FromRow, PgPool, Postgres, Row, Transaction};
use tracing::instrument;

use kiosk_core::{DateRange, MailSendHistoryId, OrderId};
use kiosk_inventory::{StockRecord, StockRequirements, plan_deduction};
use kiosk_products::{Product, ProductNumber, ProductSellingStatus};
use kiosk_sales::{Order, OrderStatus};

use super::r#trait::{Catalog, MailHistoryStore, OrderStore, OrderTransaction, StockLedger, StoreError};
use crate::external::mail::MailSendHistory;

/// Statements creating the kiosk schema; each one is idempotent.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS products (
        id             BIGSERIAL PRIMARY KEY,
        product_number TEXT        NOT NULL UNIQUE,
        product_type   TEXT        NOT NULL,
        selling_status TEXT        NOT NULL,
        name           TEXT        NOT NULL,
        price          BIGINT      NOT NULL CHECK (price > 0),
        created_at     TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS stocks (
        product_number TEXT   PRIMARY KEY,
        quantity       BIGINT NOT NULL CHECK (quantity >= 0)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS orders (
        id            UUID        PRIMARY KEY,
        order_status  TEXT        NOT NULL,
        total_price   BIGINT      NOT NULL CHECK (total_price >= 0),
        registered_at TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS orders_registered_at_status_idx
        ON orders (registered_at, order_status)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS order_line_items (
        order_id       UUID    NOT NULL REFERENCES orders (id) ON DELETE CASCADE,
        line_no        INTEGER NOT NULL,
        product_number TEXT    NOT NULL REFERENCES products (product_number),
        PRIMARY KEY (order_id, line_no)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS mail_send_history (
        id         UUID        PRIMARY KEY,
        from_email TEXT        NOT NULL,
        to_email   TEXT        NOT NULL,
        subject    TEXT        NOT NULL,
        content    TEXT        NOT NULL,
        sent_at    TIMESTAMPTZ NOT NULL
    )
    "#,
];

/// Postgres-backed store.
///
/// `Send + Sync` and cheap to clone; all operations go through the SQLx pool.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: Arc<PgPool>,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Open a pool against `database_url`.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Create tables and indexes that do not exist yet.
    #[instrument(skip(self), err)]
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        for statement in SCHEMA_STATEMENTS {
            sqlx::query(*statement)
                .execute(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl Catalog for PostgresStore {
    #[instrument(skip(self, numbers), fields(requested = numbers.len()), err)]
    async fn find_by_product_numbers(
        &self,
        numbers: &[ProductNumber],
    ) -> Result<HashMap<ProductNumber, Product>, StoreError> {
        let numbers: Vec<&str> = numbers.iter().map(ProductNumber::as_str).collect();
        let rows = sqlx::query(
            r#"
            SELECT product_number, product_type, selling_status, name, price
            FROM products
            WHERE product_number = ANY($1)
            "#,
        )
        .bind(&numbers)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_by_product_numbers", e))?;

        rows.iter()
            .map(|row| {
                let product = product_from_row(row)?;
                Ok((product.product_number().clone(), product))
            })
            .collect()
    }

    #[instrument(skip(self), err)]
    async fn find_by_selling_statuses(
        &self,
        statuses: &[ProductSellingStatus],
    ) -> Result<Vec<Product>, StoreError> {
        let statuses: Vec<&str> = statuses.iter().map(|s| s.as_str()).collect();
        let rows = sqlx::query(
            r#"
            SELECT product_number, product_type, selling_status, name, price
            FROM products
            WHERE selling_status = ANY($1)
            ORDER BY product_number COLLATE "C"
            "#,
        )
        .bind(&statuses)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_by_selling_statuses", e))?;

        rows.iter().map(product_from_row).collect()
    }

    #[instrument(skip(self), err)]
    async fn latest_product_number(&self) -> Result<Option<ProductNumber>, StoreError> {
        let number: Option<String> =
            sqlx::query_scalar("SELECT product_number FROM products ORDER BY id DESC LIMIT 1")
                .fetch_optional(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("latest_product_number", e))?;
        Ok(number.map(ProductNumber::from))
    }

    #[instrument(skip(self, product), fields(product_number = %product.product_number()), err)]
    async fn insert_product(&self, product: Product) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO products (product_number, product_type, selling_status, name, price)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(product.product_number().as_str())
        .bind(product.product_type().as_str())
        .bind(product.selling_status().as_str())
        .bind(product.name())
        .bind(to_db_amount(product.price())?)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_product", e))?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl StockLedger for PostgresStore {
    #[instrument(skip(self, record), fields(product_number = %record.product_number()), err)]
    async fn save_stock(&self, record: StockRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO stocks (product_number, quantity)
            VALUES ($1, $2)
            ON CONFLICT (product_number) DO UPDATE SET quantity = EXCLUDED.quantity
            "#,
        )
        .bind(record.product_number().as_str())
        .bind(to_db_amount(record.quantity())?)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("save_stock", e))?;
        Ok(())
    }

    #[instrument(skip(self, numbers), fields(requested = numbers.len()), err)]
    async fn find_stocks(&self, numbers: &[ProductNumber]) -> Result<Vec<StockRecord>, StoreError> {
        let numbers: Vec<&str> = numbers.iter().map(ProductNumber::as_str).collect();
        let rows = sqlx::query(
            r#"
            SELECT product_number, quantity
            FROM stocks
            WHERE product_number = ANY($1)
            ORDER BY product_number COLLATE "C"
            "#,
        )
        .bind(&numbers)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_stocks", e))?;

        rows.iter().map(stock_from_row).collect()
    }

    async fn deduct_if_sufficient(&self, required: &StockRequirements) -> Result<(), StoreError> {
        let mut tx = self.begin().await?;
        tx.deduct_if_sufficient(required).await?;
        tx.commit().await
    }
}

#[async_trait::async_trait]
impl OrderStore for PostgresStore {
    async fn begin<'a>(&'a self) -> Result<Box<dyn OrderTransaction + 'a>, StoreError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;
        Ok(Box::new(PostgresOrderTransaction { tx, deducted: false }))
    }

    #[instrument(skip(self), fields(start = %range.start(), end = %range.end()), err)]
    async fn find_orders_by(
        &self,
        range: DateRange,
        status: OrderStatus,
    ) -> Result<Vec<Order>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT
                o.id, o.order_status, o.total_price, o.registered_at,
                li.line_no,
                p.product_number, p.product_type, p.selling_status, p.name, p.price
            FROM orders o
            LEFT JOIN order_line_items li ON li.order_id = o.id
            LEFT JOIN products p ON p.product_number = li.product_number
            WHERE o.registered_at >= $1 AND o.registered_at < $2 AND o.order_status = $3
            ORDER BY o.registered_at ASC, o.id ASC, li.line_no ASC
            "#,
        )
        .bind(range.start())
        .bind(range.end())
        .bind(status.as_str())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_orders_by", e))?;

        load_orders(rows)
    }

    #[instrument(skip(self), fields(order_id = %id), err)]
    async fn find_order(&self, id: OrderId) -> Result<Option<Order>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT
                o.id, o.order_status, o.total_price, o.registered_at,
                li.line_no,
                p.product_number, p.product_type, p.selling_status, p.name, p.price
            FROM orders o
            LEFT JOIN order_line_items li ON li.order_id = o.id
            LEFT JOIN products p ON p.product_number = li.product_number
            WHERE o.id = $1
            ORDER BY li.line_no ASC
            "#,
        )
        .bind(id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_order", e))?;

        Ok(load_orders(rows)?.into_iter().next())
    }
}

#[async_trait::async_trait]
impl MailHistoryStore for PostgresStore {
    #[instrument(skip(self, history), fields(to = %history.to_email), err)]
    async fn save_history(&self, history: MailSendHistory) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO mail_send_history (id, from_email, to_email, subject, content, sent_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(history.id.as_uuid())
        .bind(&history.from_email)
        .bind(&history.to_email)
        .bind(&history.subject)
        .bind(&history.content)
        .bind(history.sent_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("save_mail_history", e))?;
        Ok(())
    }

    async fn find_all_history(&self) -> Result<Vec<MailSendHistory>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, from_email, to_email, subject, content, sent_at
            FROM mail_send_history
            ORDER BY sent_at ASC, id ASC
            "#,
        )
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_mail_history", e))?;

        rows.iter()
            .map(|row| {
                MailHistoryRow::from_row(row)
                    .map(MailSendHistory::from)
                    .map_err(|e| StoreError::Corrupt(format!("failed to read mail history row: {e}")))
            })
            .collect()
    }
}

/// Transaction over [`PostgresStore`]. sqlx rolls back on drop.
struct PostgresOrderTransaction {
    tx: Transaction<'static, Postgres>,
    deducted: bool,
}

#[async_trait::async_trait]
impl OrderTransaction for PostgresOrderTransaction {
    #[instrument(skip(self, required), fields(products = required.len()), err)]
    async fn deduct_if_sufficient(&mut self, required: &StockRequirements) -> Result<(), StoreError> {
        if self.deducted {
            return Err(StoreError::Transaction(
                "stock already deducted in this transaction".to_string(),
            ));
        }
        self.deducted = true;
        if required.is_empty() {
            return Ok(());
        }

        let numbers: Vec<String> = required
            .product_numbers()
            .into_iter()
            .map(ProductNumber::into_inner)
            .collect();

        // Byte-wise ordering matches `StockRequirements`, so every transaction
        // takes row locks in the same sequence.
        let rows = sqlx::query(
            r#"
            SELECT product_number, quantity
            FROM stocks
            WHERE product_number = ANY($1)
            ORDER BY product_number COLLATE "C"
            FOR UPDATE
            "#,
        )
        .bind(&numbers)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("lock_stocks", e))?;

        let current = rows.iter().map(stock_from_row).collect::<Result<Vec<_>, _>>()?;
        let planned = plan_deduction(&current, required)?;

        for record in &planned {
            sqlx::query("UPDATE stocks SET quantity = $2 WHERE product_number = $1")
                .bind(record.product_number().as_str())
                .bind(to_db_amount(record.quantity())?)
                .execute(&mut *self.tx)
                .await
                .map_err(|e| map_sqlx_error("update_stock", e))?;
        }
        Ok(())
    }

    #[instrument(skip(self, order), fields(order_id = %order.id_typed(), lines = order.line_items().len()), err)]
    async fn insert_order(&mut self, order: &Order) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO orders (id, order_status, total_price, registered_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(order.id_typed().as_uuid())
        .bind(order.status().as_str())
        .bind(to_db_amount(order.total_price())?)
        .bind(order.registered_at())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_order", e))?;

        for item in order.line_items() {
            sqlx::query(
                r#"
                INSERT INTO order_line_items (order_id, line_no, product_number)
                VALUES ($1, $2, $3)
                "#,
            )
            .bind(order.id_typed().as_uuid())
            .bind(to_db_line_no(item.line_no())?)
            .bind(item.product().product_number().as_str())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("insert_order_line_item", e))?;
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx
            .commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StoreError::Conflict(msg),
                Some("40001") | Some("40P01") => StoreError::Transaction(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Backend(format!("connection pool closed in {}", operation))
        }
        sqlx::Error::RowNotFound => {
            StoreError::Backend(format!("unexpected row not found in {}", operation))
        }
        _ => StoreError::Backend(format!("sqlx error in {}: {}", operation, err)),
    }
}

fn to_db_amount(value: u64) -> Result<i64, StoreError> {
    i64::try_from(value).map_err(|_| StoreError::Backend(format!("amount {value} exceeds BIGINT")))
}

fn to_db_line_no(value: u32) -> Result<i32, StoreError> {
    i32::try_from(value).map_err(|_| StoreError::Backend(format!("line number {value} exceeds INTEGER")))
}

fn from_db_amount(column: &str, value: i64) -> Result<u64, StoreError> {
    u64::try_from(value).map_err(|_| StoreError::Corrupt(format!("negative {column}: {value}")))
}

/// Groups joined rows (ordered by order, then line number) into orders.
fn load_orders(rows: Vec<PgRow>) -> Result<Vec<Order>, StoreError> {
    let mut orders: Vec<(OrderHeaderRow, Vec<(u32, Product)>)> = Vec::new();
    for row in rows {
        let line = OrderLineRow::from_row(&row)
            .map_err(|e| StoreError::Corrupt(format!("failed to read order row: {e}")))?;
        let header = line.header();
        match orders.last_mut() {
            Some((current, lines)) if current.id == header.id => {
                if let Some(item) = line.into_item()? {
                    lines.push(item);
                }
            }
            _ => {
                let lines = line.into_item()?.into_iter().collect();
                orders.push((header, lines));
            }
        }
    }

    orders
        .into_iter()
        .map(|(header, lines)| header.into_order(lines))
        .collect()
}

// SQLx row types

#[derive(Debug)]
struct ProductRow {
    product_number: String,
    product_type: String,
    selling_status: String,
    name: String,
    price: i64,
}

impl<'r> FromRow<'r, PgRow> for ProductRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(ProductRow {
            product_number: row.try_get("product_number")?,
            product_type: row.try_get("product_type")?,
            selling_status: row.try_get("selling_status")?,
            name: row.try_get("name")?,
            price: row.try_get("price")?,
        })
    }
}

impl TryFrom<ProductRow> for Product {
    type Error = StoreError;

    fn try_from(row: ProductRow) -> Result<Self, Self::Error> {
        let corrupt = |e: kiosk_core::DomainError| {
            StoreError::Corrupt(format!("product {}: {}", row.product_number, e))
        };
        let product_type = row.product_type.parse().map_err(corrupt)?;
        let selling_status = row.selling_status.parse().map_err(corrupt)?;
        let price = from_db_amount("price", row.price)?;
        Product::new(
            ProductNumber::from(row.product_number.clone()),
            product_type,
            selling_status,
            row.name.clone(),
            price,
        )
        .map_err(corrupt)
    }
}

fn product_from_row(row: &PgRow) -> Result<Product, StoreError> {
    ProductRow::from_row(row)
        .map_err(|e| StoreError::Corrupt(format!("failed to read product row: {e}")))?
        .try_into()
}

fn stock_from_row(row: &PgRow) -> Result<StockRecord, StoreError> {
    let number: String = row
        .try_get("product_number")
        .map_err(|e| StoreError::Corrupt(format!("failed to read stock row: {e}")))?;
    let quantity: i64 = row
        .try_get("quantity")
        .map_err(|e| StoreError::Corrupt(format!("failed to read stock row: {e}")))?;
    Ok(StockRecord::new(ProductNumber::from(number), from_db_amount("quantity", quantity)?))
}

#[derive(Debug)]
struct OrderHeaderRow {
    id: uuid::Uuid,
    order_status: String,
    total_price: i64,
    registered_at: DateTime<Utc>,
}

impl OrderHeaderRow {
    fn into_order(self, lines: Vec<(u32, Product)>) -> Result<Order, StoreError> {
        let status = self
            .order_status
            .parse()
            .map_err(|e| StoreError::Corrupt(format!("order {}: {}", self.id, e)))?;
        Ok(Order::restore(
            OrderId::from_uuid(self.id),
            status,
            from_db_amount("total_price", self.total_price)?,
            self.registered_at,
            lines,
        ))
    }
}

/// One row of the orders ⟕ line items ⟕ products join.
#[derive(Debug)]
struct OrderLineRow {
    id: uuid::Uuid,
    order_status: String,
    total_price: i64,
    registered_at: DateTime<Utc>,
    line_no: Option<i32>,
    product: Option<ProductRow>,
}

impl<'r> FromRow<'r, PgRow> for OrderLineRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let line_no: Option<i32> = row.try_get("line_no")?;
        let product_number: Option<String> = row.try_get("product_number")?;
        let product = match product_number {
            Some(_) => Some(ProductRow::from_row(row)?),
            None => None,
        };
        Ok(OrderLineRow {
            id: row.try_get("id")?,
            order_status: row.try_get("order_status")?,
            total_price: row.try_get("total_price")?,
            registered_at: row.try_get("registered_at")?,
            line_no,
            product,
        })
    }
}

impl OrderLineRow {
    fn header(&self) -> OrderHeaderRow {
        OrderHeaderRow {
            id: self.id,
            order_status: self.order_status.clone(),
            total_price: self.total_price,
            registered_at: self.registered_at,
        }
    }

    fn into_item(self) -> Result<Option<(u32, Product)>, StoreError> {
        match (self.line_no, self.product) {
            (Some(line_no), Some(product)) => {
                let line_no = u32::try_from(line_no)
                    .map_err(|_| StoreError::Corrupt(format!("negative line number {line_no}")))?;
                Ok(Some((line_no, product.try_into()?)))
            }
            (None, None) => Ok(None),
            _ => Err(StoreError::Corrupt(format!(
                "order {} has a line item without a product",
                self.id
            ))),
        }
    }
}

#[derive(Debug)]
struct MailHistoryRow {
    id: uuid::Uuid,
    from_email: String,
    to_email: String,
    subject: String,
    content: String,
    sent_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for MailHistoryRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(MailHistoryRow {
            id: row.try_get("id")?,
            from_email: row.try_get("from_email")?,
            to_email: row.try_get("to_email")?,
            subject: row.try_get("subject")?,
            content: row.try_get("content")?,
            sent_at: row.try_get("sent_at")?,
        })
    }
}

impl From<MailHistoryRow> for MailSendHistory {
    fn from(row: MailHistoryRow) -> Self {
        MailSendHistory {
            id: MailSendHistoryId::from_uuid(row.id),
            from_email: row.from_email,
            to_email: row.to_email,
            subject: row.subject,
            content: row.content,
            sent_at: row.sent_at,
        }
    }
}
