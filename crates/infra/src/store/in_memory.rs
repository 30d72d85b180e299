use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use tokio::sync::{Mutex, OwnedMutexGuard};

use kiosk_core::{DateRange, OrderId};
use kiosk_inventory::{StockRecord, StockRequirements, plan_deduction};
use kiosk_products::{Product, ProductNumber, ProductSellingStatus};
use kiosk_sales::{Order, OrderStatus};

use super::r#trait::{Catalog, MailHistoryStore, OrderStore, OrderTransaction, StockLedger, StoreError};
use crate::external::mail::MailSendHistory;

type StockRow = Arc<Mutex<StockRecord>>;

#[derive(Debug, Default)]
struct CatalogState {
    products: BTreeMap<ProductNumber, Product>,
    latest: Option<ProductNumber>,
}

/// In-memory store implementing every store trait.
///
/// Intended for tests/dev. Each stock record sits behind its own async mutex,
/// which plays the role of a row lock: transactions hold the guards of the
/// rows they deduct until they commit or are dropped.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    catalog: RwLock<CatalogState>,
    stocks: RwLock<HashMap<ProductNumber, StockRow>>,
    orders: RwLock<Vec<Order>>,
    mail_history: RwLock<Vec<MailSendHistory>>,
}

fn poisoned(what: &str) -> StoreError {
    StoreError::Backend(format!("{what} lock poisoned"))
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Row handles for the numbers that have a stock record, in the order given.
    fn stock_rows(&self, numbers: &[ProductNumber]) -> Result<Vec<StockRow>, StoreError> {
        let stocks = self.stocks.read().map_err(|_| poisoned("stock"))?;
        Ok(numbers.iter().filter_map(|n| stocks.get(n).cloned()).collect())
    }

    /// Current quantity of one product, if it has a stock record.
    pub async fn stock_quantity(&self, number: &ProductNumber) -> Result<Option<u64>, StoreError> {
        let row = self.stock_rows(std::slice::from_ref(number))?.into_iter().next();
        match row {
            Some(row) => Ok(Some(row.lock().await.quantity())),
            None => Ok(None),
        }
    }

    pub fn order_count(&self) -> Result<usize, StoreError> {
        Ok(self.orders.read().map_err(|_| poisoned("order"))?.len())
    }
}

#[async_trait::async_trait]
impl Catalog for InMemoryStore {
    async fn find_by_product_numbers(
        &self,
        numbers: &[ProductNumber],
    ) -> Result<HashMap<ProductNumber, Product>, StoreError> {
        let catalog = self.catalog.read().map_err(|_| poisoned("catalog"))?;
        Ok(numbers
            .iter()
            .filter_map(|n| catalog.products.get(n).map(|p| (n.clone(), p.clone())))
            .collect())
    }

    async fn find_by_selling_statuses(
        &self,
        statuses: &[ProductSellingStatus],
    ) -> Result<Vec<Product>, StoreError> {
        let catalog = self.catalog.read().map_err(|_| poisoned("catalog"))?;
        Ok(catalog
            .products
            .values()
            .filter(|p| statuses.contains(&p.selling_status()))
            .cloned()
            .collect())
    }

    async fn latest_product_number(&self) -> Result<Option<ProductNumber>, StoreError> {
        let catalog = self.catalog.read().map_err(|_| poisoned("catalog"))?;
        Ok(catalog.latest.clone())
    }

    async fn insert_product(&self, product: Product) -> Result<(), StoreError> {
        let mut catalog = self.catalog.write().map_err(|_| poisoned("catalog"))?;
        let number = product.product_number().clone();
        if catalog.products.contains_key(&number) {
            return Err(StoreError::Conflict(format!("product {number} already exists")));
        }
        catalog.products.insert(number.clone(), product);
        catalog.latest = Some(number);
        Ok(())
    }
}

#[async_trait::async_trait]
impl StockLedger for InMemoryStore {
    async fn save_stock(&self, record: StockRecord) -> Result<(), StoreError> {
        let existing = {
            let mut stocks = self.stocks.write().map_err(|_| poisoned("stock"))?;
            match stocks.entry(record.product_number().clone()) {
                Entry::Occupied(row) => Some(row.get().clone()),
                Entry::Vacant(slot) => {
                    slot.insert(Arc::new(Mutex::new(record.clone())));
                    None
                }
            }
        };

        if let Some(row) = existing {
            *row.lock().await = record;
        }
        Ok(())
    }

    async fn find_stocks(&self, numbers: &[ProductNumber]) -> Result<Vec<StockRecord>, StoreError> {
        let mut sorted = numbers.to_vec();
        sorted.sort();
        sorted.dedup();

        let mut records = Vec::with_capacity(sorted.len());
        for row in self.stock_rows(&sorted)? {
            records.push(row.lock().await.clone());
        }
        Ok(records)
    }

    async fn deduct_if_sufficient(&self, required: &StockRequirements) -> Result<(), StoreError> {
        let mut tx = self.begin().await?;
        tx.deduct_if_sufficient(required).await?;
        tx.commit().await
    }
}

#[async_trait::async_trait]
impl OrderStore for InMemoryStore {
    async fn begin<'a>(&'a self) -> Result<Box<dyn OrderTransaction + 'a>, StoreError> {
        Ok(Box::new(InMemoryTransaction {
            store: self,
            locked: Vec::new(),
            staged_stock: Vec::new(),
            staged_orders: Vec::new(),
            deducted: false,
        }))
    }

    async fn find_orders_by(
        &self,
        range: DateRange,
        status: OrderStatus,
    ) -> Result<Vec<Order>, StoreError> {
        let orders = self.orders.read().map_err(|_| poisoned("order"))?;
        let mut matching: Vec<Order> = orders
            .iter()
            .filter(|o| o.status() == status && range.contains(o.registered_at()))
            .cloned()
            .collect();
        matching.sort_by_key(Order::registered_at);
        Ok(matching)
    }

    async fn find_order(&self, id: OrderId) -> Result<Option<Order>, StoreError> {
        let orders = self.orders.read().map_err(|_| poisoned("order"))?;
        Ok(orders.iter().find(|o| o.id_typed() == id).cloned())
    }
}

#[async_trait::async_trait]
impl MailHistoryStore for InMemoryStore {
    async fn save_history(&self, history: MailSendHistory) -> Result<(), StoreError> {
        self.mail_history
            .write()
            .map_err(|_| poisoned("mail history"))?
            .push(history);
        Ok(())
    }

    async fn find_all_history(&self) -> Result<Vec<MailSendHistory>, StoreError> {
        Ok(self
            .mail_history
            .read()
            .map_err(|_| poisoned("mail history"))?
            .clone())
    }
}

/// Transaction over [`InMemoryStore`].
///
/// Stock guards are held from the deduction until commit or drop. Staged
/// writes are applied only by `commit`; dropping the transaction discards them.
struct InMemoryTransaction<'a> {
    store: &'a InMemoryStore,
    locked: Vec<OwnedMutexGuard<StockRecord>>,
    staged_stock: Vec<StockRecord>,
    staged_orders: Vec<Order>,
    deducted: bool,
}

#[async_trait::async_trait]
impl OrderTransaction for InMemoryTransaction<'_> {
    async fn deduct_if_sufficient(&mut self, required: &StockRequirements) -> Result<(), StoreError> {
        if self.deducted {
            return Err(StoreError::Transaction(
                "stock already deducted in this transaction".to_string(),
            ));
        }
        self.deducted = true;

        // Ascending product-number order keeps lock acquisition deadlock-free.
        let rows = self.store.stock_rows(&required.product_numbers())?;
        let mut guards = Vec::with_capacity(rows.len());
        for row in rows {
            guards.push(row.lock_owned().await);
        }

        let current: Vec<StockRecord> = guards.iter().map(|g| (**g).clone()).collect();
        let planned = plan_deduction(&current, required)?;

        self.locked = guards;
        self.staged_stock = planned;
        Ok(())
    }

    async fn insert_order(&mut self, order: &Order) -> Result<(), StoreError> {
        let id = order.id_typed();
        let taken = self.staged_orders.iter().any(|o| o.id_typed() == id)
            || self.store.find_order(id).await?.is_some();
        if taken {
            return Err(StoreError::Conflict(format!("order {id} already exists")));
        }
        self.staged_orders.push(order.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let Self {
            store,
            mut locked,
            staged_stock,
            staged_orders,
            ..
        } = *self;

        let mut orders = store.orders.write().map_err(|_| poisoned("order"))?;

        for guard in locked.iter_mut() {
            if let Some(updated) = staged_stock
                .iter()
                .find(|r| r.product_number() == guard.product_number())
            {
                **guard = updated.clone();
            }
        }
        orders.extend(staged_orders);
        Ok(())
    }
}
