use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex as RowLock, OwnedMutexGuard};

use pos_catalog::{CreateCustomer, CreateProduct, Customer, Product, UpdateCustomer, UpdateProduct};
use pos_core::{CustomerId, DomainError, OrderId, ProductId, Quantity};
use pos_sales::Order;

use super::r#trait::{
    CatalogLookup, CatalogStore, FulfillmentStore, OrderReader, OrderScope, Reservation, StoreError,
};

pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Committed state.
#[derive(Debug, Default)]
struct Tables {
    products: HashMap<ProductId, Product>,
    customers: HashMap<CustomerId, Customer>,
    /// Commit order.
    orders: Vec<Order>,
    order_index: HashMap<OrderId, usize>,
}

impl Tables {
    fn product_referenced(&self, id: ProductId) -> bool {
        self.orders.iter().any(|o| o.quantity_of(id) > 0)
    }

    fn customer_referenced(&self, id: CustomerId) -> bool {
        self.orders.iter().any(|o| o.customer_id() == id)
    }

    /// Key and foreign-key checks an order insert must pass.
    fn check_order_insert(&self, order: &Order) -> Result<(), StoreError> {
        if self.order_index.contains_key(&order.id()) {
            return Err(DomainError::conflict(format!("order {} already exists", order.id())).into());
        }
        if !self.customers.contains_key(&order.customer_id()) {
            return Err(StoreError::backend(format!(
                "foreign key violation: customer {} does not exist",
                order.customer_id()
            )));
        }
        for line in order.lines() {
            if !self.products.contains_key(&line.product_id) {
                return Err(StoreError::backend(format!(
                    "foreign key violation: product {} does not exist",
                    line.product_id
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct Shared {
    tables: RwLock<Tables>,
    /// One lock per product row, held by a scope from its first reservation
    /// of that product until the scope ends.
    row_locks: Mutex<HashMap<ProductId, Arc<RowLock<()>>>>,
}

impl Shared {
    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, StoreError> {
        self.tables
            .read()
            .map_err(|_| StoreError::backend("tables lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>, StoreError> {
        self.tables
            .write()
            .map_err(|_| StoreError::backend("tables lock poisoned"))
    }

    fn product(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        Ok(self.read()?.products.get(&id).cloned())
    }

    fn row_lock(&self, id: ProductId) -> Result<Arc<RowLock<()>>, StoreError> {
        let mut locks = self
            .row_locks
            .lock()
            .map_err(|_| StoreError::backend("row lock table poisoned"))?;
        Ok(locks.entry(id).or_default().clone())
    }

    /// Drop the lock entry of a deleted product. Waiters keep their own handle.
    fn forget_row(&self, id: ProductId) -> Result<(), StoreError> {
        self.row_locks
            .lock()
            .map_err(|_| StoreError::backend("row lock table poisoned"))?
            .remove(&id);
        Ok(())
    }

    async fn lock_row(&self, id: ProductId, timeout: Duration) -> Result<OwnedMutexGuard<()>, StoreError> {
        let lock = self.row_lock(id)?;
        tokio::time::timeout(timeout, lock.lock_owned())
            .await
            .map_err(|_| {
                tracing::warn!(product_id = %id, timeout_ms = timeout.as_millis() as u64, "row lock wait timed out");
                StoreError::transient(format!("timed out waiting for row lock on product {id}"))
            })
    }
}

/// In-memory store implementing every storage port.
///
/// Intended for tests/dev. Mirrors row-locking database semantics: a
/// reservation locks the product row until its scope ends, and a scope's
/// writes become visible all at once on commit.
#[derive(Debug, Clone)]
pub struct InMemoryStore {
    shared: Arc<Shared>,
    lock_timeout: Duration,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::with_lock_timeout(DEFAULT_LOCK_TIMEOUT)
    }

    /// Bound how long a reservation or product edit waits for a row lock.
    pub fn with_lock_timeout(lock_timeout: Duration) -> Self {
        Self {
            shared: Arc::new(Shared::default()),
            lock_timeout,
        }
    }

    fn update_product_locked(&self, id: ProductId, cmd: &UpdateProduct) -> Result<Product, StoreError> {
        let mut tables = self.shared.write()?;
        let product = tables.products.get_mut(&id).ok_or_else(|| DomainError::not_found("product", id))?;
        product.apply_update(cmd)?;
        Ok(product.clone())
    }

    fn delete_product_locked(&self, id: ProductId) -> Result<(), StoreError> {
        let mut tables = self.shared.write()?;
        if !tables.products.contains_key(&id) {
            return Err(DomainError::not_found("product", id).into());
        }
        if tables.product_referenced(id) {
            return Err(DomainError::conflict(format!("product {id} is referenced by committed orders")).into());
        }
        tables.products.remove(&id);
        Ok(())
    }
}

#[async_trait]
impl CatalogLookup for InMemoryStore {
    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        self.shared.product(id)
    }

    async fn customer_exists(&self, id: CustomerId) -> Result<bool, StoreError> {
        Ok(self.shared.read()?.customers.contains_key(&id))
    }
}

#[async_trait]
impl CatalogStore for InMemoryStore {
    async fn create_product(&self, cmd: CreateProduct) -> Result<Product, StoreError> {
        let product = cmd.into_product(ProductId::new(), Utc::now())?;
        self.shared.write()?.products.insert(product.id, product.clone());
        Ok(product)
    }

    async fn list_products(&self) -> Result<Vec<Product>, StoreError> {
        let mut products: Vec<Product> = self.shared.read()?.products.values().cloned().collect();
        products.sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)));
        Ok(products)
    }

    async fn update_product(&self, id: ProductId, cmd: UpdateProduct) -> Result<Product, StoreError> {
        cmd.validate()?;
        if self.shared.product(id)?.is_none() {
            return Err(DomainError::not_found("product", id).into());
        }
        let _row = self.shared.lock_row(id, self.lock_timeout).await?;
        self.update_product_locked(id, &cmd)
    }

    async fn delete_product(&self, id: ProductId) -> Result<(), StoreError> {
        if self.shared.product(id)?.is_none() {
            return Err(DomainError::not_found("product", id).into());
        }
        let row = self.shared.lock_row(id, self.lock_timeout).await?;
        self.delete_product_locked(id)?;
        drop(row);
        self.shared.forget_row(id)
    }

    async fn create_customer(&self, cmd: CreateCustomer) -> Result<Customer, StoreError> {
        let customer = cmd.into_customer(CustomerId::new(), Utc::now())?;
        self.shared.write()?.customers.insert(customer.id, customer.clone());
        Ok(customer)
    }

    async fn get_customer(&self, id: CustomerId) -> Result<Option<Customer>, StoreError> {
        Ok(self.shared.read()?.customers.get(&id).cloned())
    }

    async fn list_customers(&self) -> Result<Vec<Customer>, StoreError> {
        let mut customers: Vec<Customer> = self.shared.read()?.customers.values().cloned().collect();
        customers.sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)));
        Ok(customers)
    }

    async fn update_customer(&self, id: CustomerId, cmd: UpdateCustomer) -> Result<Customer, StoreError> {
        let mut tables = self.shared.write()?;
        let customer = tables.customers.get_mut(&id).ok_or_else(|| DomainError::not_found("customer", id))?;
        customer.apply_update(&cmd)?;
        Ok(customer.clone())
    }

    async fn delete_customer(&self, id: CustomerId) -> Result<(), StoreError> {
        let mut tables = self.shared.write()?;
        if !tables.customers.contains_key(&id) {
            return Err(DomainError::not_found("customer", id).into());
        }
        if tables.customer_referenced(id) {
            return Err(DomainError::conflict(format!("customer {id} is referenced by committed orders")).into());
        }
        tables.customers.remove(&id);
        Ok(())
    }
}

#[async_trait]
impl OrderReader for InMemoryStore {
    async fn get_order(&self, id: OrderId) -> Result<Option<Order>, StoreError> {
        let tables = self.shared.read()?;
        Ok(tables.order_index.get(&id).map(|&idx| tables.orders[idx].clone()))
    }

    async fn list_orders(&self) -> Result<Vec<Order>, StoreError> {
        Ok(self.shared.read()?.orders.clone())
    }
}

#[async_trait]
impl FulfillmentStore for InMemoryStore {
    type Scope = InMemoryScope;

    async fn begin(&self) -> Result<InMemoryScope, StoreError> {
        Ok(InMemoryScope {
            shared: self.shared.clone(),
            lock_timeout: self.lock_timeout,
            held: HashMap::new(),
            pending: HashMap::new(),
            staged: None,
            finished: false,
        })
    }
}

/// Scope over the in-memory store.
///
/// Decrements and the staged order stay private to the scope until commit.
pub struct InMemoryScope {
    shared: Arc<Shared>,
    lock_timeout: Duration,
    held: HashMap<ProductId, OwnedMutexGuard<()>>,
    /// Total units reserved per product by this scope.
    pending: HashMap<ProductId, i64>,
    staged: Option<Order>,
    finished: bool,
}

impl InMemoryScope {
    fn reserve_locked(&mut self, product_id: ProductId, quantity: Quantity) -> Result<Reservation, StoreError> {
        let product = self
            .shared
            .product(product_id)?
            .ok_or(StoreError::ProductNotFound(product_id))?;

        let already = self.pending.get(&product_id).copied().unwrap_or(0);
        let available = product.stock - already;
        if available < quantity.get() {
            return Err(StoreError::InsufficientStock {
                product_id,
                requested: quantity.get(),
                available,
            });
        }

        self.pending.insert(product_id, already + quantity.get());
        Ok(Reservation {
            product_id,
            quantity,
            unit_price: product.price,
            remaining: available - quantity.get(),
        })
    }

    /// Apply everything under a single write lock, or nothing.
    fn apply(&mut self) -> Result<(), StoreError> {
        let mut tables = self.shared.write()?;

        if let Some(order) = &self.staged {
            tables.check_order_insert(order)?;
        }
        for (product_id, units) in &self.pending {
            let product = tables
                .products
                .get(product_id)
                .ok_or(StoreError::ProductNotFound(*product_id))?;
            if product.stock < *units {
                return Err(StoreError::backend(format!(
                    "stock for product {product_id} changed while its row was locked"
                )));
            }
        }

        for (product_id, units) in self.pending.drain() {
            if let Some(product) = tables.products.get_mut(&product_id) {
                product.stock -= units;
            }
        }
        if let Some(order) = self.staged.take() {
            let idx = tables.orders.len();
            tables.order_index.insert(order.id(), idx);
            tables.orders.push(order);
        }
        Ok(())
    }
}

#[async_trait]
impl OrderScope for InMemoryScope {
    async fn try_reserve(&mut self, product_id: ProductId, quantity: Quantity) -> Result<Reservation, StoreError> {
        if !self.held.contains_key(&product_id) {
            if self.shared.product(product_id)?.is_none() {
                return Err(StoreError::ProductNotFound(product_id));
            }
            let guard = self.shared.lock_row(product_id, self.lock_timeout).await?;
            self.held.insert(product_id, guard);
        }
        self.reserve_locked(product_id, quantity)
    }

    async fn persist(&mut self, order: &Order) -> Result<OrderId, StoreError> {
        if self.staged.is_some() {
            return Err(StoreError::backend("scope already holds an order"));
        }
        self.shared.read()?.check_order_insert(order)?;
        self.staged = Some(order.clone());
        Ok(order.id())
    }

    async fn commit(mut self) -> Result<(), StoreError> {
        self.finished = true;
        self.apply()
    }

    async fn rollback(mut self) -> Result<(), StoreError> {
        self.finished = true;
        tracing::debug!(
            reserved_products = self.pending.len(),
            "in-memory scope rolled back"
        );
        Ok(())
    }
}

impl Drop for InMemoryScope {
    fn drop(&mut self) {
        if !self.finished && (!self.pending.is_empty() || self.staged.is_some()) {
            tracing::debug!(
                reserved_products = self.pending.len(),
                "scope dropped without commit; reservations discarded"
            );
        }
    }
}
