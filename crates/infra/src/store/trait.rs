use async_trait::async_trait;
use thiserror::Error;

use pos_catalog::{CreateCustomer, CreateProduct, Customer, Product, UpdateCustomer, UpdateProduct};
use pos_core::{CustomerId, DomainError, Money, OrderId, ProductId, Quantity};
use pos_sales::{Order, OrderError};

/// Store operation error.
///
/// Reservation outcomes (`ProductNotFound`, `InsufficientStock`) are business
/// results reported by the stock ledger; `Transient` and `Backend` are
/// infrastructure faults. `Domain` carries validation, not-found and conflict
/// failures from catalog operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("product {0} not found")]
    ProductNotFound(ProductId),

    #[error("insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: ProductId,
        requested: i64,
        available: i64,
    },

    /// Lock timeout, deadlock, serialization failure, lost connection.
    #[error("transient store failure: {0}")]
    Transient(String),

    #[error("store failure: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }

    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }
}

impl From<StoreError> for OrderError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::ProductNotFound(id) => OrderError::ProductNotFound(id),
            StoreError::InsufficientStock {
                product_id,
                requested,
                available,
            } => OrderError::InsufficientStock {
                product_id,
                requested,
                available,
            },
            StoreError::Domain(DomainError::Validation(msg)) => OrderError::InvalidRequest(msg),
            StoreError::Transient(msg) => OrderError::transient(msg),
            other => OrderError::persistence(other.to_string()),
        }
    }
}

/// Successful outcome of a stock reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reservation {
    pub product_id: ProductId,
    pub quantity: Quantity,
    /// Price in effect at the instant of the decrement.
    pub unit_price: Money,
    /// Stock left for this product as seen by the reserving scope.
    pub remaining: i64,
}

/// Read access to product and customer records.
///
/// Pure reads of committed state; callable inside or outside a scope.
#[async_trait]
pub trait CatalogLookup: Send + Sync {
    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, StoreError>;

    async fn customer_exists(&self, id: CustomerId) -> Result<bool, StoreError>;
}

/// Catalog maintenance (products and customers).
///
/// Product edits never interleave with a reservation's check-and-decrement on
/// the same row.
#[async_trait]
pub trait CatalogStore: CatalogLookup {
    async fn create_product(&self, cmd: CreateProduct) -> Result<Product, StoreError>;

    async fn list_products(&self) -> Result<Vec<Product>, StoreError>;

    async fn update_product(&self, id: ProductId, cmd: UpdateProduct) -> Result<Product, StoreError>;

    /// Rejected with `DomainError::Conflict` while any order line references it.
    async fn delete_product(&self, id: ProductId) -> Result<(), StoreError>;

    async fn create_customer(&self, cmd: CreateCustomer) -> Result<Customer, StoreError>;

    async fn get_customer(&self, id: CustomerId) -> Result<Option<Customer>, StoreError>;

    async fn list_customers(&self) -> Result<Vec<Customer>, StoreError>;

    async fn update_customer(&self, id: CustomerId, cmd: UpdateCustomer) -> Result<Customer, StoreError>;

    /// Rejected with `DomainError::Conflict` while any order references it.
    async fn delete_customer(&self, id: CustomerId) -> Result<(), StoreError>;
}

/// Read side of the order store. Only committed orders are visible.
#[async_trait]
pub trait OrderReader: Send + Sync {
    async fn get_order(&self, id: OrderId) -> Result<Option<Order>, StoreError>;

    /// All committed orders, oldest first, each with its lines.
    async fn list_orders(&self) -> Result<Vec<Order>, StoreError>;
}

/// One atomic unit of work: every reservation plus the final persist.
///
/// Nothing done through a scope is visible to other scopes or readers until
/// `commit` succeeds. Dropping a scope without committing discards it.
#[async_trait]
pub trait OrderScope: Send {
    /// Atomically check `stock >= quantity` and lower it by `quantity`.
    ///
    /// The scope's own earlier reservations are visible to later ones.
    async fn try_reserve(&mut self, product_id: ProductId, quantity: Quantity) -> Result<Reservation, StoreError>;

    /// Record the order and its lines as part of this scope.
    async fn persist(&mut self, order: &Order) -> Result<OrderId, StoreError>;

    async fn commit(self) -> Result<(), StoreError>;

    async fn rollback(self) -> Result<(), StoreError>;
}

/// A store able to open order-creation scopes.
#[async_trait]
pub trait FulfillmentStore: Send + Sync {
    type Scope: OrderScope;

    async fn begin(&self) -> Result<Self::Scope, StoreError>;
}
