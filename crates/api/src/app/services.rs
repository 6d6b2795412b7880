use std::sync::Arc;

use pos_catalog::{CreateCustomer, CreateProduct, Customer, Product, UpdateCustomer, UpdateProduct};
use pos_core::{CustomerId, OrderId, ProductId};
use pos_infra::AppConfig;
use pos_infra::OrderAssembler;
use pos_infra::store::{CatalogStore, InMemoryStore, PostgresStore, StoreError};
use pos_sales::{CreateOrder, Order, OrderError};

/// Backend wiring chosen at startup.
///
/// Both variants expose the same operations; handlers never see which store
/// is behind them.
#[derive(Clone)]
pub enum AppServices {
    InMemory {
        store: Arc<InMemoryStore>,
        assembler: OrderAssembler<InMemoryStore>,
    },
    Persistent {
        store: Arc<PostgresStore>,
        assembler: OrderAssembler<PostgresStore>,
    },
}

/// In-memory wiring used by tests and local development.
pub fn build_in_memory(store: InMemoryStore) -> AppServices {
    let store = Arc::new(store);
    AppServices::InMemory {
        assembler: OrderAssembler::new(store.clone()),
        store,
    }
}

/// Pick the backend from configuration: Postgres when `DATABASE_URL` is set.
pub async fn build_services(config: &AppConfig) -> Result<AppServices, StoreError> {
    let Some(url) = config.database_url.as_deref() else {
        tracing::info!("DATABASE_URL not set; using in-memory store");
        return Ok(build_in_memory(InMemoryStore::with_lock_timeout(config.stock_lock_timeout)));
    };

    let store = PostgresStore::connect(url, config.db_max_connections, config.stock_lock_timeout).await?;
    store.migrate().await?;
    tracing::info!(max_connections = config.db_max_connections, "using postgres store");

    let store = Arc::new(store);
    Ok(AppServices::Persistent {
        assembler: OrderAssembler::new(store.clone()),
        store,
    })
}

impl AppServices {
    fn catalog(&self) -> &dyn CatalogStore {
        match self {
            AppServices::InMemory { store, .. } => &**store,
            AppServices::Persistent { store, .. } => &**store,
        }
    }

    pub fn backend_name(&self) -> &'static str {
        match self {
            AppServices::InMemory { .. } => "in_memory",
            AppServices::Persistent { .. } => "postgres",
        }
    }

    // -------------------------
    // Products
    // -------------------------

    pub async fn create_product(&self, cmd: CreateProduct) -> Result<Product, StoreError> {
        self.catalog().create_product(cmd).await
    }

    pub async fn get_product(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        self.catalog().get_product(id).await
    }

    pub async fn list_products(&self) -> Result<Vec<Product>, StoreError> {
        self.catalog().list_products().await
    }

    pub async fn update_product(&self, id: ProductId, cmd: UpdateProduct) -> Result<Product, StoreError> {
        self.catalog().update_product(id, cmd).await
    }

    pub async fn delete_product(&self, id: ProductId) -> Result<(), StoreError> {
        self.catalog().delete_product(id).await
    }

    // -------------------------
    // Customers
    // -------------------------

    pub async fn create_customer(&self, cmd: CreateCustomer) -> Result<Customer, StoreError> {
        self.catalog().create_customer(cmd).await
    }

    pub async fn get_customer(&self, id: CustomerId) -> Result<Option<Customer>, StoreError> {
        self.catalog().get_customer(id).await
    }

    pub async fn list_customers(&self) -> Result<Vec<Customer>, StoreError> {
        self.catalog().list_customers().await
    }

    pub async fn update_customer(&self, id: CustomerId, cmd: UpdateCustomer) -> Result<Customer, StoreError> {
        self.catalog().update_customer(id, cmd).await
    }

    pub async fn delete_customer(&self, id: CustomerId) -> Result<(), StoreError> {
        self.catalog().delete_customer(id).await
    }

    // -------------------------
    // Orders
    // -------------------------

    pub async fn create_order(&self, cmd: CreateOrder) -> Result<Order, OrderError> {
        match self {
            AppServices::InMemory { assembler, .. } => assembler.create_order(cmd).await,
            AppServices::Persistent { assembler, .. } => assembler.create_order(cmd).await,
        }
    }

    pub async fn get_order(&self, id: OrderId) -> Result<Option<Order>, OrderError> {
        match self {
            AppServices::InMemory { assembler, .. } => assembler.get_order(id).await,
            AppServices::Persistent { assembler, .. } => assembler.get_order(id).await,
        }
    }

    pub async fn list_orders(&self) -> Result<Vec<Order>, OrderError> {
        match self {
            AppServices::InMemory { assembler, .. } => assembler.list_orders().await,
            AppServices::Persistent { assembler, .. } => assembler.list_orders().await,
        }
    }
}
