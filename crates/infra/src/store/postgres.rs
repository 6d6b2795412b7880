//! Postgres-backed store (sqlx).
//!
//! The stock ledger's reservation is the single conditional statement
//! `UPDATE products SET stock = stock - $2 WHERE id = $1 AND stock >= $2`,
//! so the check and the decrement happen in one step under the row lock the
//! database takes for the update. A scope is one database transaction; the row
//! lock and the decrement are released/undone by `ROLLBACK`, and sqlx rolls
//! back a transaction that is dropped without commit.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation) | `23505` | `Domain(Conflict)` |
//! | Database (foreign key violation) | `23503` | `Backend` (`Domain(Conflict)` on deletes) |
//! | Database (check constraint violation) | `23514` | `Domain(Validation)` |
//! | Database (deadlock / lock timeout / serialization) | `40P01` / `55P03` / `40001` | `Transient` |
//! | Database (other) | Any other | `Backend` |
//! | PoolTimedOut / PoolClosed / Io | N/A | `Transient` |
//! | Other | N/A | `Backend` |

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{FromRow, PgPool, Postgres, Row, Transaction};
use tracing::{Span, instrument};
use uuid::Uuid;

use pos_catalog::{ContactInfo, CreateCustomer, CreateProduct, Customer, Product, UpdateCustomer, UpdateProduct};
use pos_core::{CustomerId, DomainError, Money, OrderId, ProductId, Quantity};
use pos_sales::{Order, OrderLine};

use super::r#trait::{
    CatalogLookup, CatalogStore, FulfillmentStore, OrderReader, OrderScope, Reservation, StoreError,
};

const SCHEMA: &str = include_str!("schema.sql");

/// Postgres-backed implementation of every storage port.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
    lock_timeout: Duration,
}

impl PostgresStore {
    pub fn new(pool: PgPool, lock_timeout: Duration) -> Self {
        Self { pool, lock_timeout }
    }

    /// Open a connection pool against `database_url`.
    #[instrument(skip(database_url), err)]
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        lock_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool, lock_timeout))
    }

    /// Create the four fulfillment tables if they do not exist.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }

    async fn load_lines(&self, order_ids: &[Uuid]) -> Result<HashMap<Uuid, Vec<OrderLine>>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT order_id, product_id, quantity, unit_price
            FROM order_lines
            WHERE order_id = ANY($1)
            ORDER BY order_id, line_no
            "#,
        )
        .bind(order_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_lines", e))?;

        let mut lines: HashMap<Uuid, Vec<OrderLine>> = HashMap::new();
        for row in rows {
            let row = OrderLineRow::from_row(&row).map_err(|e| corrupt("order_lines", e))?;
            lines.entry(row.order_id).or_default().push(row.try_into()?);
        }
        Ok(lines)
    }
}

#[async_trait]
impl CatalogLookup for PostgresStore {
    #[instrument(skip(self), fields(product_id = %id, operation = tracing::field::Empty), err)]
    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        Span::current().record("operation", "get_product");

        let row = sqlx::query("SELECT id, name, price, stock, created_at FROM products WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_product", e))?;

        row.map(|r| product_from_row(&r)).transpose()
    }

    #[instrument(skip(self), fields(customer_id = %id, operation = tracing::field::Empty), err)]
    async fn customer_exists(&self, id: CustomerId) -> Result<bool, StoreError> {
        Span::current().record("operation", "customer_exists");

        sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM customers WHERE id = $1)")
            .bind(id.as_uuid())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("customer_exists", e))
    }
}

#[async_trait]
impl CatalogStore for PostgresStore {
    #[instrument(skip(self, cmd), err)]
    async fn create_product(&self, cmd: CreateProduct) -> Result<Product, StoreError> {
        let product = cmd.into_product(ProductId::new(), Utc::now())?;

        sqlx::query("INSERT INTO products (id, name, price, stock, created_at) VALUES ($1, $2, $3, $4, $5)")
            .bind(product.id.as_uuid())
            .bind(&product.name)
            .bind(product.price.cents())
            .bind(product.stock)
            .bind(product.created_at)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("create_product", e))?;

        Ok(product)
    }

    async fn list_products(&self) -> Result<Vec<Product>, StoreError> {
        let rows = sqlx::query("SELECT id, name, price, stock, created_at FROM products ORDER BY created_at, id")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_products", e))?;

        rows.iter().map(product_from_row).collect()
    }

    #[instrument(skip(self, cmd), fields(product_id = %id), err)]
    async fn update_product(&self, id: ProductId, cmd: UpdateProduct) -> Result<Product, StoreError> {
        cmd.validate()?;

        let row = sqlx::query(
            r#"
            UPDATE products SET name = $2, price = $3, stock = $4
            WHERE id = $1
            RETURNING id, name, price, stock, created_at
            "#,
        )
        .bind(id.as_uuid())
        .bind(cmd.name.trim())
        .bind(cmd.price.cents())
        .bind(cmd.stock)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_product", e))?;

        match row {
            Some(row) => product_from_row(&row),
            None => Err(DomainError::not_found("product", id).into()),
        }
    }

    #[instrument(skip(self), fields(product_id = %id), err)]
    async fn delete_product(&self, id: ProductId) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|e| {
                if is_foreign_key_violation(&e) {
                    DomainError::conflict(format!("product {id} is referenced by committed orders")).into()
                } else {
                    map_sqlx_error("delete_product", e)
                }
            })?;

        if result.rows_affected() == 0 {
            return Err(DomainError::not_found("product", id).into());
        }
        Ok(())
    }

    #[instrument(skip(self, cmd), err)]
    async fn create_customer(&self, cmd: CreateCustomer) -> Result<Customer, StoreError> {
        let customer = cmd.into_customer(CustomerId::new(), Utc::now())?;

        sqlx::query("INSERT INTO customers (id, name, email, phone, created_at) VALUES ($1, $2, $3, $4, $5)")
            .bind(customer.id.as_uuid())
            .bind(&customer.name)
            .bind(customer.contact.email.as_deref())
            .bind(customer.contact.phone.as_deref())
            .bind(customer.created_at)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("create_customer", e))?;

        Ok(customer)
    }

    async fn get_customer(&self, id: CustomerId) -> Result<Option<Customer>, StoreError> {
        let row = sqlx::query("SELECT id, name, email, phone, created_at FROM customers WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_customer", e))?;

        row.map(|r| customer_from_row(&r)).transpose()
    }

    async fn list_customers(&self) -> Result<Vec<Customer>, StoreError> {
        let rows = sqlx::query("SELECT id, name, email, phone, created_at FROM customers ORDER BY created_at, id")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_customers", e))?;

        rows.iter().map(customer_from_row).collect()
    }

    #[instrument(skip(self, cmd), fields(customer_id = %id), err)]
    async fn update_customer(&self, id: CustomerId, cmd: UpdateCustomer) -> Result<Customer, StoreError> {
        cmd.validate()?;

        let row = sqlx::query(
            r#"
            UPDATE customers SET name = $2, email = $3, phone = $4
            WHERE id = $1
            RETURNING id, name, email, phone, created_at
            "#,
        )
        .bind(id.as_uuid())
        .bind(cmd.name.trim())
        .bind(cmd.contact.email.as_deref())
        .bind(cmd.contact.phone.as_deref())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_customer", e))?;

        match row {
            Some(row) => customer_from_row(&row),
            None => Err(DomainError::not_found("customer", id).into()),
        }
    }

    #[instrument(skip(self), fields(customer_id = %id), err)]
    async fn delete_customer(&self, id: CustomerId) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM customers WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|e| {
                if is_foreign_key_violation(&e) {
                    DomainError::conflict(format!("customer {id} is referenced by committed orders")).into()
                } else {
                    map_sqlx_error("delete_customer", e)
                }
            })?;

        if result.rows_affected() == 0 {
            return Err(DomainError::not_found("customer", id).into());
        }
        Ok(())
    }
}

#[async_trait]
impl OrderReader for PostgresStore {
    #[instrument(skip(self), fields(order_id = %id, operation = tracing::field::Empty), err)]
    async fn get_order(&self, id: OrderId) -> Result<Option<Order>, StoreError> {
        Span::current().record("operation", "get_order");

        let Some(row) = sqlx::query("SELECT id, customer_id, total, created_at FROM orders WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_order", e))?
        else {
            return Ok(None);
        };

        let order = OrderRow::from_row(&row).map_err(|e| corrupt("orders", e))?;
        let mut lines = self.load_lines(&[order.id]).await?;
        let order_lines = lines.remove(&order.id).unwrap_or_default();
        order.into_order(order_lines).map(Some)
    }

    #[instrument(skip(self), fields(operation = tracing::field::Empty, order_count = tracing::field::Empty), err)]
    async fn list_orders(&self) -> Result<Vec<Order>, StoreError> {
        let span = Span::current();
        span.record("operation", "list_orders");

        let rows = sqlx::query("SELECT id, customer_id, total, created_at FROM orders ORDER BY created_at, id")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_orders", e))?;

        let orders = rows
            .iter()
            .map(|r| OrderRow::from_row(r).map_err(|e| corrupt("orders", e)))
            .collect::<Result<Vec<_>, _>>()?;
        let ids: Vec<Uuid> = orders.iter().map(|o| o.id).collect();
        let mut lines = self.load_lines(&ids).await?;

        let result = orders
            .into_iter()
            .map(|o| {
                let order_lines = lines.remove(&o.id).unwrap_or_default();
                o.into_order(order_lines)
            })
            .collect::<Result<Vec<_>, _>>()?;

        span.record("order_count", result.len());
        Ok(result)
    }
}

#[async_trait]
impl FulfillmentStore for PostgresStore {
    type Scope = PostgresScope;

    async fn begin(&self) -> Result<PostgresScope, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        // Bounded wait on row locks held by concurrent scopes; expiry surfaces as 55P03.
        sqlx::query("SELECT set_config('lock_timeout', $1, true)")
            .bind(format!("{}ms", self.lock_timeout.as_millis()))
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("set_lock_timeout", e))?;

        Ok(PostgresScope { tx })
    }
}

/// One order-creation transaction.
pub struct PostgresScope {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl OrderScope for PostgresScope {
    #[instrument(skip(self), fields(product_id = %product_id, quantity = quantity.get()))]
    async fn try_reserve(&mut self, product_id: ProductId, quantity: Quantity) -> Result<Reservation, StoreError> {
        let row = sqlx::query(
            r#"
            UPDATE products SET stock = stock - $2
            WHERE id = $1 AND stock >= $2
            RETURNING price, stock
            "#,
        )
        .bind(product_id.as_uuid())
        .bind(quantity.get())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("try_reserve", e))?;

        if let Some(row) = row {
            let price: i64 = row.try_get("price").map_err(|e| corrupt("products", e))?;
            let remaining: i64 = row.try_get("stock").map_err(|e| corrupt("products", e))?;
            return Ok(Reservation {
                product_id,
                quantity,
                unit_price: money(price)?,
                remaining,
            });
        }

        // Zero rows: either the product is absent or the condition failed.
        let available = sqlx::query_scalar::<_, i64>("SELECT stock FROM products WHERE id = $1")
            .bind(product_id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("read_stock", e))?;

        match available {
            None => Err(StoreError::ProductNotFound(product_id)),
            Some(available) => Err(StoreError::InsufficientStock {
                product_id,
                requested: quantity.get(),
                available,
            }),
        }
    }

    #[instrument(skip(self, order), fields(order_id = %order.id(), lines = order.lines().len()), err)]
    async fn persist(&mut self, order: &Order) -> Result<OrderId, StoreError> {
        sqlx::query("INSERT INTO orders (id, customer_id, total, created_at) VALUES ($1, $2, $3, $4)")
            .bind(order.id().as_uuid())
            .bind(order.customer_id().as_uuid())
            .bind(order.total().cents())
            .bind(order.created_at())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("insert_order", e))?;

        for (idx, line) in order.lines().iter().enumerate() {
            let line_no = i32::try_from(idx + 1)
                .map_err(|_| StoreError::backend(format!("order {} has too many lines", order.id())))?;
            sqlx::query(
                r#"
                INSERT INTO order_lines (order_id, line_no, product_id, quantity, unit_price)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(order.id().as_uuid())
            .bind(line_no)
            .bind(line.product_id.as_uuid())
            .bind(line.quantity.get())
            .bind(line.unit_price.cents())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("insert_order_line", e))?;
        }

        Ok(order.id())
    }

    async fn commit(self) -> Result<(), StoreError> {
        self.tx
            .commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }

    async fn rollback(self) -> Result<(), StoreError> {
        self.tx
            .rollback()
            .await
            .map_err(|e| map_sqlx_error("rollback", e))
    }
}

/// Map SQLx errors to StoreError.
pub(crate) fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => DomainError::conflict(msg).into(),
                Some("23514") => DomainError::validation(msg).into(),
                Some("40P01") | Some("55P03") | Some("40001") => StoreError::Transient(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            StoreError::Transient(format!("connection failure in {}: {}", operation, err))
        }
        _ => StoreError::Backend(format!("sqlx error in {}: {}", operation, err)),
    }
}

fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        if let Some(code) = db_err.code() {
            return code.as_ref() == "23503";
        }
    }
    false
}

fn corrupt(table: &str, err: impl std::fmt::Display) -> StoreError {
    StoreError::Backend(format!("failed to decode {table} row: {err}"))
}

fn money(cents: i64) -> Result<Money, StoreError> {
    Money::from_cents(cents).map_err(|e| corrupt("money", e))
}

fn product_from_row(row: &PgRow) -> Result<Product, StoreError> {
    let r = ProductRow::from_row(row).map_err(|e| corrupt("products", e))?;
    Ok(Product {
        id: ProductId::from_uuid(r.id),
        name: r.name,
        price: money(r.price)?,
        stock: r.stock,
        created_at: r.created_at,
    })
}

fn customer_from_row(row: &PgRow) -> Result<Customer, StoreError> {
    let r = CustomerRow::from_row(row).map_err(|e| corrupt("customers", e))?;
    Ok(Customer {
        id: CustomerId::from_uuid(r.id),
        name: r.name,
        contact: ContactInfo {
            email: r.email,
            phone: r.phone,
        },
        created_at: r.created_at,
    })
}

// SQLx row types

#[derive(Debug)]
struct ProductRow {
    id: Uuid,
    name: String,
    price: i64,
    stock: i64,
    created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for ProductRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(ProductRow {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            price: row.try_get("price")?,
            stock: row.try_get("stock")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[derive(Debug)]
struct CustomerRow {
    id: Uuid,
    name: String,
    email: Option<String>,
    phone: Option<String>,
    created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for CustomerRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(CustomerRow {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            email: row.try_get("email")?,
            phone: row.try_get("phone")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[derive(Debug)]
struct OrderRow {
    id: Uuid,
    customer_id: Uuid,
    total: i64,
    created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for OrderRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(OrderRow {
            id: row.try_get("id")?,
            customer_id: row.try_get("customer_id")?,
            total: row.try_get("total")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl OrderRow {
    fn into_order(self, lines: Vec<OrderLine>) -> Result<Order, StoreError> {
        Order::restore(
            OrderId::from_uuid(self.id),
            CustomerId::from_uuid(self.customer_id),
            lines,
            money(self.total)?,
            self.created_at,
        )
        .map_err(|e| corrupt("orders", e))
    }
}

#[derive(Debug)]
struct OrderLineRow {
    order_id: Uuid,
    product_id: Uuid,
    quantity: i64,
    unit_price: i64,
}

impl<'r> FromRow<'r, PgRow> for OrderLineRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(OrderLineRow {
            order_id: row.try_get("order_id")?,
            product_id: row.try_get("product_id")?,
            quantity: row.try_get("quantity")?,
            unit_price: row.try_get("unit_price")?,
        })
    }
}

impl TryFrom<OrderLineRow> for OrderLine {
    type Error = StoreError;

    fn try_from(row: OrderLineRow) -> Result<Self, Self::Error> {
        Ok(OrderLine {
            product_id: ProductId::from_uuid(row.product_id),
            quantity: Quantity::new(row.quantity).map_err(|e| corrupt("order_lines", e))?,
            unit_price: money(row.unit_price)?,
        })
    }
}
