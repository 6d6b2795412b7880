use std::str::FromStr;

use axum::http::StatusCode;
use serde::Deserialize;

use pos_catalog::{CreateProduct, Customer, Product, UpdateProduct};
use pos_core::{CustomerId, DomainError, Money, ProductId, Quantity};
use pos_sales::{CreateOrder, LineRequest, Order, OrderError};

use crate::app::errors;

// -------------------------
// Request DTOs
// -------------------------

/// Body for product create and update. Prices are integer cents.
#[derive(Debug, Deserialize)]
pub struct ProductRequest {
    pub name: String,
    pub price: i64,
    pub stock: i64,
}

impl ProductRequest {
    fn parts(self) -> Result<(String, Money, i64), DomainError> {
        let price = Money::from_cents(self.price)?;
        Ok((self.name, price, self.stock))
    }

    pub fn into_create(self) -> Result<CreateProduct, DomainError> {
        let (name, price, stock) = self.parts()?;
        Ok(CreateProduct { name, price, stock })
    }

    pub fn into_update(self) -> Result<UpdateProduct, DomainError> {
        let (name, price, stock) = self.parts()?;
        Ok(UpdateProduct { name, price, stock })
    }
}

#[derive(Debug, Deserialize)]
pub struct OrderItemRequest {
    pub product_id: String,
    pub quantity: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub customer_id: String,
    pub items: Vec<OrderItemRequest>,
}

impl CreateOrderRequest {
    /// Parse ids and quantities; anything malformed is an `InvalidRequest`.
    pub fn into_command(self) -> Result<CreateOrder, OrderError> {
        let customer_id = CustomerId::from_str(&self.customer_id)?;
        let items = self
            .items
            .into_iter()
            .enumerate()
            .map(|(idx, item)| -> Result<LineRequest, OrderError> {
                let product_id = ProductId::from_str(&item.product_id)?;
                let quantity = Quantity::new(item.quantity)
                    .map_err(|_| OrderError::invalid(format!("items[{idx}]: quantity must be positive")))?;
                Ok(LineRequest { product_id, quantity })
            })
            .collect::<Result<Vec<_>, OrderError>>()?;

        let cmd = CreateOrder { customer_id, items };
        cmd.validate()?;
        Ok(cmd)
    }
}

// -------------------------
// JSON mapping helpers
// -------------------------

pub fn product_to_json(p: Product) -> serde_json::Value {
    serde_json::json!({
        "id": p.id.to_string(),
        "name": p.name,
        "price": p.price.cents(),
        "stock": p.stock,
        "created_at": p.created_at.to_rfc3339(),
    })
}

pub fn customer_to_json(c: Customer) -> serde_json::Value {
    serde_json::json!({
        "id": c.id.to_string(),
        "name": c.name,
        "contact": {
            "email": c.contact.email,
            "phone": c.contact.phone,
        },
        "created_at": c.created_at.to_rfc3339(),
    })
}

pub fn order_to_json(o: &Order) -> serde_json::Value {
    let lines = o
        .lines()
        .iter()
        .map(|l| {
            serde_json::json!({
                "product_id": l.product_id.to_string(),
                "quantity": l.quantity.get(),
                "unit_price": l.unit_price.cents(),
            })
        })
        .collect::<Vec<_>>();

    serde_json::json!({
        "id": o.id().to_string(),
        "customer_id": o.customer_id().to_string(),
        "lines": lines,
        "total": o.total().cents(),
        "total_display": o.total().to_string(),
        "created_at": o.created_at().to_rfc3339(),
    })
}

/// Parse a path id, answering 400 with `label` on failure.
pub fn parse_id<T>(raw: &str, label: &'static str) -> Result<T, axum::response::Response>
where
    T: FromStr,
{
    raw.parse()
        .map_err(|_| errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", format!("invalid {label} id")))
}
