use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use pos_core::{DomainError, DomainResult, Money, ProductId};

/// Catalog product: current price and available stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    /// Current unit price. Order lines copy this at reservation time.
    pub price: Money,
    /// Units available for sale. Never negative.
    pub stock: i64,
    pub created_at: DateTime<Utc>,
}

impl Product {
    /// Replace name, price and stock with validated values from `cmd`.
    pub fn apply_update(&mut self, cmd: &UpdateProduct) -> DomainResult<()> {
        cmd.validate()?;
        self.name = cmd.name.trim().to_string();
        self.price = cmd.price;
        self.stock = cmd.stock;
        Ok(())
    }
}

/// Command: CreateProduct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateProduct {
    pub name: String,
    pub price: Money,
    pub stock: i64,
}

impl CreateProduct {
    pub fn validate(&self) -> DomainResult<()> {
        validate_fields(&self.name, self.stock)
    }

    /// Validate and materialize the record.
    pub fn into_product(self, id: ProductId, created_at: DateTime<Utc>) -> DomainResult<Product> {
        self.validate()?;
        Ok(Product {
            id,
            name: self.name.trim().to_string(),
            price: self.price,
            stock: self.stock,
            created_at,
        })
    }
}

/// Command: UpdateProduct (full replacement of the editable fields).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateProduct {
    pub name: String,
    pub price: Money,
    pub stock: i64,
}

impl UpdateProduct {
    pub fn validate(&self) -> DomainResult<()> {
        validate_fields(&self.name, self.stock)
    }
}

fn validate_fields(name: &str, stock: i64) -> DomainResult<()> {
    if name.trim().is_empty() {
        return Err(DomainError::validation("name cannot be empty"));
    }
    if stock < 0 {
        return Err(DomainError::validation("stock cannot be negative"));
    }
    Ok(())
}
