//! `pos-core`: domain primitives shared by the catalog and sales crates.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! identifiers, money, quantities and the shared domain error.

pub mod error;
pub mod id;
pub mod money;

pub use error::{DomainError, DomainResult};
pub use id::{CustomerId, OrderId, ProductId};
pub use money::{Money, Quantity};
