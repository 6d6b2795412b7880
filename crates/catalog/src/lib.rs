//! Catalog domain module: products and customers.
//!
//! Plain records plus the commands that create and edit them, with their
//! validation rules (no IO, no HTTP, no storage). Stock is only ever lowered
//! by the fulfillment stores' reservation primitive; catalog edits replace it
//! wholesale.

pub mod customer;
pub mod product;

pub use customer::{ContactInfo, CreateCustomer, Customer, UpdateCustomer};
pub use product::{CreateProduct, Product, UpdateProduct};
