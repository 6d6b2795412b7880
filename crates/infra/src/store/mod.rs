//! Storage boundary for catalog records and orders.
//!
//! The traits here are the stock ledger, catalog lookup and order store ports.
//! Two backends implement all of them: an in-memory store (dev/tests) and a
//! Postgres store (sqlx).

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::{InMemoryScope, InMemoryStore};
pub use postgres::{PostgresScope, PostgresStore};
pub use r#trait::{
    CatalogLookup, CatalogStore, FulfillmentStore, OrderReader, OrderScope, Reservation, StoreError,
};
