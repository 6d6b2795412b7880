//! Infrastructure layer: stores, the transaction coordinator, order assembly,
//! and configuration.

pub mod assembler;
pub mod config;
pub mod coordinator;
pub mod store;

pub use assembler::OrderAssembler;
pub use config::{AppConfig, ConfigError};
pub use coordinator::TransactionCoordinator;

#[cfg(test)]
mod integration_tests;
