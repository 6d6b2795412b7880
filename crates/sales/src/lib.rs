//! Sales orders domain module.
//!
//! Order records, the request shape accepted by order creation, the line/total
//! accumulator used while stock is being reserved, and the error taxonomy
//! surfaced to callers. Deterministic domain logic only (no IO, no storage).

pub mod error;
pub mod order;
pub mod phase;

pub use error::OrderError;
pub use order::{CreateOrder, LineRequest, Order, OrderDraft, OrderLine};
pub use phase::OrderPhase;
