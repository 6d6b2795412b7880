//! Order creation error taxonomy.

use thiserror::Error;

use pos_core::{CustomerId, DomainError, ProductId};

/// Every failure an order-creation request can end in.
///
/// Each variant is scoped to a single request; none of them is fatal to the
/// process. Store-level failures are classified into these kinds at the
/// infrastructure boundary so callers never see a raw driver error.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OrderError {
    /// The referenced customer does not exist. No stock was touched.
    #[error("customer {0} not found")]
    CustomerNotFound(CustomerId),

    /// A requested line references a product that does not exist.
    #[error("product {0} not found")]
    ProductNotFound(ProductId),

    /// A requested line asks for more units than are available.
    #[error("insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: ProductId,
        requested: i64,
        available: i64,
    },

    /// The request itself is malformed (empty line list, bad quantity, overflow).
    #[error("invalid order request: {0}")]
    InvalidRequest(String),

    /// The store rejected or failed the atomic commit.
    ///
    /// `transient` marks failures (lock timeout, deadlock, lost connection)
    /// where retrying the whole request may succeed.
    #[error("persistence failure: {message}")]
    PersistenceFailure { message: String, transient: bool },
}

impl OrderError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    pub fn persistence(msg: impl Into<String>) -> Self {
        Self::PersistenceFailure {
            message: msg.into(),
            transient: false,
        }
    }

    pub fn transient(msg: impl Into<String>) -> Self {
        Self::PersistenceFailure {
            message: msg.into(),
            transient: true,
        }
    }

    /// Stable machine-readable code, used in HTTP error bodies and logs.
    pub fn code(&self) -> &'static str {
        match self {
            OrderError::CustomerNotFound(_) => "customer_not_found",
            OrderError::ProductNotFound(_) => "product_not_found",
            OrderError::InsufficientStock { .. } => "insufficient_stock",
            OrderError::InvalidRequest(_) => "invalid_request",
            OrderError::PersistenceFailure { .. } => "persistence_failure",
        }
    }

    /// Business rejections caused by the request, as opposed to store faults.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, OrderError::PersistenceFailure { .. })
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, OrderError::PersistenceFailure { transient: true, .. })
    }
}

impl From<DomainError> for OrderError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => OrderError::InvalidRequest(msg),
            other => OrderError::InvalidRequest(other.to_string()),
        }
    }
}
