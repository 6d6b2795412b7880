use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Action a role may perform, named `resource.action` (e.g. "orders.create").
///
/// `"*"` grants every action.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    pub const WILDCARD: &'static str = "*";
    pub const ORDERS_CREATE: &'static str = "orders.create";
    pub const ORDERS_READ: &'static str = "orders.read";
    pub const PRODUCTS_READ: &'static str = "products.read";
    pub const PRODUCTS_WRITE: &'static str = "products.write";
    pub const CUSTOMERS_READ: &'static str = "customers.read";
    pub const CUSTOMERS_WRITE: &'static str = "customers.write";

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether holding `self` allows `required`.
    pub fn grants(&self, required: &Permission) -> bool {
        self.as_str() == Self::WILDCARD || self == required
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
