use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use crate::Permission;

/// Role identifier used for RBAC.
///
/// Roles are opaque strings on the wire; [`Role::permissions`] is the static
/// policy mapping them to what they may do.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(Cow<'static, str>);

impl Role {
    pub const ADMIN: &'static str = "admin";
    pub const CASHIER: &'static str = "cashier";

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn admin() -> Self {
        Self::new(Self::ADMIN)
    }

    pub fn cashier() -> Self {
        Self::new(Self::CASHIER)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Permissions granted by this role. Unknown roles grant nothing.
    pub fn permissions(&self) -> Vec<Permission> {
        match self.as_str() {
            Self::ADMIN => vec![Permission::new(Permission::WILDCARD)],
            Self::CASHIER => vec![
                Permission::new(Permission::ORDERS_CREATE),
                Permission::new(Permission::ORDERS_READ),
                Permission::new(Permission::PRODUCTS_READ),
                Permission::new(Permission::CUSTOMERS_READ),
                Permission::new(Permission::CUSTOMERS_WRITE),
            ],
            _ => Vec::new(),
        }
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
