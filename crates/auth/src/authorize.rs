use thiserror::Error;

use crate::{Permission, PrincipalId, Role};

/// A fully resolved principal for authorization decisions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub principal_id: PrincipalId,
    pub roles: Vec<Role>,
    pub permissions: Vec<Permission>,
}

impl Principal {
    /// Resolve effective permissions from the static role policy.
    pub fn from_roles(principal_id: PrincipalId, roles: Vec<Role>) -> Self {
        let permissions = roles.iter().flat_map(Role::permissions).collect();
        Self {
            principal_id,
            roles,
            permissions,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("forbidden: missing permission '{0}'")]
    Forbidden(String),
}

/// Authorize a principal for one permission.
///
/// Pure policy check: no IO, no panics.
pub fn authorize(principal: &Principal, required: &Permission) -> Result<(), AuthzError> {
    if principal.permissions.iter().any(|held| held.grants(required)) {
        Ok(())
    } else {
        Err(AuthzError::Forbidden(required.as_str().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_is_granted_everything() {
        let p = Principal::from_roles(PrincipalId::new(), vec![Role::admin()]);
        assert!(authorize(&p, &Permission::new(Permission::PRODUCTS_WRITE)).is_ok());
        assert!(authorize(&p, &Permission::new("anything.at_all")).is_ok());
    }

    #[test]
    fn cashier_can_sell_but_not_edit_catalog() {
        let p = Principal::from_roles(PrincipalId::new(), vec![Role::cashier()]);
        assert!(authorize(&p, &Permission::new(Permission::ORDERS_CREATE)).is_ok());
        assert_eq!(
            authorize(&p, &Permission::new(Permission::PRODUCTS_WRITE)),
            Err(AuthzError::Forbidden("products.write".to_string()))
        );
    }

    #[test]
    fn no_roles_no_access() {
        let p = Principal::from_roles(PrincipalId::new(), vec![]);
        assert!(authorize(&p, &Permission::new(Permission::ORDERS_READ)).is_err());
    }
}
