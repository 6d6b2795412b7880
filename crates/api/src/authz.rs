//! API-side authorization guard.
//!
//! Routes call this before touching any service, so the core and the stores
//! stay auth-agnostic.

use pos_auth::{AuthzError, Permission, Principal, authorize};

use crate::context::PrincipalContext;

/// Check that the request's principal holds `permission`.
pub fn authorize_action(principal: &PrincipalContext, permission: &'static str) -> Result<(), AuthzError> {
    let resolved = Principal::from_roles(principal.principal_id(), principal.roles().to_vec());
    authorize(&resolved, &Permission::new(permission)).inspect_err(|_| {
        tracing::info!(
            principal_id = %principal.principal_id(),
            permission,
            "action forbidden"
        );
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pos_auth::{PrincipalId, Role};

    #[test]
    fn cashier_may_create_orders_but_not_products() {
        let ctx = PrincipalContext::new(PrincipalId::new(), vec![Role::cashier()]);
        assert!(authorize_action(&ctx, Permission::ORDERS_CREATE).is_ok());
        assert!(authorize_action(&ctx, Permission::PRODUCTS_WRITE).is_err());
    }

    #[test]
    fn admin_may_do_anything() {
        let ctx = PrincipalContext::new(PrincipalId::new(), vec![Role::admin()]);
        assert!(authorize_action(&ctx, Permission::PRODUCTS_WRITE).is_ok());
        assert!(authorize_action(&ctx, Permission::CUSTOMERS_WRITE).is_ok());
    }
}
