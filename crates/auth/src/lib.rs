//! `pos-auth`: bearer-token verification and role-based authorization.
//!
//! Verifies bearer tokens and answers permission checks. Decoupled from HTTP
//! and storage; token issuance happens elsewhere.

pub mod authorize;
pub mod claims;
pub mod jwt;
pub mod permissions;
pub mod principal;
pub mod roles;

pub use authorize::{authorize, AuthzError, Principal};
pub use claims::{JwtClaims, TokenValidationError, validate_claims};
pub use jwt::{Hs256JwtValidator, JwtError, JwtValidator};
pub use permissions::Permission;
pub use principal::PrincipalId;
pub use roles::Role;
