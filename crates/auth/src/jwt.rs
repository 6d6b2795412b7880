//! Bearer token verification.

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use thiserror::Error;

use crate::claims::{JwtClaims, TokenValidationError, validate_claims};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum JwtError {
    /// Signature, encoding or claim-shape failure.
    #[error("malformed or unsigned token: {0}")]
    Malformed(String),

    #[error(transparent)]
    Claims(#[from] TokenValidationError),
}

/// Verifies a raw bearer token and yields its claims.
pub trait JwtValidator: Send + Sync {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<JwtClaims, JwtError>;
}

/// HMAC-SHA256 validator with a shared secret.
pub struct Hs256JwtValidator {
    key: DecodingKey,
    validation: Validation,
}

impl Hs256JwtValidator {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // The time window is checked against the caller's clock in `validate_claims`.
        validation.validate_exp = false;
        validation.leeway = 0;
        Self {
            key: DecodingKey::from_secret(secret.as_ref()),
            validation,
        }
    }
}

impl JwtValidator for Hs256JwtValidator {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<JwtClaims, JwtError> {
        let data = decode::<JwtClaims>(token, &self.key, &self.validation).map_err(|e| {
            tracing::debug!(error = %e, "jwt decode failed");
            JwtError::Malformed(e.to_string())
        })?;
        validate_claims(&data.claims, now)?;
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{PrincipalId, Role};
    use chrono::Duration;
    use jsonwebtoken::{EncodingKey, Header, encode};

    fn mint(secret: &str, claims: &JwtClaims) -> String {
        encode(
            &Header::new(Algorithm::HS256),
            claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn accepts_token_signed_with_same_secret() {
        let now = Utc::now();
        let claims = JwtClaims::new(PrincipalId::new(), Role::admin(), now, now + Duration::minutes(5));
        let token = mint("s3cret", &claims);

        let v = Hs256JwtValidator::new("s3cret");
        assert_eq!(v.validate(&token, now).unwrap(), claims);
    }

    #[test]
    fn rejects_wrong_secret() {
        let now = Utc::now();
        let claims = JwtClaims::new(PrincipalId::new(), Role::admin(), now, now + Duration::minutes(5));
        let token = mint("other", &claims);

        let v = Hs256JwtValidator::new("s3cret");
        assert!(matches!(v.validate(&token, now), Err(JwtError::Malformed(_))));
    }

    #[test]
    fn rejects_expired_token() {
        let issued = Utc::now() - Duration::hours(1);
        let claims = JwtClaims::new(PrincipalId::new(), Role::cashier(), issued, issued + Duration::minutes(5));
        let token = mint("s3cret", &claims);

        let v = Hs256JwtValidator::new("s3cret");
        assert_eq!(
            v.validate(&token, Utc::now()),
            Err(JwtError::Claims(TokenValidationError::Expired))
        );
    }

    #[test]
    fn rejects_garbage() {
        let v = Hs256JwtValidator::new("s3cret");
        assert!(v.validate("not.a.jwt", Utc::now()).is_err());
    }
}
