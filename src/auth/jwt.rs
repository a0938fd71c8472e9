//! Access token issuing and verification
//!
//! Security notes:
//! - Tokens are signed with HS256 (HMAC-SHA256) and live 15 minutes
//! - The secret must be at least 32 characters; a weaker one is a
//!   deployment error and fails at startup
//! - Verification failures collapse into one opaque error for callers;
//!   the specific cause is only logged at debug level

use chrono::Duration;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::auth::Role;
use crate::clock::Clock;
use crate::types::CovenantError;

/// Access token lifetime in seconds
pub const ACCESS_TOKEN_TTL_SECS: i64 = 15 * 60;

/// Minimum JWT secret length in characters
pub const MIN_SECRET_LEN: usize = 32;

/// Payload stored in an access token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessClaims {
    /// User id
    pub sub: String,
    /// Null for public customers
    #[serde(rename = "tenantId")]
    pub tenant_id: Option<String>,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
}

/// Signs and verifies HS256 access tokens
#[derive(Clone)]
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl TokenIssuer {
    /// Create an issuer.
    ///
    /// Returns an error if the secret is empty or too short
    pub fn new(secret: &str, clock: Arc<dyn Clock>) -> Result<Self, CovenantError> {
        if secret.is_empty() {
            return Err(CovenantError::Config("JWT_SECRET is required".into()));
        }
        if secret.chars().count() < MIN_SECRET_LEN {
            return Err(CovenantError::Config(format!(
                "JWT_SECRET must be at least {} characters",
                MIN_SECRET_LEN
            )));
        }

        Ok(Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl: Duration::seconds(ACCESS_TOKEN_TTL_SECS),
            clock,
        })
    }

    pub fn ttl_secs(&self) -> i64 {
        self.ttl.num_seconds()
    }

    /// Sign an access token for a user
    pub fn sign(
        &self,
        user_id: &str,
        tenant_id: Option<&str>,
        role: Role,
    ) -> Result<String, CovenantError> {
        let now = self.clock.now().timestamp();
        let claims = AccessClaims {
            sub: user_id.to_string(),
            tenant_id: tenant_id.map(str::to_string),
            role,
            iat: now,
            exp: now + self.ttl.num_seconds(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| CovenantError::Internal(format!("Failed to sign access token: {}", e)))
    }

    /// Verify signature and expiry
    pub fn verify(&self, token: &str) -> Result<AccessClaims, CovenantError> {
        // Expiry is checked against the injected clock below
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        let claims = match decode::<AccessClaims>(token, &self.decoding, &validation) {
            Ok(data) => data.claims,
            Err(err) => {
                debug!(cause = ?err.kind(), "Access token rejected");
                return Err(CovenantError::InvalidToken);
            }
        };

        if claims.exp <= self.clock.now().timestamp() {
            debug!(cause = "expired", "Access token rejected");
            return Err(CovenantError::InvalidToken);
        }

        Ok(claims)
    }
}

/// Extract a bearer token from an Authorization header value.
///
/// The scheme is matched case-insensitively.
pub fn extract_bearer(auth_header: Option<&str>) -> Option<&str> {
    let header = auth_header?.trim();
    let (scheme, token) = header.split_once(char::is_whitespace)?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}
