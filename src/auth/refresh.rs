//! Rotating refresh tokens
//!
//! Raw tokens are 48 random bytes in base64url. Only their SHA-256 is
//! stored, and the raw value is returned exactly once. Redeeming revokes
//! the presented token with a compare-and-set before minting a successor,
//! so two concurrent redeems can never both succeed. A crash between the
//! revoke and the insert leaves the caller without a valid token, which
//! forces re-authentication.
//!
//! Presenting an already-rotated token fails like any unknown token; the
//! rest of its chain is left alone.

use bson::DateTime;
use chrono::Duration;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::auth::jwt::TokenIssuer;
use crate::auth::pkce::random_urlsafe;
use crate::canonical::sha256_hex;
use crate::clock::Clock;
use crate::db::schemas::{Metadata, RefreshTokenDoc};
use crate::db::{IdentityStore, RefreshTokenStore};
use crate::types::CovenantError;

/// Refresh token lifetime in days
pub const REFRESH_TOKEN_TTL_DAYS: i64 = 30;

const RAW_TOKEN_BYTES: usize = 48;

/// A freshly issued refresh token
#[derive(Clone)]
pub struct IssuedRefreshToken {
    pub id: String,
    /// Raw credential for the caller; never persisted
    pub raw: String,
}

impl fmt::Debug for IssuedRefreshToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssuedRefreshToken")
            .field("id", &self.id)
            .field("raw", &"[REDACTED]")
            .finish()
    }
}

/// Result of a successful redeem
#[derive(Debug, Clone)]
pub struct RotatedSession {
    pub tenant_id: String,
    pub user_id: String,
    pub refresh: IssuedRefreshToken,
    pub access_token: String,
}

#[derive(Clone)]
pub struct RefreshTokenManager {
    tokens: Arc<dyn RefreshTokenStore>,
    identities: Arc<dyn IdentityStore>,
    issuer: TokenIssuer,
    clock: Arc<dyn Clock>,
}

impl RefreshTokenManager {
    pub fn new(
        tokens: Arc<dyn RefreshTokenStore>,
        identities: Arc<dyn IdentityStore>,
        issuer: TokenIssuer,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            tokens,
            identities,
            issuer,
            clock,
        }
    }

    /// Issue a new refresh token for a tenant-scoped user
    pub async fn issue(
        &self,
        tenant_id: &str,
        user_id: &str,
        rotated_from: Option<&str>,
    ) -> Result<IssuedRefreshToken, CovenantError> {
        let raw = random_urlsafe(RAW_TOKEN_BYTES);
        let now = self.clock.now();
        let id = Uuid::new_v4().to_string();

        let doc = RefreshTokenDoc {
            id: id.clone(),
            metadata: Metadata::stamped(DateTime::from_chrono(now)),
            tenant_id: tenant_id.to_string(),
            user_id: user_id.to_string(),
            token_hash: sha256_hex(raw.as_bytes()),
            expires_at: DateTime::from_chrono(now + Duration::days(REFRESH_TOKEN_TTL_DAYS)),
            revoked_at: None,
            rotated_from: rotated_from.map(str::to_string),
        };
        self.tokens.insert_refresh_token(doc).await?;

        debug!(token_id = %id, user_id, "Issued refresh token");
        Ok(IssuedRefreshToken { id, raw })
    }

    /// Exchange a refresh token for a successor and a new access token
    pub async fn redeem(&self, raw: &str) -> Result<RotatedSession, CovenantError> {
        if raw.is_empty() {
            return Err(CovenantError::MissingRefresh);
        }

        let now = DateTime::from_chrono(self.clock.now());
        let token_hash = sha256_hex(raw.as_bytes());

        let Some(current) = self
            .tokens
            .find_active_refresh_token(&token_hash, now)
            .await?
        else {
            debug!("Refresh token unknown, revoked or expired");
            return Err(CovenantError::InvalidRefresh);
        };

        let Some(user) = self.identities.find_user(&current.user_id).await? else {
            debug!(token_id = %current.id, "Refresh token owner no longer exists");
            return Err(CovenantError::InvalidRefresh);
        };

        // Only the caller that flips revoked_at mints a successor
        if !self.tokens.revoke_refresh_token(&current.id, now).await? {
            debug!(token_id = %current.id, "Lost refresh rotation race");
            return Err(CovenantError::InvalidRefresh);
        }

        let refresh = self
            .issue(&current.tenant_id, &current.user_id, Some(&current.id))
            .await?;
        let access_token =
            self.issuer
                .sign(&current.user_id, Some(&current.tenant_id), user.role)?;

        Ok(RotatedSession {
            tenant_id: current.tenant_id,
            user_id: current.user_id,
            refresh,
            access_token,
        })
    }

    /// Revoke a token if it is still active.
    ///
    /// Unknown, already revoked and empty tokens are a no-op, and storage
    /// errors are logged rather than returned: logout always succeeds.
    pub async fn revoke(&self, raw: Option<&str>) {
        let Some(raw) = raw.filter(|r| !r.is_empty()) else {
            return;
        };

        let now = DateTime::from_chrono(self.clock.now());
        if let Err(err) = self
            .tokens
            .revoke_refresh_token_by_hash(&sha256_hex(raw.as_bytes()), now)
            .await
        {
            warn!(error = %err, "Failed to revoke refresh token");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use crate::clock::ManualClock;
    use crate::db::schemas::UserDoc;
    use crate::db::MemoryStore;
    use chrono::Utc;

    async fn setup() -> (RefreshTokenManager, Arc<MemoryStore>, Arc<ManualClock>) {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let issuer = TokenIssuer::new(&"s".repeat(32), clock.clone()).unwrap();
        store
            .insert_user(UserDoc {
                id: "u1".into(),
                metadata: Metadata::default(),
                tenant_id: "t1".into(),
                email: "a@example.com".into(),
                password_hash: "scrypt$x".into(),
                role: Role::Owner,
            })
            .await
            .unwrap();
        let manager = RefreshTokenManager::new(store.clone(), store.clone(), issuer, clock.clone());
        (manager, store, clock)
    }

    #[tokio::test]
    async fn test_raw_token_is_never_stored() {
        let (manager, store, _) = setup().await;
        let issued = manager.issue("t1", "u1", None).await.unwrap();

        let rows = store.refresh_tokens().await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].token_hash, sha256_hex(issued.raw.as_bytes()));
        assert_ne!(rows[0].token_hash, issued.raw);
        assert!(!format!("{:?}", issued).contains(&issued.raw));
    }

    #[tokio::test]
    async fn test_redeem_rotates() {
        let (manager, store, _) = setup().await;
        let first = manager.issue("t1", "u1", None).await.unwrap();

        let rotated = manager.redeem(&first.raw).await.unwrap();
        assert_ne!(rotated.refresh.raw, first.raw);
        assert!(!rotated.access_token.is_empty());

        let rows = store.refresh_tokens().await;
        let old = rows.iter().find(|r| r.id == first.id).unwrap();
        let new = rows.iter().find(|r| r.id == rotated.refresh.id).unwrap();
        assert!(old.revoked_at.is_some());
        assert!(new.revoked_at.is_none());
        assert_eq!(new.rotated_from.as_deref(), Some(first.id.as_str()));

        assert!(matches!(
            manager.redeem(&first.raw).await,
            Err(CovenantError::InvalidRefresh)
        ));
        assert!(manager.redeem(&rotated.refresh.raw).await.is_ok());
    }

    #[tokio::test]
    async fn test_expired_token_is_invalid() {
        let (manager, _, clock) = setup().await;
        let issued = manager.issue("t1", "u1", None).await.unwrap();

        clock.advance(Duration::days(REFRESH_TOKEN_TTL_DAYS) + Duration::seconds(1));
        assert!(matches!(
            manager.redeem(&issued.raw).await,
            Err(CovenantError::InvalidRefresh)
        ));
    }

    #[tokio::test]
    async fn test_empty_token_is_missing() {
        let (manager, _, _) = setup().await;
        assert!(matches!(
            manager.redeem("").await,
            Err(CovenantError::MissingRefresh)
        ));
    }

    #[tokio::test]
    async fn test_revoke_is_idempotent() {
        let (manager, _, _) = setup().await;
        let issued = manager.issue("t1", "u1", None).await.unwrap();

        manager.revoke(Some(&issued.raw)).await;
        manager.revoke(Some(&issued.raw)).await;
        manager.revoke(Some("never-issued")).await;
        manager.revoke(None).await;

        assert!(matches!(
            manager.redeem(&issued.raw).await,
            Err(CovenantError::InvalidRefresh)
        ));
    }

    #[tokio::test]
    async fn test_concurrent_redeem_has_one_winner() {
        let (manager, _, _) = setup().await;
        let issued = manager.issue("t1", "u1", None).await.unwrap();

        let (a, b) = tokio::join!(manager.redeem(&issued.raw), manager.redeem(&issued.raw));
        assert_eq!(a.is_ok() as u8 + b.is_ok() as u8, 1);
    }
}
