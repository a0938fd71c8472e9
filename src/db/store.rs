//! Storage seams
//!
//! Services depend on these traits rather than on MongoDB directly so the
//! same protocol code runs over [`MongoStore`](super::MongoStore) in
//! production and [`MemoryStore`](super::MemoryStore) in dev mode and tests.
//!
//! Every backend must report unique-constraint violations as
//! [`StoreError::Duplicate`]; the permit, confirmation and signing-key
//! flows resolve races by catching it and re-reading.

use async_trait::async_trait;
use bson::DateTime;

use super::schemas::{
    AuditEventDoc, AuthCodeDoc, ConfirmationDoc, OidcClientDoc, PermitDoc, ProofDoc,
    RefreshTokenDoc, SigningKeyDoc, TenantDoc, UserDoc,
};

#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// A unique constraint rejected the write
    #[error("duplicate key: {0}")]
    Duplicate(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate(_))
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Permits, confirmations and proofs
#[async_trait]
pub trait PermitStore: Send + Sync {
    /// Insert a permit; `Duplicate` when (actor, tenant, command_key) exists
    async fn insert_permit(&self, permit: PermitDoc) -> StoreResult<()>;

    async fn find_permit(&self, permit_id: &str) -> StoreResult<Option<PermitDoc>>;

    async fn find_permit_by_command(
        &self,
        actor_id: &str,
        tenant_id: &str,
        command_key: &str,
    ) -> StoreResult<Option<PermitDoc>>;

    async fn find_confirmation(&self, permit_id: &str) -> StoreResult<Option<ConfirmationDoc>>;

    /// Insert the proof and its confirmation as one atomic unit.
    ///
    /// Either both rows commit or neither does. `Duplicate` when the permit
    /// already has a confirmation.
    async fn record_confirmation(
        &self,
        proof: ProofDoc,
        confirmation: ConfirmationDoc,
    ) -> StoreResult<()>;

    /// Proofs for (tenant, world), newest first, strictly older than `before`
    async fn list_proofs(
        &self,
        tenant_id: &str,
        world: &str,
        before: Option<DateTime>,
        limit: usize,
    ) -> StoreResult<Vec<ProofDoc>>;
}

/// Hashed refresh tokens
#[async_trait]
pub trait RefreshTokenStore: Send + Sync {
    async fn insert_refresh_token(&self, token: RefreshTokenDoc) -> StoreResult<()>;

    /// Unrevoked token with this hash whose expiry is after `now`
    async fn find_active_refresh_token(
        &self,
        token_hash: &str,
        now: DateTime,
    ) -> StoreResult<Option<RefreshTokenDoc>>;

    /// Compare-and-set revoke by id. Returns true only for the caller that
    /// flipped `revoked_at` from null.
    async fn revoke_refresh_token(&self, id: &str, at: DateTime) -> StoreResult<bool>;

    /// Revoke by hash if still active. Returns true if a row changed.
    async fn revoke_refresh_token_by_hash(&self, token_hash: &str, at: DateTime)
        -> StoreResult<bool>;
}

/// One-time OIDC authorization codes
#[async_trait]
pub trait AuthCodeStore: Send + Sync {
    async fn insert_auth_code(&self, code: AuthCodeDoc) -> StoreResult<()>;

    /// Atomically read and delete a code
    async fn take_auth_code(&self, code: &str) -> StoreResult<Option<AuthCodeDoc>>;
}

/// Persistent RSA signing keys
#[async_trait]
pub trait SigningKeyRepository: Send + Sync {
    async fn find_active_signing_key(&self) -> StoreResult<Option<SigningKeyDoc>>;

    /// `Duplicate` when another active key already exists
    async fn insert_signing_key(&self, key: SigningKeyDoc) -> StoreResult<()>;
}

/// Tenants, users and OIDC clients
#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn find_tenant_by_slug(&self, slug: &str) -> StoreResult<Option<TenantDoc>>;

    async fn insert_tenant(&self, tenant: TenantDoc) -> StoreResult<()>;

    async fn find_user(&self, user_id: &str) -> StoreResult<Option<UserDoc>>;

    async fn find_user_by_email(&self, tenant_id: &str, email: &str)
        -> StoreResult<Option<UserDoc>>;

    /// First user with this email in any tenant
    async fn find_user_by_email_any_tenant(&self, email: &str) -> StoreResult<Option<UserDoc>>;

    async fn count_users(&self, tenant_id: &str) -> StoreResult<u64>;

    async fn insert_user(&self, user: UserDoc) -> StoreResult<()>;

    async fn find_oidc_client(&self, client_id: &str) -> StoreResult<Option<OidcClientDoc>>;

    async fn insert_oidc_client(&self, client: OidcClientDoc) -> StoreResult<()>;
}

#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn insert_audit_event(&self, event: AuditEventDoc) -> StoreResult<()>;
}

/// Readiness probe
#[async_trait]
pub trait StoreHealth: Send + Sync {
    async fn ping(&self) -> StoreResult<()>;
}

/// Everything a complete backend provides
pub trait Store:
    PermitStore
    + RefreshTokenStore
    + AuthCodeStore
    + SigningKeyRepository
    + IdentityStore
    + AuditStore
    + StoreHealth
{
}

impl<T> Store for T where
    T: PermitStore
        + RefreshTokenStore
        + AuthCodeStore
        + SigningKeyRepository
        + IdentityStore
        + AuditStore
        + StoreHealth
{
}
