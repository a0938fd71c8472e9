//! Registration and login
//!
//! Two tenancy paths share these endpoints:
//! - public customers (no tenant slug, or the configured public slug) are
//!   stored in the public tenant, receive a token with a null `tenantId`,
//!   and get no refresh token
//! - tenant-scoped users; only the first user of a tenant may
//!   self-register and becomes its owner

use bson::DateTime;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::audit::AuditLog;
use crate::auth::jwt::TokenIssuer;
use crate::auth::password::{hash_password, verify_password};
use crate::auth::refresh::{IssuedRefreshToken, RefreshTokenManager};
use crate::auth::Role;
use crate::clock::Clock;
use crate::db::schemas::{Metadata, TenantDoc, UserDoc};
use crate::db::IdentityStore;
use crate::types::CovenantError;

/// Slug used when a request names no tenant
pub const DEFAULT_PUBLIC_TENANT_SLUG: &str = "public";

const PUBLIC_TENANT_NAME: &str = "Public Customers";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[serde(default)]
    pub tenant_slug: Option<String>,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    #[serde(default)]
    pub tenant_slug: Option<String>,
    pub email: String,
    pub password: String,
}

/// Tokens handed back after register, login or refresh
#[derive(Debug, Clone)]
pub struct SessionTokens {
    pub access_token: String,
    /// Absent for public customers
    pub refresh: Option<IssuedRefreshToken>,
}

#[derive(Clone)]
pub struct AccountService {
    identities: Arc<dyn IdentityStore>,
    refresh: RefreshTokenManager,
    issuer: TokenIssuer,
    audit: AuditLog,
    clock: Arc<dyn Clock>,
    public_tenant_slug: String,
}

impl AccountService {
    pub fn new(
        identities: Arc<dyn IdentityStore>,
        refresh: RefreshTokenManager,
        issuer: TokenIssuer,
        audit: AuditLog,
        clock: Arc<dyn Clock>,
        public_tenant_slug: impl Into<String>,
    ) -> Self {
        Self {
            identities,
            refresh,
            issuer,
            audit,
            clock,
            public_tenant_slug: public_tenant_slug.into(),
        }
    }

    pub fn refresh_tokens(&self) -> &RefreshTokenManager {
        &self.refresh
    }

    pub async fn register(&self, req: RegisterRequest) -> Result<SessionTokens, CovenantError> {
        let email = normalize_email(&req.email)?;
        validate_password(&req.password, 8)?;
        let slug = self.resolve_slug(req.tenant_slug.as_deref())?;
        let password_hash = hash_password_blocking(req.password).await?;

        if slug == self.public_tenant_slug {
            let tenant = self.ensure_public_tenant().await?;
            if self
                .identities
                .find_user_by_email_any_tenant(&email)
                .await?
                .is_some()
            {
                return Err(CovenantError::UserConflict);
            }

            let user = self.new_user(&tenant.id, email, password_hash, Role::Member);
            self.insert_user(user.clone()).await?;
            info!(user_id = %user.id, "Registered public customer");

            let access_token = self.issuer.sign(&user.id, None, user.role)?;
            return Ok(SessionTokens {
                access_token,
                refresh: None,
            });
        }

        let tenant = self
            .identities
            .find_tenant_by_slug(&slug)
            .await?
            .ok_or(CovenantError::TenantNotFound)?;

        // Self-registration is only open to a tenant's first user
        if self.identities.count_users(&tenant.id).await? > 0 {
            return Err(CovenantError::RegistrationClosed);
        }

        let user = self.new_user(&tenant.id, email, password_hash, Role::Owner);
        self.insert_user(user.clone()).await?;
        info!(user_id = %user.id, tenant_id = %tenant.id, "Registered tenant owner");

        self.audit
            .record("user.register", Some(&tenant.id), Some(&user.id), Value::Null)
            .await;

        self.tenant_session(&tenant.id, &user).await
    }

    pub async fn login(&self, req: LoginRequest) -> Result<SessionTokens, CovenantError> {
        let email = normalize_email(&req.email)?;
        validate_password(&req.password, 1)?;
        let slug = self.resolve_slug(req.tenant_slug.as_deref())?;

        if slug == self.public_tenant_slug {
            let user = self
                .identities
                .find_user_by_email_any_tenant(&email)
                .await?
                .ok_or(CovenantError::InvalidCredentials)?;
            if !check_password_blocking(&req.password, &user.password_hash).await? {
                return Err(CovenantError::InvalidCredentials);
            }

            let public_tenant = self
                .identities
                .find_tenant_by_slug(&self.public_tenant_slug)
                .await?;
            let is_public_customer = public_tenant.is_some_and(|t| t.id == user.tenant_id);

            if is_public_customer {
                let access_token = self.issuer.sign(&user.id, None, user.role)?;
                return Ok(SessionTokens {
                    access_token,
                    refresh: None,
                });
            }

            let session = self.tenant_session(&user.tenant_id, &user).await?;
            self.audit
                .record("user.login", Some(&user.tenant_id), Some(&user.id), Value::Null)
                .await;
            return Ok(session);
        }

        let user = self.authenticate(&slug, &email, &req.password).await?;
        let session = self.tenant_session(&user.tenant_id, &user).await?;
        self.audit
            .record("user.login", Some(&user.tenant_id), Some(&user.id), Value::Null)
            .await;
        Ok(session)
    }

    /// Verify tenant-scoped credentials.
    ///
    /// `email` must already be lower-cased.
    pub async fn authenticate(
        &self,
        tenant_slug: &str,
        email: &str,
        password: &str,
    ) -> Result<UserDoc, CovenantError> {
        let tenant = self
            .identities
            .find_tenant_by_slug(tenant_slug)
            .await?
            .ok_or(CovenantError::TenantNotFound)?;

        let user = self
            .identities
            .find_user_by_email(&tenant.id, email)
            .await?
            .ok_or(CovenantError::InvalidCredentials)?;

        if !check_password_blocking(password, &user.password_hash).await? {
            debug!(user_id = %user.id, "Password mismatch");
            return Err(CovenantError::InvalidCredentials);
        }
        Ok(user)
    }

    /// Rotate a refresh token
    pub async fn refresh(&self, raw: Option<&str>) -> Result<SessionTokens, CovenantError> {
        let raw = raw
            .filter(|r| !r.is_empty())
            .ok_or(CovenantError::MissingRefresh)?;
        let rotated = self.refresh.redeem(raw).await?;

        self.audit
            .record(
                "user.token.refresh",
                Some(&rotated.tenant_id),
                Some(&rotated.user_id),
                json!({ "rotated_to": rotated.refresh.id }),
            )
            .await;

        Ok(SessionTokens {
            access_token: rotated.access_token,
            refresh: Some(rotated.refresh),
        })
    }

    /// Revoke the presented refresh token. Always succeeds.
    pub async fn logout(&self, raw: Option<&str>) {
        self.refresh.revoke(raw).await;
    }

    fn resolve_slug(&self, requested: Option<&str>) -> Result<String, CovenantError> {
        match requested.map(str::trim).filter(|s| !s.is_empty()) {
            None => Ok(self.public_tenant_slug.clone()),
            Some(slug) if (3..=50).contains(&slug.len()) => Ok(slug.to_string()),
            Some(_) => Err(CovenantError::InvalidRequest(
                "tenantSlug must be 3-50 characters".into(),
            )),
        }
    }

    async fn tenant_session(
        &self,
        tenant_id: &str,
        user: &UserDoc,
    ) -> Result<SessionTokens, CovenantError> {
        let access_token = self.issuer.sign(&user.id, Some(tenant_id), user.role)?;
        let refresh = self.refresh.issue(tenant_id, &user.id, None).await?;
        Ok(SessionTokens {
            access_token,
            refresh: Some(refresh),
        })
    }

    /// Find the public tenant, creating it on first use
    async fn ensure_public_tenant(&self) -> Result<TenantDoc, CovenantError> {
        if let Some(tenant) = self
            .identities
            .find_tenant_by_slug(&self.public_tenant_slug)
            .await?
        {
            return Ok(tenant);
        }

        let tenant = TenantDoc {
            id: Uuid::new_v4().to_string(),
            metadata: Metadata::stamped(self.now()),
            slug: self.public_tenant_slug.clone(),
            name: PUBLIC_TENANT_NAME.to_string(),
        };
        match self.identities.insert_tenant(tenant.clone()).await {
            Ok(()) => Ok(tenant),
            // Concurrent creation: use the committed row
            Err(err) if err.is_duplicate() => self
                .identities
                .find_tenant_by_slug(&self.public_tenant_slug)
                .await?
                .ok_or_else(|| CovenantError::Database(err.to_string())),
            Err(err) => Err(err.into()),
        }
    }

    fn new_user(&self, tenant_id: &str, email: String, password_hash: String, role: Role) -> UserDoc {
        UserDoc {
            id: Uuid::new_v4().to_string(),
            metadata: Metadata::stamped(self.now()),
            tenant_id: tenant_id.to_string(),
            email,
            password_hash,
            role,
        }
    }

    async fn insert_user(&self, user: UserDoc) -> Result<(), CovenantError> {
        self.identities.insert_user(user).await.map_err(|err| {
            if err.is_duplicate() {
                CovenantError::UserConflict
            } else {
                err.into()
            }
        })
    }

    fn now(&self) -> DateTime {
        DateTime::from_chrono(self.clock.now())
    }
}

/// Lower-case and minimally validate an email address
pub fn normalize_email(raw: &str) -> Result<String, CovenantError> {
    let email = raw.trim().to_lowercase();
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.')
                && !domain.ends_with('.') && !email.contains(char::is_whitespace)
        }
        None => false,
    };
    if !valid {
        return Err(CovenantError::InvalidRequest("invalid email".into()));
    }
    Ok(email)
}

fn validate_password(password: &str, min: usize) -> Result<(), CovenantError> {
    let len = password.chars().count();
    if len < min || len > 200 {
        return Err(CovenantError::InvalidRequest(format!(
            "password must be {}-200 characters",
            min
        )));
    }
    Ok(())
}

async fn hash_password_blocking(password: String) -> Result<String, CovenantError> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| CovenantError::Internal(format!("password task failed: {}", e)))?
}

/// scrypt is deliberately expensive; keep it off the async workers
pub(crate) async fn check_password_blocking(
    password: &str,
    stored: &str,
) -> Result<bool, CovenantError> {
    let (password, stored) = (password.to_string(), stored.to_string());
    tokio::task::spawn_blocking(move || verify_password(&password, &stored))
        .await
        .map_err(|e| CovenantError::Internal(format!("password task failed: {}", e)))
}
