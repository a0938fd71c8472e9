//! OIDC authorization code + PKCE exchange
//!
//! Per authorization attempt:
//! `issued` (code stored, bound to the PKCE challenge) → `redeemed` or
//! `rejected`. The code is removed by the first exchange attempt that finds
//! it, whatever the outcome, so a code can never be tried twice.

use bson::DateTime;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use crate::auth::accounts::normalize_email;
use crate::auth::pkce::{random_urlsafe, verify_s256};
use crate::auth::{extract_bearer, AccountService, Role, TokenIssuer};
use crate::clock::Clock;
use crate::db::schemas::{AuthCodeDoc, Metadata, DEFAULT_SCOPE, PKCE_METHOD_S256};
use crate::db::{AuthCodeStore, IdentityStore};
use crate::oidc::clients::OidcClientRegistry;
use crate::oidc::signing_key::SigningKeyStore;
use crate::types::CovenantError;
use crate::world::WorldGuard;

/// Authorization code lifetime in minutes
pub const AUTH_CODE_TTL_MINUTES: i64 = 5;

const CODE_BYTES: usize = 32;
const MIN_CHALLENGE_LEN: usize = 20;
const MIN_VERIFIER_LEN: usize = 20;
const MIN_CODE_LEN: usize = 8;

/// Query parameters of `GET /authorize`, also embedded in the credential post
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AuthorizeParams {
    pub response_type: String,
    pub client_id: String,
    pub redirect_uri: String,
    pub scope: Option<String>,
    pub state: String,
    pub code_challenge: String,
    pub code_challenge_method: String,
    pub world: String,
}

/// Body of `POST /oidc/authorize`
#[derive(Debug, Clone, Deserialize)]
pub struct AuthorizeSubmission {
    #[serde(rename = "tenantSlug", default)]
    pub tenant_slug: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(flatten)]
    pub params: AuthorizeParams,
}

/// Validated authorization request awaiting credentials
#[derive(Debug, Clone, Serialize)]
pub struct PendingAuthorization {
    pub status: &'static str,
    pub client_id: String,
    pub redirect_uri: String,
    pub scope: String,
    pub state: String,
    pub code_challenge: String,
    pub code_challenge_method: String,
    pub world: String,
}

/// Body of `POST /token`, JSON or form encoded
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TokenRequest {
    pub grant_type: String,
    pub client_id: String,
    pub redirect_uri: String,
    pub code: String,
    pub code_verifier: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenResponse {
    pub token_type: &'static str,
    pub expires_in: i64,
    pub access_token: String,
    pub id_token: String,
    pub scope: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdTokenClaims {
    pub iss: String,
    pub aud: String,
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
    pub email: String,
    pub name: String,
    pub hos_user_id: String,
    pub tenant_id: String,
    pub world: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserInfo {
    pub sub: String,
    pub hos_user_id: String,
    pub email: String,
    pub name: String,
    pub tenant_id: String,
    pub role: Role,
}

#[derive(Clone)]
pub struct OidcExchange {
    guard: WorldGuard,
    clients: OidcClientRegistry,
    accounts: AccountService,
    codes: Arc<dyn AuthCodeStore>,
    identities: Arc<dyn IdentityStore>,
    keys: Arc<SigningKeyStore>,
    issuer: TokenIssuer,
    clock: Arc<dyn Clock>,
}

impl OidcExchange {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        guard: WorldGuard,
        clients: OidcClientRegistry,
        accounts: AccountService,
        codes: Arc<dyn AuthCodeStore>,
        identities: Arc<dyn IdentityStore>,
        keys: Arc<SigningKeyStore>,
        issuer: TokenIssuer,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            guard,
            clients,
            accounts,
            codes,
            identities,
            keys,
            issuer,
            clock,
        }
    }

    /// Validate an authorization request before credentials are collected
    pub async fn validate_authorize(
        &self,
        params: &AuthorizeParams,
    ) -> Result<PendingAuthorization, CovenantError> {
        if params.response_type != "code" {
            return Err(CovenantError::UnsupportedResponseType);
        }
        if params.client_id.is_empty() || params.redirect_uri.is_empty() {
            return Err(CovenantError::InvalidRequest(
                "client_id and redirect_uri are required".into(),
            ));
        }
        if params.state.is_empty() {
            return Err(CovenantError::InvalidRequest("missing_state".into()));
        }
        if params.code_challenge.len() < MIN_CHALLENGE_LEN
            || params.code_challenge_method != PKCE_METHOD_S256
        {
            return Err(CovenantError::InvalidRequest("pkce_required".into()));
        }
        let world = self.guard.enforce(&params.world)?;

        let client = self
            .clients
            .resolve(&params.client_id, &params.redirect_uri)
            .await?;
        if !client.allowed_worlds.is_empty()
            && !client.allowed_worlds.iter().any(|w| w == world.as_str())
        {
            return Err(CovenantError::InvalidRequest("world_not_allowed".into()));
        }

        Ok(PendingAuthorization {
            status: "pending_credentials",
            client_id: params.client_id.clone(),
            redirect_uri: params.redirect_uri.clone(),
            scope: requested_scope(params),
            state: params.state.clone(),
            code_challenge: params.code_challenge.clone(),
            code_challenge_method: params.code_challenge_method.clone(),
            world: world.into_inner(),
        })
    }

    /// Verify credentials, store a code, and return the redirect URL
    pub async fn authorize(&self, submission: AuthorizeSubmission) -> Result<String, CovenantError> {
        let pending = self.validate_authorize(&submission.params).await?;

        if submission.tenant_slug.is_empty() || submission.password.is_empty() {
            return Err(CovenantError::InvalidRequest(
                "tenantSlug, email and password are required".into(),
            ));
        }
        let email = normalize_email(&submission.email)?;

        let user = self
            .accounts
            .authenticate(&submission.tenant_slug, &email, &submission.password)
            .await
            .map_err(|err| match err {
                CovenantError::TenantNotFound => {
                    CovenantError::AccessDenied("tenant_not_found".into())
                }
                CovenantError::InvalidCredentials => {
                    CovenantError::AccessDenied("invalid_credentials".into())
                }
                other => other,
            })?;

        let now = self.clock.now();
        let code = random_urlsafe(CODE_BYTES);
        self.codes
            .insert_auth_code(AuthCodeDoc {
                code: code.clone(),
                metadata: Metadata::stamped(DateTime::from_chrono(now)),
                client_id: pending.client_id.clone(),
                redirect_uri: pending.redirect_uri.clone(),
                tenant_id: user.tenant_id.clone(),
                user_id: user.id.clone(),
                scope: pending.scope,
                world: pending.world.clone(),
                code_challenge: pending.code_challenge,
                code_challenge_method: pending.code_challenge_method,
                expires_at: DateTime::from_chrono(now + Duration::minutes(AUTH_CODE_TTL_MINUTES)),
            })
            .await?;

        info!(
            client_id = %pending.client_id,
            user_id = %user.id,
            world = %pending.world,
            "Issued authorization code"
        );

        let sep = if pending.redirect_uri.contains('?') { '&' } else { '?' };
        Ok(format!(
            "{}{}code={}&state={}",
            pending.redirect_uri,
            sep,
            urlencoding::encode(&code),
            urlencoding::encode(&pending.state)
        ))
    }

    /// Exchange a code for an ID token and access token
    pub async fn token(
        &self,
        req: TokenRequest,
        issuer_url: &str,
    ) -> Result<TokenResponse, CovenantError> {
        if req.grant_type != "authorization_code" {
            return Err(CovenantError::UnsupportedGrantType);
        }
        if req.client_id.is_empty()
            || req.redirect_uri.is_empty()
            || req.code.len() < MIN_CODE_LEN
            || req.code_verifier.len() < MIN_VERIFIER_LEN
        {
            return Err(CovenantError::InvalidRequest(
                "client_id, redirect_uri, code and code_verifier are required".into(),
            ));
        }

        self.clients.resolve(&req.client_id, &req.redirect_uri).await?;

        // Removed here whether or not the exchange succeeds
        let Some(code) = self.codes.take_auth_code(&req.code).await? else {
            debug!("Authorization code unknown or already used");
            return Err(CovenantError::InvalidGrant);
        };

        let now = self.clock.now();
        if code.is_expired(DateTime::from_chrono(now)) {
            debug!("Authorization code expired");
            return Err(CovenantError::InvalidGrant);
        }
        if code.client_id != req.client_id || code.redirect_uri != req.redirect_uri {
            debug!("Authorization code presented by a different client or redirect");
            return Err(CovenantError::InvalidGrant);
        }
        if code.code_challenge_method != PKCE_METHOD_S256
            || !verify_s256(&req.code_verifier, &code.code_challenge)
        {
            debug!("PKCE verification failed");
            return Err(CovenantError::InvalidGrant);
        }

        let user = self
            .identities
            .find_user(&code.user_id)
            .await?
            .ok_or(CovenantError::InvalidGrant)?;

        let expires_in = self.issuer.ttl_secs();
        let iat = now.timestamp();
        let claims = IdTokenClaims {
            iss: issuer_url.trim_end_matches('/').to_string(),
            aud: req.client_id.clone(),
            sub: user.id.clone(),
            iat,
            exp: iat + expires_in,
            email: user.email.clone(),
            name: user.display_name().to_string(),
            hos_user_id: user.id.clone(),
            tenant_id: code.tenant_id.clone(),
            world: code.world.clone(),
        };

        let key = self.keys.active().await?;
        let id_token = key.sign(&claims)?;
        let access_token = self
            .issuer
            .sign(&user.id, Some(&code.tenant_id), user.role)?;

        info!(client_id = %req.client_id, user_id = %user.id, "Exchanged authorization code");

        Ok(TokenResponse {
            token_type: "Bearer",
            expires_in,
            access_token,
            id_token,
            scope: code.scope,
        })
    }

    /// Profile of the bearer token's subject
    pub async fn userinfo(&self, authorization: Option<&str>) -> Result<UserInfo, CovenantError> {
        let token = extract_bearer(authorization).ok_or(CovenantError::InvalidToken)?;
        let claims = self.issuer.verify(token)?;
        let tenant_id = claims
            .tenant_id
            .filter(|t| !t.is_empty())
            .ok_or(CovenantError::InvalidToken)?;

        let user = self
            .identities
            .find_user(&claims.sub)
            .await?
            .filter(|u| u.tenant_id == tenant_id)
            .ok_or(CovenantError::InvalidToken)?;

        Ok(UserInfo {
            sub: user.id.clone(),
            hos_user_id: user.id.clone(),
            name: user.display_name().to_string(),
            email: user.email,
            tenant_id,
            role: user.role,
        })
    }

    /// Published verification keys
    pub async fn jwks(&self) -> Result<serde_json::Value, CovenantError> {
        self.keys.jwks().await
    }
}

fn requested_scope(params: &AuthorizeParams) -> String {
    params
        .scope
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_SCOPE)
        .to_string()
}
