//! OIDC client registry
//!
//! Clients and their redirect URIs live in the store. The configured dev
//! client is provisioned on first use, but only for localhost redirects.

use bson::DateTime;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::clock::Clock;
use crate::db::schemas::{Metadata, OidcClientDoc};
use crate::db::IdentityStore;
use crate::types::CovenantError;

#[derive(Clone)]
pub struct OidcClientRegistry {
    identities: Arc<dyn IdentityStore>,
    dev_client_id: Option<String>,
    clock: Arc<dyn Clock>,
}

impl OidcClientRegistry {
    pub fn new(
        identities: Arc<dyn IdentityStore>,
        dev_client_id: Option<String>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            identities,
            dev_client_id: dev_client_id.filter(|id| !id.is_empty()),
            clock,
        }
    }

    /// Resolve a client and check the redirect URI is registered for it
    pub async fn resolve(
        &self,
        client_id: &str,
        redirect_uri: &str,
    ) -> Result<OidcClientDoc, CovenantError> {
        let client = match self.identities.find_oidc_client(client_id).await? {
            Some(client) => client,
            None => self
                .provision_dev_client(client_id, redirect_uri)
                .await?
                .ok_or(CovenantError::InvalidClient)?,
        };

        if !client.allows_redirect(redirect_uri) {
            return Err(CovenantError::InvalidRequest(
                "redirect_uri_not_allowed".into(),
            ));
        }
        Ok(client)
    }

    async fn provision_dev_client(
        &self,
        client_id: &str,
        redirect_uri: &str,
    ) -> Result<Option<OidcClientDoc>, CovenantError> {
        if self.dev_client_id.as_deref() != Some(client_id) || !is_local_redirect(redirect_uri) {
            return Ok(None);
        }

        let client = OidcClientDoc {
            id: Uuid::new_v4().to_string(),
            metadata: Metadata::stamped(DateTime::from_chrono(self.clock.now())),
            client_id: client_id.to_string(),
            redirect_uris: vec![redirect_uri.to_string()],
            allowed_worlds: Vec::new(),
        };

        match self.identities.insert_oidc_client(client.clone()).await {
            Ok(()) => {
                info!(client_id, redirect_uri, "Provisioned dev OIDC client");
                Ok(Some(client))
            }
            Err(err) if err.is_duplicate() => {
                Ok(self.identities.find_oidc_client(client_id).await?)
            }
            Err(err) => Err(err.into()),
        }
    }
}

/// `http(s)://localhost` followed by a port or path
pub fn is_local_redirect(uri: &str) -> bool {
    let lower = uri.to_ascii_lowercase();
    let rest = lower
        .strip_prefix("http://")
        .or_else(|| lower.strip_prefix("https://"));
    match rest.and_then(|r| r.strip_prefix("localhost")) {
        Some(tail) => tail.starts_with('/') || tail.starts_with(':'),
        None => false,
    }
}
