//! OIDC authorization code schema
//!
//! Codes are short-lived (5 minutes), bound to a PKCE challenge, and
//! single-use: any exchange attempt that finds a code deletes it.

use bson::{doc, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use super::metadata::Metadata;
use crate::db::mongo::{IntoIndexes, MutMetadata};

/// Collection name for authorization codes
pub const AUTH_CODE_COLLECTION: &str = "oidc_auth_codes";

/// Scope stored when the client did not request one
pub const DEFAULT_SCOPE: &str = "openid profile email";

/// The only accepted PKCE method
pub const PKCE_METHOD_S256: &str = "S256";

/// Authorization code issued by `POST /oidc/authorize`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthCodeDoc {
    /// The code itself (base64url of 32 random bytes)
    #[serde(rename = "_id")]
    pub code: String,

    #[serde(default)]
    pub metadata: Metadata,

    pub client_id: String,

    /// Redirect URI the code was issued to
    pub redirect_uri: String,

    pub tenant_id: String,
    pub user_id: String,
    pub scope: String,

    /// World the caller declared when authorizing
    pub world: String,

    pub code_challenge: String,
    pub code_challenge_method: String,

    pub expires_at: DateTime,
}

impl AuthCodeDoc {
    /// True once `expires_at` is strictly in the past
    pub fn is_expired(&self, now: DateTime) -> bool {
        self.expires_at < now
    }
}

impl IntoIndexes for AuthCodeDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            // TTL index so abandoned codes are eventually purged
            (
                doc! { "expires_at": 1 },
                Some(
                    IndexOptions::builder()
                        .expire_after(std::time::Duration::from_secs(0))
                        .name("expires_at_ttl".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "client_id": 1 },
                Some(
                    IndexOptions::builder()
                        .name("client_id_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for AuthCodeDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
