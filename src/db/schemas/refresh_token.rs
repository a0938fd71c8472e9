//! Refresh token schema
//!
//! Only the SHA-256 of the raw token is stored. Rows move one way,
//! active → revoked, and keep a back-reference to the token they replaced.

use bson::{doc, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

/// Collection name for refresh tokens
pub const REFRESH_TOKEN_COLLECTION: &str = "refresh_tokens";

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct RefreshTokenDoc {
    #[serde(rename = "_id")]
    pub id: String,

    #[serde(default)]
    pub metadata: Metadata,

    pub tenant_id: String,
    pub user_id: String,

    /// Hex SHA-256 of the raw token
    pub token_hash: String,

    pub expires_at: DateTime,

    /// Always serialized (as null when active) so `revoked_at: null` filters match
    #[serde(default)]
    pub revoked_at: Option<DateTime>,

    #[serde(default)]
    pub rotated_from: Option<String>,
}

impl RefreshTokenDoc {
    /// Not revoked and not yet expired
    pub fn is_active(&self, now: DateTime) -> bool {
        self.revoked_at.is_none() && self.expires_at > now
    }
}

impl IntoIndexes for RefreshTokenDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "token_hash": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("token_hash_unique".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "user_id": 1 },
                Some(
                    IndexOptions::builder()
                        .name("user_id_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for RefreshTokenDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
