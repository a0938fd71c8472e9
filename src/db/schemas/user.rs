//! User document schema
//!
//! Stores tenant-scoped credentials. Emails are lower-cased before they
//! reach this layer.

use bson::{doc, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::auth::Role;
use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

/// Collection name for users
pub const USER_COLLECTION: &str = "users";

/// User document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct UserDoc {
    #[serde(rename = "_id")]
    pub id: String,

    /// Common metadata (created_at, updated_at)
    #[serde(default)]
    pub metadata: Metadata,

    pub tenant_id: String,

    /// Lower-cased email, unique per tenant
    pub email: String,

    /// `scrypt$N$r$p$salt_b64$hash_b64`
    pub password_hash: String,

    #[serde(default)]
    pub role: Role,
}

impl UserDoc {
    /// Display name used in ID tokens and userinfo
    pub fn display_name(&self) -> &str {
        if self.email.is_empty() {
            "user"
        } else {
            &self.email
        }
    }
}

impl IntoIndexes for UserDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "tenant_id": 1, "email": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("tenant_email_unique".to_string())
                        .build(),
                ),
            ),
            // Public login searches by email across tenants
            (
                doc! { "email": 1 },
                Some(
                    IndexOptions::builder()
                        .name("email_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for UserDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
