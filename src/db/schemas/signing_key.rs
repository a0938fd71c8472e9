//! OIDC signing key schema
//!
//! At most one row may have `is_active: true`; the partial unique index
//! enforces it and turns a concurrent provisioning race into a duplicate-key
//! error the loser can recover from.

use bson::{doc, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

/// Collection name for signing keys
pub const SIGNING_KEY_COLLECTION: &str = "oidc_keys";

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct SigningKeyDoc {
    #[serde(rename = "_id")]
    pub id: String,

    #[serde(default)]
    pub metadata: Metadata,

    pub kid: String,
    pub alg: String,

    /// Public JWK as JSON text
    pub public_jwk: String,

    /// PKCS#8 PEM
    pub private_pem: String,

    pub is_active: bool,
}

impl IntoIndexes for SigningKeyDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "is_active": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .partial_filter_expression(doc! { "is_active": true })
                        .name("single_active_key".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "kid": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("kid_unique".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for SigningKeyDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
