//! Registered OIDC client schema

use bson::{doc, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

/// Collection name for OIDC clients
pub const OIDC_CLIENT_COLLECTION: &str = "oidc_clients";

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct OidcClientDoc {
    #[serde(rename = "_id")]
    pub id: String,

    #[serde(default)]
    pub metadata: Metadata,

    pub client_id: String,

    /// Exact-match allow list
    #[serde(default)]
    pub redirect_uris: Vec<String>,

    /// Worlds this client may request; empty means any allowed world
    #[serde(default)]
    pub allowed_worlds: Vec<String>,
}

impl OidcClientDoc {
    pub fn allows_redirect(&self, redirect_uri: &str) -> bool {
        self.redirect_uris.iter().any(|uri| uri == redirect_uri)
    }
}

impl IntoIndexes for OidcClientDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "client_id": 1 },
            Some(
                IndexOptions::builder()
                    .unique(true)
                    .name("client_id_unique".to_string())
                    .build(),
            ),
        )]
    }
}

impl MutMetadata for OidcClientDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
