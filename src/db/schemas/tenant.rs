//! Tenant document schema

use bson::{doc, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

/// Collection name for tenants
pub const TENANT_COLLECTION: &str = "tenants";

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct TenantDoc {
    #[serde(rename = "_id")]
    pub id: String,

    #[serde(default)]
    pub metadata: Metadata,

    pub slug: String,
    pub name: String,
}

impl IntoIndexes for TenantDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "slug": 1 },
            Some(
                IndexOptions::builder()
                    .unique(true)
                    .name("slug_unique".to_string())
                    .build(),
            ),
        )]
    }
}

impl MutMetadata for TenantDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
