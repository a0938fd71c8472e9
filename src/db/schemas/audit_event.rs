//! Audit event schema
//!
//! Append-only account activity log. Distinct from proofs: audit rows are
//! best-effort and never part of a protocol guarantee.

use bson::{doc, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

/// Collection name for audit events
pub const AUDIT_EVENT_COLLECTION: &str = "audit_events";

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct AuditEventDoc {
    #[serde(rename = "_id")]
    pub id: String,

    #[serde(default)]
    pub metadata: Metadata,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor_user_id: Option<String>,

    /// Dotted action name, e.g. `user.login`
    pub action: String,

    /// Free-form details as JSON text
    pub details: String,

    pub created_at: DateTime,
}

impl IntoIndexes for AuditEventDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "tenant_id": 1, "created_at": -1 },
            Some(
                IndexOptions::builder()
                    .name("tenant_created_at".to_string())
                    .build(),
            ),
        )]
    }
}

impl MutMetadata for AuditEventDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
