//! Permit document schema
//!
//! A permit is a time-boxed, hash-bound authorization for one state
//! transition. It is written once and never mutated; it stays readable for
//! audit and idempotency lookups long after it expires.

use bson::{doc, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

/// Collection name for permits
pub const PERMIT_COLLECTION: &str = "permits";

/// Permit document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct PermitDoc {
    /// Opaque permit id (UUID v4)
    #[serde(rename = "_id")]
    pub permit_id: String,

    #[serde(default)]
    pub metadata: Metadata,

    pub actor_id: String,
    pub tenant_id: String,

    /// Caller-chosen idempotency token
    pub command_key: String,

    pub world: String,

    /// Canonical JSON text of the subject reference
    pub subject_ref: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_status: Option<String>,

    pub to_status: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_version: Option<String>,

    /// Canonical JSON text of the snapshot; these are the bytes that were hashed
    pub snapshot: String,

    pub snapshot_hash: String,

    pub expires_at: DateTime,
}

impl IntoIndexes for PermitDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            // Issuance idempotency
            (
                doc! { "actor_id": 1, "tenant_id": 1, "command_key": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("actor_tenant_command_unique".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for PermitDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
