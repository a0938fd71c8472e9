//! Proof document schema
//!
//! Immutable audit record written in the same transaction as its
//! confirmation. Queried newest-first by (tenant_id, world).

use bson::{doc, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

/// Collection name for proofs
pub const PROOF_COLLECTION: &str = "proofs";

/// Proof kind recorded on permit confirmation
pub const PROOF_KIND_PERMIT_CONFIRM: &str = "permit.confirm";

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ProofDoc {
    #[serde(rename = "_id")]
    pub proof_id: String,

    #[serde(default)]
    pub metadata: Metadata,

    pub occurred_at: DateTime,
    pub world: String,
    pub tenant_id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,

    pub actor_id: String,
    pub kind: String,

    /// Canonical JSON text
    pub subject_ref: String,

    /// Canonical JSON text
    pub payload: String,

    /// Content hash of the payload
    pub request_hash: String,

    /// Command key of the confirmed permit
    pub idempotency_key: String,

    /// Content hash of `{subject_ref, payload}`
    pub hash: String,
}

impl IntoIndexes for ProofDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "tenant_id": 1, "world": 1, "occurred_at": -1 },
            Some(
                IndexOptions::builder()
                    .name("tenant_world_occurred_at".to_string())
                    .build(),
            ),
        )]
    }
}

impl MutMetadata for ProofDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
