//! Permit confirmation schema
//!
//! One row per confirmed permit. The permit id is the document id, so the
//! primary key is the at-most-once guarantee.

use bson::{DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

/// Collection name for confirmations
pub const CONFIRMATION_COLLECTION: &str = "permit_confirms";

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ConfirmationDoc {
    #[serde(rename = "_id")]
    pub permit_id: String,

    #[serde(default)]
    pub metadata: Metadata,

    /// Caller-supplied id of the world-side effect
    pub world_mutation_id: String,

    pub proof_id: String,
    pub snapshot_hash: String,
    pub mutation_hash: String,
    pub new_version: String,

    /// Caller-reported confirmation time, stored as sent
    pub confirmed_at: String,

    /// When Covenant recorded the confirmation
    pub recorded_at: DateTime,
}

impl IntoIndexes for ConfirmationDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![]
    }
}

impl MutMetadata for ConfirmationDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
