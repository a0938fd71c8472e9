//! Common metadata for all documents
//!
//! Tracks creation and update timestamps. Covenant never soft-deletes:
//! permits, confirmations and proofs are retained, and refresh tokens carry
//! their own `revoked_at`.

use bson::DateTime;
use serde::{Deserialize, Serialize};

/// Common metadata for all documents
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct Metadata {
    /// When the document was created
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime>,

    /// When the document was last updated
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime>,
}

impl Metadata {
    /// Create new metadata with current timestamp
    pub fn new() -> Self {
        Self::stamped(DateTime::now())
    }

    /// Create metadata stamped with an explicit instant
    pub fn stamped(at: DateTime) -> Self {
        Self {
            created_at: Some(at),
            updated_at: Some(at),
        }
    }

    pub fn touch(&mut self, at: DateTime) {
        if self.created_at.is_none() {
            self.created_at = Some(at);
        }
        self.updated_at = Some(at);
    }
}
