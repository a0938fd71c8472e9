//! Permit protocol request and response types
//!
//! Requests carry a few strictly typed fields plus an opaque extension bag
//! (`subject_ref` and `ctx`). Extensions are never interpreted here; they
//! are stored and rehashed verbatim as part of the snapshot.

use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::db::schemas::{PermitDoc, ProofDoc};
use crate::types::CovenantError;

pub const MIN_COMMAND_KEY_LEN: usize = 8;
pub const MAX_COMMAND_KEY_LEN: usize = 200;

/// Subject identifier, either a string or a JSON number
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SubjectId {
    Text(String),
    Number(serde_json::Number),
}

/// Reference to the world-side entity being mutated
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubjectRef {
    pub world_id: String,
    pub tenant_id: String,

    #[serde(rename = "type")]
    pub kind: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<SubjectId>,

    #[serde(flatten)]
    pub extension: Map<String, Value>,
}

/// Caller context; only `world` is interpreted
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PermitContext {
    pub world: String,

    #[serde(flatten)]
    pub extension: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Actor {
    pub hos_user_id: String,
}

/// Body of `POST /v1/permits`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct IssuePermitRequest {
    pub actor: Actor,
    pub tenant_id: String,
    pub subject_ref: SubjectRef,
    pub from: Option<String>,
    pub to: String,
    pub expected_version: Option<String>,
    pub command_key: String,
    pub ctx: PermitContext,
}

/// The object whose canonical hash binds a permit
#[derive(Serialize)]
struct Snapshot<'a> {
    actor_id: &'a str,
    tenant_id: &'a str,
    subject_ref: &'a SubjectRef,
    from: Option<&'a str>,
    to: &'a str,
    expected_version: Option<&'a str>,
    command_key: &'a str,
    ctx: &'a PermitContext,
}

impl IssuePermitRequest {
    /// Field-level checks, run after the world guard
    pub fn validate(&self) -> Result<(), CovenantError> {
        let required = [
            ("actor.hos_user_id", self.actor.hos_user_id.as_str()),
            ("tenant_id", self.tenant_id.as_str()),
            ("subject_ref.world_id", self.subject_ref.world_id.as_str()),
            ("subject_ref.tenant_id", self.subject_ref.tenant_id.as_str()),
            ("subject_ref.type", self.subject_ref.kind.as_str()),
            ("to", self.to.as_str()),
        ];
        if let Some((field, _)) = required.iter().find(|(_, v)| v.is_empty()) {
            return Err(CovenantError::InvalidRequest(format!("{} is required", field)));
        }

        let len = self.command_key.chars().count();
        if !(MIN_COMMAND_KEY_LEN..=MAX_COMMAND_KEY_LEN).contains(&len) {
            return Err(CovenantError::InvalidRequest(format!(
                "command_key must be {}-{} characters",
                MIN_COMMAND_KEY_LEN, MAX_COMMAND_KEY_LEN
            )));
        }
        Ok(())
    }

    /// Snapshot of every input, as a JSON value ready for hashing
    pub fn snapshot(&self) -> Result<Value, CovenantError> {
        let snapshot = Snapshot {
            actor_id: &self.actor.hos_user_id,
            tenant_id: &self.tenant_id,
            subject_ref: &self.subject_ref,
            from: self.from.as_deref(),
            to: &self.to,
            expected_version: self.expected_version.as_deref(),
            command_key: &self.command_key,
            ctx: &self.ctx,
        };
        serde_json::to_value(snapshot)
            .map_err(|e| CovenantError::Internal(format!("snapshot serialization: {}", e)))
    }
}

/// Response of `POST /v1/permits`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PermitGrant {
    pub permit_id: String,
    /// Reserved for a detached signature; always null for now
    pub permit_sig: Option<String>,
    pub snapshot: Value,
    pub snapshot_hash: String,
    pub expires_at: String,
}

impl PermitGrant {
    pub fn from_doc(doc: &PermitDoc) -> Result<Self, CovenantError> {
        let snapshot = serde_json::from_str(&doc.snapshot)
            .map_err(|e| CovenantError::Internal(format!("stored snapshot unreadable: {}", e)))?;
        Ok(Self {
            permit_id: doc.permit_id.clone(),
            permit_sig: None,
            snapshot,
            snapshot_hash: doc.snapshot_hash.clone(),
            expires_at: format_instant(doc.expires_at),
        })
    }
}

/// Body of `POST /v1/permits/{permit_id}/confirm`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfirmRequest {
    pub world_id: String,
    pub world_mutation_id: String,
    pub new_version: String,
    pub snapshot_hash: String,
    pub mutation_hash: String,
    pub confirmed_at: String,
}

impl ConfirmRequest {
    pub fn validate(&self) -> Result<(), CovenantError> {
        let required = [
            ("world_mutation_id", self.world_mutation_id.as_str()),
            ("new_version", self.new_version.as_str()),
            ("snapshot_hash", self.snapshot_hash.as_str()),
            ("mutation_hash", self.mutation_hash.as_str()),
            ("confirmed_at", self.confirmed_at.as_str()),
        ];
        match required.iter().find(|(_, v)| v.is_empty()) {
            Some((field, _)) => Err(CovenantError::InvalidRequest(format!("{} is required", field))),
            None => Ok(()),
        }
    }
}

/// Proof payload recorded for a confirmation
#[derive(Debug, Serialize)]
pub(crate) struct ConfirmPayload<'a> {
    pub permit_id: &'a str,
    pub world_mutation_id: &'a str,
    pub new_version: &'a str,
    pub snapshot_hash: &'a str,
    pub mutation_hash: &'a str,
    pub confirmed_at: &'a str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfirmReceipt {
    pub ok: bool,
    pub proof_id: String,
}

impl ConfirmReceipt {
    pub fn new(proof_id: impl Into<String>) -> Self {
        Self {
            ok: true,
            proof_id: proof_id.into(),
        }
    }
}

/// Query string of `GET /v1/proof`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProofQuery {
    pub tenant_id: Option<String>,
    pub world_id: Option<String>,
    pub limit: Option<i64>,
    pub cursor: Option<String>,
}

/// A proof as returned to callers, JSON columns decoded
#[derive(Debug, Clone, Serialize)]
pub struct ProofView {
    pub proof_id: String,
    pub occurred_at: String,
    pub world: String,
    pub tenant_id: String,
    pub request_id: Option<String>,
    pub actor_id: String,
    pub kind: String,
    pub subject_ref: Value,
    pub payload: Value,
    pub request_hash: String,
    pub idempotency_key: String,
    pub hash: String,
}

impl ProofView {
    pub fn from_doc(doc: ProofDoc) -> Result<Self, CovenantError> {
        let decode = |raw: &str| {
            serde_json::from_str::<Value>(raw)
                .map_err(|e| CovenantError::Internal(format!("stored proof unreadable: {}", e)))
        };
        Ok(Self {
            subject_ref: decode(&doc.subject_ref)?,
            payload: decode(&doc.payload)?,
            occurred_at: format_instant(doc.occurred_at),
            proof_id: doc.proof_id,
            world: doc.world,
            tenant_id: doc.tenant_id,
            request_id: doc.request_id,
            actor_id: doc.actor_id,
            kind: doc.kind,
            request_hash: doc.request_hash,
            idempotency_key: doc.idempotency_key,
            hash: doc.hash,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProofPage {
    pub items: Vec<ProofView>,
    pub next_cursor: Option<String>,
}

/// RFC 3339 with millisecond precision, matching stored resolution
pub fn format_instant(at: bson::DateTime) -> String {
    at.to_chrono().to_rfc3339_opts(SecondsFormat::Millis, true)
}
