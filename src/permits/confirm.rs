//! Permit confirmation
//!
//! Checks run in a fixed order: world guard, permit lookup, world binding,
//! snapshot binding, expiry, then confirmation idempotency. A proof and its
//! confirmation are committed together or not at all.

use bson::DateTime;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::canonical::{canonical_json, content_hash};
use crate::clock::Clock;
use crate::db::schemas::{ConfirmationDoc, Metadata, PermitDoc, ProofDoc, PROOF_KIND_PERMIT_CONFIRM};
use crate::db::PermitStore;
use crate::permits::types::{ConfirmPayload, ConfirmReceipt, ConfirmRequest};
use crate::types::CovenantError;
use crate::world::WorldGuard;

#[derive(Clone)]
pub struct ConfirmationService {
    guard: WorldGuard,
    permits: Arc<dyn PermitStore>,
    clock: Arc<dyn Clock>,
}

impl ConfirmationService {
    pub fn new(guard: WorldGuard, permits: Arc<dyn PermitStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            guard,
            permits,
            clock,
        }
    }

    /// Record that the world performed the permitted mutation.
    ///
    /// `request_id` is stored on the proof for correlation.
    pub async fn confirm(
        &self,
        permit_id: &str,
        req: ConfirmRequest,
        request_id: Option<&str>,
    ) -> Result<ConfirmReceipt, CovenantError> {
        let world = self.guard.enforce(&req.world_id)?;
        if permit_id.is_empty() {
            return Err(CovenantError::InvalidRequest("permit_id is required".into()));
        }
        req.validate()?;

        let permit = self
            .permits
            .find_permit(permit_id)
            .await?
            .ok_or_else(|| CovenantError::PermitNotFound(permit_id.to_string()))?;

        if permit.world != world.as_str() {
            return Err(CovenantError::PermitWorldMismatch);
        }
        if permit.snapshot_hash != req.snapshot_hash {
            warn!(
                permit_id,
                world_mutation_id = %req.world_mutation_id,
                "Confirmation does not match the authorized snapshot"
            );
            return Err(CovenantError::BindingMismatch);
        }
        let now = DateTime::from_chrono(self.clock.now());
        if permit.expires_at < now {
            debug!(permit_id, "Permit expired before confirmation");
            return Err(CovenantError::StaleVersion);
        }

        if let Some(existing) = self.permits.find_confirmation(permit_id).await? {
            return settle(&existing, &req);
        }

        let (proof, confirmation) = build_records(&permit, &req, request_id, now)?;
        let proof_id = proof.proof_id.clone();

        match self.permits.record_confirmation(proof, confirmation).await {
            Ok(()) => {
                info!(
                    permit_id,
                    proof_id = %proof_id,
                    world = %permit.world,
                    tenant_id = %permit.tenant_id,
                    "Recorded proof"
                );
                Ok(ConfirmReceipt::new(proof_id))
            }
            Err(err) if err.is_duplicate() => {
                // A concurrent confirm committed first
                let existing = self
                    .permits
                    .find_confirmation(permit_id)
                    .await?
                    .ok_or_else(|| {
                        CovenantError::Database(
                            "confirmation vanished after duplicate-key rejection".into(),
                        )
                    })?;
                settle(&existing, &req)
            }
            Err(err) => Err(err.into()),
        }
    }
}

/// Idempotency decision against an existing confirmation
fn settle(existing: &ConfirmationDoc, req: &ConfirmRequest) -> Result<ConfirmReceipt, CovenantError> {
    if existing.world_mutation_id != req.world_mutation_id {
        warn!(
            permit_id = %existing.permit_id,
            recorded = %existing.world_mutation_id,
            attempted = %req.world_mutation_id,
            "Permit already confirmed by a different world mutation"
        );
        return Err(CovenantError::ConfirmConflict);
    }
    debug!(permit_id = %existing.permit_id, "Replayed confirmation");
    Ok(ConfirmReceipt::new(existing.proof_id.clone()))
}

fn build_records(
    permit: &PermitDoc,
    req: &ConfirmRequest,
    request_id: Option<&str>,
    now: DateTime,
) -> Result<(ProofDoc, ConfirmationDoc), CovenantError> {
    let payload = serde_json::to_value(ConfirmPayload {
        permit_id: &permit.permit_id,
        world_mutation_id: &req.world_mutation_id,
        new_version: &req.new_version,
        snapshot_hash: &req.snapshot_hash,
        mutation_hash: &req.mutation_hash,
        confirmed_at: &req.confirmed_at,
    })?;
    let subject_ref: serde_json::Value = serde_json::from_str(&permit.subject_ref)
        .map_err(|e| CovenantError::Internal(format!("stored subject_ref unreadable: {}", e)))?;

    let proof_id = Uuid::new_v4().to_string();
    let proof = ProofDoc {
        proof_id: proof_id.clone(),
        metadata: Metadata::stamped(now),
        occurred_at: now,
        world: permit.world.clone(),
        tenant_id: permit.tenant_id.clone(),
        request_id: request_id.map(str::to_string),
        actor_id: permit.actor_id.clone(),
        kind: PROOF_KIND_PERMIT_CONFIRM.to_string(),
        hash: content_hash(&json!({ "subject_ref": subject_ref, "payload": payload })),
        request_hash: content_hash(&payload),
        subject_ref: canonical_json(&subject_ref),
        payload: canonical_json(&payload),
        idempotency_key: permit.command_key.clone(),
    };

    let confirmation = ConfirmationDoc {
        permit_id: permit.permit_id.clone(),
        metadata: Metadata::stamped(now),
        world_mutation_id: req.world_mutation_id.clone(),
        proof_id,
        snapshot_hash: req.snapshot_hash.clone(),
        mutation_hash: req.mutation_hash.clone(),
        new_version: req.new_version.clone(),
        confirmed_at: req.confirmed_at.clone(),
        recorded_at: now,
    };

    Ok((proof, confirmation))
}
