//! Permit issuance
//!
//! Idempotent by natural key: (actor, tenant, command_key). A replay with
//! the same snapshot returns the stored permit unchanged; a replay with a
//! different snapshot is an `idempotency_conflict`.

use bson::DateTime;
use chrono::Duration;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::canonical::{canonical_json, content_hash};
use crate::clock::Clock;
use crate::db::schemas::{Metadata, PermitDoc};
use crate::db::PermitStore;
use crate::permits::types::{IssuePermitRequest, PermitGrant};
use crate::types::CovenantError;
use crate::world::WorldGuard;

/// How long a permit stays confirmable
pub const PERMIT_TTL_MINUTES: i64 = 10;

#[derive(Clone)]
pub struct PermitService {
    guard: WorldGuard,
    permits: Arc<dyn PermitStore>,
    clock: Arc<dyn Clock>,
}

impl PermitService {
    pub fn new(guard: WorldGuard, permits: Arc<dyn PermitStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            guard,
            permits,
            clock,
        }
    }

    pub async fn issue(&self, req: IssuePermitRequest) -> Result<PermitGrant, CovenantError> {
        let world = self.guard.enforce(&req.ctx.world)?;
        req.validate()?;

        if req.tenant_id != req.subject_ref.tenant_id {
            return Err(CovenantError::TenantMismatch);
        }
        if world.as_str() != req.subject_ref.world_id {
            return Err(CovenantError::SubjectWorldMismatch);
        }

        let snapshot = req.snapshot()?;
        let snapshot_hash = content_hash(&snapshot);
        let subject_ref = serde_json::to_value(&req.subject_ref)?;

        let now = self.clock.now();
        let permit = PermitDoc {
            permit_id: Uuid::new_v4().to_string(),
            metadata: Metadata::stamped(DateTime::from_chrono(now)),
            actor_id: req.actor.hos_user_id.clone(),
            tenant_id: req.tenant_id.clone(),
            command_key: req.command_key.clone(),
            world: world.into_inner(),
            subject_ref: canonical_json(&subject_ref),
            from_status: req.from.clone(),
            to_status: req.to.clone(),
            expected_version: req.expected_version.clone(),
            snapshot: canonical_json(&snapshot),
            snapshot_hash,
            expires_at: DateTime::from_chrono(now + Duration::minutes(PERMIT_TTL_MINUTES)),
        };

        match self.permits.insert_permit(permit.clone()).await {
            Ok(()) => {
                info!(
                    permit_id = %permit.permit_id,
                    actor_id = %permit.actor_id,
                    tenant_id = %permit.tenant_id,
                    world = %permit.world,
                    "Issued permit"
                );
                PermitGrant::from_doc(&permit)
            }
            Err(err) if err.is_duplicate() => self.replay(&permit).await,
            Err(err) => Err(err.into()),
        }
    }

    /// Resolve a natural-key collision against the stored permit
    async fn replay(&self, attempted: &PermitDoc) -> Result<PermitGrant, CovenantError> {
        let existing = self
            .permits
            .find_permit_by_command(
                &attempted.actor_id,
                &attempted.tenant_id,
                &attempted.command_key,
            )
            .await?
            .ok_or_else(|| {
                CovenantError::Database("permit vanished after duplicate-key rejection".into())
            })?;

        if existing.snapshot_hash != attempted.snapshot_hash {
            warn!(
                permit_id = %existing.permit_id,
                command_key = %attempted.command_key,
                "Command key reused for a different request"
            );
            return Err(CovenantError::IdempotencyConflict);
        }

        debug!(permit_id = %existing.permit_id, "Replayed permit issuance");
        PermitGrant::from_doc(&existing)
    }
}
