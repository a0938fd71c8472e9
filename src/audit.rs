//! Best-effort audit log
//!
//! Account activity (registration, login, refresh) is recorded here. A
//! failed audit write never aborts the operation that triggered it; the
//! outcome is returned so callers can log it.

use bson::DateTime;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

use crate::canonical::canonical_json;
use crate::clock::Clock;
use crate::db::schemas::{AuditEventDoc, Metadata};
use crate::db::AuditStore;

/// Result of a side-log write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditOutcome {
    Recorded { id: String },
    Failed { reason: &'static str },
}

impl AuditOutcome {
    pub fn is_recorded(&self) -> bool {
        matches!(self, Self::Recorded { .. })
    }
}

#[derive(Clone)]
pub struct AuditLog {
    store: Arc<dyn AuditStore>,
    clock: Arc<dyn Clock>,
}

impl AuditLog {
    pub fn new(store: Arc<dyn AuditStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Append an event. Never fails.
    ///
    /// Non-object `details` are wrapped as `{"value": details}`.
    pub async fn record(
        &self,
        action: &str,
        tenant_id: Option<&str>,
        actor_user_id: Option<&str>,
        details: Value,
    ) -> AuditOutcome {
        if action.is_empty() {
            return AuditOutcome::Failed {
                reason: "missing_action",
            };
        }

        let details = match details {
            Value::Object(_) => details,
            Value::Null => json!({}),
            other => json!({ "value": other }),
        };

        let now = DateTime::from_chrono(self.clock.now());
        let id = Uuid::new_v4().to_string();
        let event = AuditEventDoc {
            id: id.clone(),
            metadata: Metadata::stamped(now),
            tenant_id: tenant_id.map(str::to_string),
            actor_user_id: actor_user_id.map(str::to_string),
            action: action.to_string(),
            details: canonical_json(&details),
            created_at: now,
        };

        match self.store.insert_audit_event(event).await {
            Ok(()) => AuditOutcome::Recorded { id },
            Err(err) => {
                warn!(action, error = %err, "Audit write failed");
                AuditOutcome::Failed {
                    reason: "audit_failed",
                }
            }
        }
    }
}
