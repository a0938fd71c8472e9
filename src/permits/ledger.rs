//! Proof ledger query side
//!
//! Newest first by `occurred_at`. The cursor is the `occurred_at` of the
//! last row of a full page; proofs sharing that exact millisecond with the
//! last row are not revisited on the next page.

use bson::DateTime;
use std::sync::Arc;

use crate::db::PermitStore;
use crate::permits::types::{format_instant, ProofPage, ProofQuery, ProofView};
use crate::types::CovenantError;
use crate::world::WorldGuard;

pub const DEFAULT_PAGE_SIZE: i64 = 50;
pub const MAX_PAGE_SIZE: i64 = 200;

#[derive(Clone)]
pub struct ProofLedger {
    guard: WorldGuard,
    permits: Arc<dyn PermitStore>,
}

impl ProofLedger {
    pub fn new(guard: WorldGuard, permits: Arc<dyn PermitStore>) -> Self {
        Self { guard, permits }
    }

    pub async fn list(&self, query: ProofQuery) -> Result<ProofPage, CovenantError> {
        let tenant_id = query.tenant_id.unwrap_or_default();
        let world_id = query.world_id.unwrap_or_default();
        if tenant_id.is_empty() || world_id.is_empty() {
            return Err(CovenantError::MissingQuery);
        }
        let world = self.guard.enforce(&world_id)?;

        let limit = query
            .limit
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE) as usize;
        let before = query
            .cursor
            .as_deref()
            .filter(|c| !c.is_empty())
            .map(parse_cursor)
            .transpose()?;

        let rows = self
            .permits
            .list_proofs(&tenant_id, world.as_str(), before, limit)
            .await?;

        let next_cursor = if rows.len() == limit {
            rows.last().map(|p| format_instant(p.occurred_at))
        } else {
            None
        };
        let items = rows
            .into_iter()
            .map(ProofView::from_doc)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ProofPage { items, next_cursor })
    }
}

fn parse_cursor(raw: &str) -> Result<DateTime, CovenantError> {
    chrono::DateTime::parse_from_rfc3339(raw)
        .map(|at| DateTime::from_chrono(at.with_timezone(&chrono::Utc)))
        .map_err(|_| CovenantError::InvalidCursor(raw.to_string()))
}
