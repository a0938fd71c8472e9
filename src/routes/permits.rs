//! Permit protocol endpoints
//!
//! - POST /v1/permits
//! - POST /v1/permits/{permit_id}/confirm
//! - GET  /v1/proof
//! - POST /v1/contract/can-transition

use bytes::Bytes;
use hyper::http::request::Parts;
use hyper::{Response, StatusCode};
use tracing::debug;

use crate::permits::{ConfirmRequest, IssuePermitRequest, ProofQuery};
use crate::policy::TransitionQuery;
use crate::routes::{json_response, parse_json, parse_query};
use crate::server::{AppState, BoxBody};
use crate::types::CovenantError;

pub async fn issue_permit(state: &AppState, body: &Bytes) -> Result<Response<BoxBody>, CovenantError> {
    let req: IssuePermitRequest = parse_json(body)?;
    let grant = state.permits.issue(req).await?;
    Ok(json_response(StatusCode::OK, &grant))
}

pub async fn confirm_permit(
    state: &AppState,
    permit_id: &str,
    body: &Bytes,
    request_id: &str,
) -> Result<Response<BoxBody>, CovenantError> {
    let req: ConfirmRequest = parse_json(body)?;
    let receipt = state.confirms.confirm(permit_id, req, Some(request_id)).await?;
    Ok(json_response(StatusCode::OK, &receipt))
}

pub async fn query_proofs(state: &AppState, parts: &Parts) -> Result<Response<BoxBody>, CovenantError> {
    let query: ProofQuery = parse_query(parts)?;
    let page = state.ledger.list(query).await?;
    Ok(json_response(StatusCode::OK, &page))
}

/// Ask the configured contract whether `subject_ref.status -> to` is legal
pub fn can_transition(state: &AppState, body: &Bytes) -> Result<Response<BoxBody>, CovenantError> {
    let query: TransitionQuery = parse_json(body)?;
    let world = state.guard.enforce(query.world())?;

    let decision = state.policy.can_transition(&query.subject_ref, &query.to);
    debug!(world = %world, allowed = decision.allowed, reason = decision.reason, "Transition checked");
    Ok(json_response(StatusCode::OK, &decision))
}
