//! Permit protocol: issue → confirm → proof
//!
//! A world asks for a permit bound to a snapshot of its intent, performs the
//! mutation locally, then confirms. Each successful confirmation appends one
//! immutable proof.

pub mod confirm;
pub mod issue;
pub mod ledger;
mod types;

pub use confirm::ConfirmationService;
pub use issue::{PermitService, PERMIT_TTL_MINUTES};
pub use ledger::{ProofLedger, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
pub use types::{
    format_instant, Actor, ConfirmReceipt, ConfirmRequest, IssuePermitRequest, PermitContext,
    PermitGrant, ProofPage, ProofQuery, ProofView, SubjectId, SubjectRef,
};
