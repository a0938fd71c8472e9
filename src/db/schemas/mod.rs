//! Database schemas for Covenant
//!
//! MongoDB document structures for the permit protocol, token lifecycle,
//! and account records.

mod audit_event;
mod auth_code;
mod confirmation;
mod metadata;
mod oidc_client;
mod permit;
mod proof;
mod refresh_token;
mod signing_key;
mod tenant;
mod user;

pub use audit_event::{AuditEventDoc, AUDIT_EVENT_COLLECTION};
pub use auth_code::{AuthCodeDoc, AUTH_CODE_COLLECTION, DEFAULT_SCOPE, PKCE_METHOD_S256};
pub use confirmation::{ConfirmationDoc, CONFIRMATION_COLLECTION};
pub use metadata::Metadata;
pub use oidc_client::{OidcClientDoc, OIDC_CLIENT_COLLECTION};
pub use permit::{PermitDoc, PERMIT_COLLECTION};
pub use proof::{ProofDoc, PROOF_COLLECTION, PROOF_KIND_PERMIT_CONFIRM};
pub use refresh_token::{RefreshTokenDoc, REFRESH_TOKEN_COLLECTION};
pub use signing_key::{SigningKeyDoc, SIGNING_KEY_COLLECTION};
pub use tenant::{TenantDoc, TENANT_COLLECTION};
pub use user::{UserDoc, USER_COLLECTION};
