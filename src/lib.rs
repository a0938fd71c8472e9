//! Covenant - permit and proof broker for Elohim worlds
//!
//! Worlds ask Covenant "may I perform this transition?", receive a
//! hash-bound permit, mutate locally, and confirm. Every confirmation
//! leaves an immutable proof.
//!
//! ## Services
//!
//! - **Permits**: issue, confirm and query proofs, gated per world
//! - **Accounts**: registration, login and rotating refresh tokens
//! - **OIDC**: authorization code flow with PKCE for world frontends

pub mod audit;
pub mod auth;
pub mod canonical;
pub mod clock;
pub mod config;
pub mod db;
pub mod oidc;
pub mod permits;
pub mod policy;
pub mod routes;
pub mod server;
pub mod types;
pub mod world;

pub use config::Args;
pub use server::{run, AppState};
pub use types::{CovenantError, Result};
