//! Worlds: independently deployed services whose state transitions
//! Covenant authorizes.

mod guard;

pub use guard::{World, WorldGuard, CANONICAL_WORLDS};
