//! Shared types for Covenant

mod error;

pub use error::{CovenantError, ErrorBody, NextAction, Result};
