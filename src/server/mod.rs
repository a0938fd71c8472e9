//! HTTP server and shared application state

mod http;
mod state;

pub use http::{handle, run, BoxBody, MAX_BODY_BYTES};
pub use state::AppState;
