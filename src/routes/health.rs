//! Health check endpoints
//!
//! - /health - Liveness probe (is the process serving?)
//! - /ready - Readiness probe (can the backing store be reached?)
//! - /version - Build information for deployment verification

use hyper::{Response, StatusCode};
use serde::Serialize;
use tracing::warn;

use crate::routes::json_response;
use crate::server::{AppState, BoxBody};

#[derive(Serialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub version: &'static str,
    /// Seconds since the state was built
    pub uptime: u64,
    pub timestamp: String,
    /// "development" or "production"
    pub mode: &'static str,
    /// Worlds currently closed by configuration
    pub closed_worlds: Vec<String>,
}

#[derive(Serialize)]
pub struct ReadinessResponse {
    pub ok: bool,
    pub store: &'static str,
}

/// Liveness: always 200 while the process is serving
pub fn health_check(state: &AppState) -> Response<BoxBody> {
    let response = HealthResponse {
        ok: true,
        version: env!("CARGO_PKG_VERSION"),
        uptime: state.started_at.elapsed().as_secs(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        mode: if state.args.dev_mode {
            "development"
        } else {
            "production"
        },
        closed_worlds: state.guard.closed().map(str::to_string).collect(),
    };
    json_response(StatusCode::OK, &response)
}

/// Readiness: 200 only when the store answers a ping
pub async fn readiness_check(state: &AppState) -> Response<BoxBody> {
    match state.health.ping().await {
        Ok(()) => json_response(
            StatusCode::OK,
            &ReadinessResponse {
                ok: true,
                store: "up",
            },
        ),
        Err(e) => {
            warn!(error = %e, "Readiness ping failed");
            json_response(
                StatusCode::SERVICE_UNAVAILABLE,
                &ReadinessResponse {
                    ok: false,
                    store: "down",
                },
            )
        }
    }
}

/// Version information for deployment verification
#[derive(Serialize)]
pub struct VersionResponse {
    /// Cargo package version
    pub version: &'static str,
    /// Git commit hash (short)
    pub commit: &'static str,
    /// Git commit hash (full)
    pub commit_full: &'static str,
    /// Build timestamp
    pub build_time: &'static str,
    pub service: &'static str,
}

pub fn version_info() -> Response<BoxBody> {
    let response = VersionResponse {
        version: env!("CARGO_PKG_VERSION"),
        commit: option_env!("GIT_COMMIT_SHORT").unwrap_or("unknown"),
        commit_full: option_env!("GIT_COMMIT_FULL").unwrap_or("unknown"),
        build_time: option_env!("BUILD_TIMESTAMP").unwrap_or("unknown"),
        service: "covenant",
    };
    json_response(StatusCode::OK, &response)
}
