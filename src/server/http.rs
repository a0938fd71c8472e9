//! HTTP server implementation
//!
//! Uses hyper http1 with TokioIo for async handling. Routing is a flat
//! `match (method, path)`; handlers live in `crate::routes`.

use bytes::Bytes;
use http_body_util::{BodyExt, Limited};
use hyper::body::Body;
use hyper::header::{HeaderValue, CONTENT_LENGTH};
use hyper::http::request::Parts;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::routes;
use crate::server::AppState;
use crate::types::CovenantError;

pub type BoxBody = http_body_util::combinators::BoxBody<Bytes, hyper::Error>;

/// Largest accepted request body
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

const REQUEST_ID_HEADER: &str = "x-request-id";
const MIN_REQUEST_ID_LEN: usize = 8;
const MAX_REQUEST_ID_LEN: usize = 200;

pub async fn run(state: Arc<AppState>) -> Result<(), CovenantError> {
    let listener = TcpListener::bind(state.args.listen).await?;

    info!("Covenant listening on {}", state.args.listen);
    if state.args.dev_mode {
        warn!("Development mode enabled");
    }

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);

                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { Ok::<_, Infallible>(handle(state, req).await) }
                    });

                    if let Err(err) = http1::Builder::new()
                        .serve_connection(io, service)
                        .await
                    {
                        error!("Error serving connection from {}: {:?}", addr, err);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {:?}", e);
            }
        }
    }
}

/// Serve one request.
///
/// Every response carries `x-request-id`. Headers are never logged.
pub async fn handle<B>(state: Arc<AppState>, req: Request<B>) -> Response<BoxBody>
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let started = Instant::now();
    let (parts, body) = req.into_parts();
    let request_id = request_id(&parts);
    let method = parts.method.clone();
    let path = parts.uri.path().to_string();

    let result = match read_body(&parts, body).await {
        Ok(bytes) => route(&state, &parts, bytes, &request_id).await,
        Err(err) => Err(err),
    };

    let mut response = match result {
        Ok(response) => response,
        Err(err) => {
            if err.status_code().is_server_error() {
                error!(request_id = %request_id, error = %err, "Request failed");
            }
            routes::error_response(err)
        }
    };

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }

    info!(
        request_id = %request_id,
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Handled request"
    );
    response
}

async fn route(
    state: &AppState,
    parts: &Parts,
    body: Bytes,
    request_id: &str,
) -> Result<Response<BoxBody>, CovenantError> {
    let path = parts.uri.path();

    if let Some(permit_id) = confirm_target(path) {
        if parts.method == Method::POST {
            return routes::confirm_permit(state, &permit_id, &body, request_id).await;
        }
    }

    match (&parts.method, path) {
        (&Method::GET, "/health") => Ok(routes::health_check(state)),
        (&Method::GET, "/ready") => Ok(routes::readiness_check(state).await),
        (&Method::GET, "/version") => Ok(routes::version_info()),

        (&Method::POST, "/v1/permits") => routes::issue_permit(state, &body).await,
        (&Method::GET, "/v1/proof") => routes::query_proofs(state, parts).await,
        (&Method::POST, "/v1/contract/can-transition") => routes::can_transition(state, &body),

        (&Method::POST, "/v1/auth/register") => routes::register(state, parts, &body).await,
        (&Method::POST, "/v1/auth/login") => routes::login(state, parts, &body).await,
        (&Method::POST, "/v1/auth/refresh") => routes::refresh(state, parts, &body).await,
        (&Method::POST, "/v1/auth/logout") => Ok(routes::logout(state, parts, &body).await),

        (&Method::GET, "/authorize") => routes::authorize_validate(state, parts).await,
        (&Method::POST, "/oidc/authorize") => routes::authorize_submit(state, parts, &body).await,
        (&Method::POST, "/token") => routes::token(state, parts, &body).await,
        (&Method::GET, "/userinfo") => routes::userinfo(state, parts).await,
        (&Method::GET, "/jwks.json") => routes::jwks(state).await,

        (&Method::OPTIONS, _) => Ok(routes::preflight_response()),

        _ => Err(CovenantError::NotFound(path.to_string())),
    }
}

/// Permit id from `/v1/permits/{permit_id}/confirm`
fn confirm_target(path: &str) -> Option<String> {
    let raw = path
        .strip_prefix("/v1/permits/")?
        .strip_suffix("/confirm")?;
    if raw.is_empty() || raw.contains('/') {
        return None;
    }
    urlencoding::decode(raw).ok().map(|id| id.into_owned())
}

/// Caller-supplied id when it has a sane length, otherwise a fresh UUID
fn request_id(parts: &Parts) -> String {
    parts
        .headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|id| (MIN_REQUEST_ID_LEN..=MAX_REQUEST_ID_LEN).contains(&id.len()))
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

async fn read_body<B>(parts: &Parts, body: B) -> Result<Bytes, CovenantError>
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let declared = parts
        .headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());
    if declared.is_some_and(|len| len > MAX_BODY_BYTES) {
        return Err(CovenantError::PayloadTooLarge(MAX_BODY_BYTES));
    }

    match Limited::new(body, MAX_BODY_BYTES).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(err) if err.is::<http_body_util::LengthLimitError>() => {
            Err(CovenantError::PayloadTooLarge(MAX_BODY_BYTES))
        }
        Err(err) => Err(CovenantError::Http(format!("Failed to read body: {}", err))),
    }
}
