//! Authentication routes
//!
//! - POST /v1/auth/register - Create an account (201 + token)
//! - POST /v1/auth/login - Authenticate with tenant, email and password
//! - POST /v1/auth/refresh - Rotate the refresh token
//! - POST /v1/auth/logout - Revoke the refresh token and clear the cookie
//!
//! Tenant-scoped sessions carry their refresh credential in the
//! `hos_refresh` cookie. Public customers get an access token only.

use bytes::Bytes;
use hyper::header::{HeaderValue, SET_COOKIE};
use hyper::http::request::Parts;
use hyper::{Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::auth::refresh::REFRESH_TOKEN_TTL_DAYS;
use crate::auth::{LoginRequest, RegisterRequest, SessionTokens};
use crate::routes::{forwarded_https, json_response, parse_json, read_cookie};
use crate::server::{AppState, BoxBody};
use crate::types::CovenantError;

pub const REFRESH_COOKIE: &str = "hos_refresh";

#[derive(Serialize)]
struct TokenBody<'a> {
    token: &'a str,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct RefreshBody {
    refresh_token: Option<String>,
}

pub async fn register(
    state: &AppState,
    parts: &Parts,
    body: &Bytes,
) -> Result<Response<BoxBody>, CovenantError> {
    let req: RegisterRequest = parse_json(body)?;
    let session = state.accounts.register(req).await?;
    Ok(session_response(state, parts, StatusCode::CREATED, &session))
}

pub async fn login(
    state: &AppState,
    parts: &Parts,
    body: &Bytes,
) -> Result<Response<BoxBody>, CovenantError> {
    let req: LoginRequest = parse_json(body)?;
    let session = state.accounts.login(req).await?;
    Ok(session_response(state, parts, StatusCode::OK, &session))
}

pub async fn refresh(
    state: &AppState,
    parts: &Parts,
    body: &Bytes,
) -> Result<Response<BoxBody>, CovenantError> {
    let raw = presented_refresh(parts, body);
    let session = state.accounts.refresh(raw.as_deref()).await?;
    Ok(session_response(state, parts, StatusCode::OK, &session))
}

/// Always 200, whether or not a live token was presented
pub async fn logout(state: &AppState, parts: &Parts, body: &Bytes) -> Response<BoxBody> {
    let raw = presented_refresh(parts, body);
    state.accounts.logout(raw.as_deref()).await;

    let mut response = json_response(StatusCode::OK, &json!({ "ok": true }));
    set_cookie(&mut response, clear_cookie(cookie_secure(state, parts)));
    response
}

/// Body `refreshToken` wins over the cookie
fn presented_refresh(parts: &Parts, body: &Bytes) -> Option<String> {
    parse_json::<RefreshBody>(body)
        .ok()
        .and_then(|b| b.refresh_token)
        .filter(|t| !t.is_empty())
        .or_else(|| read_cookie(parts, REFRESH_COOKIE))
}

fn session_response(
    state: &AppState,
    parts: &Parts,
    status: StatusCode,
    session: &SessionTokens,
) -> Response<BoxBody> {
    let mut response = json_response(
        status,
        &TokenBody {
            token: &session.access_token,
        },
    );
    if let Some(refresh) = &session.refresh {
        set_cookie(
            &mut response,
            refresh_cookie(&refresh.raw, cookie_secure(state, parts)),
        );
    }
    response
}

fn set_cookie(response: &mut Response<BoxBody>, cookie: String) {
    if let Ok(value) = HeaderValue::from_str(&cookie) {
        response.headers_mut().append(SET_COOKIE, value);
    }
}

/// Explicit setting wins; otherwise follow the edge proxy
fn cookie_secure(state: &AppState, parts: &Parts) -> bool {
    state
        .args
        .cookie_secure
        .unwrap_or_else(|| forwarded_https(parts))
}

fn refresh_cookie(raw: &str, secure: bool) -> String {
    let max_age = REFRESH_TOKEN_TTL_DAYS * 24 * 60 * 60;
    let mut cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        REFRESH_COOKIE, raw, max_age
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

fn clear_cookie(secure: bool) -> String {
    let mut cookie = format!("{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0", REFRESH_COOKIE);
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}
