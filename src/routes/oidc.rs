//! OIDC provider endpoints
//!
//! Authorization code flow with mandatory PKCE (S256):
//! - GET  /authorize        validate the request, client renders a login form
//! - POST /oidc/authorize   submit credentials, 302 back to the client with a code
//! - POST /token            exchange code + verifier for tokens
//! - GET  /userinfo
//! - GET  /jwks.json

use bytes::Bytes;
use hyper::header::{HeaderValue, AUTHORIZATION, CACHE_CONTROL, HOST, LOCATION};
use hyper::http::request::Parts;
use hyper::{Response, StatusCode};
use serde_json::json;

use crate::oidc::{AuthorizeParams, AuthorizeSubmission, TokenRequest};
use crate::routes::{forwarded_https, header, json_response, parse_json_or_form, parse_query};
use crate::server::{AppState, BoxBody};
use crate::types::CovenantError;

pub async fn authorize_validate(
    state: &AppState,
    parts: &Parts,
) -> Result<Response<BoxBody>, CovenantError> {
    let params: AuthorizeParams = parse_query(parts)?;
    let pending = state.oidc.validate_authorize(&params).await?;
    Ok(json_response(StatusCode::OK, &pending))
}

/// Redirects with `Location`; the body repeats the target for XHR callers
pub async fn authorize_submit(
    state: &AppState,
    parts: &Parts,
    body: &Bytes,
) -> Result<Response<BoxBody>, CovenantError> {
    let submission: AuthorizeSubmission = parse_json_or_form(parts, body)?;
    let redirect_to = state.oidc.authorize(submission).await?;

    let location = HeaderValue::from_str(&redirect_to)
        .map_err(|_| CovenantError::InvalidRequest("redirect_uri is not a valid URL".into()))?;
    let mut response = json_response(StatusCode::FOUND, &json!({ "redirect_to": redirect_to }));
    response.headers_mut().insert(LOCATION, location);
    response
        .headers_mut()
        .insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
    Ok(response)
}

pub async fn token(
    state: &AppState,
    parts: &Parts,
    body: &Bytes,
) -> Result<Response<BoxBody>, CovenantError> {
    let req: TokenRequest = parse_json_or_form(parts, body)?;
    let issuer = issuer_url(state, parts);
    let tokens = state.oidc.token(req, &issuer).await?;

    let mut response = json_response(StatusCode::OK, &tokens);
    response
        .headers_mut()
        .insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
    Ok(response)
}

pub async fn userinfo(state: &AppState, parts: &Parts) -> Result<Response<BoxBody>, CovenantError> {
    let info = state
        .oidc
        .userinfo(header(parts, AUTHORIZATION.as_str()))
        .await?;
    Ok(json_response(StatusCode::OK, &info))
}

pub async fn jwks(state: &AppState) -> Result<Response<BoxBody>, CovenantError> {
    let keys = state.oidc.jwks().await?;
    Ok(json_response(StatusCode::OK, &keys))
}

/// Configured public issuer, else the origin the caller reached us on
fn issuer_url(state: &AppState, parts: &Parts) -> String {
    if let Some(issuer) = state.args.public_issuer() {
        return issuer;
    }
    let scheme = if forwarded_https(parts) { "https" } else { "http" };
    let host = header(parts, "x-forwarded-host")
        .and_then(|h| h.split(',').next())
        .or_else(|| header(parts, HOST.as_str()))
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .unwrap_or("localhost");
    format!("{}://{}", scheme, host)
}
