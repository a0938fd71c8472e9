//! Authorization code + PKCE flow over HTTP

mod common;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hyper::{Method, StatusCode};
use serde_json::{json, Value};

use common::{Harness, Reply};
use covenant::auth::pkce::s256_challenge;

const CLIENT: &str = "pazar-web";
const REDIRECT: &str = "https://pazar.example.com/callback";
const VERIFIER: &str = "verifier-0123456789-abcdefghijklmnop";

async fn oidc_harness(extra: &[&str]) -> Harness {
    let h = Harness::new(extra).await;
    h.seed_tenant("tenant-1", "acme").await;
    h.seed_client(CLIENT, REDIRECT).await;
    let reply = h
        .post_json(
            "/v1/auth/register",
            &json!({ "tenantSlug": "acme", "email": "owner@acme.test", "password": "password-123" }),
        )
        .await;
    assert_eq!(reply.status, StatusCode::CREATED);
    h
}

fn authorize_params() -> Value {
    json!({
        "response_type": "code",
        "client_id": CLIENT,
        "redirect_uri": REDIRECT,
        "scope": "openid profile",
        "state": "st-1",
        "code_challenge": s256_challenge(VERIFIER),
        "code_challenge_method": "S256",
        "world": "marketplace"
    })
}

/// Submit credentials and pull the code out of the redirect
async fn obtain_code(h: &Harness) -> String {
    let mut body = authorize_params();
    body["tenantSlug"] = json!("acme");
    body["email"] = json!("owner@acme.test");
    body["password"] = json!("password-123");

    let reply = h.post_json("/oidc/authorize", &body).await;
    assert_eq!(reply.status, StatusCode::FOUND, "{}", reply.body);
    let location = reply.header("location").unwrap().to_string();
    assert_eq!(reply.body["redirect_to"], location.as_str());
    assert!(location.starts_with(&format!("{}?code=", REDIRECT)));
    assert!(location.ends_with("&state=st-1"));

    let raw = location
        .split_once("code=")
        .and_then(|(_, rest)| rest.split('&').next())
        .unwrap();
    urlencoding::decode(raw).unwrap().into_owned()
}

async fn exchange(h: &Harness, code: &str, verifier: &str) -> Reply {
    let form = format!(
        "grant_type=authorization_code&client_id={}&redirect_uri={}&code={}&code_verifier={}",
        CLIENT,
        urlencoding::encode(REDIRECT),
        urlencoding::encode(code),
        verifier
    );
    h.send(
        Method::POST,
        "/token",
        &[
            ("content-type", "application/x-www-form-urlencoded"),
            ("host", "auth.example.com"),
        ],
        form,
    )
    .await
}

fn jwt_payload(token: &str) -> Value {
    let segment = token.split('.').nth(1).unwrap();
    serde_json::from_slice(&URL_SAFE_NO_PAD.decode(segment).unwrap()).unwrap()
}

#[tokio::test]
async fn code_flow_issues_tokens_once() {
    let h = oidc_harness(&[]).await;

    let query = serde_urlencoded::to_string(
        authorize_params()
            .as_object()
            .unwrap()
            .iter()
            .map(|(k, v)| (k.clone(), v.as_str().unwrap().to_string()))
            .collect::<Vec<_>>(),
    )
    .unwrap();
    let pending = h.get(&format!("/authorize?{}", query)).await;
    assert_eq!(pending.status, StatusCode::OK, "{}", pending.body);
    assert_eq!(pending.body["status"], "pending_credentials");
    assert_eq!(pending.body["world"], "marketplace");

    let code = obtain_code(&h).await;
    let tokens = exchange(&h, &code, VERIFIER).await;
    assert_eq!(tokens.status, StatusCode::OK, "{}", tokens.body);
    assert_eq!(tokens.body["token_type"], "Bearer");
    assert_eq!(tokens.body["expires_in"], 900);
    assert_eq!(tokens.header("cache-control"), Some("no-store"));

    let id = jwt_payload(tokens.body["id_token"].as_str().unwrap());
    assert_eq!(id["iss"], "http://auth.example.com");
    assert_eq!(id["aud"], CLIENT);
    assert_eq!(id["tenant_id"], "tenant-1");
    assert_eq!(id["world"], "marketplace");
    assert_eq!(id["email"], "owner@acme.test");

    let reuse = exchange(&h, &code, VERIFIER).await;
    assert_eq!(reuse.status, StatusCode::BAD_REQUEST);
    assert_eq!(reuse.body["error"], "invalid_grant");

    let access = tokens.body["access_token"].as_str().unwrap();
    let bearer = format!("Bearer {}", access);
    let info = h
        .send(Method::GET, "/userinfo", &[("authorization", bearer.as_str())], "")
        .await;
    assert_eq!(info.status, StatusCode::OK, "{}", info.body);
    assert_eq!(info.body["email"], "owner@acme.test");
    assert_eq!(info.body["tenant_id"], "tenant-1");
    assert_eq!(info.body["role"], "owner");
    assert_eq!(info.body["sub"], id["sub"]);

    let jwks = h.get("/jwks.json").await;
    let keys = jwks.body["keys"].as_array().unwrap();
    assert_eq!(keys.len(), 1);
    assert_eq!(keys[0]["kty"], "RSA");
}

#[tokio::test]
async fn wrong_verifier_burns_the_code() {
    let h = oidc_harness(&[]).await;
    let code = obtain_code(&h).await;

    let wrong = exchange(&h, &code, "another-verifier-0123456789").await;
    assert_eq!(wrong.body["error"], "invalid_grant");

    let right = exchange(&h, &code, VERIFIER).await;
    assert_eq!(right.body["error"], "invalid_grant");
}

#[tokio::test]
async fn configured_issuer_wins_over_host() {
    let h = oidc_harness(&["--public-issuer", "https://id.example.com/"]).await;
    let code = obtain_code(&h).await;
    let tokens = exchange(&h, &code, VERIFIER).await;
    let id = jwt_payload(tokens.body["id_token"].as_str().unwrap());
    assert_eq!(id["iss"], "https://id.example.com");
}

#[tokio::test]
async fn protocol_errors_are_reported() {
    let h = oidc_harness(&[]).await;

    let mut body = authorize_params();
    body["tenantSlug"] = json!("acme");
    body["email"] = json!("owner@acme.test");
    body["password"] = json!("not-the-password");
    let denied = h.post_json("/oidc/authorize", &body).await;
    assert_eq!(denied.status, StatusCode::UNAUTHORIZED);
    assert_eq!(denied.body["error"], "access_denied");
    assert_eq!(denied.body["error_description"], "invalid_credentials");

    let mut body = authorize_params();
    body["code_challenge_method"] = json!("plain");
    body["tenantSlug"] = json!("acme");
    let plain = h.post_json("/oidc/authorize", &body).await;
    assert_eq!(plain.body["error_description"], "pkce_required");

    let grant = h
        .post_json("/token", &json!({ "grant_type": "password" }))
        .await;
    assert_eq!(grant.body["error"], "unsupported_grant_type");

    let anonymous = h.get("/userinfo").await;
    assert_eq!(anonymous.status, StatusCode::UNAUTHORIZED);
    assert_eq!(anonymous.body["error"], "invalid_token");

    let unknown_client = h
        .get("/authorize?response_type=code&client_id=ghost&redirect_uri=https%3A%2F%2Fx.example%2Fcb&state=s&code_challenge=E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM&code_challenge_method=S256&world=marketplace")
        .await;
    assert_eq!(unknown_client.body["error"], "invalid_client");
}
