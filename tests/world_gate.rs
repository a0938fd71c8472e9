//! A closed world is refused at every protocol entry point

mod common;

use hyper::StatusCode;
use serde_json::json;

use common::{Harness, Reply};

const CHALLENGE: &str = "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM";

fn assert_closed(reply: &Reply, route: &str) {
    assert_eq!(reply.status, StatusCode::GONE, "{}: {}", route, reply.body);
    assert_eq!(reply.body["error"], "world_closed", "{}", route);
    assert_eq!(reply.body["error_subcode"], "WORLD_CLOSED", "{}", route);
}

fn authorize_query(world: &str) -> String {
    format!(
        "response_type=code&client_id=pazar-web&redirect_uri={}&state=st-1&code_challenge={}&code_challenge_method=S256&world={}",
        urlencoding::encode("https://pazar.example.com/callback"),
        CHALLENGE,
        world
    )
}

#[tokio::test]
async fn closed_world_is_refused_everywhere() {
    let h = Harness::new(&["--world-closed", "marketplace"]).await;
    h.seed_client("pazar-web", "https://pazar.example.com/callback").await;

    let reply = h
        .post_json(
            "/v1/permits",
            &json!({
                "actor": { "hos_user_id": "u1" },
                "tenant_id": "t1",
                "subject_ref": { "world_id": "marketplace", "tenant_id": "t1", "type": "order" },
                "to": "paid",
                "command_key": "cmd-00000001",
                "ctx": { "world": "marketplace" }
            }),
        )
        .await;
    assert_closed(&reply, "issue");

    // The guard runs before the permit lookup
    let reply = h
        .post_json(
            "/v1/permits/any-permit/confirm",
            &json!({ "world_id": "marketplace" }),
        )
        .await;
    assert_closed(&reply, "confirm");

    let reply = h.get("/v1/proof?tenant_id=t1&world_id=marketplace").await;
    assert_closed(&reply, "proof");

    let reply = h
        .post_json(
            "/v1/contract/can-transition",
            &json!({
                "subject_ref": { "type": "order", "status": "pending" },
                "to": "paid",
                "ctx": { "world": "marketplace" }
            }),
        )
        .await;
    assert_closed(&reply, "can-transition");

    let reply = h
        .get(&format!("/authorize?{}", authorize_query("marketplace")))
        .await;
    assert_closed(&reply, "authorize");

    let reply = h
        .send(
            hyper::Method::POST,
            "/oidc/authorize",
            &[("content-type", "application/x-www-form-urlencoded")],
            format!(
                "{}&tenantSlug=acme&email=a%40acme.test&password=secret-pass",
                authorize_query("marketplace")
            ),
        )
        .await;
    assert_closed(&reply, "oidc authorize");
}

#[tokio::test]
async fn other_worlds_stay_open() {
    let h = Harness::new(&["--world-closed", "marketplace"]).await;
    let reply = h.get("/v1/proof?tenant_id=t1&world_id=social").await;
    assert_eq!(reply.status, StatusCode::OK);
    assert!(reply.body["items"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn unknown_and_missing_worlds_are_rejected() {
    let h = Harness::new(&[]).await;

    let reply = h.get("/v1/proof?tenant_id=t1&world_id=atlantis").await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.body["error"], "invalid_world");

    let reply = h
        .post_json("/v1/permits/p-1/confirm", &json!({ "world_mutation_id": "m1" }))
        .await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.body["error"], "missing_world");
}

#[tokio::test]
async fn closed_list_wins_over_allow_list() {
    let h = Harness::new(&[
        "--world-allowlist",
        "marketplace,social",
        "--world-closed",
        "social",
    ])
    .await;

    let reply = h.get("/v1/proof?tenant_id=t1&world_id=social").await;
    assert_eq!(reply.status, StatusCode::GONE);

    let reply = h.get("/v1/proof?tenant_id=t1&world_id=commerce").await;
    assert_eq!(reply.body["error"], "invalid_world");
}
