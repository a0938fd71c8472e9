//! Issue → confirm → proof over HTTP

mod common;

use chrono::Duration;
use hyper::{Method, StatusCode};
use serde_json::{json, Value};

use common::Harness;

fn permit_request(command_key: &str, to: &str) -> Value {
    json!({
        "actor": { "hos_user_id": "u1" },
        "tenant_id": "t1",
        "subject_ref": {
            "world_id": "marketplace",
            "tenant_id": "t1",
            "type": "order",
            "id": "o-1",
            "status": "pending"
        },
        "from": "pending",
        "to": to,
        "command_key": command_key,
        "ctx": { "world": "marketplace" }
    })
}

fn confirm_request(snapshot_hash: &str, mutation: &str) -> Value {
    json!({
        "world_id": "marketplace",
        "world_mutation_id": mutation,
        "new_version": "2",
        "snapshot_hash": snapshot_hash,
        "mutation_hash": format!("mh-{}", mutation),
        "confirmed_at": "2026-01-01T00:00:05Z"
    })
}

async fn issue(h: &Harness, command_key: &str) -> Value {
    let reply = h
        .post_json("/v1/permits", &permit_request(command_key, "paid"))
        .await;
    assert_eq!(reply.status, StatusCode::OK, "{}", reply.body);
    reply.body
}

fn confirm_uri(grant: &Value) -> String {
    format!("/v1/permits/{}/confirm", grant["permit_id"].as_str().unwrap())
}

#[tokio::test]
async fn confirm_scenario_records_one_proof() {
    let h = Harness::new(&[]).await;
    let grant = issue(&h, "cmd-00000001").await;

    assert!(grant["permit_sig"].is_null());
    assert_eq!(grant["snapshot"]["actor_id"], "u1");
    assert_eq!(grant["snapshot"]["to"], "paid");
    assert_eq!(grant["expires_at"], "2026-01-01T00:10:00.000Z");
    let hash = grant["snapshot_hash"].as_str().unwrap().to_string();
    assert_eq!(hash.len(), 64);

    let first = h
        .send(
            Method::POST,
            &confirm_uri(&grant),
            &[("x-request-id", "req-confirm-0001")],
            confirm_request(&hash, "m1").to_string(),
        )
        .await;
    assert_eq!(first.status, StatusCode::OK, "{}", first.body);
    assert_eq!(first.body["ok"], true);
    let proof_id = first.body["proof_id"].as_str().unwrap().to_string();

    let replay = h
        .post_json(&confirm_uri(&grant), &confirm_request(&hash, "m1"))
        .await;
    assert_eq!(replay.status, StatusCode::OK);
    assert_eq!(replay.body["proof_id"], proof_id.as_str());

    let conflict = h
        .post_json(&confirm_uri(&grant), &confirm_request(&hash, "m2"))
        .await;
    assert_eq!(conflict.status, StatusCode::CONFLICT);
    assert_eq!(conflict.body["error"], "confirm_conflict");

    let page = h.get("/v1/proof?tenant_id=t1&world_id=marketplace").await;
    assert_eq!(page.status, StatusCode::OK);
    let items = page.body["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["proof_id"], proof_id.as_str());
    assert_eq!(items[0]["request_id"], "req-confirm-0001");
    assert_eq!(items[0]["idempotency_key"], "cmd-00000001");
    assert_eq!(items[0]["actor_id"], "u1");
    assert_eq!(items[0]["subject_ref"]["type"], "order");
    assert_eq!(items[0]["payload"]["world_mutation_id"], "m1");
    assert!(page.body["next_cursor"].is_null());
}

#[tokio::test]
async fn issuance_is_idempotent_per_command_key() {
    let h = Harness::new(&[]).await;
    let first = issue(&h, "cmd-00000001").await;
    let again = issue(&h, "cmd-00000001").await;
    assert_eq!(first["permit_id"], again["permit_id"]);
    assert_eq!(first["snapshot_hash"], again["snapshot_hash"]);

    let divergent = h
        .post_json("/v1/permits", &permit_request("cmd-00000001", "cancelled"))
        .await;
    assert_eq!(divergent.status, StatusCode::CONFLICT);
    assert_eq!(divergent.body["error"], "idempotency_conflict");

    let other = issue(&h, "cmd-00000002").await;
    assert_ne!(other["permit_id"], first["permit_id"]);
}

#[tokio::test]
async fn mismatched_snapshot_is_marked_illegal() {
    let h = Harness::new(&[]).await;
    let grant = issue(&h, "cmd-00000001").await;

    let reply = h
        .post_json(&confirm_uri(&grant), &confirm_request(&"0".repeat(64), "m1"))
        .await;
    assert_eq!(reply.status, StatusCode::CONFLICT);
    assert_eq!(reply.body["error"], "BINDING_MISMATCH");
    assert_eq!(reply.body["error_subcode"], "BINDING_MISMATCH");
    assert_eq!(reply.body["next_action"], "MARK_ILLEGAL");
}

#[tokio::test]
async fn expired_permit_requires_reissue() {
    let h = Harness::new(&[]).await;
    let grant = issue(&h, "cmd-00000001").await;
    let hash = grant["snapshot_hash"].as_str().unwrap().to_string();

    h.clock.advance(Duration::minutes(11));

    let reply = h
        .post_json(&confirm_uri(&grant), &confirm_request(&hash, "m1"))
        .await;
    assert_eq!(reply.status, StatusCode::CONFLICT);
    assert_eq!(reply.body["error"], "STALE_VERSION");
    assert_eq!(reply.body["next_action"], "REISSUE_PERMIT");

    let page = h.get("/v1/proof?tenant_id=t1&world_id=marketplace").await;
    assert!(page.body["items"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn issuance_rejects_inconsistent_requests() {
    let h = Harness::new(&[]).await;

    let mut body = permit_request("cmd-00000001", "paid");
    body["subject_ref"]["tenant_id"] = json!("t2");
    let reply = h.post_json("/v1/permits", &body).await;
    assert_eq!(reply.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(reply.body["error"], "tenant_mismatch");

    let mut body = permit_request("cmd-00000001", "paid");
    body["subject_ref"]["world_id"] = json!("social");
    let reply = h.post_json("/v1/permits", &body).await;
    assert_eq!(reply.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(reply.body["error"], "world_mismatch");

    let reply = h
        .post_json("/v1/permits", &permit_request("short", "paid"))
        .await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.body["error"], "invalid_request");

    let reply = h
        .send(Method::POST, "/v1/permits", &[], "{\"actor\":")
        .await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn confirm_unknown_permit_is_not_found() {
    let h = Harness::new(&[]).await;
    let reply = h
        .post_json(
            "/v1/permits/does-not-exist/confirm",
            &confirm_request(&"a".repeat(64), "m1"),
        )
        .await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);
    assert_eq!(reply.body["error"], "permit_not_found");
}

#[tokio::test]
async fn proof_pages_follow_cursor() {
    let h = Harness::new(&[]).await;
    for i in 0..3 {
        let grant = issue(&h, &format!("cmd-0000000{}", i)).await;
        let hash = grant["snapshot_hash"].as_str().unwrap().to_string();
        let reply = h
            .post_json(&confirm_uri(&grant), &confirm_request(&hash, &format!("m{}", i)))
            .await;
        assert_eq!(reply.status, StatusCode::OK);
        h.clock.advance(Duration::seconds(1));
    }

    let first = h
        .get("/v1/proof?tenant_id=t1&world_id=marketplace&limit=2")
        .await;
    let items = first.body["items"].as_array().unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["idempotency_key"], "cmd-00000002");
    assert_eq!(items[1]["idempotency_key"], "cmd-00000001");
    let cursor = first.body["next_cursor"].as_str().unwrap().to_string();
    assert_eq!(cursor, "2026-01-01T00:00:01.000Z");

    let second = h
        .get(&format!(
            "/v1/proof?tenant_id=t1&world_id=marketplace&limit=2&cursor={}",
            urlencoding::encode(&cursor)
        ))
        .await;
    let items = second.body["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["idempotency_key"], "cmd-00000000");
    assert!(second.body["next_cursor"].is_null());

    let missing = h.get("/v1/proof?world_id=marketplace").await;
    assert_eq!(missing.status, StatusCode::BAD_REQUEST);
    assert_eq!(missing.body["error"], "missing_query");

    let bad_cursor = h
        .get("/v1/proof?tenant_id=t1&world_id=marketplace&cursor=yesterday")
        .await;
    assert_eq!(bad_cursor.body["error"], "invalid_cursor");
}

#[tokio::test]
async fn contract_seam_answers_transitions() {
    let h = Harness::new(&[]).await;
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
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body, json!({ "allowed": true, "reason": "allowed" }));

    let reply = h
        .post_json(
            "/v1/contract/can-transition",
            &json!({
                "subject_ref": { "type": "order", "status": "cancelled" },
                "to": "paid",
                "ctx": { "world": "marketplace" }
            }),
        )
        .await;
    assert_eq!(reply.body["allowed"], false);
    assert_eq!(reply.body["reason"], "terminal_state");

    let reply = h
        .post_json(
            "/v1/contract/can-transition",
            &json!({ "subject_ref": {}, "to": "paid", "ctx": {} }),
        )
        .await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.body["error"], "missing_world");
}
