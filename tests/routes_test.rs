//! HTTP adapter behavior against a memory-store-backed router: status
//! codes, error mapping, kilogram serialization, and idempotency headers.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::util::ServiceExt;
use uuid::Uuid;

use paper_ledger_rs::routes;
use paper_ledger_rs::store::MemoryStore;
use paper_ledger_rs::LedgerEngine;

fn app() -> Router {
    routes::router(LedgerEngine::new(Arc::new(MemoryStore::new())))
}

fn post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .header("X-User-Id", "tester")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn create_target(app: &Router, notify_when_kg: f64) -> Uuid {
    let target_id = Uuid::new_v4();
    let response = app
        .clone()
        .oneshot(post(
            "/api/ledger/targets",
            json!({ "target_id": target_id, "notify_when_kg": notify_when_kg }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    target_id
}

async fn add_roll(app: &Router, target_id: Uuid, amount_kg: f64) -> Uuid {
    let response = app
        .clone()
        .oneshot(post(
            &format!("/api/ledger/targets/{target_id}/rolls"),
            json!({ "amount_kg": amount_kg }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    // Fetch the roll id from the view
    let response = app
        .clone()
        .oneshot(get(&format!("/api/ledger/targets/{target_id}")))
        .await
        .unwrap();
    let view = body_json(response).await;
    let rolls = view["rolls"].as_array().unwrap();
    Uuid::parse_str(rolls.last().unwrap()["id"].as_str().unwrap()).unwrap()
}

#[tokio::test]
async fn test_health() {
    let response = app().oneshot(get("/api/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "paper-ledger-rs");
}

#[tokio::test]
async fn test_create_target_and_view() {
    let app = app();
    let target_id = create_target(&app, 2.0).await;

    let response = app
        .oneshot(get(&format!("/api/ledger/targets/{target_id}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let view = body_json(response).await;
    assert_eq!(view["aggregate"]["total_kg"], 0.0);
    assert_eq!(view["aggregate"]["remaining_kg"], 0.0);
    assert_eq!(view["aggregate"]["notify_when_kg"], 2.0);
    assert!(view["rolls"].as_array().unwrap().is_empty());
    assert!(view["logs"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_duplicate_target_conflicts() {
    let app = app();
    let target_id = create_target(&app, 0.0).await;

    let response = app
        .oneshot(post(
            "/api/ledger/targets",
            json!({ "target_id": target_id }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_unknown_target_is_404() {
    let response = app()
        .oneshot(get(&format!("/api/ledger/targets/{}", Uuid::new_v4())))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_add_consume_correct_flow() {
    let app = app();
    let target_id = create_target(&app, 0.0).await;
    let roll_id = add_roll(&app, target_id, 10.0).await;

    // Consume down to 7.5 kg
    let response = app
        .clone()
        .oneshot(post(
            &format!("/api/ledger/targets/{target_id}/rolls/{roll_id}/consume"),
            json!({ "new_remaining_kg": 7.5 }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let aggregate = body_json(response).await;
    assert_eq!(aggregate["total_kg"], 10.0);
    assert_eq!(aggregate["remaining_kg"], 7.5);

    // Usage cannot raise stock
    let response = app
        .clone()
        .oneshot(post(
            &format!("/api/ledger/targets/{target_id}/rolls/{roll_id}/consume"),
            json!({ "new_remaining_kg": 9.0 }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    // A correction can, and it moves the total with it
    let response = app
        .clone()
        .oneshot(post(
            &format!("/api/ledger/targets/{target_id}/rolls/{roll_id}/correct"),
            json!({ "corrected_kg": 9.0 }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let aggregate = body_json(response).await;
    assert_eq!(aggregate["total_kg"], 11.5);
    assert_eq!(aggregate["remaining_kg"], 9.0);

    // Audit trail reflects all three commits with attribution
    let response = app
        .oneshot(get(&format!("/api/ledger/targets/{target_id}")))
        .await
        .unwrap();
    let view = body_json(response).await;
    let logs = view["logs"].as_array().unwrap();
    assert_eq!(logs.len(), 3);
    assert_eq!(logs[0]["action"], "paper_in");
    assert_eq!(logs[1]["action"], "paper_out");
    assert_eq!(logs[1]["amount_kg"], 2.5);
    assert_eq!(logs[2]["action"], "fixing");
    assert_eq!(logs[2]["amount_kg"], 1.5);
    assert_eq!(logs[2]["remaining_after_kg"], 9.0);
    assert_eq!(logs[0]["user_id"], "tester");
}

#[tokio::test]
async fn test_invalid_amount_is_422() {
    let app = app();
    let target_id = create_target(&app, 0.0).await;

    let response = app
        .oneshot(post(
            &format!("/api/ledger/targets/{target_id}/rolls"),
            json!({ "amount_kg": -3.0 }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = body_json(response).await;
    assert!(body["error"].as_str().unwrap().contains("positive"));
}

#[tokio::test]
async fn test_idempotency_key_replay_conflicts() {
    let app = app();
    let target_id = create_target(&app, 0.0).await;
    let key = Uuid::new_v4().to_string();

    let request = |key: &str| {
        Request::builder()
            .method("POST")
            .uri(format!("/api/ledger/targets/{target_id}/rolls"))
            .header("content-type", "application/json")
            .header("Idempotency-Key", key)
            .body(Body::from(json!({ "amount_kg": 10.0 }).to_string()))
            .unwrap()
    };

    let response = app.clone().oneshot(request(&key)).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app.clone().oneshot(request(&key)).await.unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    // Only one roll landed
    let response = app
        .oneshot(get(&format!("/api/ledger/targets/{target_id}")))
        .await
        .unwrap();
    let view = body_json(response).await;
    assert_eq!(view["rolls"].as_array().unwrap().len(), 1);
    assert_eq!(view["aggregate"]["total_kg"], 10.0);
}

#[tokio::test]
async fn test_malformed_idempotency_key_is_400() {
    let app = app();
    let target_id = create_target(&app, 0.0).await;

    let request = Request::builder()
        .method("POST")
        .uri(format!("/api/ledger/targets/{target_id}/rolls"))
        .header("content-type", "application/json")
        .header("Idempotency-Key", "not-a-uuid")
        .body(Body::from(json!({ "amount_kg": 10.0 }).to_string()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_low_stock_report() {
    let app = app();
    let low = create_target(&app, 5.0).await;
    let fine = create_target(&app, 1.0).await;

    let low_roll = add_roll(&app, low, 10.0).await;
    add_roll(&app, fine, 10.0).await;

    // Draw the first target down to its threshold
    let response = app
        .clone()
        .oneshot(post(
            &format!("/api/ledger/targets/{low}/rolls/{low_roll}/consume"),
            json!({ "new_remaining_kg": 5.0 }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.oneshot(get("/api/ledger/low-stock")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let alerts = body["alerts"].as_array().unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0]["target_id"], low.to_string());
    assert_eq!(alerts[0]["remaining_kg"], 5.0);
    assert_eq!(alerts[0]["notify_when_kg"], 5.0);
}
