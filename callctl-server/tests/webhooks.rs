//! Router-level tests for the webhook shims and debug routes

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt; // for `oneshot`

use callctl_core::db::MemoryStore;
use callctl_core::{Row, Table};
use callctl_server::{build_router, AppState, ServerConfig};

fn row(value: Value) -> Row {
    match value {
        Value::Object(map) => map,
        _ => panic!("row must be an object"),
    }
}

fn seeded_store() -> Arc<MemoryStore> {
    Arc::new(MemoryStore::new().with_rows(
        Table::Calls,
        vec![
            row(json!({"id": "c-1", "vapi_call_id": "vapi-123", "status": "in-progress"})),
            row(json!({"id": "c-2", "vapi_call_id": "vapi-456", "status": "in-progress"})),
        ],
    ))
}

fn app(store: Arc<MemoryStore>, debug_routes: bool) -> Router {
    let config = ServerConfig {
        debug_routes,
        ..Default::default()
    };
    build_router(AppState::new(store), &config)
}

fn post(uri: &str, body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(body.into())
        .expect("request builds")
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body readable");
    serde_json::from_slice(&bytes).expect("json body")
}

fn end_of_call(call_id: &str) -> String {
    json!({
        "message": {
            "type": "end-of-call-report",
            "endedReason": "customer-ended-call",
            "call": {"id": call_id},
            "transcript": "AI: Hello\nUser: Hi",
            "recordingUrl": "https://storage.example/rec.wav",
            "cost": 0.31
        }
    })
    .to_string()
}

#[tokio::test]
async fn end_of_call_updates_exactly_one_call() {
    let store = seeded_store();
    let response = app(store.clone(), false)
        .oneshot(post("/webhooks/vapi", end_of_call("vapi-123")))
        .await
        .expect("request handled");

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({"received": true}));

    let rows = store.rows(Table::Calls);
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["status"], json!("completed"));
    assert_eq!(rows[0]["transcript"], json!("AI: Hello\nUser: Hi"));
    assert_eq!(rows[0]["cost"], json!(0.31));
    assert_eq!(rows[1]["status"], json!("in-progress"));
    assert!(rows[1].get("transcript").is_none());
}

#[tokio::test]
async fn unknown_call_is_acknowledged_without_insert() {
    let store = seeded_store();
    let response = app(store.clone(), false)
        .oneshot(post("/webhooks/vapi", end_of_call("vapi-unknown")))
        .await
        .expect("request handled");

    assert_eq!(response.status(), StatusCode::OK);
    let rows = store.rows(Table::Calls);
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|r| r["status"] == json!("in-progress")));
}

#[tokio::test]
async fn malformed_payload_still_returns_200() {
    let store = seeded_store();
    let response = app(store.clone(), false)
        .oneshot(post("/webhooks/vapi", "{not json"))
        .await
        .expect("request handled");

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(store.rows(Table::Calls).len(), 2);
}

#[tokio::test]
async fn persistence_failure_still_returns_200() {
    // A CHECK on status that refuses "completed" makes the update fail.
    let store = Arc::new(
        MemoryStore::new()
            .with_rows(
                Table::Calls,
                vec![row(json!({"id": "c-1", "vapi_call_id": "vapi-123", "status": "queued"}))],
            )
            .with_check(Table::Calls, "status", ["queued"]),
    );
    let response = app(store.clone(), false)
        .oneshot(post("/webhooks/vapi", end_of_call("vapi-123")))
        .await
        .expect("request handled");

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(store.rows(Table::Calls)[0]["status"], json!("queued"));
}

#[tokio::test]
async fn status_update_sets_live_status() {
    let store = seeded_store();
    let payload = json!({
        "message": {"type": "status-update", "status": "ringing", "call": {"id": "vapi-456"}}
    })
    .to_string();
    app(store.clone(), false)
        .oneshot(post("/webhooks/vapi", payload))
        .await
        .expect("request handled");

    assert_eq!(store.rows(Table::Calls)[1]["status"], json!("ringing"));
}

#[tokio::test]
async fn log_shim_touches_nothing() {
    let store = seeded_store();
    let response = app(store.clone(), false)
        .oneshot(post("/webhooks/vapi/log", end_of_call("vapi-123")))
        .await
        .expect("request handled");

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(store.rows(Table::Calls)[0]["status"], json!("in-progress"));
}

#[tokio::test]
async fn debug_routes_are_opt_in() {
    let request = || {
        Request::builder()
            .uri("/debug/calls/vapi-123")
            .body(Body::empty())
            .expect("request builds")
    };

    let hidden = app(seeded_store(), false)
        .oneshot(request())
        .await
        .expect("request handled");
    assert_eq!(hidden.status(), StatusCode::NOT_FOUND);

    let shown = app(seeded_store(), true)
        .oneshot(request())
        .await
        .expect("request handled");
    assert_eq!(shown.status(), StatusCode::OK);
    assert_eq!(body_json(shown).await["id"], json!("c-1"));
}

#[tokio::test]
async fn debug_unknown_call_is_json_404() {
    let response = app(seeded_store(), true)
        .oneshot(
            Request::builder()
                .uri("/debug/calls/nope")
                .body(Body::empty())
                .expect("request builds"),
        )
        .await
        .expect("request handled");

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["error"], json!("not_found"));
}

#[tokio::test]
async fn health_reports_ok() {
    let response = app(seeded_store(), false)
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .expect("request builds"),
        )
        .await
        .expect("request handled");

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], json!("ok"));
    assert_eq!(body["store"], json!("memory"));
}
