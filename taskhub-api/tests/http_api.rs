//! End-to-end tests for the HTTP surface over the in-memory store.

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use taskhub_api::{create_api_router, ApiConfig, AppState};
use taskhub_core::AgentStatus;
use taskhub_test_utils::fixtures::{api_key_for, TestMarket};

fn app(m: &TestMarket) -> Router {
    app_with(m, ApiConfig::default())
}

fn app_with(m: &TestMarket, config: ApiConfig) -> Router {
    create_api_router(AppState::new(m.market.clone(), config))
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    (status, value)
}

async fn post_json(app: &Router, uri: &str, token: &str, body: Value) -> (StatusCode, Value) {
    send(app, Method::POST, uri, Some(token), Some(body)).await
}

async fn get(app: &Router, uri: &str, token: &str) -> (StatusCode, Value) {
    send(app, Method::GET, uri, Some(token), None).await
}

#[track_caller]
fn assert_error(status: StatusCode, body: &Value, expected: StatusCode) {
    assert_eq!(status, expected, "body: {}", body);
    assert_eq!(body["code"], expected.as_u16(), "body: {}", body);
    assert!(body["data"].is_null());
    assert!(body["message"].is_string());
}

// ============================================================================
// AGENTS
// ============================================================================

#[tokio::test]
async fn test_register_returns_key_once() {
    let m = TestMarket::new();
    let app = app(&m);

    let (status, body) = send(
        &app,
        Method::POST,
        "/agents/register",
        None,
        Some(json!({ "name": "alpha", "description": "writes docs" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["code"], 0);
    assert_eq!(body["message"], "ok");
    assert_eq!(body["data"]["agent"]["name"], "alpha");
    assert_eq!(body["data"]["agent"]["points"], 10);
    let key = body["data"]["apiKey"].as_str().unwrap().to_string();
    assert!(key.starts_with("th_"));

    let (status, me) = get(&app, "/agents/me", &key).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["data"]["name"], "alpha");
    assert_eq!(me["data"]["availablePoints"], 10);
    assert!(me["data"].get("apiKeyHash").is_none());
}

#[tokio::test]
async fn test_register_duplicate_name_is_rejected() {
    let m = TestMarket::new();
    let app = app(&m);
    m.agent("alpha", 0).await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/agents/register",
        None,
        Some(json!({ "name": "ALPHA" })),
    )
    .await;
    assert_error(status, &body, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_register_without_name_is_rejected() {
    let m = TestMarket::new();
    let app = app(&m);

    let (status, body) = send(&app, Method::POST, "/agents/register", None, Some(json!({}))).await;
    assert_error(status, &body, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "MISSING_FIELD");
}

#[tokio::test]
async fn test_missing_and_invalid_keys_are_unauthorized() {
    let m = TestMarket::new();
    let app = app(&m);

    let (status, body) = send(&app, Method::GET, "/agents/me", None, None).await;
    assert_error(status, &body, StatusCode::UNAUTHORIZED);

    let (status, body) = get(&app, "/agents/me", "th_not-a-key").await;
    assert_error(status, &body, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_suspended_agent_is_forbidden() {
    let m = TestMarket::new();
    let app = app(&m);
    let agent = m.agent("mallory", 50).await;
    m.store
        .set_agent_status(agent.id, AgentStatus::Suspended)
        .await
        .unwrap();

    let (status, body) = get(&app, "/agents/me", &api_key_for("mallory")).await;
    assert_error(status, &body, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_unknown_agent_is_not_found() {
    let m = TestMarket::new();
    let app = app(&m);
    m.agent("alpha", 0).await;

    let uri = format!("/agents/{}", uuid::Uuid::now_v7());
    let (status, body) = get(&app, &uri, &api_key_for("alpha")).await;
    assert_error(status, &body, StatusCode::NOT_FOUND);
}

// ============================================================================
// TASKS
// ============================================================================

#[tokio::test]
async fn test_create_task_validation() {
    let m = TestMarket::new();
    let app = app(&m);
    m.agent("creator", 100).await;
    let key = api_key_for("creator");

    let (status, body) = post_json(&app, "/tasks", &key, json!({ "points": 5, "timeoutHours": 2 })).await;
    assert_error(status, &body, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "MISSING_FIELD");

    let (status, body) = post_json(
        &app,
        "/tasks",
        &key,
        json!({ "title": "too rich", "points": 500, "timeoutHours": 2 }),
    )
    .await;
    assert_error(status, &body, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "INSUFFICIENT_FUNDS");
}

#[tokio::test]
async fn test_malformed_json_uses_envelope() {
    let m = TestMarket::new();
    let app = app(&m);
    m.agent("creator", 100).await;

    let request = Request::builder()
        .method(Method::POST)
        .uri("/tasks")
        .header(header::AUTHORIZATION, format!("Bearer {}", api_key_for("creator")))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["code"], 400);
}

#[tokio::test]
async fn test_unknown_task_and_bad_id() {
    let m = TestMarket::new();
    let app = app(&m);
    m.agent("alpha", 0).await;
    let key = api_key_for("alpha");

    let uri = format!("/tasks/{}", uuid::Uuid::now_v7());
    let (status, body) = get(&app, &uri, &key).await;
    assert_error(status, &body, StatusCode::NOT_FOUND);

    let (status, body) = get(&app, "/tasks/not-a-uuid", &key).await;
    assert_error(status, &body, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_full_lifecycle_over_http() {
    let m = TestMarket::new();
    let app = app(&m);
    let creator = m.agent("creator", 100).await;
    let worker = m.agent("worker", 0).await;
    let creator_key = api_key_for("creator");
    let worker_key = api_key_for("worker");

    let (status, body) = post_json(
        &app,
        "/tasks",
        &creator_key,
        json!({ "title": "summarize", "description": "three bullet points", "points": 30, "timeoutHours": 4 }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["data"]["status"], "PENDING");
    let task_id = body["data"]["id"].as_str().unwrap().to_string();

    let (_, balance) = get(&app, "/points/balance", &creator_key).await;
    assert_eq!(balance["data"]["frozenPoints"], 30);
    assert_eq!(balance["data"]["availablePoints"], 70);

    let (status, body) = post_json(&app, &format!("/tasks/{}/claim", task_id), &worker_key, json!({})).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["data"]["status"], "CLAIMED");
    assert_eq!(body["data"]["executorId"], worker.id.to_string());

    let (status, body) = post_json(
        &app,
        &format!("/tasks/{}/callback", task_id),
        &worker_key,
        json!({ "progress": 50, "status": "EXECUTING", "message": "halfway" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["data"]["status"], "EXECUTING");
    assert_eq!(body["data"]["progress"], 50);

    let (status, body) = post_json(
        &app,
        &format!("/tasks/{}/complete", task_id),
        &worker_key,
        json!({ "deliverySummary": "done", "resultUrl": "https://example.com/out" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["data"]["status"], "COMPLETED");

    let (status, body) = post_json(
        &app,
        &format!("/tasks/{}/verify", task_id),
        &worker_key,
        json!({ "approved": true }),
    )
    .await;
    assert_error(status, &body, StatusCode::FORBIDDEN);

    let (status, body) = post_json(
        &app,
        &format!("/tasks/{}/verify", task_id),
        &creator_key,
        json!({ "approved": true }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["data"]["status"], "VERIFIED");

    let (_, creator_balance) = get(&app, "/points/balance", &creator_key).await;
    assert_eq!(creator_balance["data"]["points"], 70);
    assert_eq!(creator_balance["data"]["frozenPoints"], 0);
    let (_, worker_balance) = get(&app, "/points/balance", &worker_key).await;
    assert_eq!(worker_balance["data"]["points"], 30);

    let (status, detail) = get(&app, &format!("/tasks/{}", task_id), &creator_key).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["data"]["status"], "VERIFIED");
    assert!(detail["data"]["logs"].as_array().unwrap().len() >= 4);

    let worker = m.reload(worker.id).await;
    assert_eq!(worker.success_tasks, 1);
    let creator = m.reload(creator.id).await;
    assert_eq!(creator.balance.points, 70);
}

#[tokio::test]
async fn test_second_claim_is_rejected() {
    let m = TestMarket::new();
    let app = app(&m);
    let creator = m.agent("creator", 100).await;
    m.agent("first", 0).await;
    m.agent("second", 0).await;
    let task = m.post(&creator, 10, 2).await;
    let uri = format!("/tasks/{}/claim", task.id);

    let (status, _) = post_json(&app, &uri, &api_key_for("first"), json!({})).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = post_json(&app, &uri, &api_key_for("second"), json!({})).await;
    assert_error(status, &body, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("already claimed"));
}

#[tokio::test]
async fn test_cancel_refunds_creator() {
    let m = TestMarket::new();
    let app = app(&m);
    let creator = m.agent("creator", 40).await;
    let task = m.post(&creator, 15, 2).await;

    let (status, body) = post_json(
        &app,
        &format!("/tasks/{}/cancel", task.id),
        &api_key_for("creator"),
        json!({}),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["data"]["status"], "CANCELLED");

    let creator = m.reload(creator.id).await;
    assert_eq!(creator.balance.points, 55);
    assert_eq!(creator.balance.frozen_points, 0);
}

#[tokio::test]
async fn test_list_tasks_filters_by_status() {
    let m = TestMarket::new();
    let app = app(&m);
    let creator = m.agent("creator", 100).await;
    m.agent("worker", 0).await;
    let claimed = m.post(&creator, 5, 2).await;
    m.post(&creator, 5, 2).await;
    post_json(
        &app,
        &format!("/tasks/{}/claim", claimed.id),
        &api_key_for("worker"),
        json!({}),
    )
    .await;

    let (status, body) = get(&app, "/tasks?status=PENDING", &api_key_for("creator")).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    let tasks = body["data"].as_array().unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0]["status"], "PENDING");

    let (_, body) = get(&app, "/tasks?limit=1", &api_key_for("creator")).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}

// ============================================================================
// POINTS
// ============================================================================

#[tokio::test]
async fn test_points_history_is_newest_first() {
    let m = TestMarket::new();
    let app = app(&m);
    let creator = m.agent("creator", 100).await;
    m.post(&creator, 10, 2).await;
    m.post(&creator, 20, 2).await;

    let (status, body) = get(&app, "/points/history", &api_key_for("creator")).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    let entries = body["data"].as_array().unwrap();
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0]["amount"], -20);
    assert_eq!(entries[0]["balance"], 70);
    assert_eq!(entries[2]["type"], "INIT");

    let (_, body) = get(&app, "/points/history?limit=1&offset=1", &api_key_for("creator")).await;
    let entries = body["data"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["amount"], -10);
}

// ============================================================================
// COMMENTS
// ============================================================================

#[tokio::test]
async fn test_comments_and_votes() {
    let m = TestMarket::new();
    let app = app(&m);
    let creator = m.agent("creator", 100).await;
    m.agent("reader", 0).await;
    let task = m.post(&creator, 10, 2).await;
    let comments_uri = format!("/tasks/{}/comments", task.id);

    let (status, body) = post_json(
        &app,
        &comments_uri,
        &api_key_for("creator"),
        json!({ "content": "please cite sources" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    let comment_id = body["data"]["id"].as_str().unwrap().to_string();
    let vote_uri = format!("/comments/{}/vote", comment_id);

    let (status, body) = post_json(&app, &vote_uri, &api_key_for("creator"), json!({ "value": "UP" })).await;
    assert_error(status, &body, StatusCode::FORBIDDEN);

    let (status, body) = post_json(&app, &vote_uri, &api_key_for("reader"), json!({ "value": "UP" })).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["data"]["value"], "UP");

    let (_, body) = get(&app, &comments_uri, &api_key_for("reader")).await;
    let comments = body["data"].as_array().unwrap();
    assert_eq!(comments.len(), 1);
    assert_eq!(comments[0]["content"], "please cite sources");
    assert_eq!(comments[0]["upVotes"], 1);

    let (status, body) = post_json(&app, &vote_uri, &api_key_for("reader"), json!({ "value": "SIDEWAYS" })).await;
    assert_error(status, &body, StatusCode::BAD_REQUEST);
}

// ============================================================================
// CRON
// ============================================================================

#[tokio::test]
async fn test_cron_requires_configured_secret() {
    let m = TestMarket::new();
    let app = app_with(&m, ApiConfig::default().with_cron_secret("s3cret"));

    let (status, body) = send(&app, Method::POST, "/cron/timeout", None, None).await;
    assert_error(status, &body, StatusCode::UNAUTHORIZED);

    let (status, body) = send(&app, Method::POST, "/cron/timeout", Some("wrong"), None).await;
    assert_error(status, &body, StatusCode::UNAUTHORIZED);

    let (status, body) = send(&app, Method::POST, "/cron/timeout", Some("s3cret"), None).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["data"]["refunded"], 0);
}

#[tokio::test]
async fn test_cron_sweep_refunds_overdue_task() {
    let m = TestMarket::new();
    let app = app(&m);
    let creator = m.agent("creator", 100).await;
    let worker = m.agent("worker", 0).await;
    let task = m.post(&creator, 25, 1).await;
    m.market.claim_task(task.id, worker.id).await.unwrap();

    m.advance_hours(2);
    let (status, body) = send(&app, Method::POST, "/cron/timeout", None, None).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["data"]["executorTimeout"], 1);
    assert_eq!(body["data"]["refunded"], 1);
    assert!(body["data"]["errors"].as_array().unwrap().is_empty());

    let creator = m.reload(creator.id).await;
    assert_eq!(creator.balance.points, 125);
    assert_eq!(creator.balance.frozen_points, 0);
}

// ============================================================================
// HEALTH
// ============================================================================

#[tokio::test]
async fn test_health_probes_are_public() {
    let m = TestMarket::new();
    let app = app(&m);

    let (status, _) = send(&app, Method::GET, "/health/ping", None, None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, Method::GET, "/health/ready", None, None).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
}

#[tokio::test]
async fn test_unknown_route_uses_envelope() {
    let m = TestMarket::new();
    let app = app(&m);

    let (status, body) = send(&app, Method::GET, "/nope", None, None).await;
    assert_error(status, &body, StatusCode::NOT_FOUND);
}
