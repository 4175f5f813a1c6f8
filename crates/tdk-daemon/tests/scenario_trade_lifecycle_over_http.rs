use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use tdk_daemon::{routes, state::AppState};
use tdk_engine::LifecycleEngine;
use tdk_notify::{Broadcaster, EventBus, Notifier};
use tdk_testkit::{MemoryTradeStore, StaticTraderDirectory};

fn app() -> Router {
    let bus = Arc::new(EventBus::new(64, 64));
    let broadcaster = Arc::new(Broadcaster::new(64));
    let notifier = Notifier::spawn(Arc::clone(&bus), Arc::clone(&broadcaster), 64);

    let engine = LifecycleEngine::new(
        Arc::new(MemoryTradeStore::new()),
        Arc::new(StaticTraderDirectory::with([("T1", "Terry Lang")])),
        notifier,
    );

    routes::build_router(Arc::new(AppState::new(engine, bus, broadcaster)))
}

async fn request(router: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let req = match body {
        Some(v) => builder
            .header("content-type", "application/json")
            .body(Body::from(v.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let res = router.clone().oneshot(req).await.unwrap();
    let status = res.status();
    let bytes = res.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn scenario_full_lifecycle_round_trip_over_http() {
    let router = app();

    // Create.
    let (status, trade) = request(
        &router,
        "POST",
        "/v1/trades",
        Some(json!({
            "instrument_id": "ES",
            "side": "BUY",
            "qty": 100,
            "price": "4500.00",
            "trader_id": "T1",
            "account_id": "ACC1"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(trade["status"], "ACTIVE");
    let trade_id = trade["trade_id"].as_str().unwrap().to_string();

    // Cancel with a reason.
    let (status, cancelled) = request(
        &router,
        "POST",
        &format!("/v1/trades/{trade_id}/cancel"),
        Some(json!({ "reason": "fat finger", "actor": "T1" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cancelled["status"], "CANCELLED");
    assert_eq!(cancelled["cancellation_reason"], "fat finger");

    // Undo with an empty body.
    let (status, restored) = request(
        &router,
        "POST",
        &format!("/v1/trades/{trade_id}/undo"),
        Some(json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(restored["status"], "ACTIVE");
    assert_eq!(restored["cancellation_reason"], Value::Null);

    // Allocate across two accounts.
    let (status, summary) = request(
        &router,
        "POST",
        &format!("/v1/trades/{trade_id}/allocate"),
        Some(json!({ "allocations": { "ACC1": 60, "ACC2": 40 } })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["allocation_count"], 2);
    assert_eq!(summary["total_qty"], 100);

    let (status, allocations) =
        request(&router, "GET", &format!("/v1/trades/{trade_id}/allocations"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(allocations.as_array().unwrap().len(), 2);

    // Audit trail: CREATED, CANCELLED, UNDO, ALLOCATED — with the actor
    // resolved to a display name.
    let (status, trail) =
        request(&router, "GET", &format!("/v1/trades/{trade_id}/audit-trail"), None).await;
    assert_eq!(status, StatusCode::OK);
    let trail = trail.as_array().unwrap();
    assert_eq!(trail.len(), 4);
    assert_eq!(trail[0]["event_type"], "CREATED");
    assert_eq!(trail[0]["changed_by_name"], "Terry Lang");
    assert_eq!(trail[3]["event_type"], "ALLOCATED");

    // Listing filters by status as plain query text.
    let (status, hits) = request(&router, "GET", "/v1/trades?status=ACTIVE", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(hits.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn engine_errors_map_to_http_statuses() {
    let router = app();

    // Unknown trade → 404.
    let (status, body) = request(&router, "GET", "/v1/trades/missing", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("not found"));

    // Create then double-cancel → 409 on the second.
    let (_, trade) = request(
        &router,
        "POST",
        "/v1/trades",
        Some(json!({
            "instrument_id": "ES",
            "side": "SELL",
            "qty": 10,
            "price": "4500.00",
            "trader_id": "T1",
            "account_id": "ACC1"
        })),
    )
    .await;
    let trade_id = trade["trade_id"].as_str().unwrap().to_string();

    let (status, _) = request(
        &router,
        "POST",
        &format!("/v1/trades/{trade_id}/cancel"),
        Some(json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = request(
        &router,
        "POST",
        &format!("/v1/trades/{trade_id}/cancel"),
        Some(json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    // Bad allocation sum → 422.
    let (status, body) = request(
        &router,
        "POST",
        &format!("/v1/trades/{trade_id}/allocate"),
        Some(json!({ "allocations": { "ACC1": 3 } })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"]
        .as_str()
        .unwrap()
        .contains("must equal trade quantity"));

    // Invalid status filter → 422.
    let (status, _) = request(&router, "GET", "/v1/trades?status=SETTLED", None).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    // Invalid create input → 422.
    let (status, _) = request(
        &router,
        "POST",
        "/v1/trades",
        Some(json!({
            "instrument_id": "ES",
            "side": "BUY",
            "qty": 0,
            "price": "4500.00",
            "trader_id": "T1",
            "account_id": "ACC1"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}
