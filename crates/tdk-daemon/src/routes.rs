//! Axum router and all HTTP handlers for tdk-daemon.
//!
//! `build_router` is the single entry point; `main.rs` calls it and attaches
//! middleware layers. Every handler delegates to the lifecycle engine and
//! maps `EngineError` onto HTTP status codes via [`ApiError`].

use std::{convert::Infallible, sync::Arc};

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures_util::{Stream, StreamExt};
use serde_json::Value;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::error;

use tdk_engine::EngineError;
use tdk_notify::TRADES_CHANNEL;
use tdk_schemas::NewTrade;

use crate::{
    api_types::{
        ActorRequest, AllocateTradeRequest, CancelTradeRequest, ErrorResponse, HealthResponse,
        ListTradesQuery,
    },
    state::AppState,
};

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the complete application router wired to the given shared state.
///
/// Middleware layers (CORS, tracing) are **not** applied here; `main.rs`
/// attaches them after this call so tests can use the bare router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/trades", post(create_trade).get(list_trades))
        .route("/v1/trades/:trade_id", get(get_trade))
        .route("/v1/trades/:trade_id/cancel", post(cancel_trade))
        .route("/v1/trades/:trade_id/expire", post(expire_trade))
        .route("/v1/trades/:trade_id/undo", post(undo_trade))
        .route("/v1/trades/:trade_id/allocate", post(allocate_trade))
        .route("/v1/trades/:trade_id/allocations", get(get_allocations))
        .route("/v1/trades/:trade_id/audit-trail", get(get_audit_trail))
        .route("/v1/events", get(recent_events))
        .route("/v1/stream", get(stream))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

/// Wrapper mapping engine errors onto HTTP responses.
pub(crate) struct ApiError(EngineError);

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            EngineError::NotFound { .. } => StatusCode::NOT_FOUND,
            EngineError::InvalidState { .. } => StatusCode::CONFLICT,
            EngineError::InvalidAllocation { .. } | EngineError::InvalidInput { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            EngineError::Storage(source) => {
                error!(error = %source, "trade store failure");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

// ---------------------------------------------------------------------------
// GET /v1/health
// ---------------------------------------------------------------------------

pub(crate) async fn health(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            ok: true,
            service: st.build.service,
            version: st.build.version,
        }),
    )
}

// ---------------------------------------------------------------------------
// POST /v1/trades  /  GET /v1/trades
// ---------------------------------------------------------------------------

pub(crate) async fn create_trade(
    State(st): State<Arc<AppState>>,
    Json(body): Json<NewTrade>,
) -> Result<impl IntoResponse, ApiError> {
    let trade = st.engine.create(body).await?;
    Ok((StatusCode::CREATED, Json(trade)))
}

pub(crate) async fn list_trades(
    State(st): State<Arc<AppState>>,
    Query(query): Query<ListTradesQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let filter = query.into_filter().map_err(|err| {
        ApiError(EngineError::InvalidInput {
            reason: err.to_string(),
        })
    })?;
    let trades = st.engine.list(&filter).await?;
    Ok(Json(trades))
}

// ---------------------------------------------------------------------------
// GET /v1/trades/{id}
// ---------------------------------------------------------------------------

pub(crate) async fn get_trade(
    State(st): State<Arc<AppState>>,
    Path(trade_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let trade = st.engine.get(&trade_id).await?;
    Ok(Json(trade))
}

// ---------------------------------------------------------------------------
// Lifecycle operations
// ---------------------------------------------------------------------------

pub(crate) async fn cancel_trade(
    State(st): State<Arc<AppState>>,
    Path(trade_id): Path<String>,
    body: Option<Json<CancelTradeRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(body) = body.unwrap_or_else(|| Json(CancelTradeRequest::default()));
    let trade = st
        .engine
        .cancel(&trade_id, &body.reason, body.actor.as_deref())
        .await?;
    Ok(Json(trade))
}

pub(crate) async fn expire_trade(
    State(st): State<Arc<AppState>>,
    Path(trade_id): Path<String>,
    body: Option<Json<ActorRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(body) = body.unwrap_or_else(|| Json(ActorRequest::default()));
    let trade = st.engine.expire(&trade_id, body.actor.as_deref()).await?;
    Ok(Json(trade))
}

pub(crate) async fn undo_trade(
    State(st): State<Arc<AppState>>,
    Path(trade_id): Path<String>,
    body: Option<Json<ActorRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(body) = body.unwrap_or_else(|| Json(ActorRequest::default()));
    let trade = st.engine.undo(&trade_id, body.actor.as_deref()).await?;
    Ok(Json(trade))
}

pub(crate) async fn allocate_trade(
    State(st): State<Arc<AppState>>,
    Path(trade_id): Path<String>,
    Json(body): Json<AllocateTradeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let summary = st.engine.allocate(&trade_id, &body.allocations).await?;
    Ok(Json(summary))
}

// ---------------------------------------------------------------------------
// GET /v1/trades/{id}/allocations  /  audit-trail
// ---------------------------------------------------------------------------

pub(crate) async fn get_allocations(
    State(st): State<Arc<AppState>>,
    Path(trade_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let allocations = st.engine.get_allocations(&trade_id).await?;
    Ok(Json(allocations))
}

pub(crate) async fn get_audit_trail(
    State(st): State<Arc<AppState>>,
    Path(trade_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let trail = st.engine.get_audit_trail(&trade_id).await?;
    Ok(Json(trail))
}

// ---------------------------------------------------------------------------
// GET /v1/events
// ---------------------------------------------------------------------------

/// Recent bus events, oldest first, bounded by the bus history capacity.
pub(crate) async fn recent_events(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    Json(st.bus.history())
}

// ---------------------------------------------------------------------------
// GET /v1/stream  (SSE)
// ---------------------------------------------------------------------------

pub(crate) async fn stream(State(st): State<Arc<AppState>>) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert("Cache-Control", HeaderValue::from_static("no-cache"));
    headers.insert("Connection", HeaderValue::from_static("keep-alive"));

    let rx = st.broadcaster.subscribe(TRADES_CHANNEL);
    let events = broadcast_to_sse(rx);

    (headers, Sse::new(events).keep_alive(KeepAlive::new())).into_response()
}

fn broadcast_to_sse(
    rx: broadcast::Receiver<Value>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    BroadcastStream::new(rx).filter_map(|msg| async move {
        match msg {
            Ok(m) => {
                let event_name = m
                    .get("type")
                    .and_then(Value::as_str)
                    .unwrap_or("message")
                    .to_string();
                let data = serde_json::to_string(&m).ok()?;
                Some(Ok(Event::default().event(event_name).data(data)))
            }
            Err(_) => None, // lagged / closed
        }
    })
}
