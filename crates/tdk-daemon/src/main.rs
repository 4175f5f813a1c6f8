//! tdk-daemon entry point.
//!
//! This file is intentionally thin: it sets up tracing, connects to
//! PostgreSQL, wires the notification stack and the lifecycle engine, and
//! starts the HTTP server. All route handlers live in `routes.rs`; all
//! shared state types live in `state.rs`.

use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use tdk_daemon::{routes, state};
use tdk_db::{PgTradeStore, PgTraderDirectory};
use tdk_engine::LifecycleEngine;
use tdk_notify::{Broadcaster, EventBus, Notifier};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, Level};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env.local if present (dev convenience). Silent if the file does
    // not exist — production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let pool = tdk_db::connect_from_env().await?;
    tdk_db::migrate(&pool).await?;
    info!("database connected and migrated");

    // Notification stack: bus history + real-time broadcast, fed by a
    // worker task the engine hands snapshots to. Wired here, injected
    // below — no global registries.
    let bus = Arc::new(EventBus::new(1024, 256));
    let broadcaster = Arc::new(Broadcaster::new(1024));
    let notifier = Notifier::spawn(Arc::clone(&bus), Arc::clone(&broadcaster), 1024);

    let engine = LifecycleEngine::new(
        Arc::new(PgTradeStore::new(pool.clone())),
        Arc::new(PgTraderDirectory::new(pool)),
        notifier,
    );

    let shared = Arc::new(state::AppState::new(engine, bus, broadcaster));

    let app = routes::build_router(Arc::clone(&shared))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_localhost_only());

    let addr = bind_addr_from_env().unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 8873)));
    info!("tdk-daemon listening on http://{}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .await
        .context("server crashed")?;

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

fn bind_addr_from_env() -> Option<SocketAddr> {
    std::env::var("TDK_DAEMON_ADDR").ok()?.parse().ok()
}

/// CORS: allow only localhost origins.
fn cors_localhost_only() -> CorsLayer {
    let allowed_origins = [
        "http://localhost",
        "http://127.0.0.1",
        "http://localhost:3000",
        "http://127.0.0.1:3000",
        "http://localhost:5173",
        "http://127.0.0.1:5173",
    ];

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(tower_http::cors::Any)
}
