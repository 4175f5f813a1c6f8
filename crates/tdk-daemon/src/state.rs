//! Shared runtime state for tdk-daemon.
//!
//! Handlers receive `State<Arc<AppState>>` from Axum. The engine and the
//! notification stack are constructed once in `main.rs` and shared here;
//! this module owns nothing async itself.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use tdk_engine::LifecycleEngine;
use tdk_notify::{Broadcaster, EventBus};

// ---------------------------------------------------------------------------
// BuildInfo
// ---------------------------------------------------------------------------

/// Static build metadata included in health responses.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

// ---------------------------------------------------------------------------
// AppState
// ---------------------------------------------------------------------------

/// Cloneable (Arc) handle shared across all Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// The trade lifecycle engine — the only write path to trades.
    pub engine: LifecycleEngine,
    /// Event bus the notifier worker publishes to (history + fan-out).
    pub bus: Arc<EventBus>,
    /// Real-time broadcaster backing the SSE stream.
    pub broadcaster: Arc<Broadcaster>,
    /// Static build metadata.
    pub build: BuildInfo,
}

impl AppState {
    pub fn new(
        engine: LifecycleEngine,
        bus: Arc<EventBus>,
        broadcaster: Arc<Broadcaster>,
    ) -> Self {
        Self {
            engine,
            bus,
            broadcaster,
            build: BuildInfo {
                service: "tdk-daemon",
                version: env!("CARGO_PKG_VERSION"),
            },
        }
    }
}
