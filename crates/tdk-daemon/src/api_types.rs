//! Request and response types for the tdk-daemon HTTP endpoints.
//!
//! These are `Serialize + Deserialize` so Axum can JSON-encode them and
//! tests can decode them. No business logic lives here. Trade bodies reuse
//! the plain `tdk-schemas` types directly.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use tdk_schemas::{ParseEnumError, TradeFilter};

// ---------------------------------------------------------------------------
// /v1/health
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: &'static str,
    pub version: &'static str,
}

// ---------------------------------------------------------------------------
// Lifecycle request bodies
// ---------------------------------------------------------------------------

fn default_cancel_reason() -> String {
    "User requested".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelTradeRequest {
    #[serde(default = "default_cancel_reason")]
    pub reason: String,
    #[serde(default)]
    pub actor: Option<String>,
}

impl Default for CancelTradeRequest {
    fn default() -> Self {
        Self {
            reason: default_cancel_reason(),
            actor: None,
        }
    }
}

/// Body for expire/undo. `{}` is a valid body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActorRequest {
    #[serde(default)]
    pub actor: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocateTradeRequest {
    /// account_id → quantity; must sum to the trade quantity exactly.
    pub allocations: BTreeMap<String, i64>,
}

// ---------------------------------------------------------------------------
// GET /v1/trades query params
// ---------------------------------------------------------------------------

/// Raw query parameters for trade listing. Status arrives as text on the
/// wire and is parsed into the typed filter here.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListTradesQuery {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub account_id: Option<String>,
    #[serde(default)]
    pub trader_id: Option<String>,
    #[serde(default)]
    pub instrument_id: Option<String>,
}

impl ListTradesQuery {
    pub fn into_filter(self) -> Result<TradeFilter, ParseEnumError> {
        Ok(TradeFilter {
            status: self.status.as_deref().map(str::parse).transpose()?,
            account_id: self.account_id,
            trader_id: self.trader_id,
            instrument_id: self.instrument_id,
        })
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
