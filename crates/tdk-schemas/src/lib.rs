//! tdk-schemas
//!
//! Plain data types shared across the TradeDesk workspace: trades,
//! allocations, filters, summaries. No IO and no business logic beyond
//! constructors and filter matching — every other crate depends on this one
//! and this one depends on nothing else in the workspace.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Enum parse error
// ---------------------------------------------------------------------------

/// Returned when a persisted text column does not decode to a known enum
/// variant (e.g. a hand-edited row).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

impl fmt::Display for ParseEnumError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {}: {:?}", self.kind, self.value)
    }
}

impl std::error::Error for ParseEnumError {}

// ---------------------------------------------------------------------------
// Side
// ---------------------------------------------------------------------------

/// Direction of a trade. Persisted and serialized as "BUY" / "SELL".
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Side {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BUY" => Ok(Side::Buy),
            "SELL" => Ok(Side::Sell),
            other => Err(ParseEnumError {
                kind: "side",
                value: other.to_string(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// TradeStatus
// ---------------------------------------------------------------------------

/// Lifecycle status of a trade.
///
/// ACTIVE is the only state from which cancel/expire are reachable;
/// CANCELLED and EXPIRED are siblings that only escape via undo, back to
/// ACTIVE. There is no terminal state at this layer — settlement is an
/// external concern.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeStatus {
    Active,
    Cancelled,
    Expired,
}

impl TradeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeStatus::Active => "ACTIVE",
            TradeStatus::Cancelled => "CANCELLED",
            TradeStatus::Expired => "EXPIRED",
        }
    }
}

impl fmt::Display for TradeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TradeStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACTIVE" => Ok(TradeStatus::Active),
            "CANCELLED" => Ok(TradeStatus::Cancelled),
            "EXPIRED" => Ok(TradeStatus::Expired),
            other => Err(ParseEnumError {
                kind: "trade status",
                value: other.to_string(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Trade
// ---------------------------------------------------------------------------

/// One economic transaction resulting from an order fill (or manual entry).
///
/// `notional_value` is fixed at creation (qty × price) and never recomputed,
/// regardless of later lifecycle transitions or allocations.
/// `cancellation_reason` is non-`None` only while `status` is CANCELLED.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub trade_id: String,
    /// Originating order; `None` for manual trades.
    pub order_id: Option<String>,
    pub instrument_id: String,
    pub side: Side,
    pub qty: i64,
    pub price: Decimal,
    pub trader_id: String,
    pub broker_id: Option<String>,
    pub account_id: String,
    pub status: TradeStatus,
    pub cancellation_reason: Option<String>,
    pub expiry_date: Option<DateTime<Utc>>,
    pub notional_value: Decimal,
    pub commission: Decimal,
    /// Realized P&L, externally supplied.
    pub pnl: Option<Decimal>,
    pub unrealized_pnl: Option<Decimal>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Creation request for a trade. The engine assigns identity, status,
/// notional and timestamps.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewTrade {
    #[serde(default)]
    pub order_id: Option<String>,
    pub instrument_id: String,
    pub side: Side,
    pub qty: i64,
    pub price: Decimal,
    pub trader_id: String,
    #[serde(default)]
    pub broker_id: Option<String>,
    pub account_id: String,
    #[serde(default)]
    pub expiry_date: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// TradeAllocation
// ---------------------------------------------------------------------------

/// Assignment of a fraction of a trade's quantity to a downstream account.
///
/// Allocation rows are created in atomic batches per allocate call and have
/// no independent lifecycle — they belong to their parent trade.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TradeAllocation {
    pub allocation_id: String,
    pub trade_id: String,
    pub account_id: String,
    pub qty: i64,
    /// Defaults to the parent trade's price.
    pub price: Decimal,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

pub const ALLOCATION_STATUS_ACTIVE: &str = "ACTIVE";

impl TradeAllocation {
    /// Build one allocation row for a parent trade.
    pub fn for_trade(
        trade_id: &str,
        account_id: &str,
        qty: i64,
        price: Decimal,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            allocation_id: Uuid::new_v4().to_string(),
            trade_id: trade_id.to_string(),
            account_id: account_id.to_string(),
            qty,
            price,
            status: ALLOCATION_STATUS_ACTIVE.to_string(),
            created_at,
        }
    }
}

/// Summary returned by an allocate call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationSummary {
    pub trade_id: String,
    pub allocation_count: usize,
    pub total_qty: i64,
}

// ---------------------------------------------------------------------------
// TradeFilter
// ---------------------------------------------------------------------------

/// Conjunctive (AND) filter for trade listings. An absent field means
/// "no constraint on that field".
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeFilter {
    #[serde(default)]
    pub status: Option<TradeStatus>,
    #[serde(default)]
    pub account_id: Option<String>,
    #[serde(default)]
    pub trader_id: Option<String>,
    #[serde(default)]
    pub instrument_id: Option<String>,
}

impl TradeFilter {
    pub fn matches(&self, trade: &Trade) -> bool {
        if let Some(status) = self.status {
            if trade.status != status {
                return false;
            }
        }
        if let Some(ref account_id) = self.account_id {
            if &trade.account_id != account_id {
                return false;
            }
        }
        if let Some(ref trader_id) = self.trader_id {
            if &trade.trader_id != trader_id {
                return false;
            }
        }
        if let Some(ref instrument_id) = self.instrument_id {
            if &trade.instrument_id != instrument_id {
                return false;
            }
        }
        true
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_trade() -> Trade {
        let now = Utc::now();
        Trade {
            trade_id: "t-1".to_string(),
            order_id: None,
            instrument_id: "ES".to_string(),
            side: Side::Buy,
            qty: 100,
            price: Decimal::new(450000, 2),
            trader_id: "T1".to_string(),
            broker_id: None,
            account_id: "ACC1".to_string(),
            status: TradeStatus::Active,
            cancellation_reason: None,
            expiry_date: None,
            notional_value: Decimal::new(45000000, 2),
            commission: Decimal::ZERO,
            pnl: None,
            unrealized_pnl: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn status_round_trips_through_str() {
        for s in [
            TradeStatus::Active,
            TradeStatus::Cancelled,
            TradeStatus::Expired,
        ] {
            assert_eq!(s.as_str().parse::<TradeStatus>().unwrap(), s);
        }
        assert!("SETTLED".parse::<TradeStatus>().is_err());
    }

    #[test]
    fn side_serializes_uppercase() {
        assert_eq!(serde_json::to_string(&Side::Buy).unwrap(), "\"BUY\"");
        assert_eq!(serde_json::to_string(&Side::Sell).unwrap(), "\"SELL\"");
    }

    #[test]
    fn empty_filter_matches_everything() {
        let trade = sample_trade();
        assert!(TradeFilter::default().matches(&trade));
    }

    #[test]
    fn filters_are_conjunctive() {
        let trade = sample_trade();

        let mut filter = TradeFilter {
            status: Some(TradeStatus::Active),
            account_id: Some("ACC1".to_string()),
            ..TradeFilter::default()
        };
        assert!(filter.matches(&trade));

        // One mismatching field rejects even when the others match.
        filter.trader_id = Some("T2".to_string());
        assert!(!filter.matches(&trade));
    }
}
