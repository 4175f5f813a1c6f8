//! tdk-audit
//!
//! Append-only lifecycle audit trail for trades.
//!
//! # Design
//!
//! Exactly one entry is recorded per successful lifecycle operation, in the
//! same transaction as the trade mutation (the store realization owns the
//! transaction; this crate owns the event model). Entries are immutable and
//! strictly ordered by creation time per trade — never updated, never
//! deleted.
//!
//! Event metadata is a tagged union ([`AuditMeta`]), one variant per event
//! type. It is serialized to a schemaless JSON column only at the
//! persistence boundary; internal code never inspects blob shapes.
//!
//! The query side enriches the actor identifier (`changed_by`) into a human
//! display name via a [`TraderDirectory`] lookup, falling back to the raw
//! identifier when the trader cannot be resolved.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use tdk_schemas::{ParseEnumError, Side, TradeStatus};

mod replay;

pub use replay::{export_jsonl, verify_replay, ReplayResult};

// ---------------------------------------------------------------------------
// AuditEventType
// ---------------------------------------------------------------------------

/// Lifecycle event kinds recorded in the audit trail.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AuditEventType {
    Created,
    Cancelled,
    Expired,
    Allocated,
    Undo,
}

impl AuditEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEventType::Created => "CREATED",
            AuditEventType::Cancelled => "CANCELLED",
            AuditEventType::Expired => "EXPIRED",
            AuditEventType::Allocated => "ALLOCATED",
            AuditEventType::Undo => "UNDO",
        }
    }
}

impl fmt::Display for AuditEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditEventType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CREATED" => Ok(AuditEventType::Created),
            "CANCELLED" => Ok(AuditEventType::Cancelled),
            "EXPIRED" => Ok(AuditEventType::Expired),
            "ALLOCATED" => Ok(AuditEventType::Allocated),
            "UNDO" => Ok(AuditEventType::Undo),
            other => Err(ParseEnumError {
                kind: "audit event type",
                value: other.to_string(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// AuditMeta
// ---------------------------------------------------------------------------

/// Per-account line inside an [`AuditMeta::Allocated`] payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AllocationLine {
    pub account_id: String,
    pub qty: i64,
}

/// Event-specific metadata payload, one variant per event type.
///
/// EXPIRED events carry no metadata (`AuditEntry.meta` is `None`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuditMeta {
    Created {
        instrument_id: String,
        qty: i64,
        price: Decimal,
        side: Side,
        notional: Decimal,
    },
    Cancelled {
        reason: String,
    },
    Allocated {
        allocations: Vec<AllocationLine>,
        total_accounts: usize,
    },
    Undone {
        undone_from: TradeStatus,
    },
}

// ---------------------------------------------------------------------------
// AuditEntry
// ---------------------------------------------------------------------------

/// Fields supplied by the caller when recording an audit entry; identity and
/// timestamp are generated by [`AuditEntry::record`].
#[derive(Clone, Debug)]
pub struct NewAuditEvent {
    pub trade_id: String,
    pub event_type: AuditEventType,
    pub description: Option<String>,
    /// `None` for non-status events (ALLOCATED).
    pub old_status: Option<TradeStatus>,
    pub new_status: Option<TradeStatus>,
    /// Identifier of the actor who caused the change.
    pub changed_by: Option<String>,
    pub meta: Option<AuditMeta>,
}

/// One immutable audit record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub audit_id: Uuid,
    pub trade_id: String,
    pub event_type: AuditEventType,
    pub description: Option<String>,
    pub old_status: Option<TradeStatus>,
    pub new_status: Option<TradeStatus>,
    pub changed_by: Option<String>,
    pub meta: Option<AuditMeta>,
    pub created_at: DateTime<Utc>,
}

impl AuditEntry {
    /// Create one immutable record with a generated identifier and the
    /// current timestamp.
    pub fn record(ev: NewAuditEvent) -> Self {
        Self {
            audit_id: Uuid::new_v4(),
            trade_id: ev.trade_id,
            event_type: ev.event_type,
            description: ev.description,
            old_status: ev.old_status,
            new_status: ev.new_status,
            changed_by: ev.changed_by,
            meta: ev.meta,
            created_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// TraderDirectory + enrichment
// ---------------------------------------------------------------------------

/// Lookup collaborator used only to enrich audit-trail actor fields for
/// display. Resolution failures are treated as "not resolvable", never as
/// errors.
#[async_trait]
pub trait TraderDirectory: Send + Sync {
    async fn resolve_display_name(&self, trader_id: &str) -> Option<String>;
}

/// An audit entry with its actor identifier resolved for display.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EnrichedAuditEntry {
    #[serde(flatten)]
    pub entry: AuditEntry,
    /// Display name of the actor: the trader's name when resolvable, else
    /// the raw identifier. `None` when the entry has no actor.
    pub changed_by_name: Option<String>,
}

/// Resolve `changed_by` on each entry against the trader directory.
pub async fn enrich_entries(
    directory: &dyn TraderDirectory,
    entries: Vec<AuditEntry>,
) -> Vec<EnrichedAuditEntry> {
    let mut out = Vec::with_capacity(entries.len());
    for entry in entries {
        let changed_by_name = match entry.changed_by.as_deref() {
            Some(id) => Some(
                directory
                    .resolve_display_name(id)
                    .await
                    .unwrap_or_else(|| id.to_string()),
            ),
            None => None,
        };
        out.push(EnrichedAuditEntry {
            entry,
            changed_by_name,
        });
    }
    out
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
