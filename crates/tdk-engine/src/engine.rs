//! The lifecycle engine: the single write path for trades, allocations and
//! the audit trail.
//!
//! Every operation re-fetches current state, validates, applies the
//! mutation together with its audit entry through the store (one
//! transaction), and only then fires a best-effort notification. A
//! notification failure can never roll back a committed mutation.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::warn;
use uuid::Uuid;

use tdk_audit::{
    enrich_entries, AllocationLine, AuditEntry, AuditEventType, AuditMeta, EnrichedAuditEntry,
    NewAuditEvent, TraderDirectory,
};
use tdk_notify::{EventTag, Notifier};
use tdk_schemas::{AllocationSummary, NewTrade, Trade, TradeAllocation, TradeFilter, TradeStatus};

use crate::error::EngineError;
use crate::lifecycle::{transition, LifecycleAction};
use crate::store::TradeStore;

// ---------------------------------------------------------------------------
// LifecycleEngine
// ---------------------------------------------------------------------------

/// Trade lifecycle and allocation engine.
///
/// Collaborators are injected at construction and shared by clone; the
/// engine itself holds no trade state.
#[derive(Clone)]
pub struct LifecycleEngine {
    store: Arc<dyn TradeStore>,
    directory: Arc<dyn TraderDirectory>,
    notifier: Notifier,
}

impl LifecycleEngine {
    pub fn new(
        store: Arc<dyn TradeStore>,
        directory: Arc<dyn TraderDirectory>,
        notifier: Notifier,
    ) -> Self {
        Self {
            store,
            directory,
            notifier,
        }
    }

    // -----------------------------------------------------------------------
    // create
    // -----------------------------------------------------------------------

    /// Create a trade from an order fill or manual entry.
    ///
    /// Notional value is computed here (qty × price) and never recomputed
    /// afterwards.
    pub async fn create(&self, new: NewTrade) -> Result<Trade, EngineError> {
        if new.qty <= 0 {
            return Err(EngineError::InvalidInput {
                reason: "trade quantity must be positive".to_string(),
            });
        }
        if new.price <= Decimal::ZERO {
            return Err(EngineError::InvalidInput {
                reason: "trade price must be positive".to_string(),
            });
        }

        let now = Utc::now();
        let notional_value = Decimal::from(new.qty) * new.price;

        let trade = Trade {
            trade_id: Uuid::new_v4().to_string(),
            order_id: new.order_id,
            instrument_id: new.instrument_id,
            side: new.side,
            qty: new.qty,
            price: new.price,
            trader_id: new.trader_id,
            broker_id: new.broker_id,
            account_id: new.account_id,
            status: TradeStatus::Active,
            cancellation_reason: None,
            expiry_date: new.expiry_date,
            notional_value,
            commission: Decimal::ZERO,
            pnl: None,
            unrealized_pnl: None,
            created_at: now,
            updated_at: now,
        };

        let audit = AuditEntry::record(NewAuditEvent {
            trade_id: trade.trade_id.clone(),
            event_type: AuditEventType::Created,
            description: Some("Trade created".to_string()),
            old_status: None,
            new_status: Some(TradeStatus::Active),
            changed_by: Some(trade.trader_id.clone()),
            meta: Some(AuditMeta::Created {
                instrument_id: trade.instrument_id.clone(),
                qty: trade.qty,
                price: trade.price,
                side: trade.side,
                notional: trade.notional_value,
            }),
        });

        self.store.insert_trade(&trade, &audit).await?;
        self.notify(&trade, EventTag::TradeCreated);

        Ok(trade)
    }

    // -----------------------------------------------------------------------
    // get / list
    // -----------------------------------------------------------------------

    pub async fn get(&self, trade_id: &str) -> Result<Trade, EngineError> {
        self.store
            .get_trade(trade_id)
            .await?
            .ok_or_else(|| EngineError::NotFound {
                trade_id: trade_id.to_string(),
            })
    }

    pub async fn list(&self, filter: &TradeFilter) -> Result<Vec<Trade>, EngineError> {
        Ok(self.store.list_trades(filter).await?)
    }

    // -----------------------------------------------------------------------
    // cancel
    // -----------------------------------------------------------------------

    /// Cancel an ACTIVE trade.
    pub async fn cancel(
        &self,
        trade_id: &str,
        reason: &str,
        actor: Option<&str>,
    ) -> Result<Trade, EngineError> {
        let mut trade = self.get(trade_id).await?;
        let t = transition(trade.status, LifecycleAction::Cancel)?;

        trade.status = t.to;
        trade.cancellation_reason = Some(reason.to_string());
        trade.updated_at = Utc::now();

        let audit = AuditEntry::record(NewAuditEvent {
            trade_id: trade.trade_id.clone(),
            event_type: AuditEventType::Cancelled,
            description: Some("Trade cancelled".to_string()),
            old_status: Some(t.from),
            new_status: Some(t.to),
            changed_by: actor.map(str::to_string),
            meta: Some(AuditMeta::Cancelled {
                reason: reason.to_string(),
            }),
        });

        self.store.update_trade(&trade, t.from, &audit).await?;
        self.notify(&trade, EventTag::TradeCancelled);

        Ok(trade)
    }

    // -----------------------------------------------------------------------
    // expire
    // -----------------------------------------------------------------------

    /// Mark an ACTIVE trade as expired.
    pub async fn expire(&self, trade_id: &str, actor: Option<&str>) -> Result<Trade, EngineError> {
        let mut trade = self.get(trade_id).await?;
        let t = transition(trade.status, LifecycleAction::Expire)?;

        trade.status = t.to;
        trade.updated_at = Utc::now();

        let audit = AuditEntry::record(NewAuditEvent {
            trade_id: trade.trade_id.clone(),
            event_type: AuditEventType::Expired,
            description: Some("Trade expired".to_string()),
            old_status: Some(t.from),
            new_status: Some(t.to),
            changed_by: actor.map(str::to_string),
            meta: None,
        });

        self.store.update_trade(&trade, t.from, &audit).await?;
        self.notify(&trade, EventTag::TradeExpired);

        Ok(trade)
    }

    // -----------------------------------------------------------------------
    // undo
    // -----------------------------------------------------------------------

    /// Restore a CANCELLED or EXPIRED trade to ACTIVE, clearing any
    /// cancellation reason. Single-step rollback: it does not replay or
    /// reverse a chain of prior events.
    pub async fn undo(&self, trade_id: &str, actor: Option<&str>) -> Result<Trade, EngineError> {
        let mut trade = self.get(trade_id).await?;
        let t = transition(trade.status, LifecycleAction::Undo)?;

        trade.status = t.to;
        trade.cancellation_reason = None;
        trade.updated_at = Utc::now();

        let audit = AuditEntry::record(NewAuditEvent {
            trade_id: trade.trade_id.clone(),
            event_type: AuditEventType::Undo,
            description: Some(format!("Trade restored to ACTIVE from {}", t.from)),
            old_status: Some(t.from),
            new_status: Some(t.to),
            changed_by: actor.map(str::to_string),
            meta: Some(AuditMeta::Undone { undone_from: t.from }),
        });

        self.store.update_trade(&trade, t.from, &audit).await?;
        self.notify(&trade, EventTag::TradeUpdated);

        Ok(trade)
    }

    // -----------------------------------------------------------------------
    // allocate
    // -----------------------------------------------------------------------

    /// Split a trade's quantity across accounts.
    ///
    /// The batch must sum to the trade quantity exactly; on failure no rows
    /// are written. Status is intentionally not checked (a CANCELLED trade
    /// can be allocated), and repeated calls each validate only against the
    /// trade quantity — both observed behaviors of the upstream system,
    /// preserved deliberately.
    pub async fn allocate(
        &self,
        trade_id: &str,
        allocations: &BTreeMap<String, i64>,
    ) -> Result<AllocationSummary, EngineError> {
        let trade = self.get(trade_id).await?;

        for (account_id, qty) in allocations {
            if *qty <= 0 {
                return Err(EngineError::InvalidInput {
                    reason: format!("allocation quantity for account {account_id} must be positive"),
                });
            }
        }

        let total: i64 = allocations.values().sum();
        if total != trade.qty {
            return Err(EngineError::InvalidAllocation {
                expected: trade.qty,
                allocated: total,
            });
        }

        let now = Utc::now();
        let rows: Vec<TradeAllocation> = allocations
            .iter()
            .map(|(account_id, qty)| {
                TradeAllocation::for_trade(trade_id, account_id, *qty, trade.price, now)
            })
            .collect();

        let lines: Vec<AllocationLine> = rows
            .iter()
            .map(|r| AllocationLine {
                account_id: r.account_id.clone(),
                qty: r.qty,
            })
            .collect();

        // One audit entry covers the whole batch, not one per row.
        let audit = AuditEntry::record(NewAuditEvent {
            trade_id: trade_id.to_string(),
            event_type: AuditEventType::Allocated,
            description: Some(format!("Allocated to {} account(s)", rows.len())),
            old_status: None,
            new_status: None,
            changed_by: None,
            meta: Some(AuditMeta::Allocated {
                total_accounts: lines.len(),
                allocations: lines,
            }),
        });

        self.store.insert_allocations(&rows, &audit).await?;
        self.notify(&trade, EventTag::TradeUpdated);

        Ok(AllocationSummary {
            trade_id: trade_id.to_string(),
            allocation_count: rows.len(),
            total_qty: total,
        })
    }

    pub async fn get_allocations(
        &self,
        trade_id: &str,
    ) -> Result<Vec<TradeAllocation>, EngineError> {
        Ok(self.store.list_allocations(trade_id).await?)
    }

    // -----------------------------------------------------------------------
    // audit trail
    // -----------------------------------------------------------------------

    /// Audit entries for a trade, oldest first, with actor identifiers
    /// resolved to display names where the trader directory knows them.
    pub async fn get_audit_trail(
        &self,
        trade_id: &str,
    ) -> Result<Vec<EnrichedAuditEntry>, EngineError> {
        let entries = self.store.list_audit(trade_id).await?;
        Ok(enrich_entries(self.directory.as_ref(), entries).await)
    }

    // -----------------------------------------------------------------------
    // notification
    // -----------------------------------------------------------------------

    /// Best-effort, post-commit. Serialization failures are logged and
    /// swallowed like every other notification failure.
    fn notify(&self, trade: &Trade, tag: EventTag) {
        match serde_json::to_value(trade) {
            Ok(snapshot) => self.notifier.notify(snapshot, tag),
            Err(err) => {
                warn!(trade_id = %trade.trade_id, tag = %tag, error = %err,
                    "failed to serialize trade snapshot for notification");
            }
        }
    }
}
