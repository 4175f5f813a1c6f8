//! In-memory trade store.
//!
//! A single mutex serializes all operations, which gives this store the
//! same observable guarantees as the PostgreSQL realization: per-trade
//! lifecycle operations cannot interleave, mutations land together with
//! their audit entry or not at all, and the compare-and-set status guard
//! on update is enforced.

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::anyhow;
use async_trait::async_trait;

use tdk_audit::AuditEntry;
use tdk_engine::{StoreError, TradeStore};
use tdk_schemas::{Trade, TradeAllocation, TradeFilter, TradeStatus};

#[derive(Default)]
struct Inner {
    trades: HashMap<String, Trade>,
    /// Insertion order doubles as creation-time order.
    allocations: Vec<TradeAllocation>,
    audit: Vec<AuditEntry>,
}

/// In-memory [`TradeStore`] realization.
#[derive(Default)]
pub struct MemoryTradeStore {
    inner: Mutex<Inner>,
}

impl MemoryTradeStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TradeStore for MemoryTradeStore {
    async fn insert_trade(&self, trade: &Trade, audit: &AuditEntry) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().expect("memory store poisoned");
        if inner.trades.contains_key(&trade.trade_id) {
            return Err(StoreError::Backend(anyhow!(
                "duplicate trade id {}",
                trade.trade_id
            )));
        }
        inner.trades.insert(trade.trade_id.clone(), trade.clone());
        inner.audit.push(audit.clone());
        Ok(())
    }

    async fn get_trade(&self, trade_id: &str) -> Result<Option<Trade>, StoreError> {
        let inner = self.inner.lock().expect("memory store poisoned");
        Ok(inner.trades.get(trade_id).cloned())
    }

    async fn update_trade(
        &self,
        trade: &Trade,
        expected: TradeStatus,
        audit: &AuditEntry,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().expect("memory store poisoned");

        let found = match inner.trades.get(&trade.trade_id) {
            None => {
                return Err(StoreError::NotFound {
                    trade_id: trade.trade_id.clone(),
                })
            }
            Some(current) => current.status,
        };

        if found != expected {
            return Err(StoreError::Conflict {
                trade_id: trade.trade_id.clone(),
                expected,
                found,
            });
        }

        inner.trades.insert(trade.trade_id.clone(), trade.clone());
        inner.audit.push(audit.clone());
        Ok(())
    }

    async fn list_trades(&self, filter: &TradeFilter) -> Result<Vec<Trade>, StoreError> {
        let inner = self.inner.lock().expect("memory store poisoned");
        Ok(inner
            .trades
            .values()
            .filter(|t| filter.matches(t))
            .cloned()
            .collect())
    }

    async fn insert_allocations(
        &self,
        allocations: &[TradeAllocation],
        audit: &AuditEntry,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().expect("memory store poisoned");
        // Single locked section: the batch and its audit entry land together.
        inner.allocations.extend_from_slice(allocations);
        inner.audit.push(audit.clone());
        Ok(())
    }

    async fn list_allocations(&self, trade_id: &str) -> Result<Vec<TradeAllocation>, StoreError> {
        let inner = self.inner.lock().expect("memory store poisoned");
        Ok(inner
            .allocations
            .iter()
            .filter(|a| a.trade_id == trade_id)
            .cloned()
            .collect())
    }

    async fn list_audit(&self, trade_id: &str) -> Result<Vec<AuditEntry>, StoreError> {
        let inner = self.inner.lock().expect("memory store poisoned");
        Ok(inner
            .audit
            .iter()
            .filter(|e| e.trade_id == trade_id)
            .cloned()
            .collect())
    }
}
