//! Persistence seam for the lifecycle engine.
//!
//! Declared here so any realization (PostgreSQL in `tdk-db`, in-memory in
//! `tdk-testkit`) can be injected. Mutating operations take the audit entry
//! alongside the trade data: the realization MUST commit both in one
//! transaction — the audit write must not succeed if the trade mutation
//! fails, and vice versa.

use async_trait::async_trait;

use tdk_audit::AuditEntry;
use tdk_schemas::{Trade, TradeAllocation, TradeFilter, TradeStatus};

// ---------------------------------------------------------------------------
// StoreError
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("trade {trade_id} not found")]
    NotFound { trade_id: String },

    /// The compare-and-set status guard on an update failed: the row's
    /// status was no longer `expected` at commit time. This is how the store
    /// serializes conflicting lifecycle operations on the same trade — the
    /// caller must re-read and re-validate.
    #[error("trade {trade_id} status changed concurrently (expected {expected}, found {found})")]
    Conflict {
        trade_id: String,
        expected: TradeStatus,
        found: TradeStatus,
    },

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

// ---------------------------------------------------------------------------
// TradeStore
// ---------------------------------------------------------------------------

/// Persistence collaborator contract.
///
/// Every mutation is transactional over (trade rows, audit row). Reads give
/// current committed state; the engine re-fetches before validating
/// preconditions, never caching across calls.
#[async_trait]
pub trait TradeStore: Send + Sync {
    /// Persist a freshly created trade together with its CREATED audit
    /// entry, atomically.
    async fn insert_trade(&self, trade: &Trade, audit: &AuditEntry) -> Result<(), StoreError>;

    async fn get_trade(&self, trade_id: &str) -> Result<Option<Trade>, StoreError>;

    /// Full-row replace of a trade, guarded by a compare-and-set on the
    /// previous status, together with its audit entry, atomically.
    ///
    /// # Errors
    /// [`StoreError::NotFound`] if the trade no longer exists;
    /// [`StoreError::Conflict`] if its status is not `expected` anymore.
    async fn update_trade(
        &self,
        trade: &Trade,
        expected: TradeStatus,
        audit: &AuditEntry,
    ) -> Result<(), StoreError>;

    /// All trades matching the filter. Finite, restartable, order
    /// unspecified.
    async fn list_trades(&self, filter: &TradeFilter) -> Result<Vec<Trade>, StoreError>;

    /// Persist one allocation batch and its single ALLOCATED audit entry,
    /// atomically — either every row lands or none do.
    async fn insert_allocations(
        &self,
        allocations: &[TradeAllocation],
        audit: &AuditEntry,
    ) -> Result<(), StoreError>;

    /// Every allocation row ever created for the trade, unfiltered by
    /// status.
    async fn list_allocations(&self, trade_id: &str) -> Result<Vec<TradeAllocation>, StoreError>;

    /// Audit entries for the trade, oldest first.
    async fn list_audit(&self, trade_id: &str) -> Result<Vec<AuditEntry>, StoreError>;
}
