//! Engine error taxonomy.
//!
//! Validation failures (InvalidState, InvalidAllocation, InvalidInput) are
//! detected before any mutation is attempted; persistence failures abort
//! the whole operation with no partial state. Notification failures never
//! appear here — they are logged and swallowed by the notify layer.

use crate::lifecycle::TransitionError;
use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("trade {trade_id} not found")]
    NotFound { trade_id: String },

    /// The attempted transition is not permitted from the current status.
    /// The caller must re-read state and decide; never auto-retried.
    #[error("{reason}")]
    InvalidState { reason: String },

    #[error("total allocated quantity ({allocated}) must equal trade quantity ({expected})")]
    InvalidAllocation { expected: i64, allocated: i64 },

    /// Constraint violation on creation or allocation input.
    #[error("{reason}")]
    InvalidInput { reason: String },

    #[error("trade store failure")]
    Storage(#[source] StoreError),
}

impl From<TransitionError> for EngineError {
    fn from(err: TransitionError) -> Self {
        EngineError::InvalidState {
            reason: err.to_string(),
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            // A failed compare-and-set means another operation committed
            // between our read and our write; to the caller this is the
            // same as having validated against the newer status.
            StoreError::Conflict { found, .. } => EngineError::InvalidState {
                reason: format!("trade status changed concurrently (now {found})"),
            },
            StoreError::NotFound { trade_id } => EngineError::NotFound { trade_id },
            other => EngineError::Storage(other),
        }
    }
}
