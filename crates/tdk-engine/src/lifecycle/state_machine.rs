//! Trade status state machine.
//!
//! # Design
//!
//! Every lifecycle mutation is validated through [`transition`], which
//! either yields the (from, to) pair to apply or a [`TransitionError`] the
//! engine surfaces as a rejected operation. Validation happens before any
//! mutation is attempted, so an illegal transition never leaves partial
//! state.
//!
//! # State diagram
//!
//! ```text
//!         create
//!           │
//!           ▼
//!      ┌─ ACTIVE ─┐
//! cancel│         │expire
//!       ▼         ▼
//!  CANCELLED   EXPIRED
//!       │         │
//!       └──undo───┘
//!           │
//!           ▼
//!        ACTIVE
//! ```
//!
//! ACTIVE is the only state from which cancel/expire are legal; CANCELLED
//! and EXPIRED are siblings, both reached only from ACTIVE, and both only
//! escape via undo back to ACTIVE. There is no terminal state — a
//! CANCELLED or EXPIRED trade stays undo-able indefinitely. Undo is a
//! single-step rollback regardless of how many prior transitions occurred.

use std::fmt;

use tdk_schemas::TradeStatus;

// ---------------------------------------------------------------------------
// LifecycleAction
// ---------------------------------------------------------------------------

/// Status-changing lifecycle operations. Allocation is intentionally absent:
/// it never changes status.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LifecycleAction {
    Cancel,
    Expire,
    Undo,
}

impl LifecycleAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleAction::Cancel => "cancel",
            LifecycleAction::Expire => "expire",
            LifecycleAction::Undo => "undo",
        }
    }
}

impl fmt::Display for LifecycleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Transition / TransitionError
// ---------------------------------------------------------------------------

/// A legal status transition, ready to apply.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Transition {
    pub from: TradeStatus,
    pub to: TradeStatus,
}

/// Returned when an action is not permitted from the current status.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransitionError {
    pub from: TradeStatus,
    pub action: LifecycleAction,
}

impl fmt::Display for TransitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.action {
            LifecycleAction::Cancel => {
                write!(f, "cannot cancel {} trade", self.from)
            }
            LifecycleAction::Expire => {
                write!(f, "cannot expire {} trade", self.from)
            }
            LifecycleAction::Undo => {
                write!(
                    f,
                    "only CANCELLED or EXPIRED trades can be undone (trade is {})",
                    self.from
                )
            }
        }
    }
}

impl std::error::Error for TransitionError {}

// ---------------------------------------------------------------------------
// transition
// ---------------------------------------------------------------------------

/// Resolve an action against the current status.
///
/// # Errors
/// Returns [`TransitionError`] when the action is illegal from `current`.
/// The caller must leave the trade unmodified in that case.
pub fn transition(
    current: TradeStatus,
    action: LifecycleAction,
) -> Result<Transition, TransitionError> {
    use LifecycleAction::*;
    use TradeStatus::*;

    let to = match (current, action) {
        (Active, Cancel) => Cancelled,
        (Active, Expire) => Expired,
        (Cancelled | Expired, Undo) => Active,
        _ => return Err(TransitionError { from: current, action }),
    };

    Ok(Transition { from: current, to })
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
