//! tdk-engine
//!
//! The trade lifecycle and allocation engine — the only sanctioned write
//! path for trades and their audit trail.
//!
//! # Design
//!
//! - [`lifecycle::state_machine`] holds the pure status transition rules
//!   (ACTIVE → CANCELLED/EXPIRED → undo back to ACTIVE).
//! - [`LifecycleEngine`] validates preconditions against freshly read state,
//!   applies the mutation together with its audit entry through the
//!   [`TradeStore`] seam (one transaction per operation), and fires a
//!   best-effort notification after commit.
//! - Collaborators are injected at construction: the store, the trader
//!   directory used for audit enrichment, and the notifier handle. No
//!   globals, no in-process caching of trade state across calls.

pub mod engine;
pub mod error;
pub mod lifecycle;
pub mod store;

pub use engine::LifecycleEngine;
pub use error::EngineError;
pub use lifecycle::{transition, LifecycleAction, Transition, TransitionError};
pub use store::{StoreError, TradeStore};
