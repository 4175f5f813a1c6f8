//! tdk-testkit
//!
//! Test doubles for the workspace: an in-memory [`TradeStore`] with the same
//! transactional semantics as the PostgreSQL realization, a static trader
//! directory, and a pre-wired notification harness. Scenario tests across
//! the workspace run against these — no database required.
//!
//! [`TradeStore`]: tdk_engine::TradeStore

mod directory;
mod memory_store;

pub use directory::StaticTraderDirectory;
pub use memory_store::MemoryTradeStore;

use std::sync::Arc;

use tdk_notify::{Broadcaster, EventBus, Notifier};

/// A fully wired notification stack with handles to observe what the
/// engine emitted.
pub struct NotifyHarness {
    pub bus: Arc<EventBus>,
    pub broadcaster: Arc<Broadcaster>,
    pub notifier: Notifier,
}

/// Build a notification stack with small bounded buffers. Must be called
/// inside a tokio runtime (the notifier spawns its worker task).
pub fn notify_harness() -> NotifyHarness {
    let bus = Arc::new(EventBus::new(64, 64));
    let broadcaster = Arc::new(Broadcaster::new(64));
    let notifier = Notifier::spawn(Arc::clone(&bus), Arc::clone(&broadcaster), 64);
    NotifyHarness {
        bus,
        broadcaster,
        notifier,
    }
}
