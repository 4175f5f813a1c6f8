//! tdk-notify
//!
//! Best-effort notification stack for trade lifecycle events.
//!
//! # Design
//!
//! Three explicitly constructed, dependency-injected pieces (no globals, no
//! module-level registries):
//!
//! - [`EventBus`] — in-process subscriber fan-out with a bounded ring-buffer
//!   history. Durable-event-log style: every published event is retained in
//!   history (up to the cap) whether or not anyone is subscribed.
//! - [`Broadcaster`] — real-time push to connected listeners, grouped by
//!   channel name. Trade updates go to the `"trades"` channel with the wire
//!   shape `{ "type": <tag>, "data": <snapshot> }`.
//! - [`Notifier`] — the handle the lifecycle engine holds. `notify` enqueues
//!   onto a bounded mpsc channel and returns immediately; a worker task owns
//!   the bus publish and the broadcast send. Transaction-commit latency is
//!   never coupled to transport latency, and no failure here ever reaches
//!   the caller — queue-full, worker-gone and zero-subscriber conditions are
//!   logged and swallowed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// EventTag
// ---------------------------------------------------------------------------

/// Tag vocabulary for trade-changed notifications.
///
/// Both undo and allocation notify with the generic `trade_updated` tag, so
/// downstream listeners cannot distinguish them without inspecting the
/// payload. Known interface smell; kept for wire compatibility.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventTag {
    TradeCreated,
    TradeCancelled,
    TradeExpired,
    TradeUpdated,
}

impl EventTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventTag::TradeCreated => "trade_created",
            EventTag::TradeCancelled => "trade_cancelled",
            EventTag::TradeExpired => "trade_expired",
            EventTag::TradeUpdated => "trade_updated",
        }
    }
}

impl fmt::Display for EventTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// TradeEvent + EventBus
// ---------------------------------------------------------------------------

/// One published bus event.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TradeEvent {
    pub event_id: Uuid,
    pub ts_utc: DateTime<Utc>,
    pub event_type: EventTag,
    /// Module that published the event (e.g. "trade").
    pub source: String,
    pub payload: Value,
}

/// In-process event bus with subscriber fan-out and bounded history.
pub struct EventBus {
    tx: broadcast::Sender<TradeEvent>,
    history: Mutex<VecDeque<TradeEvent>>,
    history_cap: usize,
}

impl EventBus {
    /// `capacity` bounds the per-subscriber broadcast buffer; `history_cap`
    /// bounds the retained event history (oldest evicted first).
    pub fn new(capacity: usize, history_cap: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self {
            tx,
            history: Mutex::new(VecDeque::with_capacity(history_cap)),
            history_cap,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TradeEvent> {
        self.tx.subscribe()
    }

    /// Publish one event: append to history, fan out to subscribers.
    /// Zero subscribers is not an error.
    pub fn publish(&self, event_type: EventTag, payload: Value, source: &str) -> TradeEvent {
        let event = TradeEvent {
            event_id: Uuid::new_v4(),
            ts_utc: Utc::now(),
            event_type,
            source: source.to_string(),
            payload,
        };

        {
            let mut history = self.history.lock().expect("event bus history poisoned");
            if history.len() == self.history_cap {
                history.pop_front();
            }
            history.push_back(event.clone());
        }

        let _ = self.tx.send(event.clone());
        event
    }

    /// Retained history, oldest first.
    pub fn history(&self) -> Vec<TradeEvent> {
        self.history
            .lock()
            .expect("event bus history poisoned")
            .iter()
            .cloned()
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Broadcaster
// ---------------------------------------------------------------------------

/// Channel name used for trade snapshots.
pub const TRADES_CHANNEL: &str = "trades";

/// Best-effort real-time push to connected listeners, grouped by channel
/// name. Listeners subscribe to a channel and receive every message sent to
/// it after the subscription; there is no replay.
pub struct Broadcaster {
    channels: RwLock<HashMap<String, broadcast::Sender<Value>>>,
    capacity: usize,
}

impl Broadcaster {
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            capacity,
        }
    }

    /// Subscribe to a channel, creating it if absent.
    pub fn subscribe(&self, channel: &str) -> broadcast::Receiver<Value> {
        let mut channels = self.channels.write().expect("broadcaster poisoned");
        channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Send a message to every listener on a channel. Returns the number of
    /// listeners reached; an unknown channel reaches zero.
    pub fn broadcast(&self, channel: &str, message: Value) -> usize {
        let channels = self.channels.read().expect("broadcaster poisoned");
        let Some(tx) = channels.get(channel) else {
            debug!(channel, "no listeners on channel");
            return 0;
        };
        tx.send(message).unwrap_or(0)
    }

    /// Push a trade snapshot to the `"trades"` channel with the standard
    /// wire shape `{ "type": <tag>, "data": <snapshot> }`.
    pub fn broadcast_trade_update(&self, snapshot: Value, tag: EventTag) -> usize {
        let message = json!({
            "type": tag.as_str(),
            "data": snapshot,
        });
        self.broadcast(TRADES_CHANNEL, message)
    }
}

// ---------------------------------------------------------------------------
// Notifier
// ---------------------------------------------------------------------------

struct NotifyMsg {
    snapshot: Value,
    tag: EventTag,
}

/// Engine-facing fire-and-forget notification handle.
///
/// Cheap to clone; all clones feed the same worker task.
#[derive(Clone)]
pub struct Notifier {
    tx: mpsc::Sender<NotifyMsg>,
}

impl Notifier {
    /// Spawn the worker task that drains the queue and performs the actual
    /// bus publish + broadcast send. Must be called inside a tokio runtime.
    pub fn spawn(bus: Arc<EventBus>, broadcaster: Arc<Broadcaster>, queue: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<NotifyMsg>(queue);

        tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                bus.publish(msg.tag, msg.snapshot.clone(), "trade");
                let reached = broadcaster.broadcast_trade_update(msg.snapshot, msg.tag);
                if reached == 0 {
                    debug!(tag = %msg.tag, "trade broadcast reached no listeners");
                }
            }
        });

        Self { tx }
    }

    /// A notifier with no worker behind it. Every notify is dropped (and
    /// logged). Useful where the notification stack is intentionally absent.
    pub fn disconnected() -> Self {
        let (tx, _) = mpsc::channel(1);
        Self { tx }
    }

    /// Enqueue a trade-changed notification. Never blocks, never fails:
    /// a full queue or a gone worker is logged at `warn` and the message is
    /// dropped.
    pub fn notify(&self, snapshot: Value, tag: EventTag) {
        if let Err(err) = self.tx.try_send(NotifyMsg { snapshot, tag }) {
            warn!(tag = %tag, error = %err, "dropping trade notification");
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
