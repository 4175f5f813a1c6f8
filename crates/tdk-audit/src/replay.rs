//! Compliance export and replay verification.
//!
//! An audit trail can be exported as JSON Lines — one canonical (recursively
//! key-sorted, compact) JSON object per entry — and later verified for
//! replay: the log must parse, each trade's entries must be non-decreasing
//! in `created_at`, and each trade's first event must be CREATED.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;

use crate::{AuditEntry, AuditEventType};

/// Canonicalize by sorting keys recursively and emitting compact JSON.
/// One entry == one JSON line.
fn canonical_json_line<T: Serialize>(v: &T) -> Result<String> {
    let raw = serde_json::to_value(v).context("serialize audit entry failed")?;
    let sorted = sort_keys(&raw);
    serde_json::to_string(&sorted).context("json stringify failed")
}

fn sort_keys(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut keys: Vec<_> = map.keys().cloned().collect();
            keys.sort();
            let mut new = serde_json::Map::new();
            for k in keys {
                new.insert(k.clone(), sort_keys(&map[&k]));
            }
            Value::Object(new)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sort_keys).collect()),
        _ => v.clone(),
    }
}

/// Export entries as canonical JSONL, in the given order.
pub fn export_jsonl(entries: &[AuditEntry]) -> Result<String> {
    let mut out = String::new();
    for entry in entries {
        out.push_str(&canonical_json_line(entry)?);
        out.push('\n');
    }
    Ok(out)
}

/// Result of replay verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplayResult {
    /// The whole log is a valid replay.
    Valid { entries: usize },
    /// The log breaks at the given (1-based) line.
    Broken { line: usize, reason: String },
}

/// Verify that JSONL content is a valid compliance replay log.
pub fn verify_replay(content: &str) -> Result<ReplayResult> {
    let mut last_seen: HashMap<String, DateTime<Utc>> = HashMap::new();
    let mut entry_count = 0usize;

    for (i, line) in content.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let entry: AuditEntry = serde_json::from_str(trimmed)
            .with_context(|| format!("parse audit entry at line {}", i + 1))?;

        entry_count += 1;

        match last_seen.get(&entry.trade_id) {
            None => {
                // First entry for this trade must be its creation.
                if entry.event_type != AuditEventType::Created {
                    return Ok(ReplayResult::Broken {
                        line: i + 1,
                        reason: format!(
                            "first event for trade {} is {}, expected CREATED",
                            entry.trade_id, entry.event_type
                        ),
                    });
                }
            }
            Some(prev) => {
                if entry.created_at < *prev {
                    return Ok(ReplayResult::Broken {
                        line: i + 1,
                        reason: format!(
                            "out-of-order entry for trade {}: {} < {}",
                            entry.trade_id, entry.created_at, prev
                        ),
                    });
                }
            }
        }

        last_seen.insert(entry.trade_id.clone(), entry.created_at);
    }

    Ok(ReplayResult::Valid {
        entries: entry_count,
    })
}
