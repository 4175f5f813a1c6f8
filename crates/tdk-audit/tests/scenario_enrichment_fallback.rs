use async_trait::async_trait;
use tdk_audit::{
    enrich_entries, AuditEntry, AuditEventType, NewAuditEvent, TraderDirectory,
};
use tdk_schemas::TradeStatus;

/// Directory that only knows one trader.
struct OneTrader;

#[async_trait]
impl TraderDirectory for OneTrader {
    async fn resolve_display_name(&self, trader_id: &str) -> Option<String> {
        (trader_id == "T1").then(|| "Terry Lang".to_string())
    }
}

fn created_by(changed_by: Option<&str>) -> AuditEntry {
    AuditEntry::record(NewAuditEvent {
        trade_id: "t-1".to_string(),
        event_type: AuditEventType::Created,
        description: None,
        old_status: None,
        new_status: Some(TradeStatus::Active),
        changed_by: changed_by.map(str::to_string),
        meta: None,
    })
}

#[tokio::test]
async fn enrichment_resolves_known_actors_and_falls_back_to_raw_ids() {
    let entries = vec![
        created_by(Some("T1")),
        created_by(Some("T-UNKNOWN")),
        created_by(None),
    ];

    let enriched = enrich_entries(&OneTrader, entries).await;

    assert_eq!(enriched[0].changed_by_name.as_deref(), Some("Terry Lang"));
    // Unresolvable actor: the raw identifier is displayed.
    assert_eq!(enriched[1].changed_by_name.as_deref(), Some("T-UNKNOWN"));
    // No actor on the entry at all.
    assert_eq!(enriched[2].changed_by_name, None);
}
