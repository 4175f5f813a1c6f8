use std::collections::BTreeMap;
use std::sync::Arc;

use rust_decimal::Decimal;
use tdk_audit::{AuditEventType, AuditMeta};
use tdk_engine::{EngineError, LifecycleEngine};
use tdk_schemas::{NewTrade, Side};
use tdk_testkit::{notify_harness, MemoryTradeStore, StaticTraderDirectory};

fn engine() -> LifecycleEngine {
    LifecycleEngine::new(
        Arc::new(MemoryTradeStore::new()),
        Arc::new(StaticTraderDirectory::empty()),
        notify_harness().notifier,
    )
}

fn es_buy_100() -> NewTrade {
    NewTrade {
        order_id: None,
        instrument_id: "ES".to_string(),
        side: Side::Buy,
        qty: 100,
        price: Decimal::new(450000, 2),
        trader_id: "T1".to_string(),
        broker_id: None,
        account_id: "ACC1".to_string(),
        expiry_date: None,
    }
}

fn split(pairs: &[(&str, i64)]) -> BTreeMap<String, i64> {
    pairs.iter().map(|(a, q)| (a.to_string(), *q)).collect()
}

#[tokio::test]
async fn scenario_allocation_must_sum_to_trade_qty_with_no_partial_rows() {
    let engine = engine();
    let trade = engine.create(es_buy_100()).await.unwrap();

    // GIVEN a full allocation batch that sums to the trade quantity
    let summary = engine
        .allocate(&trade.trade_id, &split(&[("ACC1", 60), ("ACC2", 40)]))
        .await
        .unwrap();
    assert_eq!(summary.allocation_count, 2);
    assert_eq!(summary.total_qty, 100);

    let rows = engine.get_allocations(&trade.trade_id).await.unwrap();
    assert_eq!(rows.len(), 2);
    // Every row carries the parent trade's price.
    assert!(rows.iter().all(|r| r.price == trade.price));
    assert!(rows.iter().all(|r| r.status == "ACTIVE"));

    // WHEN a batch does not sum to the trade quantity
    let err = engine
        .allocate(&trade.trade_id, &split(&[("ACC1", 60), ("ACC2", 30)]))
        .await
        .unwrap_err();

    // THEN it is rejected and no rows were written (still the prior 2)
    assert!(matches!(
        err,
        EngineError::InvalidAllocation {
            expected: 100,
            allocated: 90
        }
    ));
    let rows = engine.get_allocations(&trade.trade_id).await.unwrap();
    assert_eq!(rows.len(), 2);
}

#[tokio::test]
async fn allocation_records_one_audit_entry_per_batch() {
    let engine = engine();
    let trade = engine.create(es_buy_100()).await.unwrap();

    engine
        .allocate(&trade.trade_id, &split(&[("ACC1", 60), ("ACC2", 40)]))
        .await
        .unwrap();

    // One ALLOCATED entry covering the whole batch, not one per row.
    let trail = engine.get_audit_trail(&trade.trade_id).await.unwrap();
    assert_eq!(trail.len(), 2);

    let entry = &trail[1].entry;
    assert_eq!(entry.event_type, AuditEventType::Allocated);
    assert_eq!(entry.old_status, None);
    assert_eq!(entry.new_status, None);
    match entry.meta.as_ref().unwrap() {
        AuditMeta::Allocated {
            allocations,
            total_accounts,
        } => {
            assert_eq!(*total_accounts, 2);
            let mut accounts: Vec<_> =
                allocations.iter().map(|l| (l.account_id.as_str(), l.qty)).collect();
            accounts.sort();
            assert_eq!(accounts, vec![("ACC1", 60), ("ACC2", 40)]);
        }
        other => panic!("unexpected ALLOCATED metadata: {other:?}"),
    }

    // A failed batch audits nothing.
    let _ = engine
        .allocate(&trade.trade_id, &split(&[("ACC1", 1)]))
        .await
        .unwrap_err();
    let trail = engine.get_audit_trail(&trade.trade_id).await.unwrap();
    assert_eq!(trail.len(), 2);
}

// Each allocate call is validated only against the trade quantity, not
// against previously allocated quantity: a second full batch doubles the
// rows. Upstream behavior, preserved deliberately — do not "fix" without a
// product decision.
#[tokio::test]
async fn repeated_full_allocations_stack_beyond_trade_qty() {
    let engine = engine();
    let trade = engine.create(es_buy_100()).await.unwrap();

    engine
        .allocate(&trade.trade_id, &split(&[("ACC1", 60), ("ACC2", 40)]))
        .await
        .unwrap();
    engine
        .allocate(&trade.trade_id, &split(&[("ACC3", 100)]))
        .await
        .unwrap();

    let rows = engine.get_allocations(&trade.trade_id).await.unwrap();
    assert_eq!(rows.len(), 3);
    let total: i64 = rows.iter().map(|r| r.qty).sum();
    assert_eq!(total, 200); // 200% of the trade quantity across two calls
}

// Allocation does not check trade status: a CANCELLED trade can still be
// allocated. Upstream behavior, preserved deliberately.
#[tokio::test]
async fn cancelled_trades_can_still_be_allocated() {
    let engine = engine();
    let trade = engine.create(es_buy_100()).await.unwrap();
    engine.cancel(&trade.trade_id, "busted", None).await.unwrap();

    let summary = engine
        .allocate(&trade.trade_id, &split(&[("ACC1", 100)]))
        .await
        .unwrap();
    assert_eq!(summary.allocation_count, 1);
}

#[tokio::test]
async fn allocation_input_guards() {
    let engine = engine();
    let trade = engine.create(es_buy_100()).await.unwrap();

    // Unknown trade.
    assert!(matches!(
        engine.allocate("missing", &split(&[("ACC1", 100)])).await,
        Err(EngineError::NotFound { .. })
    ));

    // Empty batch can never sum to a positive quantity.
    assert!(matches!(
        engine.allocate(&trade.trade_id, &BTreeMap::new()).await,
        Err(EngineError::InvalidAllocation { allocated: 0, .. })
    ));

    // Non-positive per-account quantities are rejected outright.
    assert!(matches!(
        engine
            .allocate(&trade.trade_id, &split(&[("ACC1", 101), ("ACC2", -1)]))
            .await,
        Err(EngineError::InvalidInput { .. })
    ));

    // Nothing was written by any of the failed calls.
    assert!(engine.get_allocations(&trade.trade_id).await.unwrap().is_empty());
}
