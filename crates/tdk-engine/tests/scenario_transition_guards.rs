use std::sync::Arc;

use rust_decimal::Decimal;
use tdk_engine::{EngineError, LifecycleEngine};
use tdk_schemas::{NewTrade, Side, Trade};
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

async fn assert_unmodified(engine: &LifecycleEngine, before: &Trade, audit_len: usize) {
    let after = engine.get(&before.trade_id).await.unwrap();
    assert_eq!(&after, before, "guarded operation must not modify the trade");
    let trail = engine.get_audit_trail(&before.trade_id).await.unwrap();
    assert_eq!(trail.len(), audit_len, "guarded operation must not audit");
}

#[tokio::test]
async fn cancel_is_rejected_off_active() {
    let engine = engine();
    let trade = engine.create(es_buy_100()).await.unwrap();
    let cancelled = engine.cancel(&trade.trade_id, "first", None).await.unwrap();

    // Cancelling a CANCELLED trade fails and changes nothing.
    let err = engine
        .cancel(&trade.trade_id, "second", None)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidState { .. }));
    assert!(err.to_string().contains("cannot cancel CANCELLED trade"));
    assert_unmodified(&engine, &cancelled, 2).await;
}

#[tokio::test]
async fn scenario_expire_on_expired_trade_is_rejected() {
    let engine = engine();
    let trade = engine.create(es_buy_100()).await.unwrap();
    let expired = engine.expire(&trade.trade_id, None).await.unwrap();

    let err = engine.expire(&trade.trade_id, None).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidState { .. }));
    assert_unmodified(&engine, &expired, 2).await;
}

#[tokio::test]
async fn cancel_and_expire_are_rejected_on_each_others_states() {
    let engine = engine();

    let trade = engine.create(es_buy_100()).await.unwrap();
    engine.expire(&trade.trade_id, None).await.unwrap();
    assert!(matches!(
        engine.cancel(&trade.trade_id, "late", None).await,
        Err(EngineError::InvalidState { .. })
    ));

    let trade = engine.create(es_buy_100()).await.unwrap();
    engine.cancel(&trade.trade_id, "gone", None).await.unwrap();
    assert!(matches!(
        engine.expire(&trade.trade_id, None).await,
        Err(EngineError::InvalidState { .. })
    ));
}

#[tokio::test]
async fn undo_is_rejected_on_active_trades() {
    let engine = engine();
    let trade = engine.create(es_buy_100()).await.unwrap();

    let err = engine.undo(&trade.trade_id, None).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidState { .. }));
    assert!(err
        .to_string()
        .contains("only CANCELLED or EXPIRED trades can be undone"));
    assert_unmodified(&engine, &trade, 1).await;
}

#[tokio::test]
async fn lifecycle_operations_on_unknown_trades_are_not_found() {
    let engine = engine();

    assert!(matches!(
        engine.cancel("missing", "why", None).await,
        Err(EngineError::NotFound { .. })
    ));
    assert!(matches!(
        engine.expire("missing", None).await,
        Err(EngineError::NotFound { .. })
    ));
    assert!(matches!(
        engine.undo("missing", None).await,
        Err(EngineError::NotFound { .. })
    ));
}
