//! End-to-end scenarios driven through the pair actor, covering the
//! full admit → match → settle → publish path against an in-memory ledger.

use clob_core::{
    spawn_pair_actor, CoreConfig, CoreError, EventBus, InMemoryLedger, OrderMode, OrderStatus,
    PlaceOrderRequest, Side, Tif,
};
use rust_decimal_macros::dec;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;

const PAIR: &str = "BTC/USDT";

fn limit_request(owner: &str, side: Side, price: rust_decimal::Decimal, qty: rust_decimal::Decimal, tif: Tif) -> PlaceOrderRequest {
    PlaceOrderRequest {
        owner: owner.to_string(),
        pair: PAIR.to_string(),
        side,
        mode: OrderMode::Limit,
        price: Some(price),
        quantity: qty,
        tif,
        stop_loss: None,
        take_profit: None,
        client_nonce: uuid::Uuid::new_v4().to_string(),
    }
}

async fn wired_pair(ledger: Arc<InMemoryLedger>) -> clob_core::PairActorHandle {
    let config = CoreConfig::default();
    let event_bus = Arc::new(EventBus::new(config.subscriber_queue_depth));
    let admit_seq = Arc::new(AtomicU64::new(1));
    spawn_pair_actor(PAIR.to_string(), ledger, event_bus, admit_seq, config)
}

#[tokio::test]
async fn s1_full_match_same_price_same_size() {
    let ledger = Arc::new(InMemoryLedger::new());
    ledger.credit(&"a".to_string(), "USDT", dec!(100000)).await;
    ledger.credit(&"b".to_string(), "BTC", dec!(1)).await;
    let handle = wired_pair(ledger.clone()).await;

    let buy = handle
        .place(limit_request("a", Side::Buy, dec!(50000), dec!(0.10), Tif::Gtc))
        .await
        .unwrap();
    assert_eq!(buy.status, OrderStatus::Open);

    let sell = handle
        .place(limit_request("b", Side::Sell, dec!(50000), dec!(0.10), Tif::Gtc))
        .await
        .unwrap();
    assert_eq!(sell.status, OrderStatus::Filled);

    let (bids, asks) = handle.snapshot(10).await.unwrap();
    assert!(bids.is_empty());
    assert!(asks.is_empty());

    let a_btc = ledger.balance(&"a".to_string(), "BTC").await.unwrap();
    assert_eq!(a_btc.available, dec!(0.10));
    let b_usdt = ledger.balance(&"b".to_string(), "USDT").await.unwrap();
    assert_eq!(b_usdt.available, dec!(5000));
}

#[tokio::test]
async fn s2_partial_fill_leaves_taker_open_with_remaining() {
    let ledger = Arc::new(InMemoryLedger::new());
    ledger.credit(&"a".to_string(), "USDT", dec!(100000)).await;
    ledger.credit(&"b".to_string(), "BTC", dec!(1)).await;
    let handle = wired_pair(ledger).await;

    let a_order = handle
        .place(limit_request("a", Side::Buy, dec!(51000), dec!(1.0), Tif::Gtc))
        .await
        .unwrap();
    assert_eq!(a_order.status, OrderStatus::Open);

    let b_order = handle
        .place(limit_request("b", Side::Sell, dec!(51000), dec!(0.3), Tif::Gtc))
        .await
        .unwrap();
    assert_eq!(b_order.status, OrderStatus::Filled);

    let (bids, _) = handle.snapshot(10).await.unwrap();
    assert_eq!(bids[0].1, dec!(0.7));
}

#[tokio::test]
async fn s3_self_trade_prevention_makes_no_progress() {
    let ledger = Arc::new(InMemoryLedger::new());
    ledger.credit(&"a".to_string(), "USDT", dec!(100000)).await;
    ledger.credit(&"a".to_string(), "BTC", dec!(1)).await;
    let handle = wired_pair(ledger).await;

    let sell = handle
        .place(limit_request("a", Side::Sell, dec!(52000), dec!(0.1), Tif::Gtc))
        .await
        .unwrap();
    assert_eq!(sell.status, OrderStatus::Open);

    let buy = handle
        .place(limit_request("a", Side::Buy, dec!(52000), dec!(0.1), Tif::Gtc))
        .await
        .unwrap();
    // SKIP policy: the engine walks past the conflicting pair and restores
    // it afterward, making no progress — both orders stay resting.
    assert_eq!(buy.status, OrderStatus::Open);

    let (bids, asks) = handle.snapshot(10).await.unwrap();
    assert!(asks.iter().any(|(p, _)| *p == dec!(52000)));
    assert!(bids.iter().any(|(p, _)| *p == dec!(52000)));
}

#[tokio::test]
async fn s4_fifo_at_same_price() {
    let ledger = Arc::new(InMemoryLedger::new());
    ledger.credit(&"b1".to_string(), "USDT", dec!(100000)).await;
    ledger.credit(&"b2".to_string(), "USDT", dec!(100000)).await;
    ledger.credit(&"s".to_string(), "BTC", dec!(10)).await;
    let handle = wired_pair(ledger).await;

    let b1 = handle
        .place(limit_request("b1", Side::Buy, dec!(100), dec!(1.0), Tif::Gtc))
        .await
        .unwrap();
    let b2 = handle
        .place(limit_request("b2", Side::Buy, dec!(100), dec!(1.0), Tif::Gtc))
        .await
        .unwrap();

    let s = handle
        .place(limit_request("s", Side::Sell, dec!(100), dec!(1.0), Tif::Gtc))
        .await
        .unwrap();
    assert_eq!(s.status, OrderStatus::Filled);

    let (bids, _) = handle.snapshot(10).await.unwrap();
    assert_eq!(bids[0].1, dec!(1.0));
    assert!(b1.admit_seq < b2.admit_seq);
}

#[tokio::test]
async fn s5_fok_unfillable_is_rejected_with_no_residual() {
    let ledger = Arc::new(InMemoryLedger::new());
    ledger.credit(&"s1".to_string(), "BTC", dec!(1)).await;
    ledger.credit(&"s2".to_string(), "BTC", dec!(1)).await;
    ledger.credit(&"taker".to_string(), "USDT", dec!(1000000)).await;
    let handle = wired_pair(ledger.clone()).await;

    handle
        .place(limit_request("s1", Side::Sell, dec!(50000), dec!(0.05), Tif::Gtc))
        .await
        .unwrap();
    handle
        .place(limit_request("s2", Side::Sell, dec!(50100), dec!(0.02), Tif::Gtc))
        .await
        .unwrap();

    let err = handle
        .place(limit_request("taker", Side::Buy, dec!(50100), dec!(1.0), Tif::Fok))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::FokUnfillable));

    let taker_usdt = ledger.balance(&"taker".to_string(), "USDT").await.unwrap();
    assert_eq!(taker_usdt.locked, dec!(0));
    assert_eq!(taker_usdt.available, dec!(1000000));
}

#[tokio::test]
async fn s6_cancel_returns_residual_lock() {
    let ledger = Arc::new(InMemoryLedger::new());
    ledger.credit(&"a".to_string(), "USDT", dec!(100000)).await;
    ledger.credit(&"b".to_string(), "BTC", dec!(1)).await;
    let handle = wired_pair(ledger.clone()).await;

    let a_order = handle
        .place(limit_request("a", Side::Buy, dec!(50000), dec!(1.0), Tif::Gtc))
        .await
        .unwrap();

    handle
        .place(limit_request("b", Side::Sell, dec!(50000), dec!(0.4), Tif::Gtc))
        .await
        .unwrap();

    let cancelled = handle.cancel(a_order.id, "a".to_string()).await.unwrap();
    assert_eq!(cancelled.status, OrderStatus::Cancelled);

    let a_usdt = ledger.balance(&"a".to_string(), "USDT").await.unwrap();
    assert_eq!(a_usdt.locked, dec!(0));
}
