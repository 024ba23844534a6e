use clob_core::{AdmissionLayer, BookStateStore, CoreConfig, EventBus, InMemoryLedger, PlaceOrderRequest, SettlementDriver, Side, Tif};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;

fn request(owner: &str, side: Side, price: Decimal, qty: Decimal) -> PlaceOrderRequest {
    PlaceOrderRequest {
        owner: owner.to_string(),
        pair: "BTC/USDT".to_string(),
        side,
        mode: clob_core::OrderMode::Limit,
        price: Some(price),
        quantity: qty,
        tif: Tif::Gtc,
        stop_loss: None,
        take_profit: None,
        client_nonce: uuid::Uuid::new_v4().to_string(),
    }
}

#[tokio::main]
async fn main() {
    let ledger = Arc::new(InMemoryLedger::new());
    ledger.credit(&"alice".to_string(), "USDT", dec!(1_000_000)).await;
    ledger.credit(&"bob".to_string(), "BTC", dec!(10)).await;

    let config = CoreConfig::default();
    let admission = AdmissionLayer::new(ledger.clone(), Arc::new(AtomicU64::new(1)), config.clone());
    let event_bus = Arc::new(EventBus::new(config.subscriber_queue_depth));
    let settlement = SettlementDriver::new(ledger.clone(), event_bus.clone(), config.settle_retry.clone());

    let mut bss = BookStateStore::new();
    bss.admit_pair("BTC/USDT");

    let maker = admission
        .place(&mut bss, request("bob", Side::Sell, dec!(98), dec!(2.5)))
        .await
        .unwrap();
    println!("maker resting: {:?}", maker.order);

    let taker_outcome = admission
        .place(&mut bss, request("alice", Side::Buy, dec!(98), dec!(2.5)))
        .await
        .unwrap();

    for intent in &taker_outcome.intents {
        let outcome = settlement.drive(&mut bss, intent).await.unwrap();
        match outcome {
            clob_core::SettleOutcome::Settled(trade) => {
                println!("settled {} @ {}", trade.quantity, trade.price);
            }
            clob_core::SettleOutcome::Abandoned => println!("intent abandoned"),
        }
    }

    let alice_btc = ledger.balance(&"alice".to_string(), "BTC").await.unwrap();
    println!("alice BTC balance after settlement: {alice_btc:?}");
    assert_eq!(alice_btc.available, dec!(2.5));
}
