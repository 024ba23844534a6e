use clob_core::{BookStateStore, LockHandle, Order, OrderMode, OrderStatus, Side, Tif};
use rust_decimal::Decimal;
use uuid::Uuid;

fn resting(owner: &str, side: Side, price: i64, qty: i64, seq: u64) -> Order {
    Order {
        id: Uuid::new_v4(),
        owner: owner.to_string(),
        pair: "BTC/USDT".to_string(),
        side,
        mode: OrderMode::Limit,
        price: Some(Decimal::from(price)),
        quantity: Decimal::from(qty),
        filled: Decimal::ZERO,
        tif: Tif::Gtc,
        lock_handle: Some(LockHandle(format!("lock-{seq}"))),
        admit_seq: seq,
        status: OrderStatus::Open,
        stop_loss: None,
        take_profit: None,
    }
}

fn main() {
    let mut bss = BookStateStore::new();
    bss.admit_pair("BTC/USDT");

    bss.insert(resting("alice", Side::Buy, 99, 100, 1)).unwrap();
    bss.insert(resting("bob", Side::Buy, 98, 150, 2)).unwrap();
    bss.insert(resting("carol", Side::Buy, 97, 200, 3)).unwrap();
    bss.insert(resting("dave", Side::Sell, 101, 100, 4)).unwrap();
    bss.insert(resting("erin", Side::Sell, 102, 150, 5)).unwrap();
    bss.insert(resting("frank", Side::Sell, 103, 200, 6)).unwrap();

    let (bids, asks) = bss.snapshot("BTC/USDT", 10);
    println!("best bid: {:?}", bids.first());
    println!("best ask: {:?}", asks.first());

    let best_bid = bids.first().map(|(p, _)| *p);
    let best_ask = asks.first().map(|(p, _)| *p);
    assert_eq!(best_bid, Some(Decimal::from(99)));
    assert_eq!(best_ask, Some(Decimal::from(101)));
    println!("spread: {:?}", best_ask.zip(best_bid).map(|(a, b)| a - b));
}
