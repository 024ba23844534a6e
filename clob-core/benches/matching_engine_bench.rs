use clob_core::{match_pair, BookStateStore, LockHandle, Order, OrderMode, OrderStatus, SelfTradePolicy, Side, Tif};
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use rust_decimal::Decimal;
use std::time::Duration;
use uuid::Uuid;

const PAIR: &str = "BTC/USDT";

fn resting(owner: &str, side: Side, price: i64, qty: i64, seq: u64) -> Order {
    Order {
        id: Uuid::new_v4(),
        owner: owner.to_string(),
        pair: PAIR.to_string(),
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

// 70% limit / 30% market, mirroring a realistic exchange order mix.
fn simulate_exchange_orders(bss: &mut BookStateStore, order_count: usize) {
    let base_price = 50000i64;
    let mut seq = 1u64;

    for i in 0..order_count {
        let side = if i % 2 == 0 { Side::Buy } else { Side::Sell };
        if i % 10 < 7 {
            let price = base_price + (i % 10) as i64 - 5;
            let qty = ((i % 5) + 1) as i64;
            let order = resting(&format!("owner-{i}"), side, price, qty, seq);
            seq += 1;
            let _ = bss.insert(order);
        } else {
            let qty = ((i % 3) + 1) as i64;
            let order = Order {
                mode: OrderMode::Market,
                price: None,
                ..resting(&format!("owner-{i}"), side, base_price, qty, seq)
            };
            seq += 1;
            let _ = bss.insert(order);
        }
        let _ = match_pair(bss, PAIR, SelfTradePolicy::Skip);
    }
}

fn bench_mixed_order_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("exchange_simulation");

    for order_count in [100, 1000, 10000].iter() {
        group.throughput(Throughput::Elements(*order_count as u64));
        group.bench_with_input(format!("{order_count}_orders"), order_count, |b, &count| {
            b.iter(|| {
                let mut bss = BookStateStore::new();
                bss.admit_pair(PAIR);
                simulate_exchange_orders(black_box(&mut bss), black_box(count));
            });
        });
    }

    group.finish();
}

fn bench_limit_order_placement(c: &mut Criterion) {
    let mut group = c.benchmark_group("limit_orders");

    group.bench_function("insert_and_match", |b| {
        let mut seq = 0u64;
        b.iter(|| {
            let mut bss = BookStateStore::new();
            bss.admit_pair(PAIR);
            seq += 1;
            let order = resting("bench", Side::Buy, 50000, 1, seq);
            let _ = bss.insert(black_box(order));
            let _ = match_pair(&mut bss, PAIR, SelfTradePolicy::Skip);
        });
    });

    group.finish();
}

fn bench_deep_book_matching(c: &mut Criterion) {
    let mut group = c.benchmark_group("deep_book");

    group.bench_function("match_across_levels", |b| {
        b.iter_batched(
            || {
                let mut bss = BookStateStore::new();
                bss.admit_pair(PAIR);
                for i in 0..100 {
                    let _ = bss.insert(resting("maker", Side::Sell, 50000 + i, 100, i as u64 + 1));
                }
                bss
            },
            |mut bss| {
                let taker = Order {
                    mode: OrderMode::Market,
                    price: None,
                    ..resting("taker", Side::Buy, 0, 5000, 10_000)
                };
                let _ = bss.insert(black_box(taker));
                match_pair(&mut bss, PAIR, SelfTradePolicy::Skip)
            },
            criterion::BatchSize::SmallInput,
        );
    });

    group.finish();
}

fn bench_high_frequency_trading(c: &mut Criterion) {
    let mut group = c.benchmark_group("high_frequency");
    group.measurement_time(Duration::from_secs(10));

    group.bench_function("hft_simulation", |b| {
        b.iter(|| {
            let mut bss = BookStateStore::new();
            bss.admit_pair(PAIR);
            for i in 0..1000u64 {
                let price = 50000 + (i % 10) as i64 - 5;
                let order = resting("hft", Side::Buy, price, 1, i + 1);
                let id = order.id;
                let _ = bss.insert(order);
                if i % 3 == 0 {
                    let _ = bss.cancel(id);
                }
            }
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_mixed_order_throughput,
    bench_limit_order_placement,
    bench_deep_book_matching,
    bench_high_frequency_trading
);
criterion_main!(benches);
