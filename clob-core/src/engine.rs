//! Matching Engine: the pure price-time-priority walk over the Book State
//! Store. Per spec, a pass always compares the current top of the BUY side
//! against the current top of the SELL side — the order just admitted is
//! not distinguished from any other resting order except by its admit_seq.
//! Produces fill intents for the Settlement Driver; never suspends, never
//! touches the ledger, never publishes anything itself.

use crate::book::BookStateStore;
use crate::types::{FillIntent, Order, OrderMode, OrderStatus, SelfTradePolicy, Side};
use rust_decimal::Decimal;

/// Result of running one matching pass over a pair.
pub struct MatchOutcome {
    pub intents: Vec<FillIntent>,
    /// Orders removed by a `CANCEL_TAKER`/`CANCEL_MAKER` self-trade policy.
    /// The caller must release their locks; they never appear in `intents`.
    pub cancelled: Vec<Order>,
}

fn crosses(buy: &Order, sell: &Order) -> bool {
    match (buy.mode, sell.mode) {
        (OrderMode::Market, _) | (_, OrderMode::Market) => true,
        (OrderMode::Limit, OrderMode::Limit) => {
            buy.price.expect("limit order carries a price") >= sell.price.expect("limit order carries a price")
        }
    }
}

/// Runs the pair to a fixed point: repeatedly takes the current best BUY and
/// best SELL, matches them while they cross, and stops once they don't (or
/// one side is empty). Mutates the Book State Store in place as it goes.
pub fn match_pair(bss: &mut BookStateStore, pair: &str, policy: SelfTradePolicy) -> MatchOutcome {
    let mut intents = Vec::new();
    let mut cancelled = Vec::new();
    let mut skipped = Vec::new();

    loop {
        let (Some(b), Some(s)) = (
            bss.top(pair, Side::Buy).cloned(),
            bss.top(pair, Side::Sell).cloned(),
        ) else {
            break;
        };

        if !crosses(&b, &s) {
            break;
        }

        if b.owner == s.owner {
            let (taker_id, maker_kept_id) = if b.admit_seq > s.admit_seq {
                (b.id, s.id)
            } else {
                (s.id, b.id)
            };
            let _ = maker_kept_id;
            match policy {
                SelfTradePolicy::Skip => {
                    if let Some(order) = bss.pop_for_skip(taker_id) {
                        skipped.push(order);
                    }
                }
                SelfTradePolicy::CancelTaker => {
                    if let Some(order) = bss.pop_for_skip(taker_id) {
                        cancelled.push(order);
                    }
                }
                SelfTradePolicy::CancelMaker => {
                    let maker_id = if taker_id == b.id { s.id } else { b.id };
                    if let Some(order) = bss.pop_for_skip(maker_id) {
                        cancelled.push(order);
                    }
                }
            }
            continue;
        }

        // The earlier-admitted side is the maker; its price is the trade price.
        let (maker, taker) = if b.admit_seq < s.admit_seq { (&b, &s) } else { (&s, &b) };
        let trade_price = maker.price.unwrap_or_else(|| taker.price.expect("at least one side carries a price"));
        let trade_qty = b.remaining().min(s.remaining());

        let intent = FillIntent {
            pair: pair.to_string(),
            buy_order_id: b.id,
            sell_order_id: s.id,
            buyer: b.owner.clone(),
            seller: s.owner.clone(),
            trade_price,
            trade_qty,
            buyer_filled_before: b.filled,
            seller_filled_before: s.filled,
            buyer_lock: b.lock_handle.clone().expect("resting order carries a lock"),
            seller_lock: s.lock_handle.clone().expect("resting order carries a lock"),
            maker_side: maker.side,
        };

        bss.fill(b.id, trade_qty).expect("b was just read from the book");
        bss.fill(s.id, trade_qty).expect("s was just read from the book");
        intents.push(intent);
    }

    for order in skipped {
        bss.restore_after_skip(order);
    }

    MatchOutcome { intents, cancelled }
}

/// Fill-or-kill pre-pass: computes the total quantity fillable against the
/// opposite side without mutating the book, respecting self-trade skip.
/// Run before `probe` is inserted; the caller rejects with `FOK_UNFILLABLE`
/// when the result falls short of the order's full quantity.
pub fn dry_walk_fillable(bss: &BookStateStore, probe: &Order) -> Decimal {
    let opposite = probe.side.opposite();
    let mut remaining = probe.remaining();
    let mut fillable = Decimal::ZERO;

    for maker in bss.iter_resting(&probe.pair, opposite) {
        if remaining.is_zero() {
            break;
        }
        if maker.owner == probe.owner {
            continue;
        }
        let maker_price = maker.price.expect("resting orders always carry a price");
        let crosses = match probe.mode {
            OrderMode::Market => true,
            OrderMode::Limit => {
                let price = probe.price.expect("limit order always carries a price");
                match probe.side {
                    Side::Buy => price >= maker_price,
                    Side::Sell => price <= maker_price,
                }
            }
        };
        if !crosses {
            break;
        }
        let take = remaining.min(maker.remaining());
        fillable += take;
        remaining -= take;
    }

    fillable
}

/// True once an order has left the OPEN state via either path.
pub fn is_terminal(status: OrderStatus) -> bool {
    matches!(status, OrderStatus::Filled | OrderStatus::Cancelled | OrderStatus::Rejected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::book::BookStateStore;
    use crate::types::{LockHandle, OrderMode, Tif};
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn limit(owner: &str, pair: &str, side: Side, price: Decimal, qty: Decimal, seq: u64, tif: Tif) -> Order {
        Order {
            id: Uuid::new_v4(),
            owner: owner.to_string(),
            pair: pair.to_string(),
            side,
            mode: OrderMode::Limit,
            price: Some(price),
            quantity: qty,
            filled: Decimal::ZERO,
            tif,
            lock_handle: Some(LockHandle(format!("lock-{owner}"))),
            admit_seq: seq,
            status: OrderStatus::Open,
            stop_loss: None,
            take_profit: None,
        }
    }

    #[test]
    fn full_match_same_price_same_size() {
        let mut bss = BookStateStore::new();
        bss.admit_pair("BTC/USDT");
        bss.insert(limit("bob", "BTC/USDT", Side::Sell, dec!(50000), dec!(0.10), 1, Tif::Gtc)).unwrap();
        bss.insert(limit("alice", "BTC/USDT", Side::Buy, dec!(50000), dec!(0.10), 2, Tif::Gtc)).unwrap();

        let outcome = match_pair(&mut bss, "BTC/USDT", SelfTradePolicy::Skip);

        assert_eq!(outcome.intents.len(), 1);
        let intent = &outcome.intents[0];
        assert_eq!(intent.trade_price, dec!(50000));
        assert_eq!(intent.trade_qty, dec!(0.10));
        assert_eq!(intent.maker_side, Side::Sell);
        assert!(bss.top("BTC/USDT", Side::Sell).is_none());
        assert!(bss.top("BTC/USDT", Side::Buy).is_none());
    }

    #[test]
    fn partial_fill_leaves_taker_residual() {
        let mut bss = BookStateStore::new();
        bss.admit_pair("BTC/USDT");
        bss.insert(limit("bob", "BTC/USDT", Side::Sell, dec!(51000), dec!(0.3), 1, Tif::Gtc)).unwrap();
        bss.insert(limit("alice", "BTC/USDT", Side::Buy, dec!(51000), dec!(1.0), 2, Tif::Gtc)).unwrap();

        let outcome = match_pair(&mut bss, "BTC/USDT", SelfTradePolicy::Skip);

        assert_eq!(outcome.intents.len(), 1);
        assert_eq!(outcome.intents[0].trade_qty, dec!(0.3));
        let remaining = bss.top("BTC/USDT", Side::Buy).unwrap();
        assert_eq!(remaining.remaining(), dec!(0.7));
    }

    #[test]
    fn self_trade_skip_makes_no_progress() {
        let mut bss = BookStateStore::new();
        bss.admit_pair("BTC/USDT");
        bss.insert(limit("alice", "BTC/USDT", Side::Sell, dec!(52000), dec!(0.1), 1, Tif::Gtc)).unwrap();
        bss.insert(limit("alice", "BTC/USDT", Side::Buy, dec!(52000), dec!(0.1), 2, Tif::Gtc)).unwrap();

        let outcome = match_pair(&mut bss, "BTC/USDT", SelfTradePolicy::Skip);

        assert!(outcome.intents.is_empty());
        // Both sides remain resting; the younger one is merely skipped, not removed.
        assert!(bss.top("BTC/USDT", Side::Sell).is_some());
        assert!(bss.top("BTC/USDT", Side::Buy).is_some());
    }

    #[test]
    fn fifo_at_same_price() {
        let mut bss = BookStateStore::new();
        bss.admit_pair("BTC/USDT");
        bss.insert(limit("b1", "BTC/USDT", Side::Buy, dec!(100), dec!(1.0), 1, Tif::Gtc)).unwrap();
        bss.insert(limit("b2", "BTC/USDT", Side::Buy, dec!(100), dec!(1.0), 2, Tif::Gtc)).unwrap();
        bss.insert(limit("s", "BTC/USDT", Side::Sell, dec!(100), dec!(1.0), 3, Tif::Gtc)).unwrap();

        let outcome = match_pair(&mut bss, "BTC/USDT", SelfTradePolicy::Skip);

        assert_eq!(outcome.intents.len(), 1);
        assert_eq!(outcome.intents[0].buyer, "b1");
        let remaining_top = bss.top("BTC/USDT", Side::Buy).unwrap();
        assert_eq!(remaining_top.owner, "b2");
        assert_eq!(remaining_top.remaining(), dec!(1.0));
    }

    #[test]
    fn fok_dry_walk_reports_short_liquidity() {
        let mut bss = BookStateStore::new();
        bss.admit_pair("BTC/USDT");
        bss.insert(limit("s1", "BTC/USDT", Side::Sell, dec!(50000), dec!(0.05), 1, Tif::Gtc)).unwrap();
        bss.insert(limit("s2", "BTC/USDT", Side::Sell, dec!(50100), dec!(0.02), 2, Tif::Gtc)).unwrap();

        let probe = limit("taker", "BTC/USDT", Side::Buy, dec!(50100), dec!(1.0), 3, Tif::Fok);
        let fillable = dry_walk_fillable(&bss, &probe);
        assert_eq!(fillable, dec!(0.07));
        assert!(fillable < probe.quantity);
    }
}
