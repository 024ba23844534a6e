//! Stop-loss / take-profit trigger check: scans resting orders against the
//! latest trade price and reports which ones should be cancelled. Purely
//! observational — no on-ledger semantics, no interaction with the matching
//! engine beyond the ordinary cancel path. Grounded on the teacher's
//! trade-price consumer loop in `gateway::server::start_event_broadcaster`
//! (react to each committed trade), adapted so the check runs inline inside
//! the owning pair actor instead of a separate subscriber task — the book is
//! never shared outside its single-writer actor, so the trigger scan has to
//! live where the book already lives.

use crate::book::BookStateStore;
use crate::types::{Order, Price, Side};

/// A BUY's stop-loss triggers when price falls to or below the trigger (the
/// position was bought to go long and is being protected on the way down);
/// a SELL's stop-loss triggers when price rises to or above it (protecting a
/// short). Take-profit is the mirror condition on each side.
pub fn triggered_orders(bss: &BookStateStore, pair: &str, last_trade_price: Price) -> Vec<Order> {
    let mut hits = Vec::new();
    for side in [Side::Buy, Side::Sell] {
        for order in bss.iter_resting(pair, side) {
            let stop_hit = order.stop_loss.is_some_and(|trigger| match order.side {
                Side::Buy => last_trade_price <= trigger,
                Side::Sell => last_trade_price >= trigger,
            });
            let profit_hit = order.take_profit.is_some_and(|trigger| match order.side {
                Side::Buy => last_trade_price >= trigger,
                Side::Sell => last_trade_price <= trigger,
            });
            if stop_hit || profit_hit {
                hits.push(order.clone());
            }
        }
    }
    hits
}
