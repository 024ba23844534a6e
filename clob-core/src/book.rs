//! Book State Store: per-pair resting-order index with the priority
//! discipline the matching engine requires, plus by-id and by-owner lookup.

use crate::error::{CoreError, CoreResult};
use crate::types::{AdmitSeq, Order, OrderId, Owner, Price, Side};
use rust_decimal::Decimal;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Ordering key for the BUY side: best price first, then earliest admission.
/// Implemented by negating the price comparison so a plain `BTreeMap` walk in
/// ascending key order visits highest price first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BidKey(Price, AdmitSeq);

impl PartialOrd for BidKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for BidKey {
    fn cmp(&self, other: &Self) -> Ordering {
        other.0.cmp(&self.0).then_with(|| self.1.cmp(&other.1))
    }
}

/// Ordering key for the SELL side: best (lowest) price first, then earliest
/// admission. Natural tuple ordering already expresses this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct AskKey(Price, AdmitSeq);

#[derive(Default)]
struct Book {
    bids: BTreeMap<BidKey, OrderId>,
    asks: BTreeMap<AskKey, OrderId>,
}

#[derive(Default)]
pub struct BookStateStore {
    books: HashMap<String, Book>,
    orders: HashMap<OrderId, Order>,
    by_owner: HashMap<Owner, HashSet<OrderId>>,
}

impl BookStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn admit_pair(&mut self, pair: &str) {
        self.books.entry(pair.to_string()).or_default();
    }

    pub fn has_pair(&self, pair: &str) -> bool {
        self.books.contains_key(pair)
    }

    pub fn insert(&mut self, order: Order) -> CoreResult<()> {
        if self.orders.contains_key(&order.id) {
            return Err(CoreError::BadRequest("duplicate order id".into()));
        }
        let book = self
            .books
            .get_mut(&order.pair)
            .ok_or_else(|| CoreError::UnknownPair(order.pair.clone()))?;
        let price = order.price.unwrap_or(match order.side {
            Side::Buy => Decimal::MAX,
            Side::Sell => Decimal::MIN,
        });
        match order.side {
            Side::Buy => {
                book.bids.insert(BidKey(price, order.admit_seq), order.id);
            }
            Side::Sell => {
                book.asks.insert(AskKey(price, order.admit_seq), order.id);
            }
        }
        self.by_owner
            .entry(order.owner.clone())
            .or_default()
            .insert(order.id);
        self.orders.insert(order.id, order);
        Ok(())
    }

    fn remove_from_index(&mut self, order: &Order) {
        if let Some(book) = self.books.get_mut(&order.pair) {
            let price = order.price.unwrap_or(match order.side {
                Side::Buy => Decimal::MAX,
                Side::Sell => Decimal::MIN,
            });
            match order.side {
                Side::Buy => {
                    book.bids.remove(&BidKey(price, order.admit_seq));
                }
                Side::Sell => {
                    book.asks.remove(&AskKey(price, order.admit_seq));
                }
            }
        }
    }

    pub fn cancel(&mut self, order_id: OrderId) -> CoreResult<Order> {
        let order = self
            .orders
            .get(&order_id)
            .ok_or_else(|| CoreError::NotFound(order_id.to_string()))?;
        if order.status != crate::types::OrderStatus::Open {
            return Err(CoreError::AlreadyTerminal);
        }
        let mut order = self.orders.remove(&order_id).unwrap();
        self.remove_from_index(&order);
        if let Some(set) = self.by_owner.get_mut(&order.owner) {
            set.remove(&order_id);
        }
        order.status = crate::types::OrderStatus::Cancelled;
        Ok(order)
    }

    /// Removes an order from the live index without touching its terminal
    /// status, used by the matching engine's self-trade skip list.
    pub fn pop_for_skip(&mut self, order_id: OrderId) -> Option<Order> {
        let order = self.orders.remove(&order_id)?;
        self.remove_from_index(&order);
        Some(order)
    }

    /// Restores an order removed via `pop_for_skip` after a matching pass.
    pub fn restore_after_skip(&mut self, order: Order) {
        let _ = self.insert(order);
    }

    pub fn top(&self, pair: &str, side: Side) -> Option<&Order> {
        let book = self.books.get(pair)?;
        let id = match side {
            Side::Buy => book.bids.values().next(),
            Side::Sell => book.asks.values().next(),
        }?;
        self.orders.get(id)
    }

    pub fn get(&self, order_id: OrderId) -> Option<&Order> {
        self.orders.get(&order_id)
    }

    pub fn get_mut(&mut self, order_id: OrderId) -> Option<&mut Order> {
        self.orders.get_mut(&order_id)
    }

    /// Applies a fill to a resting order, removing it from the book entirely
    /// once it is completely filled.
    pub fn fill(&mut self, order_id: OrderId, qty: Decimal) -> CoreResult<Order> {
        let order = self
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| CoreError::NotFound(order_id.to_string()))?;
        order.filled += qty;
        let filled = order.is_filled();
        if filled {
            order.status = crate::types::OrderStatus::Filled;
        }
        let result = order.clone();
        if filled {
            self.remove_from_index(&result);
            self.orders.remove(&order_id);
            if let Some(set) = self.by_owner.get_mut(&result.owner) {
                set.remove(&order_id);
            }
        }
        Ok(result)
    }

    /// Non-mutating walk over resting orders on one side of a pair's book in
    /// strict priority order. Used by the fill-or-kill dry walk, which must
    /// compute total fillable quantity without touching the live index.
    pub fn iter_resting(&self, pair: &str, side: Side) -> Box<dyn Iterator<Item = &Order> + '_> {
        let Some(book) = self.books.get(pair) else {
            return Box::new(std::iter::empty());
        };
        match side {
            Side::Buy => Box::new(book.bids.values().filter_map(move |id| self.orders.get(id))),
            Side::Sell => Box::new(book.asks.values().filter_map(move |id| self.orders.get(id))),
        }
    }

    /// Every owner with order history in this book, including owners whose
    /// resting orders have since been fully cancelled or filled.
    pub fn owners(&self) -> Vec<Owner> {
        self.by_owner.keys().cloned().collect()
    }

    pub fn by_owner(&self, owner: &str) -> Vec<&Order> {
        self.by_owner
            .get(owner)
            .into_iter()
            .flat_map(|ids| ids.iter())
            .filter_map(|id| self.orders.get(id))
            .collect()
    }

    pub fn snapshot(&self, pair: &str, depth: usize) -> (Vec<(Price, Decimal)>, Vec<(Price, Decimal)>) {
        let Some(book) = self.books.get(pair) else {
            return (Vec::new(), Vec::new());
        };
        let mut bids: Vec<(Price, Decimal)> = Vec::new();
        for id in book.bids.values() {
            let Some(order) = self.orders.get(id) else { continue };
            let price = order.price.unwrap_or_default();
            match bids.last_mut() {
                Some((p, q)) if *p == price => *q += order.remaining(),
                _ => {
                    if bids.len() >= depth {
                        continue;
                    }
                    bids.push((price, order.remaining()))
                }
            }
        }
        let mut asks: Vec<(Price, Decimal)> = Vec::new();
        for id in book.asks.values() {
            let Some(order) = self.orders.get(id) else { continue };
            let price = order.price.unwrap_or_default();
            match asks.last_mut() {
                Some((p, q)) if *p == price => *q += order.remaining(),
                _ => {
                    if asks.len() >= depth {
                        continue;
                    }
                    asks.push((price, order.remaining()))
                }
            }
        }
        (bids, asks)
    }
}
