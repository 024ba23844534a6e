//! Event Bus: fans out order-book deltas, trade ticks, and balance updates.
//! Grounded on `gateway::state::GatewayState` (coarse-locked registry,
//! `tokio::sync::broadcast` fan-out) and `gateway::channel_updates`
//! (greeting-snapshot pattern), extended with explicit lagged-subscriber
//! disconnection — the teacher's plain `broadcast::channel` lets a slow
//! client silently miss messages instead of being dropped.

use crate::types::{Price, Trade};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use tokio::sync::{broadcast, RwLock};

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum OrderBookEvent {
    Snapshot {
        pair: String,
        sequence: u64,
        bids: Vec<(Price, Decimal)>,
        asks: Vec<(Price, Decimal)>,
    },
    Delta {
        pair: String,
        sequence: u64,
        side: crate::types::Side,
        price: Price,
        quantity: Decimal,
    },
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum TradeEvent {
    Snapshot { pair: String, trades: Vec<Trade> },
    Trade(Trade),
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum BalanceEvent {
    Snapshot {
        owner: String,
        balances: Vec<(String, crate::types::Balance)>,
    },
    Update {
        owner: String,
        asset: String,
        balance: crate::types::Balance,
    },
}

const TRADE_HISTORY_CAP: usize = 100;

struct PairChannel {
    orderbook: broadcast::Sender<OrderBookEvent>,
    trades: broadcast::Sender<TradeEvent>,
    last_trades: Vec<Trade>,
    sequence: u64,
}

/// Subscriber registry guarded by a single coarse lock, matching the
/// teacher's `GatewayState` design (§5: "the EB subscriber registry is
/// shared and guarded by a coarse lock; subscription is O(1)").
pub struct EventBus {
    capacity: usize,
    pairs: RwLock<HashMap<String, PairChannel>>,
    balances: RwLock<HashMap<String, broadcast::Sender<BalanceEvent>>>,
}

impl EventBus {
    pub fn new(subscriber_queue_depth: usize) -> Self {
        Self {
            capacity: subscriber_queue_depth,
            pairs: RwLock::new(HashMap::new()),
            balances: RwLock::new(HashMap::new()),
        }
    }

    async fn ensure_pair(&self, pair: &str) {
        let mut pairs = self.pairs.write().await;
        pairs.entry(pair.to_string()).or_insert_with(|| PairChannel {
            orderbook: broadcast::channel(self.capacity).0,
            trades: broadcast::channel(self.capacity).0,
            last_trades: Vec::new(),
            sequence: 0,
        });
    }

    /// Subscribe to `orderbook:{pair}`. Returns the greeting snapshot and a
    /// receiver for subsequent deltas.
    pub async fn subscribe_orderbook(
        &self,
        pair: &str,
        snapshot: (Vec<(Price, Decimal)>, Vec<(Price, Decimal)>),
    ) -> (OrderBookEvent, broadcast::Receiver<OrderBookEvent>) {
        self.ensure_pair(pair).await;
        let pairs = self.pairs.read().await;
        let channel = pairs.get(pair).expect("just ensured");
        let greeting = OrderBookEvent::Snapshot {
            pair: pair.to_string(),
            sequence: channel.sequence,
            bids: snapshot.0,
            asks: snapshot.1,
        };
        (greeting, channel.orderbook.subscribe())
    }

    pub async fn subscribe_trades(&self, pair: &str) -> (TradeEvent, broadcast::Receiver<TradeEvent>) {
        self.ensure_pair(pair).await;
        let pairs = self.pairs.read().await;
        let channel = pairs.get(pair).expect("just ensured");
        let greeting = TradeEvent::Snapshot {
            pair: pair.to_string(),
            trades: channel.last_trades.clone(),
        };
        (greeting, channel.trades.subscribe())
    }

    pub async fn subscribe_balance(
        &self,
        owner: &str,
        current: Vec<(String, crate::types::Balance)>,
    ) -> (BalanceEvent, broadcast::Receiver<BalanceEvent>) {
        let mut balances = self.balances.write().await;
        let sender = balances
            .entry(owner.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0);
        let greeting = BalanceEvent::Snapshot {
            owner: owner.to_string(),
            balances: current,
        };
        (greeting, sender.subscribe())
    }

    /// Publishes one delta per affected price level. Called only after the
    /// settlement driver's ALA.settle has already succeeded, never before.
    pub async fn publish_orderbook_delta(
        &self,
        pair: &str,
        side: crate::types::Side,
        price: Price,
        quantity: Decimal,
    ) {
        self.ensure_pair(pair).await;
        let mut pairs = self.pairs.write().await;
        let channel = pairs.get_mut(pair).expect("just ensured");
        channel.sequence += 1;
        let _ = channel.orderbook.send(OrderBookEvent::Delta {
            pair: pair.to_string(),
            sequence: channel.sequence,
            side,
            price,
            quantity,
        });
    }

    pub async fn publish_trade(&self, trade: Trade) {
        self.ensure_pair(&trade.pair).await;
        let mut pairs = self.pairs.write().await;
        let channel = pairs.get_mut(&trade.pair).expect("just ensured");
        channel.last_trades.push(trade.clone());
        if channel.last_trades.len() > TRADE_HISTORY_CAP {
            channel.last_trades.remove(0);
        }
        let _ = channel.trades.send(TradeEvent::Trade(trade));
    }

    pub async fn publish_balance(&self, owner: &str, asset: &str, balance: crate::types::Balance) {
        let mut balances = self.balances.write().await;
        let sender = balances
            .entry(owner.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0);
        let _ = sender.send(BalanceEvent::Update {
            owner: owner.to_string(),
            asset: asset.to_string(),
            balance,
        });
    }
}

/// Drains a subscriber's receiver, translating a `RecvError::Lagged` into an
/// explicit `SLOW_CONSUMER` disconnect instead of silently skipping entries.
pub async fn next_or_slow_consumer<T: Clone>(
    rx: &mut broadcast::Receiver<T>,
) -> Result<T, crate::error::CoreError> {
    match rx.recv().await {
        Ok(event) => Ok(event),
        Err(broadcast::error::RecvError::Lagged(_)) => Err(crate::error::CoreError::BadRequest(
            "SLOW_CONSUMER".to_string(),
        )),
        Err(broadcast::error::RecvError::Closed) => {
            Err(crate::error::CoreError::BadRequest("channel closed".to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    #[tokio::test]
    async fn subscribe_receives_greeting_then_deltas() {
        let bus = EventBus::new(16);
        let (greeting, mut rx) = bus.subscribe_orderbook("BTC/USDT", (vec![], vec![])).await;
        assert!(matches!(greeting, OrderBookEvent::Snapshot { .. }));
        bus.publish_orderbook_delta("BTC/USDT", crate::types::Side::Buy, dec!(100), dec!(1))
            .await;
        let delta = rx.recv().await.unwrap();
        assert!(matches!(delta, OrderBookEvent::Delta { .. }));
    }

    #[tokio::test]
    async fn trade_snapshot_then_publish() {
        let bus = EventBus::new(16);
        let (greeting, mut rx) = bus.subscribe_trades("BTC/USDT").await;
        assert!(matches!(greeting, TradeEvent::Snapshot { trades, .. } if trades.is_empty()));
        let trade = Trade {
            trade_id: Uuid::new_v4(),
            pair: "BTC/USDT".to_string(),
            price: dec!(50000),
            quantity: dec!(0.1),
            buyer: "alice".into(),
            seller: "bob".into(),
            buy_order_id: Uuid::new_v4(),
            sell_order_id: Uuid::new_v4(),
            maker_side: crate::types::Side::Sell,
            ts: 1,
        };
        bus.publish_trade(trade.clone()).await;
        let received = rx.recv().await.unwrap();
        assert!(matches!(received, TradeEvent::Trade(t) if t.trade_id == trade.trade_id));
    }
}
