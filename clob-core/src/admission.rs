//! Admission Layer: validates incoming orders, computes and places the
//! required ledger lock, assigns admission sequence, runs the matching pass,
//! and handles cancellation. Grounded on `gateway::server::place_order`
//! (compensating unlock on downstream failure) and
//! `accounts::models::order::calculate_lock_amount`/`cancel_internal`
//! (lock sizing and residual-unlock-on-cancel).

use crate::book::BookStateStore;
use crate::config::CoreConfig;
use crate::engine;
use crate::error::{CoreError, CoreResult};
use crate::ledger::AssetLedger;
use crate::types::{FillIntent, Order, OrderMode, OrderStatus, Owner, Side, Tif};
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct PlaceOrderRequest {
    pub owner: Owner,
    pub pair: String,
    pub side: Side,
    pub mode: OrderMode,
    pub price: Option<Decimal>,
    pub quantity: Decimal,
    pub tif: Tif,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
    pub client_nonce: String,
}

/// What the admission layer produced for a `place` call: the order as
/// admitted (its final status is decided later, once the caller has driven
/// `intents` through settlement), any fill intents ready for the settlement
/// driver, and any other resting orders a self-trade policy cancelled
/// outright (never party to an intent, so their locks can be released now).
pub struct PlaceOutcome {
    pub order: Order,
    pub intents: Vec<FillIntent>,
    pub self_trade_cancelled: Vec<Order>,
}

pub struct AdmissionLayer {
    ledger: Arc<dyn AssetLedger>,
    admit_seq: Arc<AtomicU64>,
    config: CoreConfig,
}

impl AdmissionLayer {
    pub fn new(ledger: Arc<dyn AssetLedger>, admit_seq: Arc<AtomicU64>, config: CoreConfig) -> Self {
        Self {
            ledger,
            admit_seq,
            config,
        }
    }

    fn validate(&self, bss: &BookStateStore, req: &PlaceOrderRequest) -> CoreResult<()> {
        if !bss.has_pair(&req.pair) {
            return Err(CoreError::UnknownPair(req.pair.clone()));
        }
        if req.quantity <= Decimal::ZERO {
            return Err(CoreError::BadRequest("quantity must be positive".into()));
        }
        if req.mode == OrderMode::Limit {
            match req.price {
                Some(p) if p > Decimal::ZERO => {}
                _ => return Err(CoreError::BadRequest("limit order requires a positive price".into())),
            }
        }
        if req.mode == OrderMode::Market && req.tif == Tif::Gtc {
            return Err(CoreError::BadRequest("market orders must use IOC or FOK".into()));
        }
        Ok(())
    }

    /// BUY locks QUOTE, SELL locks BASE. MARKET buys lock conservatively
    /// against the current best ask plus the configured slippage buffer,
    /// since no price is known until the match actually runs.
    fn required_lock(&self, bss: &BookStateStore, req: &PlaceOrderRequest) -> CoreResult<(String, Decimal)> {
        let pair = crate::types::TradingPair::parse(&req.pair)
            .ok_or_else(|| CoreError::UnknownPair(req.pair.clone()))?;
        match req.side {
            Side::Sell => Ok((pair.base, req.quantity)),
            Side::Buy => match req.mode {
                OrderMode::Limit => {
                    let price = req.price.expect("validated above");
                    Ok((pair.quote, price * req.quantity))
                }
                OrderMode::Market => {
                    let best_ask = bss
                        .top(&req.pair, Side::Sell)
                        .and_then(|o| o.price)
                        .ok_or(CoreError::NoLiquidity)?;
                    let buffered = best_ask * (Decimal::ONE + self.config.market_slippage_buffer);
                    Ok((pair.quote, buffered * req.quantity))
                }
            },
        }
    }

    pub async fn place(
        &self,
        bss: &mut BookStateStore,
        req: PlaceOrderRequest,
    ) -> CoreResult<PlaceOutcome> {
        self.validate(bss, &req)?;
        let (asset, amount) = self.required_lock(bss, &req)?;
        let lock_handle = self
            .ledger
            .lock(&req.owner, &asset, amount, &req.client_nonce)
            .await?;

        let admit_seq = self.admit_seq.fetch_add(1, Ordering::SeqCst);
        let order = Order {
            id: Uuid::new_v4(),
            owner: req.owner.clone(),
            pair: req.pair.clone(),
            side: req.side,
            mode: req.mode,
            price: req.price,
            quantity: req.quantity,
            filled: Decimal::ZERO,
            tif: req.tif,
            lock_handle: Some(lock_handle.clone()),
            admit_seq,
            status: OrderStatus::Open,
            stop_loss: req.stop_loss,
            take_profit: req.take_profit,
        };

        if req.tif == Tif::Fok {
            let fillable = engine::dry_walk_fillable(bss, &order);
            if fillable < order.quantity {
                let _ = self.ledger.unlock(&lock_handle).await;
                return Err(CoreError::FokUnfillable);
            }
        }

        // Every TIF is inserted before matching: the engine always compares
        // the current top of both sides, so GTC/IOC/FOK orders are treated
        // identically by the matching pass itself. TIF only decides what
        // happens to a surviving residual once the pass is done.
        bss.insert(order.clone())?;
        let outcome = engine::match_pair(bss, &req.pair, self.config.self_trade_policy);

        for cancelled in &outcome.cancelled {
            if cancelled.id == order.id {
                continue;
            }
            if let Some(handle) = &cancelled.lock_handle {
                let _ = self.ledger.unlock(handle).await;
            }
        }

        // If a self-trade policy cancelled this very order, release its lock
        // now — it never became party to any intent.
        if let Some(cancelled_self) = outcome.cancelled.iter().find(|o| o.id == order.id) {
            let _ = self.ledger.unlock(&lock_handle).await;
            return Ok(PlaceOutcome {
                order: Order {
                    status: OrderStatus::Rejected,
                    ..cancelled_self.clone()
                },
                intents: outcome.intents,
                self_trade_cancelled: outcome
                    .cancelled
                    .into_iter()
                    .filter(|o| o.id != order.id)
                    .collect(),
            });
        }

        Ok(PlaceOutcome {
            order,
            intents: outcome.intents,
            self_trade_cancelled: outcome.cancelled,
        })
    }

    pub async fn cancel(
        &self,
        bss: &mut BookStateStore,
        order_id: crate::types::OrderId,
        owner: &Owner,
    ) -> CoreResult<Order> {
        let existing = bss.get(order_id).ok_or_else(|| CoreError::NotFound(order_id.to_string()))?;
        if &existing.owner != owner {
            return Err(CoreError::NotOwner);
        }
        let order = bss.cancel(order_id)?;
        if let Some(handle) = &order.lock_handle {
            let _ = self.ledger.unlock(handle).await;
        }
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::InMemoryLedger;
    use rust_decimal_macros::dec;

    fn request(owner: &str, side: Side, price: Option<Decimal>, qty: Decimal, tif: Tif) -> PlaceOrderRequest {
        PlaceOrderRequest {
            owner: owner.to_string(),
            pair: "BTC/USDT".to_string(),
            side,
            mode: if price.is_some() { OrderMode::Limit } else { OrderMode::Market },
            price,
            quantity: qty,
            tif,
            stop_loss: None,
            take_profit: None,
            client_nonce: Uuid::new_v4().to_string(),
        }
    }

    #[tokio::test]
    async fn place_limit_rests_when_no_cross() {
        let ledger = Arc::new(InMemoryLedger::new());
        ledger.credit(&"alice".to_string(), "USDT", dec!(10000)).await;
        let al = AdmissionLayer::new(
            ledger.clone(),
            Arc::new(AtomicU64::new(1)),
            CoreConfig::default(),
        );
        let mut bss = BookStateStore::new();
        bss.admit_pair("BTC/USDT");

        let outcome = al
            .place(&mut bss, request("alice", Side::Buy, Some(dec!(100)), dec!(1), Tif::Gtc))
            .await
            .unwrap();
        assert_eq!(outcome.order.status, OrderStatus::Open);
        assert!(outcome.intents.is_empty());
        assert!(bss.top("BTC/USDT", Side::Buy).is_some());
    }

    #[tokio::test]
    async fn place_rejects_insufficient_funds_without_side_effects() {
        let ledger = Arc::new(InMemoryLedger::new());
        let al = AdmissionLayer::new(
            ledger.clone(),
            Arc::new(AtomicU64::new(1)),
            CoreConfig::default(),
        );
        let mut bss = BookStateStore::new();
        bss.admit_pair("BTC/USDT");

        let err = al
            .place(&mut bss, request("alice", Side::Buy, Some(dec!(100)), dec!(1), Tif::Gtc))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::InsufficientFunds { .. }));
        assert!(bss.top("BTC/USDT", Side::Buy).is_none());
    }

    #[tokio::test]
    async fn market_buy_against_empty_book_is_rejected() {
        let ledger = Arc::new(InMemoryLedger::new());
        ledger.credit(&"alice".to_string(), "USDT", dec!(10000)).await;
        let al = AdmissionLayer::new(
            ledger.clone(),
            Arc::new(AtomicU64::new(1)),
            CoreConfig::default(),
        );
        let mut bss = BookStateStore::new();
        bss.admit_pair("BTC/USDT");

        let err = al
            .place(&mut bss, request("alice", Side::Buy, None, dec!(1), Tif::Ioc))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NoLiquidity));
    }

    #[tokio::test]
    async fn market_order_with_gtc_is_rejected() {
        let ledger = Arc::new(InMemoryLedger::new());
        ledger.credit(&"alice".to_string(), "USDT", dec!(10000)).await;
        let al = AdmissionLayer::new(
            ledger.clone(),
            Arc::new(AtomicU64::new(1)),
            CoreConfig::default(),
        );
        let mut bss = BookStateStore::new();
        bss.admit_pair("BTC/USDT");

        let err = al
            .place(&mut bss, request("alice", Side::Buy, None, dec!(1), Tif::Gtc))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::BadRequest(_)));
    }

    #[tokio::test]
    async fn cancel_rejects_wrong_owner() {
        let ledger = Arc::new(InMemoryLedger::new());
        ledger.credit(&"alice".to_string(), "USDT", dec!(10000)).await;
        let al = AdmissionLayer::new(
            ledger.clone(),
            Arc::new(AtomicU64::new(1)),
            CoreConfig::default(),
        );
        let mut bss = BookStateStore::new();
        bss.admit_pair("BTC/USDT");
        let outcome = al
            .place(&mut bss, request("alice", Side::Buy, Some(dec!(100)), dec!(1), Tif::Gtc))
            .await
            .unwrap();

        let err = al
            .cancel(&mut bss, outcome.order.id, &"mallory".to_string())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NotOwner));
    }
}
