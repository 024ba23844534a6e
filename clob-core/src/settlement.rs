//! Settlement Driver: turns matching-engine fill intents into idempotent
//! `AssetLedger::settle` calls and only then updates the book and publishes.
//! Grounded on `matching_engine_service::settlement::SettlementClient`
//! (retry/backoff shape, error-code branching) and
//! `accounts::models::trade::Trade::settle` (idempotency key, atomic
//! two-legged transfer).

use crate::book::BookStateStore;
use crate::config::RetryConfig;
use crate::error::CoreError;
use crate::eventbus::EventBus;
use crate::ledger::AssetLedger;
use crate::types::{FillIntent, Side, Trade, TradingPair};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Outcome of driving one fill intent to settlement.
pub enum SettleOutcome {
    Settled(Trade),
    /// The lock backing one side vanished out-of-band; both orders are
    /// defensively cancelled and the pair should re-enter matching.
    Abandoned,
}

pub struct SettlementDriver {
    ledger: Arc<dyn AssetLedger>,
    event_bus: Arc<EventBus>,
    retry: RetryConfig,
    frozen_pairs: RwLock<HashSet<String>>,
    trade_seq: AtomicU64,
}

impl SettlementDriver {
    pub fn new(ledger: Arc<dyn AssetLedger>, event_bus: Arc<EventBus>, retry: RetryConfig) -> Self {
        Self {
            ledger,
            event_bus,
            retry,
            frozen_pairs: RwLock::new(HashSet::new()),
            trade_seq: AtomicU64::new(0),
        }
    }

    pub async fn is_frozen(&self, pair: &str) -> bool {
        self.frozen_pairs.read().await.contains(pair)
    }

    async fn freeze(&self, pair: &str) {
        self.frozen_pairs.write().await.insert(pair.to_string());
        tracing::error!(pair, "PAIR_FROZEN: settlement retries exhausted, operator intervention required");
    }

    /// Executes one fill intent: settle against the ledger (retrying
    /// transient failures), then mutate the book and publish. No event is
    /// observable to subscribers until `ALA.settle` has already succeeded.
    pub async fn drive(
        &self,
        bss: &mut BookStateStore,
        intent: &FillIntent,
    ) -> Result<SettleOutcome, CoreError> {
        let intent_id = intent.intent_id();
        let base_qty = intent.trade_qty;
        let quote_qty = intent.trade_price * intent.trade_qty;

        let mut attempt = 0u32;
        loop {
            match self
                .ledger
                .settle(
                    &intent.buyer_lock,
                    &intent.seller_lock,
                    base_qty,
                    quote_qty,
                    &intent_id,
                )
                .await
            {
                Ok((buyer_residual, seller_residual)) => {
                    bss.fill(intent.buy_order_id, intent.trade_qty)
                        .map_err(|_| CoreError::IndexCorrupt)?;
                    bss.fill(intent.sell_order_id, intent.trade_qty)
                        .map_err(|_| CoreError::IndexCorrupt)?;
                    if let Some(order) = bss.get_mut(intent.buy_order_id) {
                        order.lock_handle = Some(buyer_residual);
                    }
                    if let Some(order) = bss.get_mut(intent.sell_order_id) {
                        order.lock_handle = Some(seller_residual);
                    }

                    let trade = Trade {
                        trade_id: Uuid::new_v4(),
                        pair: intent.pair.clone(),
                        price: intent.trade_price,
                        quantity: intent.trade_qty,
                        buyer: intent.buyer.clone(),
                        seller: intent.seller.clone(),
                        buy_order_id: intent.buy_order_id,
                        sell_order_id: intent.sell_order_id,
                        maker_side: intent.maker_side,
                        ts: self.trade_seq.fetch_add(1, Ordering::SeqCst),
                    };

                    self.event_bus.publish_trade(trade.clone()).await;
                    self.event_bus
                        .publish_orderbook_delta(&intent.pair, intent.maker_side, intent.trade_price, intent.trade_qty)
                        .await;
                    if let Some(tp) = TradingPair::parse(&intent.pair) {
                        for (owner, asset) in [
                            (&intent.buyer, tp.base.as_str()),
                            (&intent.buyer, tp.quote.as_str()),
                            (&intent.seller, tp.base.as_str()),
                            (&intent.seller, tp.quote.as_str()),
                        ] {
                            if let Ok(balance) = self.ledger.balance(owner, asset).await {
                                self.event_bus.publish_balance(owner, asset, balance).await;
                            }
                        }
                    }
                    tracing::info!(
                        pair = %intent.pair,
                        price = %intent.trade_price,
                        qty = %intent.trade_qty,
                        "trade settled"
                    );
                    return Ok(SettleOutcome::Settled(trade));
                }
                Err(CoreError::LockInvalid) => {
                    tracing::warn!(pair = %intent.pair, "settlement lock invalid, abandoning intent");
                    let _ = bss.cancel(intent.buy_order_id);
                    let _ = bss.cancel(intent.sell_order_id);
                    return Ok(SettleOutcome::Abandoned);
                }
                Err(e) if e.is_transient() => {
                    attempt += 1;
                    if attempt >= self.retry.max_attempts {
                        self.freeze(&intent.pair).await;
                        return Err(e);
                    }
                    let delay = self.retry.delay_for_attempt(attempt - 1);
                    tracing::warn!(pair = %intent.pair, attempt, ?delay, "settlement retry");
                    tokio::time::sleep(delay).await;
                    continue;
                }
                Err(e) => {
                    self.freeze(&intent.pair).await;
                    return Err(e);
                }
            }
        }
    }
}
