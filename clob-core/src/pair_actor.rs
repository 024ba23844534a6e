//! Per-pair single-writer actor: owns exclusive write access to one pair's
//! Book State Store slice and drives admission, matching, and settlement
//! sequentially off a bounded `mpsc` queue. Grounded on
//! `matching_engine_service::main::process_order_command` (the
//! settle-before-publish sequencing) and its `OrderBookPublisher` loop.

use crate::admission::{AdmissionLayer, PlaceOrderRequest};
use crate::book::BookStateStore;
use crate::config::CoreConfig;
use crate::error::{CoreError, CoreResult};
use crate::eventbus::EventBus;
use crate::journal::{Journal, JournalRecord};
use crate::ledger::AssetLedger;
use crate::monitor;
use crate::settlement::{SettleOutcome, SettlementDriver};
use crate::types::{Order, OrderId, OrderMode, OrderStatus, Owner, Price, Tif, TradingPair};
use rust_decimal::Decimal;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

enum PairCommand {
    Place {
        req: PlaceOrderRequest,
        resp: oneshot::Sender<CoreResult<Order>>,
    },
    Cancel {
        order_id: OrderId,
        owner: Owner,
        resp: oneshot::Sender<CoreResult<Order>>,
    },
    Snapshot {
        depth: usize,
        resp: oneshot::Sender<(Vec<(Price, Decimal)>, Vec<(Price, Decimal)>)>,
    },
    Owners {
        resp: oneshot::Sender<Vec<Owner>>,
    },
}

#[derive(Clone)]
pub struct PairActorHandle {
    tx: mpsc::Sender<PairCommand>,
}

impl PairActorHandle {
    pub async fn place(&self, req: PlaceOrderRequest) -> CoreResult<Order> {
        let (resp_tx, resp_rx) = oneshot::channel();
        self.tx
            .send(PairCommand::Place { req, resp: resp_tx })
            .await
            .map_err(|_| CoreError::BadRequest("pair actor is no longer running".into()))?;
        resp_rx
            .await
            .map_err(|_| CoreError::BadRequest("pair actor dropped the response channel".into()))?
    }

    pub async fn cancel(&self, order_id: OrderId, owner: Owner) -> CoreResult<Order> {
        let (resp_tx, resp_rx) = oneshot::channel();
        self.tx
            .send(PairCommand::Cancel { order_id, owner, resp: resp_tx })
            .await
            .map_err(|_| CoreError::BadRequest("pair actor is no longer running".into()))?;
        resp_rx
            .await
            .map_err(|_| CoreError::BadRequest("pair actor dropped the response channel".into()))?
    }

    pub async fn snapshot(&self, depth: usize) -> CoreResult<(Vec<(Price, Decimal)>, Vec<(Price, Decimal)>)> {
        let (resp_tx, resp_rx) = oneshot::channel();
        self.tx
            .send(PairCommand::Snapshot { depth, resp: resp_tx })
            .await
            .map_err(|_| CoreError::BadRequest("pair actor is no longer running".into()))?;
        resp_rx
            .await
            .map_err(|_| CoreError::BadRequest("pair actor dropped the response channel".into()))
    }

    /// Every owner with order history against this pair, used by the
    /// periodic balance reconciliation sweep.
    pub async fn owners(&self) -> CoreResult<Vec<Owner>> {
        let (resp_tx, resp_rx) = oneshot::channel();
        self.tx
            .send(PairCommand::Owners { resp: resp_tx })
            .await
            .map_err(|_| CoreError::BadRequest("pair actor is no longer running".into()))?;
        resp_rx
            .await
            .map_err(|_| CoreError::BadRequest("pair actor dropped the response channel".into()))
    }
}

/// BUY locks QUOTE, SELL locks BASE — the asset a cancelled order's residual
/// lock was released in, and so the asset whose balance changed.
fn locked_asset(order: &Order) -> Option<String> {
    let tp = TradingPair::parse(&order.pair)?;
    Some(match order.side {
        crate::types::Side::Buy => tp.quote,
        crate::types::Side::Sell => tp.base,
    })
}

async fn publish_balance_after_cancel(ledger: &Arc<dyn AssetLedger>, event_bus: &EventBus, order: &Order) {
    let Some(asset) = locked_asset(order) else { return };
    if let Ok(balance) = ledger.balance(&order.owner, &asset).await {
        event_bus.publish_balance(&order.owner, &asset, balance).await;
    }
}

/// Replays an existing journal (if `config.journal_dir` is set) into a fresh
/// `BookStateStore`, returning the store and the `admit_seq` high-water mark
/// to resume from. Order state, not lock state, is what's rebuilt here — the
/// ledger remains authoritative for every `lock_handle`.
fn restore_from_journal(pair: &str, journal: Option<&Journal>) -> (BookStateStore, u64) {
    let mut bss = BookStateStore::new();
    bss.admit_pair(pair);
    let mut high_water_mark = 0u64;

    let Some(journal) = journal else {
        return (bss, high_water_mark);
    };

    let records = match journal.replay() {
        Ok(records) => records,
        Err(e) => {
            tracing::warn!(pair, %e, "journal replay failed, starting from an empty book");
            return (bss, high_water_mark);
        }
    };

    for record in records {
        match record {
            JournalRecord::PairAdmitted { .. } => {}
            JournalRecord::OrderOpened { order } | JournalRecord::OrderMutated { order } => {
                if order.status == OrderStatus::Open {
                    let _ = bss.insert(*order);
                } else if bss.get(order.id).is_some() {
                    let _ = bss.cancel(order.id);
                }
            }
            JournalRecord::OrderRemoved { order_id } => {
                let _ = bss.cancel(order_id);
            }
            JournalRecord::AdmitSeqHighWaterMark { seq } => {
                high_water_mark = high_water_mark.max(seq);
            }
        }
    }

    (bss, high_water_mark)
}

/// Spawns the actor task owning `pair`'s book. Returns a cheaply-cloneable
/// handle; the task itself runs until the handle (and every clone) is dropped.
pub fn spawn(
    pair: String,
    ledger: Arc<dyn AssetLedger>,
    event_bus: Arc<EventBus>,
    admit_seq: Arc<AtomicU64>,
    config: CoreConfig,
) -> PairActorHandle {
    let (tx, mut rx) = mpsc::channel(config.admission_queue_depth);
    let journal = config.journal_dir.as_ref().and_then(|dir| {
        let path = dir.join(format!("{}.jsonl", pair.replace('/', "_")));
        match Journal::open(&path) {
            Ok(j) => Some(Arc::new(j)),
            Err(e) => {
                tracing::warn!(pair = %pair, %e, "failed to open journal, proceeding without durability");
                None
            }
        }
    });
    let admission = Arc::new(AdmissionLayer::new(ledger.clone(), admit_seq.clone(), config.clone()));
    let settlement = SettlementDriver::new(ledger.clone(), event_bus.clone(), config.settle_retry.clone());
    let place_cancel_deadline = config.place_cancel_deadline;

    let (bss_init, high_water_mark) = restore_from_journal(&pair, journal.as_deref());
    admit_seq.fetch_max(high_water_mark, std::sync::atomic::Ordering::SeqCst);
    if let Some(j) = &journal {
        let _ = j.append(&JournalRecord::PairAdmitted { pair: pair.clone() });
    }

    tokio::spawn(async move {
        let mut bss = bss_init;

        while let Some(cmd) = rx.recv().await {
            match cmd {
                PairCommand::Place { req, resp } => {
                    let result = match tokio::time::timeout(
                        place_cancel_deadline,
                        handle_place(&mut bss, &ledger, &admission, &settlement, &event_bus, journal.as_deref(), req),
                    )
                    .await
                    {
                        Ok(result) => result,
                        Err(_) => Err(CoreError::Timeout),
                    };
                    let _ = resp.send(result);
                }
                PairCommand::Cancel { order_id, owner, resp } => {
                    let result = match tokio::time::timeout(
                        place_cancel_deadline,
                        admission.cancel(&mut bss, order_id, &owner),
                    )
                    .await
                    {
                        Ok(result) => result,
                        Err(_) => Err(CoreError::Timeout),
                    };
                    if let Ok(order) = &result {
                        if let Some(j) = &journal {
                            let _ = j.append(&JournalRecord::OrderRemoved { order_id: order.id });
                        }
                        if let Some(price) = order.price {
                            event_bus
                                .publish_orderbook_delta(&pair, order.side, price, Decimal::ZERO)
                                .await;
                        }
                        publish_balance_after_cancel(&ledger, &event_bus, order).await;
                    }
                    let _ = resp.send(result);
                }
                PairCommand::Snapshot { depth, resp } => {
                    let _ = resp.send(bss.snapshot(&pair, depth));
                }
                PairCommand::Owners { resp } => {
                    let _ = resp.send(bss.owners());
                }
            }
        }
    });

    PairActorHandle { tx }
}

/// Runs one placement end to end: admit, settle every resulting intent
/// (bounded in-flight window of 1 per spec §4.4), resolve the order's
/// TIF-driven terminal state, then run the stop-loss/take-profit scan the
/// newly-settled trade(s) may have triggered. Nothing from this function is
/// observable to subscribers until the corresponding settlement has already
/// succeeded.
async fn handle_place(
    bss: &mut BookStateStore,
    ledger: &Arc<dyn AssetLedger>,
    admission: &AdmissionLayer,
    settlement: &SettlementDriver,
    event_bus: &Arc<EventBus>,
    journal: Option<&Journal>,
    req: PlaceOrderRequest,
) -> CoreResult<Order> {
    if settlement.is_frozen(&req.pair).await {
        return Err(CoreError::LedgerUnavailable);
    }

    let tif = req.tif;
    let owner = req.owner.clone();
    let outcome = admission.place(bss, req).await?;

    if let Some(j) = journal {
        let _ = j.append(&JournalRecord::AdmitSeqHighWaterMark { seq: outcome.order.admit_seq });
    }

    if outcome.order.status == OrderStatus::Rejected {
        return Ok(outcome.order);
    }

    for maker in &outcome.self_trade_cancelled {
        if let Some(j) = journal {
            let _ = j.append(&JournalRecord::OrderRemoved { order_id: maker.id });
        }
        if let Some(price) = maker.price {
            event_bus
                .publish_orderbook_delta(&maker.pair, maker.side, price, Decimal::ZERO)
                .await;
        }
        publish_balance_after_cancel(ledger, event_bus, maker).await;
    }

    let mut last_trade_price = None;
    for intent in &outcome.intents {
        match settlement.drive(bss, intent).await? {
            SettleOutcome::Settled(trade) => last_trade_price = Some(trade.price),
            SettleOutcome::Abandoned => {
                tracing::warn!(
                    pair = %intent.pair,
                    "fill intent abandoned after lock invalidation; affected orders were cancelled defensively"
                );
            }
        }
    }

    let order_id = outcome.order.id;
    let mut final_order = match bss.get(order_id) {
        Some(order) => order.clone(),
        None => Order {
            status: OrderStatus::Filled,
            filled: outcome.order.quantity,
            ..outcome.order
        },
    };

    if (final_order.mode == OrderMode::Market || tif == Tif::Ioc) && final_order.status == OrderStatus::Open {
        final_order = admission.cancel(bss, order_id, &owner).await?;
        publish_balance_after_cancel(ledger, event_bus, &final_order).await;
    }

    if let Some(j) = journal {
        let record = if final_order.status == OrderStatus::Open {
            JournalRecord::OrderOpened { order: Box::new(final_order.clone()) }
        } else {
            JournalRecord::OrderMutated { order: Box::new(final_order.clone()) }
        };
        let _ = j.append(&record);
    }

    if final_order.status == OrderStatus::Open {
        if let Some(price) = final_order.price {
            event_bus
                .publish_orderbook_delta(&final_order.pair, final_order.side, price, final_order.remaining())
                .await;
        }
    }

    if let Some(price) = last_trade_price {
        let triggered = monitor::triggered_orders(bss, &final_order.pair, price);
        for order in triggered {
            if order.id == final_order.id {
                continue;
            }
            match admission.cancel(bss, order.id, &order.owner).await {
                Ok(cancelled) => {
                    if let Some(j) = journal {
                        let _ = j.append(&JournalRecord::OrderRemoved { order_id: cancelled.id });
                    }
                    tracing::info!(
                        order_id = %cancelled.id,
                        pair = %cancelled.pair,
                        price = %price,
                        "stop-loss/take-profit trigger cancelled resting order"
                    );
                    if let Some(cancel_price) = cancelled.price {
                        event_bus
                            .publish_orderbook_delta(&cancelled.pair, cancelled.side, cancel_price, Decimal::ZERO)
                            .await;
                    }
                    publish_balance_after_cancel(ledger, event_bus, &cancelled).await;
                }
                Err(e) => tracing::warn!(order_id = %order.id, %e, "trigger cancel failed"),
            }
        }
    }

    Ok(final_order)
}
