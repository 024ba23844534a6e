//! Pure matching core for a single-process central limit order book: book
//! state, the matching pass, settlement sequencing, the admission layer, the
//! per-pair actor, and the event bus. The only I/O boundary is the
//! `AssetLedger` trait in [`ledger`] — everything else here is synchronous
//! state manipulation plus the `tokio` plumbing needed to serialize it.

pub mod admission;
pub mod book;
pub mod config;
pub mod engine;
pub mod error;
pub mod eventbus;
pub mod journal;
pub mod ledger;
pub mod monitor;
pub mod pair_actor;
pub mod settlement;
pub mod types;

pub use admission::{AdmissionLayer, PlaceOrderRequest, PlaceOutcome};
pub use book::BookStateStore;
pub use config::{CoreConfig, RetryConfig};
pub use engine::{dry_walk_fillable, match_pair, MatchOutcome};
pub use error::{CoreError, CoreResult};
pub use eventbus::{next_or_slow_consumer, BalanceEvent, EventBus, OrderBookEvent, TradeEvent};
pub use journal::{Journal, JournalRecord};
pub use ledger::{AssetLedger, InMemoryLedger, LedgerEvent, LedgerEventKind};
pub use pair_actor::{spawn as spawn_pair_actor, PairActorHandle};
pub use settlement::{SettleOutcome, SettlementDriver};
pub use types::{
    Balance, FillIntent, LockHandle, Order, OrderId, OrderMode, OrderStatus, Owner, Price,
    Quantity, SelfTradePolicy, Side, Tif, Trade, TradingPair,
};
