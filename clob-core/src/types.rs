use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub type OrderId = Uuid;
pub type Price = Decimal;
pub type Quantity = Decimal;
pub type AdmitSeq = u64;

/// Opaque party identifier. The core never interprets this beyond equality.
pub type Owner = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    #[serde(rename = "BUY")]
    Buy,
    #[serde(rename = "SELL")]
    Sell,
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderMode {
    #[serde(rename = "LIMIT")]
    Limit,
    #[serde(rename = "MARKET")]
    Market,
}

/// Time-in-force. GTC rests any residual; IOC cancels the residual after one
/// matching pass; FOK is rejected outright unless the whole quantity fills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Tif {
    #[serde(rename = "GTC")]
    Gtc,
    #[serde(rename = "IOC")]
    Ioc,
    #[serde(rename = "FOK")]
    Fok,
}

impl Default for Tif {
    fn default() -> Self {
        Tif::Gtc
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Open,
    Filled,
    Cancelled,
    Rejected,
}

/// How the matching engine resolves a cross between two orders owned by the
/// same party. SKIP moves the younger order aside for this pass and restores
/// it afterward; the CANCEL_* variants terminate the named side outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelfTradePolicy {
    Skip,
    CancelTaker,
    CancelMaker,
}

impl Default for SelfTradePolicy {
    fn default() -> Self {
        SelfTradePolicy::Skip
    }
}

/// A reference to assets reserved under operator custody by the ledger.
/// Opaque to everything except the `AssetLedger` implementation that issued it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockHandle(pub String);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub owner: Owner,
    pub pair: String,
    pub side: Side,
    pub mode: OrderMode,
    pub price: Option<Price>,
    pub quantity: Quantity,
    pub filled: Quantity,
    pub tif: Tif,
    pub lock_handle: Option<LockHandle>,
    pub admit_seq: AdmitSeq,
    pub status: OrderStatus,
    pub stop_loss: Option<Price>,
    pub take_profit: Option<Price>,
}

impl Order {
    pub fn remaining(&self) -> Quantity {
        self.quantity - self.filled
    }

    pub fn is_filled(&self) -> bool {
        self.remaining().is_zero()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub trade_id: Uuid,
    pub pair: String,
    pub price: Price,
    pub quantity: Quantity,
    pub buyer: Owner,
    pub seller: Owner,
    pub buy_order_id: OrderId,
    pub sell_order_id: OrderId,
    pub maker_side: Side,
    pub ts: u64,
}

/// A tentative, pre-settlement description of a trade produced by the
/// matching engine and consumed by the settlement driver. Nothing about a
/// fill intent is observable to subscribers until settlement succeeds.
#[derive(Debug, Clone)]
pub struct FillIntent {
    pub pair: String,
    pub buy_order_id: OrderId,
    pub sell_order_id: OrderId,
    pub buyer: Owner,
    pub seller: Owner,
    pub trade_price: Price,
    pub trade_qty: Quantity,
    pub buyer_filled_before: Quantity,
    pub seller_filled_before: Quantity,
    pub buyer_lock: LockHandle,
    pub seller_lock: LockHandle,
    pub maker_side: Side,
}

impl FillIntent {
    /// Deterministic idempotency key passed to `AssetLedger::settle`, so a
    /// retried settlement call never double-transfers.
    pub fn intent_id(&self) -> String {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};
        let mut hasher = DefaultHasher::new();
        self.pair.hash(&mut hasher);
        self.buy_order_id.hash(&mut hasher);
        self.sell_order_id.hash(&mut hasher);
        self.buyer_filled_before.to_string().hash(&mut hasher);
        self.seller_filled_before.to_string().hash(&mut hasher);
        self.trade_qty.to_string().hash(&mut hasher);
        format!("{:016x}", hasher.finish())
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Balance {
    pub available: Decimal,
    pub locked: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingPair {
    pub base: String,
    pub quote: String,
}

impl TradingPair {
    pub fn symbol(&self) -> String {
        format!("{}/{}", self.base, self.quote)
    }

    pub fn parse(symbol: &str) -> Option<Self> {
        let mut parts = symbol.split('/');
        let base = parts.next()?.to_string();
        let quote = parts.next()?.to_string();
        if parts.next().is_some() || base.is_empty() || quote.is_empty() {
            return None;
        }
        Some(Self { base, quote })
    }
}
