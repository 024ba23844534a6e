//! Asset Ledger Adapter: the narrow façade over the external settlement
//! ledger. `AssetLedger` is the only abstract boundary in the core; it has
//! exactly two implementations — the HTTP production client in
//! `clob-ledger-client`, and `InMemoryLedger` below, used by tests and the
//! bundled demos.

use crate::error::{CoreError, CoreResult};
use crate::types::{Balance, LockHandle, Owner};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerEventKind {
    Created,
    Archived,
}

#[derive(Debug, Clone)]
pub struct LedgerEvent {
    pub offset: u64,
    pub kind: LedgerEventKind,
    pub owner: Owner,
    pub asset: String,
}

/// Capability set the matching core needs from an external ledger: lock an
/// asset under operator custody, atomically transfer two locked holdings
/// between counterparties, release a lock, and stream contract events.
#[async_trait]
pub trait AssetLedger: Send + Sync {
    async fn lock(
        &self,
        owner: &Owner,
        asset: &str,
        amount: Decimal,
        client_nonce: &str,
    ) -> CoreResult<LockHandle>;

    async fn settle(
        &self,
        buyer_lock: &LockHandle,
        seller_lock: &LockHandle,
        base_qty: Decimal,
        quote_qty: Decimal,
        intent_id: &str,
    ) -> CoreResult<(LockHandle, LockHandle)>;

    /// Releases the entire remaining amount reserved under `lock` back to
    /// `available` and returns how much was released.
    async fn unlock(&self, lock: &LockHandle) -> CoreResult<Decimal>;

    async fn balance(&self, owner: &Owner, asset: &str) -> CoreResult<Balance>;

    async fn events(&self, since_offset: u64) -> CoreResult<Vec<LedgerEvent>>;
}

#[derive(Debug, Clone)]
struct Lock {
    owner: Owner,
    asset: String,
    amount: Decimal,
}

/// In-memory test double for `AssetLedger`. Tracks available/locked balances
/// per (owner, asset) the same way `accounts::models::ledger::LedgerEntry`
/// keeps a cached balance reconciled against an append-only history, minus
/// the Postgres persistence: everything here lives for the process lifetime.
pub struct InMemoryLedger {
    balances: RwLock<HashMap<(Owner, String), Balance>>,
    locks: RwLock<HashMap<String, Lock>>,
    events: RwLock<Vec<LedgerEvent>>,
    next_lock_id: std::sync::atomic::AtomicU64,
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self {
            balances: RwLock::new(HashMap::new()),
            locks: RwLock::new(HashMap::new()),
            events: RwLock::new(Vec::new()),
            next_lock_id: std::sync::atomic::AtomicU64::new(1),
        }
    }

    /// Test/demo helper to seed a party's available balance.
    pub async fn credit(&self, owner: &Owner, asset: &str, amount: Decimal) {
        let mut balances = self.balances.write().await;
        let entry = balances
            .entry((owner.clone(), asset.to_string()))
            .or_insert_with(Balance::default);
        entry.available += amount;
    }

    fn next_handle(&self) -> LockHandle {
        let id = self
            .next_lock_id
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        LockHandle(format!("lock-{id}"))
    }
}

#[async_trait]
impl AssetLedger for InMemoryLedger {
    async fn lock(
        &self,
        owner: &Owner,
        asset: &str,
        amount: Decimal,
        _client_nonce: &str,
    ) -> CoreResult<LockHandle> {
        let mut balances = self.balances.write().await;
        let entry = balances
            .entry((owner.clone(), asset.to_string()))
            .or_insert_with(Balance::default);
        if entry.available < amount {
            return Err(CoreError::InsufficientFunds {
                available: entry.available.to_string(),
                required: amount.to_string(),
            });
        }
        entry.available -= amount;
        entry.locked += amount;
        drop(balances);

        let handle = self.next_handle();
        let mut locks = self.locks.write().await;
        locks.insert(
            handle.0.clone(),
            Lock {
                owner: owner.clone(),
                asset: asset.to_string(),
                amount,
            },
        );
        let mut events = self.events.write().await;
        events.push(LedgerEvent {
            offset: events.len() as u64,
            kind: LedgerEventKind::Created,
            owner: owner.clone(),
            asset: asset.to_string(),
        });
        Ok(handle)
    }

    async fn settle(
        &self,
        buyer_lock: &LockHandle,
        seller_lock: &LockHandle,
        base_qty: Decimal,
        quote_qty: Decimal,
        _intent_id: &str,
    ) -> CoreResult<(LockHandle, LockHandle)> {
        let mut locks = self.locks.write().await;
        let buyer = locks
            .get(&buyer_lock.0)
            .cloned()
            .ok_or(CoreError::LockInvalid)?;
        let seller = locks
            .get(&seller_lock.0)
            .cloned()
            .ok_or(CoreError::LockInvalid)?;

        let base_asset = &seller.asset;
        let quote_asset = &buyer.asset;

        let mut balances = self.balances.write().await;

        // Buyer: release the quote lock, pay the quote leg, receive the base leg.
        {
            let buyer_quote = balances
                .entry((buyer.owner.clone(), quote_asset.clone()))
                .or_insert_with(Balance::default);
            buyer_quote.locked -= quote_qty;
            let buyer_base = balances
                .entry((buyer.owner.clone(), base_asset.clone()))
                .or_insert_with(Balance::default);
            buyer_base.available += base_qty;
        }
        // Seller: release the base lock, transfer the base leg, receive the quote leg.
        {
            let seller_base = balances
                .entry((seller.owner.clone(), base_asset.clone()))
                .or_insert_with(Balance::default);
            seller_base.locked -= base_qty;
            let seller_quote = balances
                .entry((seller.owner.clone(), quote_asset.clone()))
                .or_insert_with(Balance::default);
            seller_quote.available += quote_qty;
        }
        drop(balances);

        let residual_buyer = buyer.amount - quote_qty;
        let residual_seller = seller.amount - base_qty;

        locks.remove(&buyer_lock.0);
        locks.remove(&seller_lock.0);

        let new_buyer_handle = self.next_handle();
        let new_seller_handle = self.next_handle();
        locks.insert(
            new_buyer_handle.0.clone(),
            Lock {
                owner: buyer.owner.clone(),
                asset: quote_asset.clone(),
                amount: residual_buyer,
            },
        );
        locks.insert(
            new_seller_handle.0.clone(),
            Lock {
                owner: seller.owner.clone(),
                asset: base_asset.clone(),
                amount: residual_seller,
            },
        );

        // Re-lock the residual so callers can continue referencing a live handle.
        let mut balances = self.balances.write().await;
        balances
            .entry((buyer.owner.clone(), quote_asset.clone()))
            .or_insert_with(Balance::default)
            .locked += residual_buyer;
        balances
            .entry((seller.owner.clone(), base_asset.clone()))
            .or_insert_with(Balance::default)
            .locked += residual_seller;

        Ok((new_buyer_handle, new_seller_handle))
    }

    async fn unlock(&self, lock: &LockHandle) -> CoreResult<Decimal> {
        let mut locks = self.locks.write().await;
        let entry = locks.remove(&lock.0).ok_or(CoreError::LockInvalid)?;
        let mut balances = self.balances.write().await;
        let balance = balances
            .entry((entry.owner.clone(), entry.asset.clone()))
            .or_insert_with(Balance::default);
        balance.locked -= entry.amount;
        balance.available += entry.amount;
        Ok(entry.amount)
    }

    async fn balance(&self, owner: &Owner, asset: &str) -> CoreResult<Balance> {
        let balances = self.balances.read().await;
        Ok(balances
            .get(&(owner.clone(), asset.to_string()))
            .copied()
            .unwrap_or_default())
    }

    async fn events(&self, since_offset: u64) -> CoreResult<Vec<LedgerEvent>> {
        let events = self.events.read().await;
        Ok(events
            .iter()
            .filter(|e| e.offset >= since_offset)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn lock_then_settle_moves_both_legs() {
        let ledger = InMemoryLedger::new();
        ledger.credit(&"alice".to_string(), "USDT", dec!(10000)).await;
        ledger.credit(&"bob".to_string(), "BTC", dec!(1)).await;

        let buy_lock = ledger
            .lock(&"alice".to_string(), "USDT", dec!(5000), "n1")
            .await
            .unwrap();
        let sell_lock = ledger
            .lock(&"bob".to_string(), "BTC", dec!(0.1), "n2")
            .await
            .unwrap();

        ledger
            .settle(&buy_lock, &sell_lock, dec!(0.1), dec!(5000), "intent-1")
            .await
            .unwrap();

        let alice_btc = ledger.balance(&"alice".to_string(), "BTC").await.unwrap();
        assert_eq!(alice_btc.available, dec!(0.1));
        let bob_usdt = ledger.balance(&"bob".to_string(), "USDT").await.unwrap();
        assert_eq!(bob_usdt.available, dec!(5000));
    }

    #[tokio::test]
    async fn lock_rejects_insufficient_funds() {
        let ledger = InMemoryLedger::new();
        let err = ledger
            .lock(&"alice".to_string(), "USDT", dec!(100), "n1")
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::InsufficientFunds { .. }));
    }

    #[tokio::test]
    async fn unlock_returns_residual_to_available() {
        let ledger = InMemoryLedger::new();
        ledger.credit(&"alice".to_string(), "USDT", dec!(1000)).await;
        let lock = ledger
            .lock(&"alice".to_string(), "USDT", dec!(1000), "n1")
            .await
            .unwrap();
        let released = ledger.unlock(&lock).await.unwrap();
        assert_eq!(released, dec!(1000));
        let balance = ledger.balance(&"alice".to_string(), "USDT").await.unwrap();
        assert_eq!(balance.available, dec!(1000));
        assert_eq!(balance.locked, dec!(0));
    }
}
