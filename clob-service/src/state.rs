//! Process-wide wiring: the pair-actor registry, the shared event bus, and
//! the ledger client every actor is spawned against. Grounded on
//! `gateway::state::GatewayState` (coarse-locked registry shared across
//! handlers via `Clone`).

use clob_core::{spawn_pair_actor, AssetLedger, Balance, CoreConfig, CoreError, EventBus, Owner, PairActorHandle, TradingPair};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Clone)]
pub struct AppState {
    pairs: Arc<RwLock<HashMap<String, PairActorHandle>>>,
    pub event_bus: Arc<EventBus>,
    ledger: Arc<dyn AssetLedger>,
    admit_seq: Arc<AtomicU64>,
    config: CoreConfig,
}

impl AppState {
    pub fn new(ledger: Arc<dyn AssetLedger>, config: CoreConfig) -> Self {
        Self {
            pairs: Arc::new(RwLock::new(HashMap::new())),
            event_bus: Arc::new(EventBus::new(config.subscriber_queue_depth)),
            ledger,
            admit_seq: Arc::new(AtomicU64::new(1)),
            config,
        }
    }

    /// Admits a pair (idempotent) and returns its actor handle, spawning the
    /// actor task on first admission.
    pub async fn admit_pair(&self, pair: &str) -> PairActorHandle {
        if let Some(handle) = self.pairs.read().await.get(pair) {
            return handle.clone();
        }
        let mut pairs = self.pairs.write().await;
        pairs
            .entry(pair.to_string())
            .or_insert_with(|| {
                tracing::info!(pair, "admitting trading pair");
                spawn_pair_actor(
                    pair.to_string(),
                    self.ledger.clone(),
                    self.event_bus.clone(),
                    self.admit_seq.clone(),
                    self.config.clone(),
                )
            })
            .clone()
    }

    pub async fn pair_handle(&self, pair: &str) -> Result<PairActorHandle, CoreError> {
        self.pairs
            .read()
            .await
            .get(pair)
            .cloned()
            .ok_or_else(|| CoreError::UnknownPair(pair.to_string()))
    }

    /// Base/quote assets across every admitted pair, used to know which
    /// assets to poll for balance snapshots and reconciliation.
    async fn known_assets(&self) -> Vec<String> {
        let pairs = self.pairs.read().await;
        let mut assets = HashSet::new();
        for pair in pairs.keys() {
            if let Some(tp) = TradingPair::parse(pair) {
                assets.insert(tp.base);
                assets.insert(tp.quote);
            }
        }
        assets.into_iter().collect()
    }

    /// Every owner with order history across every admitted pair.
    async fn all_owners(&self) -> HashSet<Owner> {
        let handles: Vec<PairActorHandle> = self.pairs.read().await.values().cloned().collect();
        let mut owners = HashSet::new();
        for handle in handles {
            if let Ok(pair_owners) = handle.owners().await {
                owners.extend(pair_owners);
            }
        }
        owners
    }

    /// Current `{available, locked}` per known asset for one owner, used as
    /// the `balance:{owner}` channel's greeting snapshot.
    pub async fn balances_snapshot(&self, owner: &str) -> Vec<(String, Balance)> {
        let mut out = Vec::new();
        for asset in self.known_assets().await {
            if let Ok(balance) = self.ledger.balance(&owner.to_string(), &asset).await {
                out.push((asset, balance));
            }
        }
        out
    }

    /// Periodic sweep republishing every known owner/asset balance on the
    /// `balance:{owner}` channel, independent of trade/cancel activity.
    pub async fn reconcile_balances(&self) {
        let owners = self.all_owners().await;
        let assets = self.known_assets().await;
        for owner in owners {
            for asset in &assets {
                if let Ok(balance) = self.ledger.balance(&owner, asset).await {
                    self.event_bus.publish_balance(&owner, asset, balance).await;
                }
            }
        }
    }
}
