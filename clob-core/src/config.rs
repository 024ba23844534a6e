//! Recognised configuration options (spec §6), read from the environment the
//! way `matching_engine_service`/`gateway` read `SYMBOL`/`BIND_ADDR`/
//! `ACCOUNTS_URL`: `dotenvy::dotenv()` first, then `std::env::var(..).unwrap_or_else(..)`.

use crate::types::SelfTradePolicy;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base: Duration,
    pub cap: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base: Duration::from_secs(2),
            cap: Duration::from_secs(8),
        }
    }
}

impl RetryConfig {
    /// Exponential back-off capped at `cap`, doubling per attempt from `base`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let doubled = self.base.saturating_mul(1u32 << attempt.min(16));
        doubled.min(self.cap)
    }
}

#[derive(Debug, Clone)]
pub struct CoreConfig {
    pub decimal_precision: u32,
    pub market_slippage_buffer: Decimal,
    pub settle_retry: RetryConfig,
    pub admission_queue_depth: usize,
    pub subscriber_queue_depth: usize,
    pub balance_reconcile_interval: Duration,
    pub self_trade_policy: SelfTradePolicy,
    pub place_cancel_deadline: Duration,
    /// Directory holding one append-only journal file per pair. `None`
    /// disables the restart journal (used by tests and the bundled demos).
    pub journal_dir: Option<std::path::PathBuf>,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            decimal_precision: 18,
            market_slippage_buffer: Decimal::new(5, 2), // 0.05
            settle_retry: RetryConfig::default(),
            admission_queue_depth: 4096,
            subscriber_queue_depth: 1024,
            balance_reconcile_interval: Duration::from_secs(60),
            self_trade_policy: SelfTradePolicy::Skip,
            place_cancel_deadline: Duration::from_secs(30),
            journal_dir: None,
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl CoreConfig {
    /// Loads `.env` if present (mirrors the teacher's `dotenvy` usage) and
    /// overlays any recognised environment variables on top of the defaults.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        let default = Self::default();
        Self {
            decimal_precision: env_or("DECIMAL_PRECISION", default.decimal_precision),
            market_slippage_buffer: std::env::var("MARKET_SLIPPAGE_BUFFER")
                .ok()
                .and_then(|v| Decimal::from_str(&v).ok())
                .unwrap_or(default.market_slippage_buffer),
            settle_retry: RetryConfig {
                max_attempts: env_or("SETTLE_RETRY_MAX_ATTEMPTS", default.settle_retry.max_attempts),
                base: Duration::from_millis(env_or("SETTLE_RETRY_BASE_MS", default.settle_retry.base.as_millis() as u64)),
                cap: Duration::from_millis(env_or("SETTLE_RETRY_CAP_MS", default.settle_retry.cap.as_millis() as u64)),
            },
            admission_queue_depth: env_or("ADMISSION_QUEUE_DEPTH", default.admission_queue_depth),
            subscriber_queue_depth: env_or("SUBSCRIBER_QUEUE_DEPTH", default.subscriber_queue_depth),
            balance_reconcile_interval: Duration::from_secs(env_or(
                "BALANCE_RECONCILE_INTERVAL_S",
                default.balance_reconcile_interval.as_secs(),
            )),
            self_trade_policy: match std::env::var("SELF_TRADE_POLICY").as_deref() {
                Ok("CANCEL_TAKER") => SelfTradePolicy::CancelTaker,
                Ok("CANCEL_MAKER") => SelfTradePolicy::CancelMaker,
                _ => default.self_trade_policy,
            },
            place_cancel_deadline: Duration::from_secs(env_or(
                "PLACE_CANCEL_DEADLINE_S",
                default.place_cancel_deadline.as_secs(),
            )),
            journal_dir: std::env::var("JOURNAL_DIR").ok().map(std::path::PathBuf::from),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_delay_doubles_and_caps() {
        let retry = RetryConfig::default();
        assert_eq!(retry.delay_for_attempt(0), Duration::from_secs(2));
        assert_eq!(retry.delay_for_attempt(1), Duration::from_secs(4));
        assert_eq!(retry.delay_for_attempt(2), Duration::from_secs(8));
        assert_eq!(retry.delay_for_attempt(3), Duration::from_secs(8));
    }
}
