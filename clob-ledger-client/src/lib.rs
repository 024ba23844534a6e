//! Production `AssetLedger`: an HTTP client against the external settlement
//! ledger. Grounded on `matching_engine_service::settlement::SettlementClient`
//! (retry/backoff shape, specific error-code branching) and
//! `accounts::routes::internal` (the `/internal/settle`, `/internal/cancel`
//! request/response shapes this client's wire format mirrors).

use async_trait::async_trait;
use clob_core::{
    AssetLedger, Balance, CoreError, CoreResult, LedgerEvent, LedgerEventKind, LockHandle, Owner, RetryConfig,
};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, info, warn};

const REQUEST_TIMEOUT_MS: u64 = 5000;

#[derive(Debug, Clone)]
pub struct LedgerClientConfig {
    pub base_url: String,
    pub timeout: Duration,
    pub retry: RetryConfig,
}

impl LedgerClientConfig {
    pub fn from_env() -> Self {
        Self {
            base_url: std::env::var("LEDGER_URL").unwrap_or_else(|_| "http://localhost:9000".to_string()),
            timeout: Duration::from_millis(REQUEST_TIMEOUT_MS),
            retry: RetryConfig::default(),
        }
    }
}

/// Reqwest-backed `AssetLedger`. Every call is idempotent or carries an
/// idempotency key; transient HTTP/server errors are retried with the same
/// doubling-and-capped backoff `RetryConfig::delay_for_attempt` gives the
/// settlement driver, before surfacing `CoreError::LedgerUnavailable`.
pub struct HttpLedgerClient {
    client: Client,
    base_url: String,
    retry: RetryConfig,
}

impl HttpLedgerClient {
    pub fn new(config: LedgerClientConfig) -> Self {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .expect("failed to build ledger HTTP client");
        Self {
            client,
            base_url: config.base_url,
            retry: config.retry,
        }
    }
}

#[derive(Debug, Serialize)]
struct LockRequest<'a> {
    owner: &'a str,
    asset: &'a str,
    amount: Decimal,
    client_nonce: &'a str,
}

#[derive(Debug, Deserialize)]
struct LockResponse {
    lock_id: String,
}

#[derive(Debug, Serialize)]
struct SettleRequest<'a> {
    buyer_lock: &'a str,
    seller_lock: &'a str,
    base_qty: Decimal,
    quote_qty: Decimal,
    intent_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct SettleResponse {
    buyer_residual_lock: String,
    seller_residual_lock: String,
}

#[derive(Debug, Serialize)]
struct UnlockRequest<'a> {
    lock_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct UnlockResponse {
    released: Decimal,
}

#[derive(Debug, Deserialize)]
struct BalanceResponse {
    available: Decimal,
    locked: Decimal,
}

#[derive(Debug, Deserialize)]
struct EventsResponse {
    events: Vec<EventWire>,
}

#[derive(Debug, Deserialize)]
struct EventWire {
    offset: u64,
    kind: String,
    owner: String,
    asset: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
    code: String,
}

fn map_error_code(code: &str, error: &str) -> CoreError {
    match code {
        "INSUFFICIENT_FUNDS" => CoreError::InsufficientFunds {
            available: String::new(),
            required: String::new(),
        },
        "LOCK_INVALID" | "LOCK_NOT_FOUND" | "ALREADY_SETTLED" => CoreError::LockInvalid,
        "NOT_OWNER" => CoreError::NotOwner,
        "BAD_DECIMAL" => CoreError::BadDecimal(error.to_string()),
        _ => CoreError::BadRequest(format!("{code}: {error}")),
    }
}

/// Runs `op` up to `retry.max_attempts` times, retrying only on connection
/// failure or a 5xx response; any parsed application error (4xx with a
/// `code`/`error` body) is translated immediately and never retried.
async fn with_retry<T, F, Fut>(retry: &RetryConfig, label: &str, mut op: F) -> CoreResult<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, RetryableError>>,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(RetryableError::Fatal(e)) => return Err(e),
            Err(RetryableError::Transient(msg)) => {
                if attempt >= retry.max_attempts {
                    error!(label, attempt, %msg, "ledger call failed permanently");
                    return Err(CoreError::LedgerUnavailable);
                }
                let delay = retry.delay_for_attempt(attempt - 1);
                warn!(label, attempt, ?delay, %msg, "retrying ledger call");
                tokio::time::sleep(delay).await;
            }
        }
    }
}

enum RetryableError {
    Transient(String),
    Fatal(CoreError),
}

async fn parse_response<T: for<'de> Deserialize<'de>>(response: reqwest::Response) -> Result<T, RetryableError> {
    let status = response.status();
    if status.is_success() {
        response
            .json::<T>()
            .await
            .map_err(|e| RetryableError::Fatal(CoreError::BadDecimal(e.to_string())))
    } else if let Ok(err) = response.json::<ErrorResponse>().await {
        Err(RetryableError::Fatal(map_error_code(&err.code, &err.error)))
    } else if status.is_server_error() {
        Err(RetryableError::Transient(format!("HTTP {status}")))
    } else {
        Err(RetryableError::Fatal(CoreError::BadRequest(format!("HTTP {status}"))))
    }
}

fn network_error(e: reqwest::Error) -> RetryableError {
    RetryableError::Transient(e.to_string())
}

#[async_trait]
impl AssetLedger for HttpLedgerClient {
    async fn lock(
        &self,
        owner: &Owner,
        asset: &str,
        amount: Decimal,
        client_nonce: &str,
    ) -> CoreResult<LockHandle> {
        let url = format!("{}/internal/lock", self.base_url);
        let body = LockRequest {
            owner,
            asset,
            amount,
            client_nonce,
        };
        let response: LockResponse = with_retry(&self.retry, "lock", || async {
            let resp = self
                .client
                .post(&url)
                .json(&body)
                .send()
                .await
                .map_err(network_error)?;
            parse_response(resp).await
        })
        .await?;
        Ok(LockHandle(response.lock_id))
    }

    async fn settle(
        &self,
        buyer_lock: &LockHandle,
        seller_lock: &LockHandle,
        base_qty: Decimal,
        quote_qty: Decimal,
        intent_id: &str,
    ) -> CoreResult<(LockHandle, LockHandle)> {
        let url = format!("{}/internal/settle", self.base_url);
        let body = SettleRequest {
            buyer_lock: &buyer_lock.0,
            seller_lock: &seller_lock.0,
            base_qty,
            quote_qty,
            intent_id,
        };
        let response: SettleResponse = with_retry(&self.retry, "settle", || async {
            let resp = self
                .client
                .post(&url)
                .json(&body)
                .send()
                .await
                .map_err(network_error)?;
            parse_response(resp).await
        })
        .await?;
        info!(intent_id, "settled trade via ledger service");
        Ok((
            LockHandle(response.buyer_residual_lock),
            LockHandle(response.seller_residual_lock),
        ))
    }

    async fn unlock(&self, lock: &LockHandle) -> CoreResult<Decimal> {
        let url = format!("{}/internal/unlock", self.base_url);
        let body = UnlockRequest { lock_id: &lock.0 };
        let response: UnlockResponse = with_retry(&self.retry, "unlock", || async {
            let resp = self
                .client
                .post(&url)
                .json(&body)
                .send()
                .await
                .map_err(network_error)?;
            parse_response(resp).await
        })
        .await?;
        Ok(response.released)
    }

    async fn balance(&self, owner: &Owner, asset: &str) -> CoreResult<Balance> {
        let url = format!("{}/internal/balance/{}/{}", self.base_url, owner, asset);
        let response: BalanceResponse = with_retry(&self.retry, "balance", || async {
            let resp = self
                .client
                .get(&url)
                .send()
                .await
                .map_err(network_error)?;
            parse_response(resp).await
        })
        .await?;
        Ok(Balance {
            available: response.available,
            locked: response.locked,
        })
    }

    /// Polls the ledger's event stream from `since_offset`. Which upstream
    /// filter shape the ledger service uses internally is this client's
    /// concern alone; `AssetLedger` only promises a flat, offset-ordered feed.
    async fn events(&self, since_offset: u64) -> CoreResult<Vec<LedgerEvent>> {
        let url = format!("{}/internal/events?since={}", self.base_url, since_offset);
        let response: EventsResponse = with_retry(&self.retry, "events", || async {
            let resp = self
                .client
                .get(&url)
                .send()
                .await
                .map_err(network_error)?;
            parse_response(resp).await
        })
        .await?;
        Ok(response
            .events
            .into_iter()
            .map(|e| LedgerEvent {
                offset: e.offset,
                kind: match e.kind.as_str() {
                    "ARCHIVED" => LedgerEventKind::Archived,
                    _ => LedgerEventKind::Created,
                },
                owner: e.owner,
                asset: e.asset,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_known_error_codes() {
        assert!(matches!(
            map_error_code("INSUFFICIENT_FUNDS", "short"),
            CoreError::InsufficientFunds { .. }
        ));
        assert!(matches!(map_error_code("LOCK_INVALID", "gone"), CoreError::LockInvalid));
        assert!(matches!(map_error_code("NOT_OWNER", "nope"), CoreError::NotOwner));
    }

    #[test]
    fn config_from_env_defaults_when_unset() {
        std::env::remove_var("LEDGER_URL");
        let config = LedgerClientConfig::from_env();
        assert_eq!(config.base_url, "http://localhost:9000");
        assert_eq!(config.retry.max_attempts, RetryConfig::default().max_attempts);
    }
}
