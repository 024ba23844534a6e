use serde::Serialize;

/// Structured error kinds per the error-handling design: validation and
/// funding/authorisation/state errors carry no side effects; transient infra
/// errors are retried by the caller; fatal errors freeze the affected pair.
#[derive(Debug, Clone, thiserror::Error, Serialize)]
#[serde(tag = "code", content = "message")]
pub enum CoreError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("unknown pair: {0}")]
    UnknownPair(String),
    #[error("bad decimal: {0}")]
    BadDecimal(String),

    #[error("insufficient funds: available {available}, required {required}")]
    InsufficientFunds { available: String, required: String },

    #[error("not owner")]
    NotOwner,

    #[error("not found: {0}")]
    NotFound(String),
    #[error("already terminal")]
    AlreadyTerminal,
    #[error("fill-or-kill order could not be fully filled")]
    FokUnfillable,
    #[error("no liquidity on the opposite side")]
    NoLiquidity,

    #[error("ledger unavailable")]
    LedgerUnavailable,
    #[error("operation timed out")]
    Timeout,

    #[error("settlement lock no longer valid")]
    LockInvalid,
    #[error("internal index corrupted")]
    IndexCorrupt,
}

impl CoreError {
    /// Stable string code surfaced to clients, independent of the Display message.
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::BadRequest(_) => "BAD_REQUEST",
            CoreError::UnknownPair(_) => "UNKNOWN_PAIR",
            CoreError::BadDecimal(_) => "BAD_DECIMAL",
            CoreError::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            CoreError::NotOwner => "NOT_OWNER",
            CoreError::NotFound(_) => "NOT_FOUND",
            CoreError::AlreadyTerminal => "ALREADY_TERMINAL",
            CoreError::FokUnfillable => "FOK_UNFILLABLE",
            CoreError::NoLiquidity => "NO_LIQUIDITY",
            CoreError::LedgerUnavailable => "LEDGER_UNAVAILABLE",
            CoreError::Timeout => "TIMEOUT",
            CoreError::LockInvalid => "LOCK_INVALID",
            CoreError::IndexCorrupt => "INDEX_CORRUPT",
        }
    }

    /// Transient errors are worth retrying; everything else is not.
    pub fn is_transient(&self) -> bool {
        matches!(self, CoreError::LedgerUnavailable | CoreError::Timeout)
    }

    /// Fatal invariant violations freeze the pair and require an operator.
    pub fn is_fatal(&self) -> bool {
        matches!(self, CoreError::LockInvalid | CoreError::IndexCorrupt)
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
