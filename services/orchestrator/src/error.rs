use thiserror::Error;

/// Failure taxonomy surfaced to callers. Everything a provider, wallet or
/// chain can throw is classified into one of these before it leaves the
/// crate; no raw transport error crosses the boundary.
#[derive(Debug, Clone, Error)]
pub enum SwapError {
    /// Provider found no route. A normal outcome, not a transport failure;
    /// recoverable by changing the amount or the pair.
    #[error("no liquidity available for this pair")]
    NoLiquidity,

    #[error("amount below minimum: entered {entered} {symbol}, minimum is {minimum} {symbol}")]
    BelowMinimumAmount {
        minimum: String,
        entered: String,
        symbol: String,
    },

    /// USD entry mode with no spot price to convert against.
    #[error("no spot price available to convert a USD amount")]
    PriceUnavailable,

    /// Signing or submission was attempted against a quote past its TTL.
    #[error("quote expired, refresh and retry")]
    QuoteExpired,

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// On-chain failure after broadcast. Commonly a stale quote; the
    /// recovery path is a retry with a freshly resolved quote.
    #[error("transaction {hash} reverted on-chain, retry with a fresh quote")]
    TransactionReverted { hash: String },

    #[error("wallet declined the request")]
    WalletRejected,

    #[error("chain {0} is not configured")]
    UnsupportedChain(u64),

    #[error("provider error: {0}")]
    Transport(String),
}

impl From<reqwest::Error> for SwapError {
    fn from(err: reqwest::Error) -> Self {
        SwapError::Transport(err.to_string())
    }
}

/// Errors from the external wallet collaborator.
#[derive(Debug, Clone, Error)]
pub enum WalletError {
    #[error("user rejected the request")]
    Rejected,

    #[error("operation not supported by this wallet")]
    Unsupported,

    #[error("wallet rpc error: {0}")]
    Rpc(String),
}

impl From<WalletError> for SwapError {
    fn from(err: WalletError) -> Self {
        match err {
            WalletError::Rejected => SwapError::WalletRejected,
            other => SwapError::Transport(other.to_string()),
        }
    }
}
