//! Normalized quote shape shared by every execution path.
//!
//! Provider responses differ per path, so the execution payload is a tagged
//! union rather than one flat struct with optional fields: which variant is
//! present tells the engine exactly how the trade executes.

pub mod resolver;

pub use resolver::{FeePolicy, QuoteResolver, ResolverOptions};

use crate::error::SwapError;
use ethers::types::{transaction::eip712::TypedData, Address, Bytes, U256};
use omniswap_registry::{is_solana, TokenInfo};
use rust_decimal::Decimal;
use std::time::{Duration, Instant};

/// Fixed validity window for quotes that reference live provider pricing.
pub const QUOTE_TTL_SECS: u64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradePath {
    GaslessSameChain,
    OnchainSameChain,
    BridgeCrossChain,
    Wrap,
    Unwrap,
}

impl std::fmt::Display for TradePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TradePath::GaslessSameChain => "gasless-same-chain",
            TradePath::OnchainSameChain => "onchain-swap-same-chain",
            TradePath::BridgeCrossChain => "bridge-cross-chain",
            TradePath::Wrap => "wrap",
            TradePath::Unwrap => "unwrap",
        };
        f.write_str(name)
    }
}

/// Native-ness of one side of a pair, as seen by path selection.
#[derive(Debug, Clone, Copy)]
pub struct PathToken {
    pub native: bool,
    pub wrapped_native: bool,
}

impl PathToken {
    pub fn of(token: &TokenInfo, wrapped_native: bool) -> Self {
        Self {
            native: token.is_native(),
            wrapped_native,
        }
    }
}

/// Pick the execution path for a pair. Pure: fixed inputs always yield the
/// same path.
///
/// Same-chain wrap pairs never touch a provider; gasless handles ERC-20 to
/// ERC-20 only (meta-transactions cannot move the native asset); anything
/// same-chain involving the native asset swaps on-chain; Solana swaps are
/// always on-chain swaps; different chains bridge.
pub fn select_path(origin_chain: u64, dest_chain: u64, sell: PathToken, buy: PathToken) -> TradePath {
    if origin_chain != dest_chain {
        return TradePath::BridgeCrossChain;
    }
    if sell.native && buy.wrapped_native {
        return TradePath::Wrap;
    }
    if sell.wrapped_native && buy.native {
        return TradePath::Unwrap;
    }
    if is_solana(origin_chain) {
        return TradePath::OnchainSameChain;
    }
    if !sell.native && !buy.native {
        return TradePath::GaslessSameChain;
    }
    TradePath::OnchainSameChain
}

/// A transaction payload ready to hand to the wallet.
#[derive(Debug, Clone, Default)]
pub struct PreparedTx {
    pub to: Address,
    pub data: Bytes,
    pub value: U256,
    pub gas: Option<U256>,
    pub gas_price: Option<U256>,
}

/// Path-specific execution material.
#[derive(Debug, Clone)]
pub enum QuotePayload {
    /// Typed-data payloads to sign as messages; no on-chain send by us.
    Gasless {
        approval: Option<TypedData>,
        trade: TypedData,
    },
    /// Raw transaction to sign and broadcast.
    Evm { tx: PreparedTx },
    /// Bridge deposit, optionally preceded by provider-built approvals.
    Bridge {
        approvals: Vec<PreparedTx>,
        tx: PreparedTx,
    },
    /// Serialized Solana transaction, base64.
    Solana { transaction: String },
    /// Direct wrapped-native contract call; built by the engine.
    WrapUnwrap,
}

#[derive(Debug, Clone)]
pub struct FeeLine {
    pub label: String,
    pub amount: U256,
    pub token_symbol: String,
}

#[derive(Debug, Clone)]
pub struct AllowanceRequirement {
    pub spender: Address,
    pub amount: U256,
}

#[derive(Debug, Clone)]
pub enum AmountInput {
    /// Human decimal amount of the sell token.
    Tokens(String),
    /// Target USD value, converted at the latest spot price.
    Usd(Decimal),
}

#[derive(Debug, Clone)]
pub struct QuoteRequest {
    pub origin_chain: u64,
    pub dest_chain: u64,
    pub sell_token: TokenInfo,
    pub buy_token: TokenInfo,
    pub amount: AmountInput,
    /// Address of the account that will take the trade. Hex on EVM chains,
    /// base58 on Solana.
    pub taker: String,
}

/// One priced trade, replaced wholesale on any input change and discarded
/// after execution.
#[derive(Debug, Clone)]
pub struct Quote {
    pub path: TradePath,
    pub sell_token: TokenInfo,
    pub buy_token: TokenInfo,
    pub sell_amount: U256,
    pub buy_amount: U256,
    pub min_buy_amount: U256,
    pub fees: Vec<FeeLine>,
    pub allowance: Option<AllowanceRequirement>,
    pub payload: QuotePayload,
    pub received_at: Instant,
    /// None for wrap/unwrap, which carry no live pricing and never expire.
    pub ttl: Option<Duration>,
    /// The originating request, kept so the engine can re-resolve.
    pub request: QuoteRequest,
}

impl Quote {
    /// Valid for execution only while inside the TTL window. An expired
    /// quote must be refreshed before signing, never reused.
    pub fn is_fresh(&self) -> bool {
        match self.ttl {
            Some(ttl) => self.received_at.elapsed() < ttl,
            None => true,
        }
    }

    pub fn age(&self) -> Duration {
        self.received_at.elapsed()
    }

    /// Checked accessor used at signing time.
    pub fn ensure_fresh(&self) -> Result<(), SwapError> {
        if self.is_fresh() {
            Ok(())
        } else {
            Err(SwapError::QuoteExpired)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use omniswap_registry::{ETHEREUM, POLYGON, SOLANA_CHAIN_ID};

    const ERC20: PathToken = PathToken {
        native: false,
        wrapped_native: false,
    };
    const NATIVE: PathToken = PathToken {
        native: true,
        wrapped_native: false,
    };
    const WRAPPED: PathToken = PathToken {
        native: false,
        wrapped_native: true,
    };

    #[test]
    fn path_selection_order() {
        // Wrap direction wins over everything else on the same chain.
        assert_eq!(
            select_path(ETHEREUM, ETHEREUM, NATIVE, WRAPPED),
            TradePath::Wrap
        );
        assert_eq!(
            select_path(ETHEREUM, ETHEREUM, WRAPPED, NATIVE),
            TradePath::Unwrap
        );
        // ERC-20 to ERC-20 goes gasless; wrapped-native is still an ERC-20.
        assert_eq!(
            select_path(ETHEREUM, ETHEREUM, ERC20, ERC20),
            TradePath::GaslessSameChain
        );
        assert_eq!(
            select_path(ETHEREUM, ETHEREUM, WRAPPED, ERC20),
            TradePath::GaslessSameChain
        );
        // Native on either side swaps on-chain.
        assert_eq!(
            select_path(ETHEREUM, ETHEREUM, NATIVE, ERC20),
            TradePath::OnchainSameChain
        );
        assert_eq!(
            select_path(ETHEREUM, ETHEREUM, ERC20, NATIVE),
            TradePath::OnchainSameChain
        );
        // Cross-chain bridges, native or not.
        assert_eq!(
            select_path(ETHEREUM, POLYGON, ERC20, ERC20),
            TradePath::BridgeCrossChain
        );
        assert_eq!(
            select_path(ETHEREUM, POLYGON, NATIVE, WRAPPED),
            TradePath::BridgeCrossChain
        );
        // Solana same-chain always swaps on-chain.
        assert_eq!(
            select_path(SOLANA_CHAIN_ID, SOLANA_CHAIN_ID, ERC20, ERC20),
            TradePath::OnchainSameChain
        );
    }

    #[test]
    fn path_selection_is_deterministic() {
        for _ in 0..3 {
            assert_eq!(
                select_path(POLYGON, POLYGON, ERC20, NATIVE),
                TradePath::OnchainSameChain
            );
        }
    }

    #[test]
    fn freshness_window() {
        let registry = omniswap_registry::TokenRegistry::with_defaults();
        let usdc = registry.by_symbol(ETHEREUM, "USDC").unwrap().clone();
        let weth = registry.by_symbol(ETHEREUM, "WETH").unwrap().clone();
        let mut quote = Quote {
            path: TradePath::GaslessSameChain,
            sell_token: usdc.clone(),
            buy_token: weth.clone(),
            sell_amount: U256::from(10_000_000u64),
            buy_amount: U256::one(),
            min_buy_amount: U256::one(),
            fees: vec![],
            allowance: None,
            payload: QuotePayload::WrapUnwrap,
            received_at: Instant::now(),
            ttl: Some(Duration::from_secs(QUOTE_TTL_SECS)),
            request: QuoteRequest {
                origin_chain: ETHEREUM,
                dest_chain: ETHEREUM,
                sell_token: usdc,
                buy_token: weth,
                amount: AmountInput::Tokens("10".to_string()),
                taker: "0x0000000000000000000000000000000000000001".to_string(),
            },
        };
        assert!(quote.is_fresh());
        assert!(quote.ensure_fresh().is_ok());

        // Backdate past the TTL: invalid at exactly t0 + ttl and beyond.
        quote.received_at = Instant::now() - Duration::from_secs(QUOTE_TTL_SECS);
        assert!(!quote.is_fresh());
        assert!(matches!(
            quote.ensure_fresh(),
            Err(SwapError::QuoteExpired)
        ));

        // Wrap quotes carry no TTL.
        quote.ttl = None;
        assert!(quote.is_fresh());
    }
}
