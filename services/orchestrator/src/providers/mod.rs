//! Trait seams over the external quote providers, plus the normalized
//! request/response shapes the resolver consumes. Concrete HTTP clients
//! live in the sibling modules; the engine and the tests only ever see
//! these traits.

pub mod across;
pub mod jupiter;
pub mod prices;
pub mod zerox;

pub use across::AcrossClient;
pub use jupiter::JupiterClient;
pub use prices::CoinGeckoFeed;
pub use zerox::ZeroExClient;

use crate::error::SwapError;
use crate::quote::PreparedTx;
use async_trait::async_trait;
use ethers::types::{transaction::eip712::TypedData, Address, Signature, U256};

/// One fee a provider will deduct from the trade, informational only.
#[derive(Debug, Clone)]
pub struct ProviderFee {
    pub label: String,
    pub amount: U256,
    /// Token address as reported by the provider.
    pub token: String,
}

/// Fee directive passed through to providers so the fee is deducted inside
/// the trade; the orchestrator never transfers a fee itself.
#[derive(Debug, Clone, Copy)]
pub struct FeeDirective {
    pub recipient: Address,
    pub bps: u16,
    pub token: Address,
}

#[derive(Debug, Clone)]
pub struct GaslessQuoteRequest {
    pub chain_id: u64,
    pub sell_token: Address,
    pub buy_token: Address,
    pub sell_amount: U256,
    pub taker: Address,
    pub slippage_bps: u16,
    pub fee: Option<FeeDirective>,
}

#[derive(Debug, Clone)]
pub struct GaslessQuote {
    pub sell_amount: U256,
    pub buy_amount: U256,
    pub min_buy_amount: U256,
    pub fees: Vec<ProviderFee>,
    /// Spender from the provider's allowance issue, when allowance is short.
    pub allowance_spender: Option<Address>,
    /// Typed-data approval to sign in place of an on-chain approve, when
    /// the sell token supports it.
    pub approval: Option<TypedData>,
    pub trade: TypedData,
}

#[derive(Debug, Clone)]
pub struct SwapQuoteRequest {
    pub chain_id: u64,
    pub sell_token: Address,
    pub buy_token: Address,
    pub sell_amount: U256,
    pub taker: Address,
    pub slippage_bps: u16,
    pub fee: Option<FeeDirective>,
}

#[derive(Debug, Clone)]
pub struct OnchainQuote {
    pub sell_amount: U256,
    pub buy_amount: U256,
    pub min_buy_amount: U256,
    pub fees: Vec<ProviderFee>,
    pub allowance_spender: Option<Address>,
    pub tx: PreparedTx,
}

#[derive(Debug, Clone)]
pub struct BridgeQuoteRequest {
    pub origin_chain: u64,
    pub dest_chain: u64,
    pub input_token: Address,
    pub output_token: Address,
    pub amount: U256,
    pub depositor: Address,
    pub recipient: Address,
    pub slippage_bps: u16,
    pub fee: Option<FeeDirective>,
}

#[derive(Debug, Clone)]
pub struct BridgeQuote {
    pub expected_output: U256,
    pub min_output: U256,
    pub output_decimals: u8,
    pub fees: Vec<ProviderFee>,
    /// Ready-made approval transactions to send before the deposit.
    pub approvals: Vec<PreparedTx>,
    pub tx: PreparedTx,
    pub expiry_unix: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct SolanaQuoteRequest {
    pub input_mint: String,
    pub output_mint: String,
    pub amount: U256,
    pub taker: String,
    pub slippage_bps: u16,
}

#[derive(Debug, Clone)]
pub struct SolanaQuote {
    pub out_amount: U256,
    pub min_out_amount: U256,
    /// Serialized transaction to sign, base64.
    pub transaction: String,
    pub fees: Vec<ProviderFee>,
}

/// A typed-data payload together with the wallet's signature over it.
#[derive(Debug, Clone)]
pub struct SignedTypedData {
    pub payload: TypedData,
    pub signature: Signature,
}

/// Terminal and non-terminal poll outcomes, shared by the gasless status
/// endpoint, EVM receipt polling and Solana signature statuses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TradeStatus {
    Pending,
    Confirmed { tx_hash: Option<String> },
    Failed { reason: String },
}

#[async_trait]
pub trait GaslessApi: Send + Sync {
    async fn quote(&self, request: &GaslessQuoteRequest) -> Result<GaslessQuote, SwapError>;
    /// Send the signed payloads; returns the provider's trade handle.
    async fn submit(
        &self,
        chain_id: u64,
        trade: &SignedTypedData,
        approval: Option<&SignedTypedData>,
    ) -> Result<String, SwapError>;
    async fn status(&self, chain_id: u64, trade_hash: &str) -> Result<TradeStatus, SwapError>;
}

#[async_trait]
pub trait SwapApi: Send + Sync {
    async fn quote(&self, request: &SwapQuoteRequest) -> Result<OnchainQuote, SwapError>;
}

#[async_trait]
pub trait BridgeApi: Send + Sync {
    async fn quote(&self, request: &BridgeQuoteRequest) -> Result<BridgeQuote, SwapError>;
}

#[async_trait]
pub trait SolanaApi: Send + Sync {
    async fn quote(&self, request: &SolanaQuoteRequest) -> Result<SolanaQuote, SwapError>;
    /// Broadcast a signed serialized transaction; returns the signature.
    async fn submit(&self, signed_transaction: &str) -> Result<String, SwapError>;
    async fn status(&self, signature: &str) -> Result<TradeStatus, SwapError>;
}

/// USD valuation for display and USD-entry conversion only; never involved
/// in execution correctness.
#[async_trait]
pub trait PriceFeed: Send + Sync {
    async fn spot_usd(&self, symbol: &str) -> Result<f64, SwapError>;
}
