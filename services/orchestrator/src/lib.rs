//! Multi-path swap orchestration: resolve a quote for a (chain, token-in,
//! token-out, chain-out) tuple across gasless, on-chain, bridge and
//! wrap/unwrap paths, then drive approval, signing, submission and
//! confirmation polling to a terminal outcome.
//!
//! The crate is a thin orchestration layer over external aggregators; it
//! never custodies funds, executes trades itself, or caches signatures.

pub mod amount;
pub mod chain;
pub mod config;
pub mod error;
pub mod execution;
pub mod history;
pub mod providers;
pub mod quote;
pub mod refresh;
pub mod wallet;


pub use config::OrchestratorConfig;
pub use error::{SwapError, WalletError};
pub use execution::{
    BridgeConfirmation, EngineOptions, ExecutionEngine, ExecutionOutcome, ExecutionStatus,
};
pub use quote::{
    AmountInput, FeePolicy, Quote, QuoteRequest, QuoteResolver, ResolverOptions, TradePath,
};
pub use refresh::{spawn_auto_refresh, QuoteSlot};
pub use wallet::{LocalSigner, Wallet};
