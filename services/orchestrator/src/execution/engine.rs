//! Async driver over the pure state machine: performs each effect against
//! the wallet, chain and provider seams, feeds the result back in as an
//! event, and stops at the first terminal state.

use crate::chain::{self, ChainReader, ReceiptStatus};
use crate::error::{SwapError, WalletError};
use crate::execution::machine::{step, Effect, ExecutionEvent, ExecutionStatus, PollTarget};
use crate::history::{HistoryEntry, HistoryLog};
use crate::providers::{GaslessApi, SignedTypedData, SolanaApi, TradeStatus};
use crate::quote::{PreparedTx, Quote, QuotePayload, QuoteResolver, TradePath};
use crate::wallet::Wallet;
use crate::amount::format_base_units;
use async_trait::async_trait;
use chrono::Utc;
use ethers::types::{Address, U256};
use metrics::counter;
use omniswap_registry::TokenRegistry;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Secondary confirmation hook for cross-chain execution. A bridge commits
/// funds on the origin chain against a price that can move, so the engine
/// asks once more (distinct from the wallet's own prompt) and re-fetches
/// the quote at the moment of confirmation.
#[async_trait]
pub trait BridgeConfirmation: Send + Sync {
    async fn confirm(&self, quote: &Quote) -> bool;
}

#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub poll_interval: Duration,
    pub max_poll_attempts: u32,
    /// Bound on refresh-then-retry cycles before the attempt gives up.
    pub max_refreshes: u32,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            max_poll_attempts: 20,
            max_refreshes: 3,
        }
    }
}

/// Terminal result of one attempt, with the state labels visited in order.
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub status: ExecutionStatus,
    pub message: String,
    pub trace: Vec<&'static str>,
}

pub struct ExecutionEngine {
    registry: Arc<TokenRegistry>,
    resolver: Arc<QuoteResolver>,
    chains: HashMap<u64, Arc<dyn ChainReader>>,
    gasless: Arc<dyn GaslessApi>,
    solana: Arc<dyn SolanaApi>,
    history: Arc<HistoryLog>,
    options: EngineOptions,
}

impl ExecutionEngine {
    pub fn new(
        registry: Arc<TokenRegistry>,
        resolver: Arc<QuoteResolver>,
        chains: HashMap<u64, Arc<dyn ChainReader>>,
        gasless: Arc<dyn GaslessApi>,
        solana: Arc<dyn SolanaApi>,
        history: Arc<HistoryLog>,
        options: EngineOptions,
    ) -> Self {
        Self {
            registry,
            resolver,
            chains,
            gasless,
            solana,
            history,
            options,
        }
    }

    /// Run one attempt over `quote` to a terminal state. Taking the quote
    /// by value is what makes "at most one attempt per quote" structural:
    /// a consumed quote cannot be executed again.
    pub async fn execute(
        &self,
        quote: Quote,
        wallet: &dyn Wallet,
        confirm: Option<&dyn BridgeConfirmation>,
    ) -> ExecutionOutcome {
        counter!("swap.attempts").increment(1);
        let mut quote = quote;

        if quote.path == TradePath::BridgeCrossChain {
            let Some(confirm) = confirm else {
                return finish(
                    ExecutionStatus::Rejected,
                    "cross-chain execution requires an explicit confirmation step".to_string(),
                    vec!["idle", "rejected"],
                );
            };
            if !confirm.confirm(&quote).await {
                return finish(
                    ExecutionStatus::Rejected,
                    "bridge not confirmed".to_string(),
                    vec!["idle", "rejected"],
                );
            }
            // Sign against a quote fetched at confirmation time, never the
            // one that was on display while the user decided.
            match self.resolver.refresh(&quote).await {
                Ok(fresh) => quote = fresh,
                Err(err) => {
                    return finish(
                        ExecutionStatus::Failed {
                            reason: err.to_string(),
                        },
                        err.to_string(),
                        vec!["idle", "failed"],
                    )
                }
            }
        }

        let mut attempt = Attempt {
            engine: self,
            wallet,
            quote,
            refreshes: 0,
            signed_trade: None,
            signed_approval: None,
            signed_solana: None,
            pending_approvals: Vec::new(),
        };

        let mut trace: Vec<&'static str> = vec![ExecutionStatus::Idle.label()];
        let mut state = ExecutionStatus::Idle;
        let mut event = ExecutionEvent::Started {
            needs_allowance_check: needs_allowance_check(&attempt.quote),
        };

        loop {
            let (next, effect) = step(state, event, self.options.max_poll_attempts);
            state = next;
            if trace.last() != Some(&state.label()) {
                trace.push(state.label());
                info!(state = state.label(), "execution state");
            }
            match attempt.perform(effect, &state).await {
                Some(next_event) => event = next_event,
                None => break,
            }
        }

        match &state {
            ExecutionStatus::Confirmed { .. } => counter!("swap.confirmed").increment(1),
            ExecutionStatus::Reverted { .. } => counter!("swap.reverted").increment(1),
            ExecutionStatus::Rejected => counter!("swap.rejected").increment(1),
            ExecutionStatus::Failed { .. } => counter!("swap.failed").increment(1),
            _ => {}
        }
        let message = outcome_message(&state);
        finish(state, message, trace)
    }

    fn chain_for(&self, chain_id: u64) -> Result<&Arc<dyn ChainReader>, SwapError> {
        self.chains
            .get(&chain_id)
            .ok_or(SwapError::UnsupportedChain(chain_id))
    }

    /// Gas parameterization for transactions we broadcast: prefer our own
    /// simulated estimate plus the current gas price, fall back to the
    /// provider's hints already on the payload, and otherwise leave both
    /// unset so the wallet estimates.
    async fn with_gas_params(&self, chain_id: u64, from: Address, mut tx: PreparedTx) -> PreparedTx {
        if let Some(chain) = self.chains.get(&chain_id) {
            match (chain.estimate_gas(from, &tx).await, chain.gas_price().await) {
                (Ok(estimate), Ok(price)) => {
                    // Headroom over the simulated value.
                    tx.gas = Some(estimate * U256::from(12u64) / U256::from(10u64));
                    tx.gas_price = Some(price);
                    return tx;
                }
                (estimate, _) => {
                    debug!(
                        ok = estimate.is_ok(),
                        "independent gas estimation unavailable, using provider hints"
                    );
                }
            }
        }
        tx
    }
}

fn finish(status: ExecutionStatus, message: String, trace: Vec<&'static str>) -> ExecutionOutcome {
    info!(state = status.label(), %message, "execution finished");
    ExecutionOutcome {
        status,
        message,
        trace,
    }
}

fn outcome_message(status: &ExecutionStatus) -> String {
    match status {
        ExecutionStatus::Confirmed { tx_hash: Some(hash) } => format!("confirmed: {hash}"),
        ExecutionStatus::Confirmed { tx_hash: None } => {
            "submitted; not confirmed within the polling window, the trade may still land".to_string()
        }
        ExecutionStatus::Reverted { tx_hash } => SwapError::TransactionReverted {
            hash: tx_hash.clone(),
        }
        .to_string(),
        ExecutionStatus::Rejected => SwapError::WalletRejected.to_string(),
        ExecutionStatus::Expired => SwapError::QuoteExpired.to_string(),
        ExecutionStatus::Failed { reason } => reason.clone(),
        other => format!("stopped while {}", other.label()),
    }
}

/// Only an on-chain approve needs a pre-check; a signable gasless approval
/// is collected as a message during signing instead.
fn needs_allowance_check(quote: &Quote) -> bool {
    match &quote.payload {
        QuotePayload::Gasless {
            approval: Some(_), ..
        } => false,
        _ => quote.allowance.is_some(),
    }
}

/// Mutable scratch state for one attempt.
struct Attempt<'a> {
    engine: &'a ExecutionEngine,
    wallet: &'a dyn Wallet,
    quote: Quote,
    refreshes: u32,
    signed_trade: Option<SignedTypedData>,
    signed_approval: Option<SignedTypedData>,
    signed_solana: Option<String>,
    pending_approvals: Vec<PreparedTx>,
}

impl<'a> Attempt<'a> {
    /// Perform one effect; returns the next event, or None when the
    /// machine has nothing left to do.
    async fn perform(
        &mut self,
        effect: Effect,
        state: &ExecutionStatus,
    ) -> Option<ExecutionEvent> {
        match effect {
            Effect::None => None,
            Effect::CheckAllowance => Some(self.check_allowance().await),
            Effect::SubmitApproval { spender } => Some(self.submit_approval(spender).await),
            Effect::AwaitApprovalReceipt { tx_hash } => {
                Some(self.await_approvals(tx_hash).await)
            }
            Effect::RefreshQuote => Some(self.refresh_quote().await),
            Effect::RequestWallet => Some(self.request_wallet().await),
            Effect::SubmitTrade => Some(self.submit_trade().await),
            Effect::Poll { .. } => Some(self.poll(state).await),
            Effect::RecordHistory => {
                self.record_history(state);
                None
            }
        }
    }

    async fn check_allowance(&mut self) -> ExecutionEvent {
        let Some(requirement) = self.quote.allowance.clone() else {
            return ExecutionEvent::AllowanceChecked {
                sufficient: true,
                spender: Address::zero(),
            };
        };
        let Some(token) = self.quote.sell_token.address.evm() else {
            return ExecutionEvent::AllowanceChecked {
                sufficient: true,
                spender: requirement.spender,
            };
        };
        let chain = match self.engine.chain_for(self.quote.request.origin_chain) {
            Ok(chain) => chain,
            Err(err) => {
                return ExecutionEvent::ProviderFailed {
                    reason: err.to_string(),
                }
            }
        };
        match chain
            .allowance(token, self.wallet.address(), requirement.spender)
            .await
        {
            Ok(current) => {
                debug!(%current, required = %requirement.amount, "allowance read");
                ExecutionEvent::AllowanceChecked {
                    sufficient: current >= requirement.amount,
                    spender: requirement.spender,
                }
            }
            Err(err) => ExecutionEvent::ProviderFailed {
                reason: err.to_string(),
            },
        }
    }

    async fn submit_approval(&mut self, spender: Address) -> ExecutionEvent {
        // Bridge quotes ship ready-made approval transactions; everything
        // else gets a MAX approve built locally so the token is never
        // approved again on later trades.
        let mut txs = match &self.quote.payload {
            QuotePayload::Bridge { approvals, .. } if !approvals.is_empty() => approvals.clone(),
            _ => {
                let Some(token) = self.quote.sell_token.address.evm() else {
                    return ExecutionEvent::ProviderFailed {
                        reason: "approval required for a non-EVM token".to_string(),
                    };
                };
                vec![chain::approval_tx(token, spender)]
            }
        };
        let first = txs.remove(0);
        self.pending_approvals = txs;
        info!(%spender, "sending approval transaction");
        match self.wallet.send_transaction(&first).await {
            Ok(tx_hash) => ExecutionEvent::ApprovalSent { tx_hash },
            Err(WalletError::Rejected) => ExecutionEvent::WalletDeclined,
            Err(err) => ExecutionEvent::ProviderFailed {
                reason: err.to_string(),
            },
        }
    }

    /// Wait out the receipt for the in-flight approval, then any further
    /// provider-supplied approvals, sequentially.
    async fn await_approvals(&mut self, first: ethers::types::H256) -> ExecutionEvent {
        let mut tx_hash = first;
        loop {
            match self.wait_receipt(tx_hash).await {
                Ok(ReceiptStatus::Succeeded) => {}
                Ok(ReceiptStatus::Reverted) => {
                    return ExecutionEvent::ApprovalReverted { tx_hash }
                }
                Ok(ReceiptStatus::Pending) => {
                    return ExecutionEvent::ProviderFailed {
                        reason: "approval confirmation timed out".to_string(),
                    }
                }
                Err(err) => {
                    return ExecutionEvent::ProviderFailed {
                        reason: err.to_string(),
                    }
                }
            }
            let Some(next) = self.pending_approvals.first().cloned() else {
                return ExecutionEvent::ApprovalConfirmed;
            };
            self.pending_approvals.remove(0);
            match self.wallet.send_transaction(&next).await {
                Ok(hash) => tx_hash = hash,
                Err(WalletError::Rejected) => return ExecutionEvent::WalletDeclined,
                Err(err) => {
                    return ExecutionEvent::ProviderFailed {
                        reason: err.to_string(),
                    }
                }
            }
        }
    }

    /// Bounded receipt wait; `Pending` on return means the bound elapsed.
    async fn wait_receipt(
        &self,
        tx_hash: ethers::types::H256,
    ) -> Result<ReceiptStatus, SwapError> {
        let chain = self.engine.chain_for(self.quote.request.origin_chain)?;
        for _ in 0..self.engine.options.max_poll_attempts {
            tokio::time::sleep(self.engine.options.poll_interval).await;
            match chain.receipt_status(tx_hash).await {
                Ok(ReceiptStatus::Pending) => continue,
                Ok(terminal) => return Ok(terminal),
                Err(err) => {
                    warn!(%err, "receipt lookup failed, retrying");
                    continue;
                }
            }
        }
        Ok(ReceiptStatus::Pending)
    }

    async fn refresh_quote(&mut self) -> ExecutionEvent {
        self.refreshes += 1;
        if self.refreshes > self.engine.options.max_refreshes {
            return ExecutionEvent::ProviderFailed {
                reason: "quote kept expiring before it could be signed".to_string(),
            };
        }
        match self.engine.resolver.refresh(&self.quote).await {
            Ok(fresh) => {
                self.quote = fresh;
                self.signed_trade = None;
                self.signed_approval = None;
                self.signed_solana = None;
                ExecutionEvent::Started {
                    needs_allowance_check: needs_allowance_check(&self.quote),
                }
            }
            Err(err) => ExecutionEvent::ProviderFailed {
                reason: err.to_string(),
            },
        }
    }

    async fn request_wallet(&mut self) -> ExecutionEvent {
        if !self.quote.is_fresh() {
            return ExecutionEvent::QuoteLapsed;
        }
        match self.quote.payload.clone() {
            QuotePayload::Gasless { approval, trade } => {
                if let Some(approval) = approval {
                    match self.wallet.sign_typed_data(&approval).await {
                        Ok(signature) => {
                            self.signed_approval = Some(SignedTypedData {
                                payload: approval,
                                signature,
                            })
                        }
                        Err(WalletError::Rejected) => return ExecutionEvent::WalletDeclined,
                        Err(err) => {
                            return ExecutionEvent::ProviderFailed {
                                reason: err.to_string(),
                            }
                        }
                    }
                }
                match self.wallet.sign_typed_data(&trade).await {
                    Ok(signature) => {
                        self.signed_trade = Some(SignedTypedData {
                            payload: trade,
                            signature,
                        });
                        ExecutionEvent::SignaturesReady
                    }
                    Err(WalletError::Rejected) => ExecutionEvent::WalletDeclined,
                    Err(err) => ExecutionEvent::ProviderFailed {
                        reason: err.to_string(),
                    },
                }
            }
            QuotePayload::Solana { transaction } => {
                match self.wallet.sign_serialized(&transaction).await {
                    Ok(signed) => {
                        self.signed_solana = Some(signed);
                        ExecutionEvent::SignaturesReady
                    }
                    Err(WalletError::Rejected) => ExecutionEvent::WalletDeclined,
                    Err(err) => ExecutionEvent::ProviderFailed {
                        reason: err.to_string(),
                    },
                }
            }
            QuotePayload::Evm { tx } => self.send_onchain(tx).await,
            QuotePayload::Bridge { tx, .. } => self.send_onchain(tx).await,
            QuotePayload::WrapUnwrap => {
                let tx = match self.build_wrap_tx() {
                    Ok(tx) => tx,
                    Err(err) => {
                        return ExecutionEvent::ProviderFailed {
                            reason: err.to_string(),
                        }
                    }
                };
                self.send_onchain(tx).await
            }
        }
    }

    fn build_wrap_tx(&self) -> Result<PreparedTx, SwapError> {
        let chain_id = self.quote.request.origin_chain;
        let wrapped = self
            .engine
            .registry
            .wrapped_native(chain_id)
            .and_then(|token| token.address.evm())
            .ok_or(SwapError::UnsupportedChain(chain_id))?;
        Ok(match self.quote.path {
            TradePath::Wrap => chain::wrap_tx(wrapped, self.quote.sell_amount),
            _ => chain::unwrap_tx(wrapped, self.quote.sell_amount),
        })
    }

    async fn send_onchain(&mut self, tx: PreparedTx) -> ExecutionEvent {
        let tx = self
            .engine
            .with_gas_params(self.quote.request.origin_chain, self.wallet.address(), tx)
            .await;
        match self.wallet.send_transaction(&tx).await {
            Ok(tx_hash) => ExecutionEvent::TransactionSent { tx_hash },
            Err(WalletError::Rejected) => ExecutionEvent::WalletDeclined,
            Err(err) => ExecutionEvent::ProviderFailed {
                reason: err.to_string(),
            },
        }
    }

    async fn submit_trade(&mut self) -> ExecutionEvent {
        match &self.quote.payload {
            QuotePayload::Gasless { .. } => {
                let Some(trade) = self.signed_trade.clone() else {
                    return ExecutionEvent::ProviderFailed {
                        reason: "trade signature missing at submit".to_string(),
                    };
                };
                match self
                    .engine
                    .gasless
                    .submit(
                        self.quote.request.origin_chain,
                        &trade,
                        self.signed_approval.as_ref(),
                    )
                    .await
                {
                    Ok(trade_hash) => ExecutionEvent::TradeAccepted { trade_hash },
                    Err(err) => ExecutionEvent::ProviderFailed {
                        reason: err.to_string(),
                    },
                }
            }
            QuotePayload::Solana { .. } => {
                let Some(signed) = self.signed_solana.clone() else {
                    return ExecutionEvent::ProviderFailed {
                        reason: "signed transaction missing at submit".to_string(),
                    };
                };
                match self.engine.solana.submit(&signed).await {
                    Ok(signature) => ExecutionEvent::SignatureBroadcast { signature },
                    Err(err) => ExecutionEvent::ProviderFailed {
                        reason: err.to_string(),
                    },
                }
            }
            _ => ExecutionEvent::ProviderFailed {
                reason: "nothing to submit for this path".to_string(),
            },
        }
    }

    /// One poll round. Transport errors count as a pending round rather
    /// than failing the attempt: the loop stays bounded either way.
    async fn poll(&mut self, state: &ExecutionStatus) -> ExecutionEvent {
        let ExecutionStatus::Polling { target, attempt } = state else {
            return ExecutionEvent::ProviderFailed {
                reason: "poll requested outside polling state".to_string(),
            };
        };
        tokio::time::sleep(self.engine.options.poll_interval).await;
        debug!(attempt, "polling trade status");
        match target {
            PollTarget::GaslessTrade(handle) => {
                match self
                    .engine
                    .gasless
                    .status(self.quote.request.origin_chain, handle)
                    .await
                {
                    Ok(TradeStatus::Pending) => ExecutionEvent::PollPending,
                    Ok(TradeStatus::Confirmed { tx_hash }) => {
                        ExecutionEvent::PollConfirmed { tx_hash }
                    }
                    Ok(TradeStatus::Failed { reason }) => ExecutionEvent::PollFailed { reason },
                    Err(err) => {
                        warn!(%err, "status poll failed");
                        ExecutionEvent::PollPending
                    }
                }
            }
            PollTarget::EvmReceipt(tx_hash) => {
                let chain = match self.engine.chain_for(self.quote.request.origin_chain) {
                    Ok(chain) => chain,
                    Err(err) => {
                        return ExecutionEvent::ProviderFailed {
                            reason: err.to_string(),
                        }
                    }
                };
                match chain.receipt_status(*tx_hash).await {
                    Ok(ReceiptStatus::Pending) => ExecutionEvent::PollPending,
                    Ok(ReceiptStatus::Succeeded) => ExecutionEvent::PollConfirmed {
                        tx_hash: Some(format!("{tx_hash:#x}")),
                    },
                    Ok(ReceiptStatus::Reverted) => ExecutionEvent::ReceiptReverted {
                        tx_hash: *tx_hash,
                    },
                    Err(err) => {
                        warn!(%err, "receipt poll failed");
                        ExecutionEvent::PollPending
                    }
                }
            }
            PollTarget::SolanaSignature(signature) => {
                match self.engine.solana.status(signature).await {
                    Ok(TradeStatus::Pending) => ExecutionEvent::PollPending,
                    Ok(TradeStatus::Confirmed { tx_hash }) => {
                        ExecutionEvent::PollConfirmed { tx_hash }
                    }
                    Ok(TradeStatus::Failed { reason }) => ExecutionEvent::PollFailed { reason },
                    Err(err) => {
                        warn!(%err, "signature status poll failed");
                        ExecutionEvent::PollPending
                    }
                }
            }
        }
    }

    /// Fire-and-forget: history never blocks or fails the attempt.
    fn record_history(&self, state: &ExecutionStatus) {
        let tx_hash = match state {
            ExecutionStatus::Confirmed { tx_hash } => tx_hash.clone(),
            _ => None,
        };
        let entry = HistoryEntry {
            chain_id: self.quote.request.origin_chain,
            tx_hash,
            sell_symbol: self.quote.sell_token.symbol.clone(),
            sell_amount: format_base_units(self.quote.sell_amount, self.quote.sell_token.decimals),
            buy_symbol: self.quote.buy_token.symbol.clone(),
            buy_amount: format_base_units(self.quote.buy_amount, self.quote.buy_token.decimals),
            timestamp: Utc::now(),
        };
        self.engine.history.record_detached(entry);
    }
}
