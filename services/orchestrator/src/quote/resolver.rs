//! Resolves a user request into one normalized `Quote` by picking the
//! execution path and querying the matching provider.

use crate::amount::{to_base_units, usd_to_base_units, MinimumSellPolicy};
use crate::error::SwapError;
use crate::providers::{
    BridgeApi, BridgeQuoteRequest, FeeDirective, GaslessApi, GaslessQuoteRequest, PriceFeed,
    ProviderFee, SolanaApi, SolanaQuoteRequest, SwapApi, SwapQuoteRequest,
};
use crate::quote::{
    select_path, AllowanceRequirement, AmountInput, FeeLine, PathToken, Quote, QuotePayload,
    QuoteRequest, TradePath, QUOTE_TTL_SECS,
};
use ethers::types::{Address, U256};
use omniswap_registry::{is_solana, TokenAddress, TokenInfo, TokenRegistry};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

/// Protocol fee attachment: passed through to providers so the fee is
/// deducted inside the trade itself.
#[derive(Debug, Clone, Copy)]
pub struct FeePolicy {
    pub recipient: Address,
    pub bps: u16,
}

pub struct ResolverOptions {
    pub fee: Option<FeePolicy>,
    pub minimums: MinimumSellPolicy,
    pub slippage_bps: u16,
    pub ttl: Duration,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            fee: None,
            minimums: MinimumSellPolicy::default(),
            slippage_bps: 100,
            ttl: Duration::from_secs(QUOTE_TTL_SECS),
        }
    }
}

pub struct QuoteResolver {
    registry: Arc<TokenRegistry>,
    gasless: Arc<dyn GaslessApi>,
    swap: Arc<dyn SwapApi>,
    bridge: Arc<dyn BridgeApi>,
    solana: Arc<dyn SolanaApi>,
    prices: Arc<dyn PriceFeed>,
    options: ResolverOptions,
}

/// Fee-collection token preference: a stablecoin from the pair when there
/// is one, then the buy token, then the sell token (when the buy side is
/// the native asset, which fee deduction cannot target).
pub(crate) fn fee_collection_token<'a>(
    sell: &'a TokenInfo,
    buy: &'a TokenInfo,
) -> &'a TokenInfo {
    if sell.stablecoin {
        sell
    } else if buy.stablecoin {
        buy
    } else if !buy.is_native() {
        buy
    } else {
        sell
    }
}

impl QuoteResolver {
    pub fn new(
        registry: Arc<TokenRegistry>,
        gasless: Arc<dyn GaslessApi>,
        swap: Arc<dyn SwapApi>,
        bridge: Arc<dyn BridgeApi>,
        solana: Arc<dyn SolanaApi>,
        prices: Arc<dyn PriceFeed>,
        options: ResolverOptions,
    ) -> Self {
        Self {
            registry,
            gasless,
            swap,
            bridge,
            solana,
            prices,
            options,
        }
    }

    /// Resolve a request into a priced quote, or a typed failure.
    pub async fn resolve(&self, request: QuoteRequest) -> Result<Quote, SwapError> {
        let sell_amount = self.sell_amount_units(&request).await?;
        self.options.minimums.ensure(&request.sell_token, sell_amount)?;

        let sell = PathToken::of(
            &request.sell_token,
            self.registry
                .is_wrapped_native(request.origin_chain, &request.sell_token.address),
        );
        let buy = PathToken::of(
            &request.buy_token,
            self.registry
                .is_wrapped_native(request.dest_chain, &request.buy_token.address),
        );
        let path = select_path(request.origin_chain, request.dest_chain, sell, buy);
        debug!(
            %path,
            sell = %request.sell_token.symbol,
            buy = %request.buy_token.symbol,
            origin = request.origin_chain,
            dest = request.dest_chain,
            "resolving quote"
        );

        match path {
            TradePath::Wrap | TradePath::Unwrap => Ok(self.wrap_quote(request, sell_amount, path)),
            TradePath::OnchainSameChain if is_solana(request.origin_chain) => {
                self.solana_quote(request, sell_amount).await
            }
            TradePath::GaslessSameChain => self.gasless_quote(request, sell_amount).await,
            TradePath::OnchainSameChain => self.onchain_quote(request, sell_amount).await,
            TradePath::BridgeCrossChain => self.bridge_quote(request, sell_amount).await,
        }
    }

    /// Re-resolve the request a quote was built from. Used whenever a
    /// stale quote must be replaced before signing.
    pub async fn refresh(&self, quote: &Quote) -> Result<Quote, SwapError> {
        info!(age_secs = quote.age().as_secs(), "refreshing quote");
        self.resolve(quote.request.clone()).await
    }

    async fn sell_amount_units(&self, request: &QuoteRequest) -> Result<U256, SwapError> {
        match &request.amount {
            AmountInput::Tokens(human) => to_base_units(human, request.sell_token.decimals),
            AmountInput::Usd(usd) => {
                let spot = self
                    .prices
                    .spot_usd(&request.sell_token.symbol)
                    .await
                    .map_err(|err| {
                        warn!(%err, symbol = %request.sell_token.symbol, "usd entry without price");
                        SwapError::PriceUnavailable
                    })?;
                usd_to_base_units(*usd, spot, request.sell_token.decimals)
            }
        }
    }

    fn fee_directive(&self, sell: &TokenInfo, buy: &TokenInfo) -> Option<FeeDirective> {
        let policy = self.options.fee?;
        let token = fee_collection_token(sell, buy).address.evm()?;
        Some(FeeDirective {
            recipient: policy.recipient,
            bps: policy.bps,
            token,
        })
    }

    fn fee_lines(&self, chain_id: u64, fees: Vec<ProviderFee>) -> Vec<FeeLine> {
        fees.into_iter()
            .map(|fee| {
                let address = fee
                    .token
                    .parse::<Address>()
                    .map(TokenAddress::Evm)
                    .unwrap_or_else(|_| TokenAddress::Spl(fee.token.clone()));
                let symbol = self
                    .registry
                    .token(chain_id, &address)
                    .map(|token| token.symbol.clone())
                    .unwrap_or_else(|| fee.token.clone());
                FeeLine {
                    label: fee.label,
                    amount: fee.amount,
                    token_symbol: symbol,
                }
            })
            .collect()
    }

    /// Wrap and unwrap are 1:1 and never touch a provider; the engine
    /// builds the single contract call at execution time.
    fn wrap_quote(&self, request: QuoteRequest, sell_amount: U256, path: TradePath) -> Quote {
        Quote {
            path,
            sell_token: request.sell_token.clone(),
            buy_token: request.buy_token.clone(),
            sell_amount,
            buy_amount: sell_amount,
            min_buy_amount: sell_amount,
            fees: Vec::new(),
            allowance: None,
            payload: QuotePayload::WrapUnwrap,
            received_at: Instant::now(),
            ttl: None,
            request,
        }
    }

    async fn gasless_quote(
        &self,
        request: QuoteRequest,
        sell_amount: U256,
    ) -> Result<Quote, SwapError> {
        let provider_request = GaslessQuoteRequest {
            chain_id: request.origin_chain,
            sell_token: evm_address(&request.sell_token)?,
            buy_token: evm_address(&request.buy_token)?,
            sell_amount,
            taker: parse_taker(&request.taker)?,
            slippage_bps: self.options.slippage_bps,
            fee: self.fee_directive(&request.sell_token, &request.buy_token),
        };
        let provider_quote = self.gasless.quote(&provider_request).await?;
        let allowance = provider_quote
            .allowance_spender
            .map(|spender| AllowanceRequirement {
                spender,
                amount: sell_amount,
            });
        Ok(Quote {
            path: TradePath::GaslessSameChain,
            sell_token: request.sell_token.clone(),
            buy_token: request.buy_token.clone(),
            sell_amount: provider_quote.sell_amount,
            buy_amount: provider_quote.buy_amount,
            min_buy_amount: provider_quote.min_buy_amount,
            fees: self.fee_lines(request.origin_chain, provider_quote.fees),
            allowance,
            payload: QuotePayload::Gasless {
                approval: provider_quote.approval,
                trade: provider_quote.trade,
            },
            received_at: Instant::now(),
            ttl: Some(self.options.ttl),
            request,
        })
    }

    async fn onchain_quote(
        &self,
        request: QuoteRequest,
        sell_amount: U256,
    ) -> Result<Quote, SwapError> {
        let provider_request = SwapQuoteRequest {
            chain_id: request.origin_chain,
            sell_token: evm_address(&request.sell_token)?,
            buy_token: evm_address(&request.buy_token)?,
            sell_amount,
            taker: parse_taker(&request.taker)?,
            slippage_bps: self.options.slippage_bps,
            fee: self.fee_directive(&request.sell_token, &request.buy_token),
        };
        let provider_quote = self.swap.quote(&provider_request).await?;
        let allowance = if request.sell_token.is_native() {
            None
        } else {
            provider_quote
                .allowance_spender
                .map(|spender| AllowanceRequirement {
                    spender,
                    amount: sell_amount,
                })
        };
        Ok(Quote {
            path: TradePath::OnchainSameChain,
            sell_token: request.sell_token.clone(),
            buy_token: request.buy_token.clone(),
            sell_amount: provider_quote.sell_amount,
            buy_amount: provider_quote.buy_amount,
            min_buy_amount: provider_quote.min_buy_amount,
            fees: self.fee_lines(request.origin_chain, provider_quote.fees),
            allowance,
            payload: QuotePayload::Evm {
                tx: provider_quote.tx,
            },
            received_at: Instant::now(),
            ttl: Some(self.options.ttl),
            request,
        })
    }

    async fn bridge_quote(
        &self,
        request: QuoteRequest,
        sell_amount: U256,
    ) -> Result<Quote, SwapError> {
        // The bridge API only understands ERC-20s: substitute the wrapped
        // representation for a native side while the user-facing tokens on
        // the Quote keep their native semantics.
        let input_token = self.bridge_leg_address(request.origin_chain, &request.sell_token)?;
        let output_token = self.bridge_leg_address(request.dest_chain, &request.buy_token)?;
        let taker = parse_taker(&request.taker)?;
        let provider_request = BridgeQuoteRequest {
            origin_chain: request.origin_chain,
            dest_chain: request.dest_chain,
            input_token,
            output_token,
            amount: sell_amount,
            depositor: taker,
            recipient: taker,
            slippage_bps: self.options.slippage_bps,
            fee: self.fee_directive(&request.sell_token, &request.buy_token),
        };
        let provider_quote = self.bridge.quote(&provider_request).await?;
        if provider_quote.output_decimals != request.buy_token.decimals {
            warn!(
                provider = provider_quote.output_decimals,
                registry = request.buy_token.decimals,
                token = %request.buy_token.symbol,
                "bridge output decimals disagree with registry"
            );
        }

        let allowance = provider_quote
            .approvals
            .first()
            .filter(|_| !request.sell_token.is_native())
            .map(|approval| AllowanceRequirement {
                spender: approval_spender(approval).unwrap_or(approval.to),
                amount: sell_amount,
            });

        // Honor the provider's own expiry when it is tighter than ours.
        let ttl = match provider_quote.expiry_unix {
            Some(expiry) => {
                let now = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .unwrap_or_default()
                    .as_secs();
                Some(Duration::from_secs(
                    expiry.saturating_sub(now).min(self.options.ttl.as_secs()),
                ))
            }
            None => Some(self.options.ttl),
        };

        Ok(Quote {
            path: TradePath::BridgeCrossChain,
            sell_token: request.sell_token.clone(),
            buy_token: request.buy_token.clone(),
            sell_amount,
            buy_amount: provider_quote.expected_output,
            min_buy_amount: provider_quote.min_output,
            fees: self.fee_lines(request.origin_chain, provider_quote.fees),
            allowance,
            payload: QuotePayload::Bridge {
                approvals: provider_quote.approvals,
                tx: provider_quote.tx,
            },
            received_at: Instant::now(),
            ttl,
            request,
        })
    }

    async fn solana_quote(
        &self,
        request: QuoteRequest,
        sell_amount: U256,
    ) -> Result<Quote, SwapError> {
        let provider_request = SolanaQuoteRequest {
            input_mint: mint_of(&request.sell_token)?,
            output_mint: mint_of(&request.buy_token)?,
            amount: sell_amount,
            taker: request.taker.clone(),
            slippage_bps: self.options.slippage_bps,
        };
        let provider_quote = self.solana.quote(&provider_request).await?;
        Ok(Quote {
            path: TradePath::OnchainSameChain,
            sell_token: request.sell_token.clone(),
            buy_token: request.buy_token.clone(),
            sell_amount,
            buy_amount: provider_quote.out_amount,
            min_buy_amount: provider_quote.min_out_amount,
            fees: self.fee_lines(request.origin_chain, provider_quote.fees),
            allowance: None,
            payload: QuotePayload::Solana {
                transaction: provider_quote.transaction,
            },
            received_at: Instant::now(),
            ttl: Some(self.options.ttl),
            request,
        })
    }

    fn bridge_leg_address(&self, chain_id: u64, token: &TokenInfo) -> Result<Address, SwapError> {
        if token.is_native() {
            let wrapped = self
                .registry
                .wrapped_native(chain_id)
                .ok_or(SwapError::UnsupportedChain(chain_id))?;
            evm_address(wrapped)
        } else {
            evm_address(token)
        }
    }
}

fn evm_address(token: &TokenInfo) -> Result<Address, SwapError> {
    token.address.evm().ok_or_else(|| {
        SwapError::Transport(format!("{} is not an EVM token", token.symbol))
    })
}

fn parse_taker(taker: &str) -> Result<Address, SwapError> {
    taker
        .parse()
        .map_err(|_| SwapError::Transport(format!("bad taker address: {taker}")))
}

fn mint_of(token: &TokenInfo) -> Result<String, SwapError> {
    match &token.address {
        TokenAddress::Spl(mint) => Ok(mint.clone()),
        TokenAddress::Evm(_) => Err(SwapError::Transport(format!(
            "{} is not a Solana token",
            token.symbol
        ))),
    }
}

/// Spender of a standard ERC-20 `approve(spender, amount)` call.
fn approval_spender(tx: &crate::quote::PreparedTx) -> Option<Address> {
    let data = tx.data.as_ref();
    if data.len() >= 36 && data[0..4] == [0x09, 0x5e, 0xa7, 0xb3] {
        return Some(Address::from_slice(&data[16..36]));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use omniswap_registry::ETHEREUM;

    #[test]
    fn fee_token_preference() {
        let registry = TokenRegistry::with_defaults();
        let usdc = registry.by_symbol(ETHEREUM, "USDC").unwrap();
        let weth = registry.by_symbol(ETHEREUM, "WETH").unwrap();
        let dai = registry.by_symbol(ETHEREUM, "DAI").unwrap();
        let eth = registry.native_token(ETHEREUM).unwrap();

        // Stablecoin on the sell side wins.
        assert_eq!(fee_collection_token(usdc, weth).symbol, "USDC");
        // Stablecoin on the buy side next.
        assert_eq!(fee_collection_token(weth, dai).symbol, "DAI");
        // No stablecoin: the buy token.
        assert_eq!(fee_collection_token(&eth, weth).symbol, "WETH");
        // Buy side native: fall back to the sell token.
        assert_eq!(fee_collection_token(weth, &eth).symbol, "WETH");
    }

    #[test]
    fn extracts_approval_spender() {
        let spender: Address = "0x5c7BCd6E7De5423a257D81B442095A1a6ced35C5".parse().unwrap();
        let mut data = vec![0x09, 0x5e, 0xa7, 0xb3];
        data.extend_from_slice(&[0u8; 12]);
        data.extend_from_slice(spender.as_bytes());
        data.extend_from_slice(&[0xffu8; 32]);
        let tx = crate::quote::PreparedTx {
            to: Address::repeat_byte(0xaa),
            data: data.into(),
            value: U256::zero(),
            gas: None,
            gas_price: None,
        };
        assert_eq!(approval_spender(&tx), Some(spender));

        let junk = crate::quote::PreparedTx {
            to: Address::repeat_byte(0xaa),
            data: vec![0xde, 0xad].into(),
            value: U256::zero(),
            gas: None,
            gas_price: None,
        };
        assert_eq!(approval_spender(&junk), None);
    }
}
