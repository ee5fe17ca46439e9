use anyhow::{anyhow, Context, Result};
use clap::Parser;
use omniswap_orchestrator::chain::{ChainReader, EthersChain};
use omniswap_orchestrator::execution::{BridgeConfirmation, EngineOptions, ExecutionEngine};
use omniswap_orchestrator::history::{FileHistory, HistoryLog, HistorySink, RemoteHistory};
use omniswap_orchestrator::providers::{AcrossClient, CoinGeckoFeed, JupiterClient, ZeroExClient};
use omniswap_orchestrator::quote::{
    AmountInput, FeePolicy, Quote, QuoteRequest, QuoteResolver, ResolverOptions,
};
use omniswap_orchestrator::amount::MinimumSellPolicy;
use omniswap_orchestrator::wallet::LocalSigner;
use omniswap_orchestrator::OrchestratorConfig;
use omniswap_registry::TokenRegistry;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "swap-cli", about = "Quote and execute swaps across chains")]
struct Args {
    /// Origin chain id
    #[arg(long)]
    chain: u64,

    /// Destination chain id; defaults to the origin chain
    #[arg(long)]
    dest_chain: Option<u64>,

    /// Sell token symbol, or "native"
    #[arg(long)]
    sell: String,

    /// Buy token symbol, or "native"
    #[arg(long)]
    buy: String,

    /// Amount to sell, human decimal (or USD value with --usd)
    #[arg(long)]
    amount: String,

    /// Treat --amount as a USD target instead of a token amount
    #[arg(long)]
    usd: bool,

    /// Execute the quote with the key in PRIVATE_KEY; quote-only otherwise
    #[arg(long)]
    execute: bool,

    /// Skip the interactive cross-chain confirmation prompt
    #[arg(long)]
    yes: bool,
}

struct PromptConfirm {
    auto: bool,
}

#[async_trait::async_trait]
impl BridgeConfirmation for PromptConfirm {
    async fn confirm(&self, quote: &Quote) -> bool {
        if self.auto {
            return true;
        }
        println!(
            "Bridge {} {} on chain {} for ~{} {} on chain {}. Proceed? [y/N]",
            omniswap_orchestrator::amount::format_base_units(
                quote.sell_amount,
                quote.sell_token.decimals
            ),
            quote.sell_token.symbol,
            quote.request.origin_chain,
            omniswap_orchestrator::amount::format_base_units(
                quote.buy_amount,
                quote.buy_token.decimals
            ),
            quote.buy_token.symbol,
            quote.request.dest_chain,
        );
        let mut line = String::new();
        if std::io::stdin().read_line(&mut line).is_err() {
            return false;
        }
        matches!(line.trim(), "y" | "Y" | "yes")
    }
}

fn lookup_token(
    registry: &TokenRegistry,
    chain_id: u64,
    symbol: &str,
) -> Result<omniswap_registry::TokenInfo> {
    if symbol.eq_ignore_ascii_case("native") {
        return registry
            .native_token(chain_id)
            .ok_or_else(|| anyhow!("unknown chain {chain_id}"));
    }
    if let Some(token) = registry.by_symbol(chain_id, symbol) {
        return Ok(token.clone());
    }
    // The chain's native symbol also resolves to the native asset.
    let native = registry
        .native_token(chain_id)
        .ok_or_else(|| anyhow!("unknown chain {chain_id}"))?;
    if native.symbol.eq_ignore_ascii_case(symbol) {
        return Ok(native);
    }
    Err(anyhow!("unknown token {symbol} on chain {chain_id}"))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let config = OrchestratorConfig::from_env()?;
    let dest_chain = args.dest_chain.unwrap_or(args.chain);

    let registry = Arc::new(TokenRegistry::with_defaults());
    let sell_token = lookup_token(&registry, args.chain, &args.sell)?;
    let buy_token = lookup_token(&registry, dest_chain, &args.buy)?;

    let zerox = Arc::new(ZeroExClient::new(
        config.zerox_base_url.clone(),
        config.zerox_api_key.clone(),
    ));
    let across = Arc::new(AcrossClient::new(config.across_base_url.clone()));
    let jupiter = Arc::new(JupiterClient::new(
        config.jupiter_base_url.clone(),
        config.solana_rpc_url.clone(),
    ));
    let prices = Arc::new(CoinGeckoFeed::new(config.price_base_url.clone()));

    let resolver = Arc::new(QuoteResolver::new(
        registry.clone(),
        zerox.clone(),
        zerox.clone(),
        across,
        jupiter.clone(),
        prices,
        ResolverOptions {
            fee: config
                .fee_recipient
                .map(|recipient| FeePolicy {
                    recipient,
                    bps: config.fee_bps,
                }),
            minimums: MinimumSellPolicy::new(config.min_sell_overrides.clone()),
            slippage_bps: config.slippage_bps,
            ttl: Duration::from_secs(config.quote_ttl_secs),
        },
    ));

    let taker = std::env::var("TAKER_ADDRESS")
        .context("TAKER_ADDRESS environment variable not set")?;

    let amount = if args.usd {
        AmountInput::Usd(args.amount.parse::<Decimal>().context("Invalid USD amount")?)
    } else {
        AmountInput::Tokens(args.amount.clone())
    };
    let request = QuoteRequest {
        origin_chain: args.chain,
        dest_chain,
        sell_token: sell_token.clone(),
        buy_token: buy_token.clone(),
        amount,
        taker: taker.clone(),
    };

    info!(
        sell = %sell_token.symbol,
        buy = %buy_token.symbol,
        chain = args.chain,
        dest_chain,
        "requesting quote"
    );
    let quote = resolver.resolve(request).await?;

    info!(path = %quote.path, "quote received");
    info!(
        "sell {} {} -> buy {} {} (min {})",
        omniswap_orchestrator::amount::format_base_units(quote.sell_amount, sell_token.decimals),
        sell_token.symbol,
        omniswap_orchestrator::amount::format_base_units(quote.buy_amount, buy_token.decimals),
        buy_token.symbol,
        omniswap_orchestrator::amount::format_base_units(quote.min_buy_amount, buy_token.decimals),
    );
    for fee in &quote.fees {
        info!("fee: {} {} ({})", fee.amount, fee.token_symbol, fee.label);
    }

    if !args.execute {
        return Ok(());
    }

    let mut chains: HashMap<u64, Arc<dyn ChainReader>> = HashMap::new();
    for (chain_id, rpc_url) in &config.rpc_urls {
        chains.insert(*chain_id, Arc::new(EthersChain::new(rpc_url)?));
    }

    // Balance shown best-effort; an unreadable balance never blocks.
    if let Some(chain) = chains.get(&args.chain) {
        let owner = taker.parse().context("Invalid TAKER_ADDRESS")?;
        match chain.balance(sell_token.address.evm(), owner).await {
            Ok(balance) => info!(
                "sell token balance: {}",
                omniswap_orchestrator::amount::format_base_units(balance, sell_token.decimals)
            ),
            Err(err) => warn!(%err, "balance unknown"),
        }
    }

    let private_key = std::env::var("PRIVATE_KEY")
        .context("PRIVATE_KEY environment variable not set")?;
    let rpc_url = config
        .rpc_urls
        .get(&args.chain)
        .ok_or_else(|| anyhow!("no RPC_URLS entry for chain {}", args.chain))?;
    let signer = LocalSigner::new(rpc_url, &private_key, args.chain)
        .map_err(|e| anyhow!("signer init failed: {e}"))?;

    let mut sinks: Vec<Arc<dyn HistorySink>> = Vec::new();
    if let Some(path) = &config.history_path {
        sinks.push(Arc::new(FileHistory::open(path.clone(), config.history_cap)));
    }
    if let Some(url) = &config.history_remote_url {
        sinks.push(Arc::new(RemoteHistory::new(url.clone())));
    }
    let history = Arc::new(HistoryLog::new(sinks));

    let engine = ExecutionEngine::new(
        registry,
        resolver,
        chains,
        zerox,
        jupiter,
        history,
        EngineOptions {
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            max_poll_attempts: config.max_poll_attempts,
            ..EngineOptions::default()
        },
    );

    let confirm = PromptConfirm { auto: args.yes };
    let outcome = engine.execute(quote, &signer, Some(&confirm)).await;
    info!(
        state = outcome.status.label(),
        trace = ?outcome.trace,
        "{}",
        outcome.message
    );
    Ok(())
}
