use anyhow::{Context, Result};
use ethers::types::Address;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    pub zerox_base_url: String,
    pub zerox_api_key: String,
    pub across_base_url: String,
    pub jupiter_base_url: String,
    pub solana_rpc_url: String,
    pub price_base_url: String,
    /// chain id -> RPC endpoint, parsed from "1=https://...,137=https://...".
    pub rpc_urls: HashMap<u64, String>,
    pub fee_recipient: Option<Address>,
    pub fee_bps: u16,
    pub slippage_bps: u16,
    pub quote_ttl_secs: u64,
    pub refresh_interval_secs: u64,
    pub poll_interval_ms: u64,
    pub max_poll_attempts: u32,
    pub history_path: Option<PathBuf>,
    pub history_cap: usize,
    pub history_remote_url: Option<String>,
    /// symbol -> human minimum, e.g. "WETH=0.01,USDC=5".
    pub min_sell_overrides: HashMap<String, String>,
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_pairs(raw: &str) -> Vec<(String, String)> {
    raw.split(',')
        .filter_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            Some((key.trim().to_string(), value.trim().to_string()))
        })
        .collect()
}

impl OrchestratorConfig {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        let rpc_urls = parse_pairs(&env_or("RPC_URLS", ""))
            .into_iter()
            .map(|(chain, url)| {
                chain
                    .parse::<u64>()
                    .map(|chain| (chain, url))
                    .with_context(|| format!("bad chain id in RPC_URLS: {chain}"))
            })
            .collect::<Result<HashMap<_, _>>>()?;

        Ok(Self {
            zerox_base_url: env_or("ZEROX_BASE_URL", "https://api.0x.org"),
            zerox_api_key: env_or("ZEROX_API_KEY", ""),
            across_base_url: env_or("ACROSS_BASE_URL", "https://app.across.to/api"),
            jupiter_base_url: env_or("JUPITER_BASE_URL", "https://quote-api.jup.ag/v6"),
            solana_rpc_url: env_or("SOLANA_RPC_URL", "https://api.mainnet-beta.solana.com"),
            price_base_url: env_or("PRICE_BASE_URL", "https://api.coingecko.com/api/v3"),
            rpc_urls,
            fee_recipient: match env::var("FEE_RECIPIENT") {
                Ok(raw) => Some(raw.parse().context("Invalid FEE_RECIPIENT")?),
                Err(_) => None,
            },
            fee_bps: env_or("FEE_BPS", "15").parse().context("Invalid FEE_BPS")?,
            slippage_bps: env_or("SLIPPAGE_BPS", "100")
                .parse()
                .context("Invalid SLIPPAGE_BPS")?,
            quote_ttl_secs: env_or("QUOTE_TTL_SECS", "30")
                .parse()
                .context("Invalid QUOTE_TTL_SECS")?,
            refresh_interval_secs: env_or("QUOTE_REFRESH_SECS", "30")
                .parse()
                .context("Invalid QUOTE_REFRESH_SECS")?,
            poll_interval_ms: env_or("POLL_INTERVAL_MS", "2000")
                .parse()
                .context("Invalid POLL_INTERVAL_MS")?,
            max_poll_attempts: env_or("MAX_POLL_ATTEMPTS", "20")
                .parse()
                .context("Invalid MAX_POLL_ATTEMPTS")?,
            history_path: env::var("HISTORY_PATH").ok().map(PathBuf::from),
            history_cap: env_or("HISTORY_CAP", "50")
                .parse()
                .context("Invalid HISTORY_CAP")?,
            history_remote_url: env::var("HISTORY_REMOTE_URL").ok(),
            min_sell_overrides: parse_pairs(&env_or("MIN_SELL_OVERRIDES", ""))
                .into_iter()
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_env() {
        // Serialized env access; other tests in this module share keys.
        env::remove_var("FEE_BPS");
        env::remove_var("RPC_URLS");
        let config = OrchestratorConfig::from_env().unwrap();
        assert_eq!(config.fee_bps, 15);
        assert_eq!(config.quote_ttl_secs, 30);
        assert_eq!(config.max_poll_attempts, 20);
        assert!(config.fee_recipient.is_none());
    }

    #[test]
    fn parses_pair_lists() {
        let pairs = parse_pairs("1=https://eth.example,137=https://poly.example");
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].0, "1");
        assert_eq!(pairs[1].1, "https://poly.example");

        // Malformed entries are skipped, not fatal.
        let pairs = parse_pairs("WETH=0.01,garbage,USDC=5");
        assert_eq!(pairs.len(), 2);

        assert!(parse_pairs("").is_empty());
    }
}
