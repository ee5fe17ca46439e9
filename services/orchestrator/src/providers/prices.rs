//! CoinGecko-backed spot prices. Display and USD-entry conversion only;
//! execution never depends on these values, so every failure degrades to
//! `PriceUnavailable` instead of blocking the flow.

use crate::error::SwapError;
use crate::providers::PriceFeed;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, warn};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
const CACHE_TTL: Duration = Duration::from_secs(60);

/// Symbol -> CoinGecko id for the assets the swap flows trade.
fn coingecko_id(symbol: &str) -> Option<&'static str> {
    let id = match symbol {
        "ETH" | "WETH" => "ethereum",
        "POL" | "WPOL" => "polygon-ecosystem-token",
        "SOL" => "solana",
        "USDC" | "USDC.e" => "usd-coin",
        "USDT" => "tether",
        "DAI" => "dai",
        _ => return None,
    };
    Some(id)
}

pub struct CoinGeckoFeed {
    http: reqwest::Client,
    base_url: String,
    cache: RwLock<HashMap<String, (f64, Instant)>>,
}

impl CoinGeckoFeed {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    async fn fetch(&self, id: &str) -> Result<f64, SwapError> {
        let url = format!("{}/simple/price", self.base_url);
        let response = self
            .http
            .get(&url)
            .query(&[("ids", id), ("vs_currencies", "usd")])
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(SwapError::Transport(format!(
                "price api {}",
                response.status()
            )));
        }
        let parsed: HashMap<String, PriceEntry> = response.json().await?;
        parsed
            .get(id)
            .and_then(|entry| entry.usd)
            .ok_or_else(|| SwapError::Transport(format!("no usd price for {id}")))
    }
}

#[derive(Debug, Deserialize)]
struct PriceEntry {
    usd: Option<f64>,
}

#[async_trait]
impl PriceFeed for CoinGeckoFeed {
    async fn spot_usd(&self, symbol: &str) -> Result<f64, SwapError> {
        let Some(id) = coingecko_id(symbol) else {
            return Err(SwapError::PriceUnavailable);
        };

        {
            let cache = self.cache.read().await;
            if let Some((price, fetched_at)) = cache.get(id) {
                if fetched_at.elapsed() < CACHE_TTL {
                    debug!(symbol, price, "using cached spot price");
                    return Ok(*price);
                }
            }
        }

        match self.fetch(id).await {
            Ok(price) => {
                let mut cache = self.cache.write().await;
                cache.insert(id.to_string(), (price, Instant::now()));
                Ok(price)
            }
            Err(err) => {
                warn!(symbol, %err, "spot price fetch failed");
                // Serve a stale cached price over nothing at all.
                let cache = self.cache.read().await;
                if let Some((price, _)) = cache.get(id) {
                    return Ok(*price);
                }
                Err(SwapError::PriceUnavailable)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn fetches_and_caches() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", mockito::Matcher::Regex("^/simple/price".to_string()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({"ethereum": {"usd": 3500.25}}).to_string())
            .expect(1)
            .create_async()
            .await;

        let feed = CoinGeckoFeed::new(server.url());
        assert_eq!(feed.spot_usd("WETH").await.unwrap(), 3500.25);
        // Second read is served from cache; the mock allows one hit only.
        assert_eq!(feed.spot_usd("ETH").await.unwrap(), 3500.25);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn unknown_symbol_is_price_unavailable() {
        let feed = CoinGeckoFeed::new("http://127.0.0.1:1");
        assert!(matches!(
            feed.spot_usd("UNLISTED").await.unwrap_err(),
            SwapError::PriceUnavailable
        ));
    }

    #[tokio::test]
    async fn transport_failure_degrades_to_price_unavailable() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", mockito::Matcher::Regex("^/simple/price".to_string()))
            .with_status(500)
            .create_async()
            .await;

        let feed = CoinGeckoFeed::new(server.url());
        assert!(matches!(
            feed.spot_usd("SOL").await.unwrap_err(),
            SwapError::PriceUnavailable
        ));
    }
}
