//! Jupiter swap client for same-chain Solana swaps, plus the thin JSON-RPC
//! calls used to broadcast and confirm the signed transaction.

use crate::error::SwapError;
use crate::providers::zerox::parse_provider_units;
use crate::providers::{ProviderFee, SolanaApi, SolanaQuote, SolanaQuoteRequest, TradeStatus};
use async_trait::async_trait;
use base64::Engine as _;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub struct JupiterClient {
    http: reqwest::Client,
    base_url: String,
    rpc_url: String,
}

impl JupiterClient {
    pub fn new(base_url: impl Into<String>, rpc_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            rpc_url: rpc_url.into(),
        }
    }

    async fn rpc(&self, method: &str, params: serde_json::Value) -> Result<serde_json::Value, SwapError> {
        let body = json!({"jsonrpc": "2.0", "id": 1, "method": method, "params": params});
        let response = self
            .http
            .post(&self.rpc_url)
            .json(&body)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            return Err(SwapError::Transport(format!("solana rpc {status}")));
        }
        let parsed: serde_json::Value = response.json().await?;
        if let Some(error) = parsed.get("error") {
            return Err(SwapError::Transport(format!("solana rpc error: {error}")));
        }
        Ok(parsed.get("result").cloned().unwrap_or(serde_json::Value::Null))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuoteResponse {
    out_amount: String,
    other_amount_threshold: String,
    #[serde(default)]
    platform_fee: Option<PlatformFee>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlatformFee {
    amount: String,
    #[serde(default)]
    fee_mint: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SwapResponse {
    swap_transaction: String,
}

#[async_trait]
impl SolanaApi for JupiterClient {
    async fn quote(&self, request: &SolanaQuoteRequest) -> Result<SolanaQuote, SwapError> {
        let quote_url = format!("{}/quote", self.base_url);
        let response = self
            .http
            .get(&quote_url)
            .query(&[
                ("inputMint", request.input_mint.as_str()),
                ("outputMint", request.output_mint.as_str()),
                ("amount", &request.amount.to_string()),
                ("slippageBps", &request.slippage_bps.to_string()),
            ])
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            if body.contains("COULD_NOT_FIND_ANY_ROUTE") {
                return Err(SwapError::NoLiquidity);
            }
            return Err(SwapError::Transport(format!("jupiter {status}: {body}")));
        }
        let raw_quote: serde_json::Value = response.json().await?;
        if raw_quote
            .get("errorCode")
            .and_then(|code| code.as_str())
            .is_some()
        {
            return Err(SwapError::NoLiquidity);
        }
        let parsed: QuoteResponse = serde_json::from_value(raw_quote.clone())
            .map_err(|e| SwapError::Transport(format!("bad jupiter quote: {e}")))?;

        // The swap endpoint turns the quote into a transaction to sign.
        let swap_url = format!("{}/swap", self.base_url);
        let swap_body = json!({
            "quoteResponse": raw_quote,
            "userPublicKey": request.taker,
            "wrapAndUnwrapSol": true,
        });
        let response = self
            .http
            .post(&swap_url)
            .json(&swap_body)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SwapError::Transport(format!("jupiter swap {status}: {body}")));
        }
        let swap: SwapResponse = response.json().await?;
        base64::engine::general_purpose::STANDARD
            .decode(&swap.swap_transaction)
            .map_err(|_| SwapError::Transport("jupiter returned invalid transaction".to_string()))?;

        let mut fees = Vec::new();
        if let Some(fee) = parsed.platform_fee {
            fees.push(ProviderFee {
                label: "platform fee".to_string(),
                amount: parse_provider_units(&fee.amount)?,
                token: fee.fee_mint.unwrap_or_else(|| request.output_mint.clone()),
            });
        }
        debug!(
            input = %request.input_mint,
            output = %request.output_mint,
            "jupiter quote received"
        );
        Ok(SolanaQuote {
            out_amount: parse_provider_units(&parsed.out_amount)?,
            min_out_amount: parse_provider_units(&parsed.other_amount_threshold)?,
            transaction: swap.swap_transaction,
            fees,
        })
    }

    async fn submit(&self, signed_transaction: &str) -> Result<String, SwapError> {
        let result = self
            .rpc(
                "sendTransaction",
                json!([signed_transaction, {"encoding": "base64"}]),
            )
            .await?;
        result
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| SwapError::Transport("sendTransaction returned no signature".to_string()))
    }

    async fn status(&self, signature: &str) -> Result<TradeStatus, SwapError> {
        let result = self
            .rpc("getSignatureStatuses", json!([[signature]]))
            .await?;
        let entry = result
            .get("value")
            .and_then(|value| value.get(0))
            .cloned()
            .unwrap_or(serde_json::Value::Null);
        if entry.is_null() {
            return Ok(TradeStatus::Pending);
        }
        if let Some(err) = entry.get("err") {
            if !err.is_null() {
                return Ok(TradeStatus::Failed {
                    reason: err.to_string(),
                });
            }
        }
        match entry
            .get("confirmationStatus")
            .and_then(|status| status.as_str())
        {
            Some("confirmed") | Some("finalized") => Ok(TradeStatus::Confirmed {
                tx_hash: Some(signature.to_string()),
            }),
            _ => Ok(TradeStatus::Pending),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::types::U256;

    fn request() -> SolanaQuoteRequest {
        SolanaQuoteRequest {
            input_mint: omniswap_registry::WSOL_MINT.to_string(),
            output_mint: "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v".to_string(),
            amount: U256::from(1_000_000_000u64),
            taker: "7Np41oeYqPefeNQEHSv1UDhYrehxin3NStELsSKCT4K2".to_string(),
            slippage_bps: 100,
        }
    }

    #[tokio::test]
    async fn quote_then_swap_round() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", mockito::Matcher::Regex("^/quote".to_string()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "outAmount": "171500000",
                    "otherAmountThreshold": "169785000",
                    "routePlan": []
                })
                .to_string(),
            )
            .create_async()
            .await;
        let payload = base64::engine::general_purpose::STANDARD.encode([1u8, 2, 3]);
        server
            .mock("POST", "/swap")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({"swapTransaction": payload}).to_string())
            .create_async()
            .await;

        let client = JupiterClient::new(server.url(), server.url());
        let quote = client.quote(&request()).await.unwrap();
        assert_eq!(quote.out_amount, U256::from(171_500_000u64));
        assert_eq!(quote.min_out_amount, U256::from(169_785_000u64));
        assert!(!quote.transaction.is_empty());
    }

    #[tokio::test]
    async fn route_not_found_is_no_liquidity() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", mockito::Matcher::Regex("^/quote".to_string()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({"errorCode": "COULD_NOT_FIND_ANY_ROUTE"}).to_string())
            .create_async()
            .await;

        let client = JupiterClient::new(server.url(), server.url());
        assert!(matches!(
            client.quote(&request()).await.unwrap_err(),
            SwapError::NoLiquidity
        ));
    }

    #[tokio::test]
    async fn signature_status_mapping() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "jsonrpc": "2.0", "id": 1,
                    "result": {"value": [{"confirmationStatus": "finalized", "err": null}]}
                })
                .to_string(),
            )
            .create_async()
            .await;

        let client = JupiterClient::new(server.url(), format!("{}/", server.url()));
        let status = client.status("5sig").await.unwrap();
        assert_eq!(
            status,
            TradeStatus::Confirmed {
                tx_hash: Some("5sig".to_string())
            }
        );
    }
}
