//! 0x API v2 client: gasless (meta-transaction) quotes with submit/status,
//! and allowance-holder quotes for plain on-chain swaps.

use crate::error::SwapError;
use crate::providers::{
    FeeDirective, GaslessApi, GaslessQuote, GaslessQuoteRequest, OnchainQuote, ProviderFee,
    SignedTypedData, SwapApi, SwapQuoteRequest, TradeStatus,
};
use crate::quote::PreparedTx;
use async_trait::async_trait;
use ethers::types::{transaction::eip712::TypedData, Address, Bytes, Signature, U256};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};

const API_VERSION_HEADER: &str = "0x-version";
const API_KEY_HEADER: &str = "0x-api-key";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub struct ZeroExClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl ZeroExClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    fn quote_query(
        chain_id: u64,
        sell_token: Address,
        buy_token: Address,
        sell_amount: U256,
        taker: Address,
        slippage_bps: u16,
        fee: Option<&FeeDirective>,
    ) -> Vec<(String, String)> {
        let mut query = vec![
            ("chainId".to_string(), chain_id.to_string()),
            ("sellToken".to_string(), format!("{sell_token:#x}")),
            ("buyToken".to_string(), format!("{buy_token:#x}")),
            ("sellAmount".to_string(), sell_amount.to_string()),
            ("taker".to_string(), format!("{taker:#x}")),
            ("slippageBps".to_string(), slippage_bps.to_string()),
        ];
        if let Some(fee) = fee {
            query.push(("swapFeeRecipient".to_string(), format!("{:#x}", fee.recipient)));
            query.push(("swapFeeBps".to_string(), fee.bps.to_string()));
            query.push(("swapFeeToken".to_string(), format!("{:#x}", fee.token)));
        }
        query
    }

    async fn get<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(String, String)],
    ) -> Result<T, SwapError> {
        let url = format!("{}{path}", self.base_url);
        let response = self
            .http
            .get(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .header(API_VERSION_HEADER, "v2")
            .query(query)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SwapError::Transport(format!("0x {status}: {body}")));
        }
        Ok(response.json::<T>().await?)
    }
}

pub(crate) fn parse_provider_units(value: &str) -> Result<U256, SwapError> {
    U256::from_dec_str(value)
        .map_err(|_| SwapError::Transport(format!("unparseable amount from provider: {value}")))
}

fn parse_address(value: &str) -> Result<Address, SwapError> {
    value
        .parse()
        .map_err(|_| SwapError::Transport(format!("unparseable address from provider: {value}")))
}

fn signature_json(signature: &Signature) -> serde_json::Value {
    json!({
        "signatureType": 2,
        "v": signature.v,
        "r": format!("0x{:064x}", signature.r),
        "s": format!("0x{:064x}", signature.s),
    })
}

#[derive(Debug, Deserialize)]
struct TypedDataEnvelope {
    eip712: TypedData,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FeesResponse {
    integrator_fee: Option<FeeObject>,
    zero_ex_fee: Option<FeeObject>,
    gas_fee: Option<FeeObject>,
}

#[derive(Debug, Deserialize)]
struct FeeObject {
    amount: String,
    token: String,
}

impl FeesResponse {
    fn collect(self) -> Result<Vec<ProviderFee>, SwapError> {
        let mut fees = Vec::new();
        for (label, fee) in [
            ("integrator fee", self.integrator_fee),
            ("0x fee", self.zero_ex_fee),
            ("gas fee", self.gas_fee),
        ] {
            if let Some(fee) = fee {
                fees.push(ProviderFee {
                    label: label.to_string(),
                    amount: parse_provider_units(&fee.amount)?,
                    token: fee.token,
                });
            }
        }
        Ok(fees)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IssuesResponse {
    allowance: Option<AllowanceIssue>,
}

#[derive(Debug, Deserialize)]
struct AllowanceIssue {
    spender: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GaslessQuoteResponse {
    liquidity_available: bool,
    sell_amount: Option<String>,
    buy_amount: Option<String>,
    min_buy_amount: Option<String>,
    #[serde(default)]
    fees: Option<FeesResponse>,
    #[serde(default)]
    issues: Option<IssuesResponse>,
    approval: Option<TypedDataEnvelope>,
    trade: Option<TypedDataEnvelope>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SwapQuoteResponse {
    liquidity_available: bool,
    sell_amount: Option<String>,
    buy_amount: Option<String>,
    min_buy_amount: Option<String>,
    #[serde(default)]
    fees: Option<FeesResponse>,
    #[serde(default)]
    issues: Option<IssuesResponse>,
    transaction: Option<TransactionResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransactionResponse {
    to: String,
    data: String,
    #[serde(default)]
    value: Option<String>,
    #[serde(default)]
    gas: Option<String>,
    #[serde(default)]
    gas_price: Option<String>,
}

impl TransactionResponse {
    fn into_prepared(self) -> Result<PreparedTx, SwapError> {
        let data = self
            .data
            .parse::<Bytes>()
            .map_err(|_| SwapError::Transport("unparseable calldata from provider".to_string()))?;
        Ok(PreparedTx {
            to: parse_address(&self.to)?,
            data,
            value: match self.value.as_deref() {
                Some(value) => parse_provider_units(value)?,
                None => U256::zero(),
            },
            gas: self.gas.as_deref().map(parse_provider_units).transpose()?,
            gas_price: self
                .gas_price
                .as_deref()
                .map(parse_provider_units)
                .transpose()?,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitResponse {
    trade_hash: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusResponse {
    status: String,
    #[serde(default)]
    transactions: Vec<StatusTransaction>,
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StatusTransaction {
    hash: String,
}

fn required_units(value: Option<&str>, field: &str) -> Result<U256, SwapError> {
    match value {
        Some(value) => parse_provider_units(value),
        None => Err(SwapError::Transport(format!(
            "provider quote missing {field}"
        ))),
    }
}

#[async_trait]
impl GaslessApi for ZeroExClient {
    async fn quote(&self, request: &GaslessQuoteRequest) -> Result<GaslessQuote, SwapError> {
        let query = Self::quote_query(
            request.chain_id,
            request.sell_token,
            request.buy_token,
            request.sell_amount,
            request.taker,
            request.slippage_bps,
            request.fee.as_ref(),
        );
        let response: GaslessQuoteResponse = self.get("/gasless/quote", &query).await?;
        if !response.liquidity_available {
            return Err(SwapError::NoLiquidity);
        }
        let trade = response
            .trade
            .ok_or_else(|| SwapError::Transport("gasless quote missing trade payload".to_string()))?
            .eip712;
        let allowance_spender = match response.issues.unwrap_or_default().allowance {
            Some(issue) => Some(parse_address(&issue.spender)?),
            None => None,
        };
        debug!(
            chain_id = request.chain_id,
            needs_allowance = allowance_spender.is_some(),
            "gasless quote received"
        );
        Ok(GaslessQuote {
            sell_amount: required_units(response.sell_amount.as_deref(), "sellAmount")?,
            buy_amount: required_units(response.buy_amount.as_deref(), "buyAmount")?,
            min_buy_amount: required_units(response.min_buy_amount.as_deref(), "minBuyAmount")?,
            fees: response.fees.unwrap_or_default().collect()?,
            allowance_spender,
            approval: response.approval.map(|envelope| envelope.eip712),
            trade,
        })
    }

    async fn submit(
        &self,
        chain_id: u64,
        trade: &SignedTypedData,
        approval: Option<&SignedTypedData>,
    ) -> Result<String, SwapError> {
        let mut body = json!({
            "chainId": chain_id,
            "trade": {
                "type": "settler_metatransaction",
                "eip712": serde_json::to_value(&trade.payload)
                    .map_err(|e| SwapError::Transport(e.to_string()))?,
                "signature": signature_json(&trade.signature),
            },
        });
        if let Some(approval) = approval {
            body["approval"] = json!({
                "type": "permit",
                "eip712": serde_json::to_value(&approval.payload)
                    .map_err(|e| SwapError::Transport(e.to_string()))?,
                "signature": signature_json(&approval.signature),
            });
        }
        let url = format!("{}/gasless/submit", self.base_url);
        let response = self
            .http
            .post(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .header(API_VERSION_HEADER, "v2")
            .json(&body)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SwapError::Transport(format!("0x submit {status}: {body}")));
        }
        let submitted: SubmitResponse = response.json().await?;
        Ok(submitted.trade_hash)
    }

    async fn status(&self, chain_id: u64, trade_hash: &str) -> Result<TradeStatus, SwapError> {
        let query = vec![("chainId".to_string(), chain_id.to_string())];
        let response: StatusResponse = self
            .get(&format!("/gasless/status/{trade_hash}"), &query)
            .await?;
        let status = match response.status.as_str() {
            "confirmed" | "succeeded" => TradeStatus::Confirmed {
                tx_hash: response.transactions.into_iter().next().map(|tx| tx.hash),
            },
            "failed" => TradeStatus::Failed {
                reason: response
                    .reason
                    .unwrap_or_else(|| "provider reported failure".to_string()),
            },
            other => {
                debug!(status = other, trade_hash, "gasless trade still pending");
                TradeStatus::Pending
            }
        };
        Ok(status)
    }
}

#[async_trait]
impl SwapApi for ZeroExClient {
    async fn quote(&self, request: &SwapQuoteRequest) -> Result<OnchainQuote, SwapError> {
        let query = Self::quote_query(
            request.chain_id,
            request.sell_token,
            request.buy_token,
            request.sell_amount,
            request.taker,
            request.slippage_bps,
            request.fee.as_ref(),
        );
        let response: SwapQuoteResponse = self.get("/swap/allowance-holder/quote", &query).await?;
        if !response.liquidity_available {
            return Err(SwapError::NoLiquidity);
        }
        let transaction = response.transaction.ok_or_else(|| {
            warn!("swap quote reported liquidity but carried no transaction");
            SwapError::Transport("swap quote missing transaction".to_string())
        })?;
        let allowance_spender = match response.issues.unwrap_or_default().allowance {
            Some(issue) => Some(parse_address(&issue.spender)?),
            None => None,
        };
        Ok(OnchainQuote {
            sell_amount: required_units(response.sell_amount.as_deref(), "sellAmount")?,
            buy_amount: required_units(response.buy_amount.as_deref(), "buyAmount")?,
            min_buy_amount: required_units(response.min_buy_amount.as_deref(), "minBuyAmount")?,
            fees: response.fees.unwrap_or_default().collect()?,
            allowance_spender,
            tx: transaction.into_prepared()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TAKER: &str = "0x1111111111111111111111111111111111111111";
    const USDC: &str = "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48";
    const WETH: &str = "0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2";

    fn gasless_request() -> GaslessQuoteRequest {
        GaslessQuoteRequest {
            chain_id: 1,
            sell_token: USDC.parse().unwrap(),
            buy_token: WETH.parse().unwrap(),
            sell_amount: U256::from(10_000_000u64),
            taker: TAKER.parse().unwrap(),
            slippage_bps: 100,
            fee: None,
        }
    }

    fn eip712_json(primary: &str) -> serde_json::Value {
        json!({
            "types": {
                "EIP712Domain": [
                    {"name": "name", "type": "string"},
                    {"name": "chainId", "type": "uint256"}
                ],
                (primary): [{"name": "taker", "type": "address"}]
            },
            "domain": {"name": "ZeroEx", "chainId": "0x1"},
            "primaryType": primary,
            "message": {"taker": TAKER}
        })
    }

    #[tokio::test]
    async fn parses_gasless_quote_with_allowance_issue() {
        let mut server = mockito::Server::new_async().await;
        let body = json!({
            "liquidityAvailable": true,
            "sellAmount": "10000000",
            "buyAmount": "2860000000000000",
            "minBuyAmount": "2831400000000000",
            "fees": {
                "integratorFee": {"amount": "5000", "token": USDC},
                "zeroExFee": null,
                "gasFee": null
            },
            "issues": {"allowance": {"actual": "0", "spender": "0x0000000000001fF3684f28c67538d4D072C22734"}},
            "approval": {"type": "permit", "eip712": eip712_json("Permit")},
            "trade": {"type": "settler_metatransaction", "eip712": eip712_json("Trade")}
        });
        let mock = server
            .mock("GET", mockito::Matcher::Regex("^/gasless/quote".to_string()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body.to_string())
            .create_async()
            .await;

        let client = ZeroExClient::new(server.url(), "test-key");
        let quote = GaslessApi::quote(&client, &gasless_request()).await.unwrap();
        mock.assert_async().await;

        assert_eq!(quote.sell_amount, U256::from(10_000_000u64));
        assert_eq!(quote.min_buy_amount, U256::from(2_831_400_000_000_000u64));
        assert!(quote.approval.is_some());
        assert_eq!(
            quote.allowance_spender,
            Some("0x0000000000001fF3684f28c67538d4D072C22734".parse().unwrap())
        );
        assert_eq!(quote.fees.len(), 1);
        assert_eq!(quote.fees[0].label, "integrator fee");
    }

    #[tokio::test]
    async fn no_liquidity_is_typed_not_transport() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", mockito::Matcher::Regex("^/gasless/quote".to_string()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({"liquidityAvailable": false}).to_string())
            .create_async()
            .await;

        let client = ZeroExClient::new(server.url(), "test-key");
        let err = GaslessApi::quote(&client, &gasless_request()).await.unwrap_err();
        assert!(matches!(err, SwapError::NoLiquidity));
    }

    #[tokio::test]
    async fn status_mapping() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", mockito::Matcher::Regex("^/gasless/status/0xabc".to_string()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({"status": "confirmed", "transactions": [{"hash": "0xdeadbeef", "timestamp": 1}]})
                    .to_string(),
            )
            .create_async()
            .await;

        let client = ZeroExClient::new(server.url(), "test-key");
        let status = client.status(1, "0xabc").await.unwrap();
        assert_eq!(
            status,
            TradeStatus::Confirmed {
                tx_hash: Some("0xdeadbeef".to_string())
            }
        );
    }

    #[tokio::test]
    async fn pending_status_and_failure_reason() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", mockito::Matcher::Regex("^/gasless/status/0x1".to_string()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({"status": "submitted"}).to_string())
            .create_async()
            .await;
        server
            .mock("GET", mockito::Matcher::Regex("^/gasless/status/0x2".to_string()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({"status": "failed", "reason": "expired"}).to_string())
            .create_async()
            .await;

        let client = ZeroExClient::new(server.url(), "test-key");
        assert_eq!(client.status(1, "0x1").await.unwrap(), TradeStatus::Pending);
        assert_eq!(
            client.status(1, "0x2").await.unwrap(),
            TradeStatus::Failed {
                reason: "expired".to_string()
            }
        );
    }

    #[tokio::test]
    async fn onchain_quote_builds_prepared_tx() {
        let mut server = mockito::Server::new_async().await;
        let body = json!({
            "liquidityAvailable": true,
            "sellAmount": "1000000000000000000",
            "buyAmount": "3400000000",
            "minBuyAmount": "3366000000",
            "transaction": {
                "to": "0x0000000000001fF3684f28c67538d4D072C22734",
                "data": "0xdeadbeef",
                "value": "1000000000000000000",
                "gas": "185000",
                "gasPrice": "30000000000"
            }
        });
        server
            .mock(
                "GET",
                mockito::Matcher::Regex("^/swap/allowance-holder/quote".to_string()),
            )
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body.to_string())
            .create_async()
            .await;

        let client = ZeroExClient::new(server.url(), "test-key");
        let request = SwapQuoteRequest {
            chain_id: 1,
            sell_token: omniswap_registry::native_sentinel(),
            buy_token: USDC.parse().unwrap(),
            sell_amount: U256::exp10(18),
            taker: TAKER.parse().unwrap(),
            slippage_bps: 100,
            fee: None,
        };
        let quote = SwapApi::quote(&client, &request).await.unwrap();
        assert_eq!(quote.tx.value, U256::exp10(18));
        assert_eq!(quote.tx.gas, Some(U256::from(185_000u64)));
        assert_eq!(quote.tx.gas_price, Some(U256::from(30_000_000_000u64)));
        assert_eq!(quote.tx.data.to_vec(), vec![0xde, 0xad, 0xbe, 0xef]);
    }
}
