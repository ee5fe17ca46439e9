//! Across swap API client for cross-chain bridge-swaps. The API operates on
//! ERC-20 representations only; native-asset substitution happens in the
//! resolver before the request is built.

use crate::error::SwapError;
use crate::providers::zerox::parse_provider_units;
use crate::providers::{BridgeApi, BridgeQuote, BridgeQuoteRequest, ProviderFee};
use crate::quote::PreparedTx;
use async_trait::async_trait;
use ethers::types::{Bytes, U256};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

pub struct AcrossClient {
    http: reqwest::Client,
    base_url: String,
}

impl AcrossClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SwapApprovalResponse {
    #[serde(default)]
    approval_txns: Option<Vec<RawTx>>,
    swap_tx: Option<RawTx>,
    expected_output_amount: Option<String>,
    #[serde(default)]
    min_output_amount: Option<String>,
    output_token: OutputToken,
    #[serde(default)]
    fees: Option<FeesBlock>,
    #[serde(default)]
    quote_expiry_timestamp: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct OutputToken {
    decimals: u8,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FeesBlock {
    #[serde(default)]
    total: Option<FeeAmount>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FeeAmount {
    amount: String,
    token: TokenRef,
}

#[derive(Debug, Deserialize)]
struct TokenRef {
    address: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTx {
    to: String,
    data: String,
    #[serde(default)]
    value: Option<String>,
    #[serde(default)]
    gas: Option<String>,
    #[serde(default)]
    max_fee_per_gas: Option<String>,
}

impl RawTx {
    fn into_prepared(self) -> Result<PreparedTx, SwapError> {
        Ok(PreparedTx {
            to: self
                .to
                .parse()
                .map_err(|_| SwapError::Transport(format!("bad address from bridge: {}", self.to)))?,
            data: self
                .data
                .parse::<Bytes>()
                .map_err(|_| SwapError::Transport("unparseable bridge calldata".to_string()))?,
            value: match self.value.as_deref() {
                Some(value) => parse_provider_units(value)?,
                None => U256::zero(),
            },
            gas: self.gas.as_deref().map(parse_provider_units).transpose()?,
            gas_price: self
                .max_fee_per_gas
                .as_deref()
                .map(parse_provider_units)
                .transpose()?,
        })
    }
}

#[async_trait]
impl BridgeApi for AcrossClient {
    async fn quote(&self, request: &BridgeQuoteRequest) -> Result<BridgeQuote, SwapError> {
        let mut query = vec![
            ("tradeType".to_string(), "exactInput".to_string()),
            ("amount".to_string(), request.amount.to_string()),
            ("inputToken".to_string(), format!("{:#x}", request.input_token)),
            ("outputToken".to_string(), format!("{:#x}", request.output_token)),
            ("originChainId".to_string(), request.origin_chain.to_string()),
            (
                "destinationChainId".to_string(),
                request.dest_chain.to_string(),
            ),
            ("depositor".to_string(), format!("{:#x}", request.depositor)),
            ("recipient".to_string(), format!("{:#x}", request.recipient)),
            (
                "slippageTolerance".to_string(),
                format!("{}", f64::from(request.slippage_bps) / 100.0),
            ),
        ];
        if let Some(fee) = &request.fee {
            query.push((
                "appFee".to_string(),
                format!("{}", f64::from(fee.bps) / 10_000.0),
            ));
            query.push(("appFeeRecipient".to_string(), format!("{:#x}", fee.recipient)));
        }

        let url = format!("{}/swap/approval", self.base_url);
        let response = self
            .http
            .get(&url)
            .query(&query)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SwapError::Transport(format!("across {status}: {body}")));
        }
        let parsed: SwapApprovalResponse = response.json().await?;

        // A response without a deposit transaction means no route was found.
        let Some(swap_tx) = parsed.swap_tx else {
            return Err(SwapError::NoLiquidity);
        };
        let expected_output = match parsed.expected_output_amount.as_deref() {
            Some(amount) => parse_provider_units(amount)?,
            None => return Err(SwapError::NoLiquidity),
        };
        let min_output = match parsed.min_output_amount.as_deref() {
            Some(amount) => parse_provider_units(amount)?,
            None => expected_output,
        };

        let mut approvals = Vec::new();
        for raw in parsed.approval_txns.unwrap_or_default() {
            approvals.push(raw.into_prepared()?);
        }
        let mut fees = Vec::new();
        if let Some(total) = parsed.fees.and_then(|block| block.total) {
            fees.push(ProviderFee {
                label: "bridge fee".to_string(),
                amount: parse_provider_units(&total.amount)?,
                token: total.token.address,
            });
        }
        debug!(
            origin = request.origin_chain,
            dest = request.dest_chain,
            approvals = approvals.len(),
            "bridge quote received"
        );
        Ok(BridgeQuote {
            expected_output,
            min_output,
            output_decimals: parsed.output_token.decimals,
            fees,
            approvals,
            tx: swap_tx.into_prepared()?,
            expiry_unix: parsed.quote_expiry_timestamp,
        })
    }
}
