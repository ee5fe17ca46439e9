//! Read-side chain access and calldata construction for the transactions
//! the orchestrator builds itself (approve, wrap, unwrap). Everything the
//! engine needs from a chain goes through `ChainReader` so tests can run
//! against an in-memory fake.

use crate::error::SwapError;
use crate::quote::PreparedTx;
use async_trait::async_trait;
use ethers::abi::{encode, Token};
use ethers::prelude::*;
use ethers::types::transaction::eip2718::TypedTransaction;
use std::sync::Arc;

abigen!(
    IERC20,
    r#"[
        function balanceOf(address owner) external view returns (uint256)
        function allowance(address owner, address spender) external view returns (uint256)
        function decimals() external view returns (uint8)
    ]"#
);

// approve(address,uint256)
const APPROVE_SELECTOR: [u8; 4] = [0x09, 0x5e, 0xa7, 0xb3];
// deposit()
const DEPOSIT_SELECTOR: [u8; 4] = [0xd0, 0xe3, 0x0d, 0xb0];
// withdraw(uint256)
const WITHDRAW_SELECTOR: [u8; 4] = [0x2e, 0x1a, 0x7d, 0x4d];

fn calldata(selector: [u8; 4], args: &[Token]) -> Bytes {
    let mut data = selector.to_vec();
    data.extend(encode(args));
    data.into()
}

/// Unlimited approval for `spender` on `token`. MAX allowance in a single
/// transaction avoids re-approving the same token on every subsequent
/// trade; a UX/gas trade-off, not a security requirement.
pub fn approval_tx(token: Address, spender: Address) -> PreparedTx {
    PreparedTx {
        to: token,
        data: calldata(
            APPROVE_SELECTOR,
            &[Token::Address(spender), Token::Uint(U256::MAX)],
        ),
        value: U256::zero(),
        gas: None,
        gas_price: None,
    }
}

/// `deposit()` on the wrapped-native contract with value = amount.
pub fn wrap_tx(wrapped_native: Address, amount: U256) -> PreparedTx {
    PreparedTx {
        to: wrapped_native,
        data: calldata(DEPOSIT_SELECTOR, &[]),
        value: amount,
        gas: None,
        gas_price: None,
    }
}

/// `withdraw(amount)` on the wrapped-native contract.
pub fn unwrap_tx(wrapped_native: Address, amount: U256) -> PreparedTx {
    PreparedTx {
        to: wrapped_native,
        data: calldata(WITHDRAW_SELECTOR, &[Token::Uint(amount)]),
        value: U256::zero(),
        gas: None,
        gas_price: None,
    }
}

/// Outcome of a receipt lookup: not yet mined, succeeded, or reverted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiptStatus {
    Pending,
    Succeeded,
    Reverted,
}

#[async_trait]
pub trait ChainReader: Send + Sync {
    async fn allowance(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
    ) -> Result<U256, SwapError>;

    /// Native balance when `token` is None, ERC-20 balance otherwise.
    async fn balance(&self, token: Option<Address>, owner: Address) -> Result<U256, SwapError>;

    async fn estimate_gas(&self, from: Address, tx: &PreparedTx) -> Result<U256, SwapError>;

    async fn gas_price(&self) -> Result<U256, SwapError>;

    async fn receipt_status(&self, tx_hash: H256) -> Result<ReceiptStatus, SwapError>;
}

pub struct EthersChain {
    provider: Arc<Provider<Http>>,
}

impl EthersChain {
    pub fn new(rpc_url: &str) -> Result<Self, SwapError> {
        let provider = Provider::<Http>::try_from(rpc_url)
            .map_err(|e| SwapError::Transport(format!("bad rpc url {rpc_url}: {e}")))?;
        Ok(Self {
            provider: Arc::new(provider),
        })
    }

    fn typed_tx(from: Address, tx: &PreparedTx) -> TypedTransaction {
        let mut request = TransactionRequest::new()
            .from(from)
            .to(tx.to)
            .data(tx.data.clone())
            .value(tx.value);
        if let Some(gas_price) = tx.gas_price {
            request = request.gas_price(gas_price);
        }
        TypedTransaction::Legacy(request)
    }
}

#[async_trait]
impl ChainReader for EthersChain {
    async fn allowance(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
    ) -> Result<U256, SwapError> {
        IERC20::new(token, self.provider.clone())
            .allowance(owner, spender)
            .call()
            .await
            .map_err(|e| SwapError::Transport(format!("allowance read failed: {e}")))
    }

    async fn balance(&self, token: Option<Address>, owner: Address) -> Result<U256, SwapError> {
        match token {
            None => self
                .provider
                .get_balance(owner, None)
                .await
                .map_err(|e| SwapError::Transport(format!("balance read failed: {e}"))),
            Some(token) => IERC20::new(token, self.provider.clone())
                .balance_of(owner)
                .call()
                .await
                .map_err(|e| SwapError::Transport(format!("balance read failed: {e}"))),
        }
    }

    async fn estimate_gas(&self, from: Address, tx: &PreparedTx) -> Result<U256, SwapError> {
        self.provider
            .estimate_gas(&Self::typed_tx(from, tx), None)
            .await
            .map_err(|e| SwapError::Transport(format!("gas estimate failed: {e}")))
    }

    async fn gas_price(&self) -> Result<U256, SwapError> {
        self.provider
            .get_gas_price()
            .await
            .map_err(|e| SwapError::Transport(format!("gas price read failed: {e}")))
    }

    async fn receipt_status(&self, tx_hash: H256) -> Result<ReceiptStatus, SwapError> {
        let receipt = self
            .provider
            .get_transaction_receipt(tx_hash)
            .await
            .map_err(|e| SwapError::Transport(format!("receipt lookup failed: {e}")))?;
        Ok(match receipt {
            None => ReceiptStatus::Pending,
            Some(receipt) if receipt.status == Some(1u64.into()) => ReceiptStatus::Succeeded,
            Some(_) => ReceiptStatus::Reverted,
        })
    }
}
