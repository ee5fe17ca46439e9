//! The wallet seam. Signing key custody is entirely external: the engine
//! only ever asks for a signature or a broadcast and never sees private
//! material. `LocalSigner` is the in-process implementation used by the
//! CLI; a browser or hardware wallet slots in behind the same trait.

use crate::error::WalletError;
use crate::quote::PreparedTx;
use async_trait::async_trait;
use ethers::prelude::*;
use ethers::types::transaction::eip712::TypedData;
use std::sync::Arc;
use tracing::debug;

#[async_trait]
pub trait Wallet: Send + Sync {
    fn address(&self) -> Address;

    /// EIP-712 signature over a provider-supplied payload.
    async fn sign_typed_data(&self, payload: &TypedData) -> Result<Signature, WalletError>;

    /// Sign and broadcast; returns the transaction hash. The orchestrator
    /// waits for the receipt itself.
    async fn send_transaction(&self, tx: &PreparedTx) -> Result<H256, WalletError>;

    /// Sign a serialized (base64) Solana transaction, returning the signed
    /// serialization. EVM-only wallets return `Unsupported`.
    async fn sign_serialized(&self, transaction_base64: &str) -> Result<String, WalletError>;
}

/// Wallet/RPC rejections come back as opaque strings; user declines are
/// recognized by the conventional markers so they map to the recoverable
/// outcome instead of a hard failure.
fn classify(message: String) -> WalletError {
    let lowered = message.to_lowercase();
    if lowered.contains("rejected") || lowered.contains("denied") || lowered.contains("4001") {
        WalletError::Rejected
    } else {
        WalletError::Rpc(message)
    }
}

pub struct LocalSigner {
    inner: Arc<SignerMiddleware<Provider<Http>, LocalWallet>>,
}

impl LocalSigner {
    pub fn new(rpc_url: &str, private_key: &str, chain_id: u64) -> Result<Self, WalletError> {
        let provider = Provider::<Http>::try_from(rpc_url)
            .map_err(|e| WalletError::Rpc(format!("bad rpc url: {e}")))?;
        let wallet = private_key
            .parse::<LocalWallet>()
            .map_err(|e| WalletError::Rpc(format!("bad private key: {e}")))?
            .with_chain_id(chain_id);
        Ok(Self {
            inner: Arc::new(SignerMiddleware::new(provider, wallet)),
        })
    }
}

#[async_trait]
impl Wallet for LocalSigner {
    fn address(&self) -> Address {
        self.inner.address()
    }

    async fn sign_typed_data(&self, payload: &TypedData) -> Result<Signature, WalletError> {
        debug!(primary_type = %payload.primary_type, "signing typed data");
        self.inner
            .signer()
            .sign_typed_data(payload)
            .await
            .map_err(|e| classify(e.to_string()))
    }

    async fn send_transaction(&self, tx: &PreparedTx) -> Result<H256, WalletError> {
        let mut request = TransactionRequest::new()
            .from(self.inner.address())
            .to(tx.to)
            .data(tx.data.clone())
            .value(tx.value);
        if let Some(gas) = tx.gas {
            request = request.gas(gas);
        }
        if let Some(gas_price) = tx.gas_price {
            request = request.gas_price(gas_price);
        }
        let pending = self
            .inner
            .send_transaction(request, None)
            .await
            .map_err(|e| classify(e.to_string()))?;
        Ok(pending.tx_hash())
    }

    async fn sign_serialized(&self, _transaction_base64: &str) -> Result<String, WalletError> {
        Err(WalletError::Unsupported)
    }
}
