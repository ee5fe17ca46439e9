//! Static chain and token registries shared across the orchestrator.
//!
//! Tables are process-wide read-only constants, built once on first access.
//! Token coverage is intentionally the short list of assets the swap flows
//! trade; everything else is looked up at runtime by the caller.

use ethers::types::Address;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Sentinel address aggregators use for the chain's native asset.
pub const NATIVE_SENTINEL: &str = "0xEeeeeEeeeEeEeeEeEeEeeEEEeeeeEeeeeeeeEEeE";

/// Chain id aggregators conventionally assign to Solana mainnet.
pub const SOLANA_CHAIN_ID: u64 = 501;

// EVM chain ids
pub const ETHEREUM: u64 = 1;
pub const OPTIMISM: u64 = 10;
pub const POLYGON: u64 = 137;
pub const BASE: u64 = 8453;
pub const ARBITRUM: u64 = 42161;

// Wrapped-native addresses
pub const WETH_MAINNET: &str = "0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2";
pub const WETH_OP_STACK: &str = "0x4200000000000000000000000000000000000006";
pub const WPOL: &str = "0x0d500B1d8E8eF31E21C99d1Db9A6444d3ADf1270";
pub const WETH_ARBITRUM: &str = "0x82aF49447D8a07e3bd95BD0d56f35241523fBab1";
pub const WSOL_MINT: &str = "So11111111111111111111111111111111111111112";

/// 0x AllowanceHolder, deployed at the same address on every supported chain.
/// Used as the approval spender when a quote does not name one.
pub const ALLOWANCE_HOLDER: &str = "0x0000000000001fF3684f28c67538d4D072C22734";

/// Chain-scoped token address. EVM chains use 20-byte addresses, Solana
/// uses base58 mint strings, so the registry carries both shapes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenAddress {
    Evm(Address),
    Spl(String),
}

impl TokenAddress {
    pub fn evm(&self) -> Option<Address> {
        match self {
            TokenAddress::Evm(addr) => Some(*addr),
            TokenAddress::Spl(_) => None,
        }
    }

    /// True when this is the native-asset sentinel.
    pub fn is_native_sentinel(&self) -> bool {
        match self {
            TokenAddress::Evm(addr) => *addr == native_sentinel(),
            TokenAddress::Spl(mint) => mint == WSOL_MINT,
        }
    }
}

impl std::fmt::Display for TokenAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenAddress::Evm(addr) => write!(f, "{addr:#x}"),
            TokenAddress::Spl(mint) => write!(f, "{mint}"),
        }
    }
}

pub fn native_sentinel() -> Address {
    static SENTINEL: Lazy<Address> = Lazy::new(|| NATIVE_SENTINEL.parse().unwrap());
    *SENTINEL
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenInfo {
    pub chain_id: u64,
    pub address: TokenAddress,
    pub symbol: String,
    pub decimals: u8,
    pub stablecoin: bool,
}

impl TokenInfo {
    pub fn is_native(&self) -> bool {
        self.address.is_native_sentinel()
    }
}

#[derive(Debug, Clone)]
pub struct ChainSpec {
    pub chain_id: u64,
    pub name: &'static str,
    pub native_symbol: &'static str,
    pub native_decimals: u8,
    pub wrapped_native: TokenAddress,
    /// Default approval spender when a quote omits one. None on Solana,
    /// where approvals do not apply.
    pub allowance_holder: Option<Address>,
}

static CHAINS: Lazy<HashMap<u64, ChainSpec>> = Lazy::new(|| {
    let holder: Address = ALLOWANCE_HOLDER.parse().unwrap();
    let evm = |s: &str| TokenAddress::Evm(s.parse().unwrap());
    let mut chains = HashMap::new();
    chains.insert(
        ETHEREUM,
        ChainSpec {
            chain_id: ETHEREUM,
            name: "Ethereum",
            native_symbol: "ETH",
            native_decimals: 18,
            wrapped_native: evm(WETH_MAINNET),
            allowance_holder: Some(holder),
        },
    );
    chains.insert(
        OPTIMISM,
        ChainSpec {
            chain_id: OPTIMISM,
            name: "Optimism",
            native_symbol: "ETH",
            native_decimals: 18,
            wrapped_native: evm(WETH_OP_STACK),
            allowance_holder: Some(holder),
        },
    );
    chains.insert(
        POLYGON,
        ChainSpec {
            chain_id: POLYGON,
            name: "Polygon",
            native_symbol: "POL",
            native_decimals: 18,
            wrapped_native: evm(WPOL),
            allowance_holder: Some(holder),
        },
    );
    chains.insert(
        BASE,
        ChainSpec {
            chain_id: BASE,
            name: "Base",
            native_symbol: "ETH",
            native_decimals: 18,
            wrapped_native: evm(WETH_OP_STACK),
            allowance_holder: Some(holder),
        },
    );
    chains.insert(
        ARBITRUM,
        ChainSpec {
            chain_id: ARBITRUM,
            name: "Arbitrum",
            native_symbol: "ETH",
            native_decimals: 18,
            wrapped_native: evm(WETH_ARBITRUM),
            allowance_holder: Some(holder),
        },
    );
    chains.insert(
        SOLANA_CHAIN_ID,
        ChainSpec {
            chain_id: SOLANA_CHAIN_ID,
            name: "Solana",
            native_symbol: "SOL",
            native_decimals: 9,
            wrapped_native: TokenAddress::Spl(WSOL_MINT.to_string()),
            allowance_holder: None,
        },
    );
    chains
});

pub fn chain(chain_id: u64) -> Option<&'static ChainSpec> {
    CHAINS.get(&chain_id)
}

pub fn is_solana(chain_id: u64) -> bool {
    chain_id == SOLANA_CHAIN_ID
}

/// Token lookup tables keyed by chain and address, with a symbol index.
pub struct TokenRegistry {
    tokens: HashMap<(u64, TokenAddress), TokenInfo>,
    by_symbol: HashMap<(u64, String), TokenAddress>,
}

impl TokenRegistry {
    /// Registry preloaded with the token set the swap flows trade.
    pub fn with_defaults() -> Self {
        let mut registry = Self {
            tokens: HashMap::new(),
            by_symbol: HashMap::new(),
        };

        // (chain, address, symbol, decimals, stablecoin)
        let evm_tokens: &[(u64, &str, &str, u8, bool)] = &[
            (ETHEREUM, WETH_MAINNET, "WETH", 18, false),
            (ETHEREUM, "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48", "USDC", 6, true),
            (ETHEREUM, "0xdAC17F958D2ee523a2206206994597C13D831ec7", "USDT", 6, true),
            (ETHEREUM, "0x6B175474E89094C44Da98b954EedeAC495271d0F", "DAI", 18, true),
            (OPTIMISM, WETH_OP_STACK, "WETH", 18, false),
            (OPTIMISM, "0x0b2C639c533813f4Aa9D7837CAf62653d097Ff85", "USDC", 6, true),
            (POLYGON, WPOL, "WPOL", 18, false),
            (POLYGON, "0x3c499c542cEF5E3811e1192ce70d8cC03d5c3359", "USDC", 6, true),
            (POLYGON, "0x2791Bca1f2de4661ED88A30C99A7a9449Aa84174", "USDC.e", 6, true),
            (POLYGON, "0xc2132D05D31c914a87C6611C10748AEb04B58e8F", "USDT", 6, true),
            (POLYGON, "0x7ceB23fD6bC0adD59E62ac25578270cFf1b9f619", "WETH", 18, false),
            (POLYGON, "0x8f3Cf7ad23Cd3CaDbD9735AFf958023239c6A063", "DAI", 18, true),
            (BASE, WETH_OP_STACK, "WETH", 18, false),
            (BASE, "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913", "USDC", 6, true),
            (ARBITRUM, WETH_ARBITRUM, "WETH", 18, false),
            (ARBITRUM, "0xaf88d065e77c8cC2239327C5EDb3A432268e5831", "USDC", 6, true),
            (ARBITRUM, "0xFd086bC7CD5C481DCC9C85ebE478A1C0b69FCbb9", "USDT", 6, true),
        ];
        for (chain_id, address, symbol, decimals, stablecoin) in evm_tokens {
            registry.insert(TokenInfo {
                chain_id: *chain_id,
                address: TokenAddress::Evm(address.parse().unwrap()),
                symbol: (*symbol).to_string(),
                decimals: *decimals,
                stablecoin: *stablecoin,
            });
        }

        let spl_tokens: &[(&str, &str, u8, bool)] = &[
            (WSOL_MINT, "SOL", 9, false),
            ("EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v", "USDC", 6, true),
            ("Es9vMFrzaCERmJfrF4H2FYD4KCoNkY11McCe8BenwNYB", "USDT", 6, true),
        ];
        for (mint, symbol, decimals, stablecoin) in spl_tokens {
            registry.insert(TokenInfo {
                chain_id: SOLANA_CHAIN_ID,
                address: TokenAddress::Spl((*mint).to_string()),
                symbol: (*symbol).to_string(),
                decimals: *decimals,
                stablecoin: *stablecoin,
            });
        }

        registry
    }

    pub fn insert(&mut self, token: TokenInfo) {
        self.by_symbol.insert(
            (token.chain_id, token.symbol.clone()),
            token.address.clone(),
        );
        self.tokens
            .insert((token.chain_id, token.address.clone()), token);
    }

    pub fn token(&self, chain_id: u64, address: &TokenAddress) -> Option<&TokenInfo> {
        self.tokens.get(&(chain_id, address.clone()))
    }

    pub fn by_symbol(&self, chain_id: u64, symbol: &str) -> Option<&TokenInfo> {
        let address = self.by_symbol.get(&(chain_id, symbol.to_string()))?;
        self.tokens.get(&(chain_id, address.clone()))
    }

    /// The native asset of a chain, carried under the sentinel address.
    pub fn native_token(&self, chain_id: u64) -> Option<TokenInfo> {
        let spec = chain(chain_id)?;
        let address = if is_solana(chain_id) {
            TokenAddress::Spl(WSOL_MINT.to_string())
        } else {
            TokenAddress::Evm(native_sentinel())
        };
        Some(TokenInfo {
            chain_id,
            address,
            symbol: spec.native_symbol.to_string(),
            decimals: spec.native_decimals,
            stablecoin: false,
        })
    }

    pub fn wrapped_native(&self, chain_id: u64) -> Option<&TokenInfo> {
        let spec = chain(chain_id)?;
        self.tokens.get(&(chain_id, spec.wrapped_native.clone()))
    }

    pub fn is_wrapped_native(&self, chain_id: u64, address: &TokenAddress) -> bool {
        chain(chain_id).map(|spec| &spec.wrapped_native == address) == Some(true)
    }
}

impl Default for TokenRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_table_covers_supported_networks() {
        for id in [ETHEREUM, OPTIMISM, POLYGON, BASE, ARBITRUM, SOLANA_CHAIN_ID] {
            assert!(chain(id).is_some(), "missing chain {id}");
        }
        assert!(chain(99999).is_none());
        assert_eq!(chain(POLYGON).unwrap().native_symbol, "POL");
    }

    #[test]
    fn token_lookups() {
        let registry = TokenRegistry::with_defaults();

        let usdc = registry.by_symbol(POLYGON, "USDC").unwrap();
        assert_eq!(usdc.decimals, 6);
        assert!(usdc.stablecoin);

        let weth = registry.by_symbol(ETHEREUM, "WETH").unwrap();
        assert_eq!(weth.decimals, 18);
        assert!(!weth.stablecoin);
        assert!(registry.is_wrapped_native(ETHEREUM, &weth.address));

        let by_addr = registry.token(ETHEREUM, &weth.address.clone()).unwrap();
        assert_eq!(by_addr.symbol, "WETH");
    }

    #[test]
    fn native_sentinel_round_trip() {
        let registry = TokenRegistry::with_defaults();
        let eth = registry.native_token(ETHEREUM).unwrap();
        assert!(eth.is_native());
        assert_eq!(eth.symbol, "ETH");
        assert_eq!(eth.decimals, 18);

        let weth = registry.by_symbol(ETHEREUM, "WETH").unwrap();
        assert!(!weth.is_native());
    }

    #[test]
    fn solana_entries_use_mints() {
        let registry = TokenRegistry::with_defaults();
        let sol = registry.native_token(SOLANA_CHAIN_ID).unwrap();
        assert_eq!(sol.decimals, 9);
        assert!(sol.is_native());
        assert!(sol.address.evm().is_none());

        let usdc = registry.by_symbol(SOLANA_CHAIN_ID, "USDC").unwrap();
        assert!(matches!(usdc.address, TokenAddress::Spl(_)));
        assert!(is_solana(SOLANA_CHAIN_ID));
        assert!(!is_solana(ETHEREUM));
    }
}
