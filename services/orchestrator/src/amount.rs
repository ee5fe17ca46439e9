//! Exact conversions between human decimal amounts and integer base units.
//!
//! All arithmetic is integer arithmetic on U256. Floating point is never
//! used for amounts; at 18 decimals a single f64 multiply can already be
//! off by whole units.

use crate::error::SwapError;
use ethers::types::U256;
use omniswap_registry::TokenInfo;
use rust_decimal::{Decimal, RoundingStrategy};
use std::collections::HashMap;

/// Convert a human decimal string ("1.5", "0.000001") into base units.
///
/// Exact for any input with no more fractional digits than the token
/// carries; anything beyond that is rejected rather than rounded.
pub fn to_base_units(amount: &str, decimals: u8) -> Result<U256, SwapError> {
    let trimmed = amount.trim();
    if trimmed.is_empty() {
        return Err(SwapError::InvalidAmount("empty amount".to_string()));
    }

    let (int_part, frac_part) = match trimmed.split_once('.') {
        Some((int_part, frac_part)) => (int_part, frac_part),
        None => (trimmed, ""),
    };
    if int_part.is_empty() && frac_part.is_empty() {
        return Err(SwapError::InvalidAmount(format!("not a number: {trimmed}")));
    }
    if !int_part.chars().all(|c| c.is_ascii_digit())
        || !frac_part.chars().all(|c| c.is_ascii_digit())
    {
        return Err(SwapError::InvalidAmount(format!("not a number: {trimmed}")));
    }
    if frac_part.len() > decimals as usize {
        return Err(SwapError::InvalidAmount(format!(
            "{trimmed} has more than {decimals} fractional digits"
        )));
    }

    let scale = U256::exp10(decimals as usize);
    let int_value = if int_part.is_empty() {
        U256::zero()
    } else {
        U256::from_dec_str(int_part)
            .map_err(|_| SwapError::InvalidAmount(format!("integer part overflow: {int_part}")))?
    };
    let frac_value = if frac_part.is_empty() {
        U256::zero()
    } else {
        // Right-pad to the token's scale: "5" at 6 decimals is 500000.
        let padded = format!("{frac_part:0<width$}", width = decimals as usize);
        U256::from_dec_str(&padded)
            .map_err(|_| SwapError::InvalidAmount(format!("bad fraction: {frac_part}")))?
    };

    int_value
        .checked_mul(scale)
        .and_then(|scaled| scaled.checked_add(frac_value))
        .ok_or_else(|| SwapError::InvalidAmount(format!("amount overflows 256 bits: {trimmed}")))
}

/// Render base units back as a human decimal string, trailing zeros trimmed.
pub fn format_base_units(amount: U256, decimals: u8) -> String {
    if decimals == 0 {
        return amount.to_string();
    }
    let scale = U256::exp10(decimals as usize);
    let int_part = amount / scale;
    let frac_part = amount % scale;
    if frac_part.is_zero() {
        return int_part.to_string();
    }
    let frac = format!("{:0>width$}", frac_part.to_string(), width = decimals as usize);
    format!("{}.{}", int_part, frac.trim_end_matches('0'))
}

/// Convert a target USD value into sell-token base units at the given spot
/// price, truncating toward zero at the token's decimal count.
pub fn usd_to_base_units(usd: Decimal, spot_usd: f64, decimals: u8) -> Result<U256, SwapError> {
    if !spot_usd.is_finite() || spot_usd <= 0.0 {
        return Err(SwapError::PriceUnavailable);
    }
    let spot = Decimal::from_f64_retain(spot_usd).ok_or(SwapError::PriceUnavailable)?;
    let tokens = usd
        .checked_div(spot)
        .ok_or(SwapError::PriceUnavailable)?
        .round_dp_with_strategy(u32::from(decimals).min(28), RoundingStrategy::ToZero);
    to_base_units(&tokens.normalize().to_string(), decimals)
}

/// Per-token minimum sell amounts, enforced before any provider call so
/// provider-side rejections are pre-empted. Provider minimums change
/// independently of this code, so the table is a policy input: defaults
/// below, per-symbol overrides from configuration.
#[derive(Debug, Clone, Default)]
pub struct MinimumSellPolicy {
    overrides: HashMap<String, String>,
}

impl MinimumSellPolicy {
    pub fn new(overrides: HashMap<String, String>) -> Self {
        Self { overrides }
    }

    /// Minimum as a human decimal string, or None when the token has no
    /// enforced minimum.
    pub fn minimum_human(&self, token: &TokenInfo) -> Option<String> {
        if let Some(min) = self.overrides.get(&token.symbol) {
            return Some(min.clone());
        }
        if token.stablecoin {
            return Some("1".to_string());
        }
        if token.decimals >= 18 {
            return Some("0.001".to_string());
        }
        None
    }

    /// Check a base-unit sell amount against the policy.
    pub fn ensure(&self, token: &TokenInfo, sell_amount: U256) -> Result<(), SwapError> {
        let Some(minimum) = self.minimum_human(token) else {
            return Ok(());
        };
        let minimum_units = to_base_units(&minimum, token.decimals)?;
        if sell_amount < minimum_units {
            return Err(SwapError::BelowMinimumAmount {
                minimum,
                entered: format_base_units(sell_amount, token.decimals),
                symbol: token.symbol.clone(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use omniswap_registry::{TokenAddress, TokenRegistry, ETHEREUM};

    #[test]
    fn base_unit_round_trip_is_exact() {
        // (human, decimals)
        let cases = [
            ("1", 18u8),
            ("1.5", 18),
            ("0.000000000000000001", 18),
            ("123456.654321", 6),
            ("0.0005", 18),
            ("10", 6),
            ("0.1", 9),
            ("42", 0),
        ];
        for (human, decimals) in cases {
            let units = to_base_units(human, decimals).unwrap();
            let back = format_base_units(units, decimals);
            assert_eq!(back, human, "round trip failed at {decimals} decimals");
        }
    }

    #[test]
    fn known_conversions() {
        assert_eq!(to_base_units("10", 6).unwrap(), U256::from(10_000_000u64));
        assert_eq!(
            to_base_units("1.5", 18).unwrap(),
            U256::from(1_500_000_000_000_000_000u64)
        );
        assert_eq!(to_base_units(".5", 6).unwrap(), U256::from(500_000u64));
        assert_eq!(to_base_units("2.", 6).unwrap(), U256::from(2_000_000u64));
    }

    #[test]
    fn rejects_excess_precision_and_garbage() {
        assert!(matches!(
            to_base_units("1.1234567", 6),
            Err(SwapError::InvalidAmount(_))
        ));
        assert!(to_base_units("", 6).is_err());
        assert!(to_base_units(".", 6).is_err());
        assert!(to_base_units("1,5", 6).is_err());
        assert!(to_base_units("-1", 6).is_err());
        assert!(to_base_units("1e6", 6).is_err());
    }

    #[test]
    fn usd_conversion_truncates_to_token_scale() {
        // $50 of a $2000 asset = 0.025
        let units = usd_to_base_units(Decimal::from(50), 2000.0, 18).unwrap();
        assert_eq!(units, to_base_units("0.025", 18).unwrap());

        // $10 at $3 = 3.333333... truncated at 6 decimals
        let units = usd_to_base_units(Decimal::from(10), 3.0, 6).unwrap();
        assert_eq!(units, U256::from(3_333_333u64));

        assert!(matches!(
            usd_to_base_units(Decimal::from(10), 0.0, 6),
            Err(SwapError::PriceUnavailable)
        ));
        assert!(matches!(
            usd_to_base_units(Decimal::from(10), f64::NAN, 6),
            Err(SwapError::PriceUnavailable)
        ));
    }

    #[test]
    fn minimum_policy_defaults_and_overrides() {
        let registry = TokenRegistry::with_defaults();
        let usdc = registry.by_symbol(ETHEREUM, "USDC").unwrap();
        let weth = registry.by_symbol(ETHEREUM, "WETH").unwrap();
        let policy = MinimumSellPolicy::default();

        // Stablecoins: 1 unit.
        assert!(policy.ensure(usdc, U256::from(999_999u64)).is_err());
        assert!(policy.ensure(usdc, U256::from(1_000_000u64)).is_ok());

        // 18-decimal assets: 0.001.
        let below = to_base_units("0.0005", 18).unwrap();
        let err = policy.ensure(weth, below).unwrap_err();
        match err {
            SwapError::BelowMinimumAmount {
                minimum,
                entered,
                symbol,
            } => {
                assert_eq!(minimum, "0.001");
                assert_eq!(entered, "0.0005");
                assert_eq!(symbol, "WETH");
            }
            other => panic!("unexpected error: {other:?}"),
        }

        // Overrides replace the defaults.
        let mut overrides = HashMap::new();
        overrides.insert("WETH".to_string(), "0.01".to_string());
        let policy = MinimumSellPolicy::new(overrides);
        let at_default = to_base_units("0.005", 18).unwrap();
        assert!(policy.ensure(weth, at_default).is_err());

        // Tokens outside the table have no minimum.
        let wbtc = TokenInfo {
            chain_id: ETHEREUM,
            address: TokenAddress::Evm(
                "0x2260FAC5E5542a773Aa44fBCfeDf7C193bc2C599".parse().unwrap(),
            ),
            symbol: "WBTC".to_string(),
            decimals: 8,
            stablecoin: false,
        };
        let policy = MinimumSellPolicy::default();
        assert!(policy.ensure(&wbtc, U256::one()).is_ok());
    }
}
