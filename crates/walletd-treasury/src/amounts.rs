use alloy::primitives::U256;
use anyhow::{Context, Result, bail};
use bigdecimal::num_bigint::BigInt;
use bigdecimal::{BigDecimal, RoundingMode, Zero};
use std::str::FromStr;

/// Scales a human-readable token amount into base units (`amount * 10^decimals`),
/// truncating anything below one base unit.
pub fn to_base_units(amount: &BigDecimal, decimals: i32) -> Result<U256> {
    if amount.sign() == bigdecimal::num_bigint::Sign::Minus {
        bail!("amount must not be negative");
    }

    let scale = BigDecimal::new(BigInt::from(1), -i64::from(decimals));
    let scaled = (amount * scale).with_scale_round(0, RoundingMode::Down);

    U256::from_str_radix(&scaled.to_string(), 10)
        .context("amount does not fit into 256 bits")
}

/// Base-unit integer as an arbitrary-precision decimal, for NUMERIC columns.
pub fn u256_to_decimal(value: U256) -> BigDecimal {
    BigDecimal::from_str(&value.to_string()).expect("U256 decimal representation is always valid")
}

/// Base-unit decimal (as stored in the ledger) back into a U256.
pub fn decimal_to_u256(value: &BigDecimal) -> Result<U256> {
    if value.sign() == bigdecimal::num_bigint::Sign::Minus {
        bail!("amount must not be negative");
    }
    let normalized = value.with_scale_round(0, RoundingMode::Down);
    U256::from_str_radix(&normalized.to_string(), 10)
        .context("amount does not fit into 256 bits")
}

pub fn is_positive(value: &BigDecimal) -> bool {
    !value.is_zero() && value.sign() == bigdecimal::num_bigint::Sign::Plus
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    #[test]
    fn one_usdt_with_six_decimals() {
        assert_eq!(to_base_units(&dec("1"), 6).unwrap(), U256::from(1_000_000u64));
    }

    #[test]
    fn fractional_native_amount() {
        assert_eq!(
            to_base_units(&dec("0.005"), 18).unwrap(),
            U256::from(5_000_000_000_000_000u64)
        );
    }

    #[test]
    fn sub_base_unit_dust_truncates_to_zero() {
        assert_eq!(to_base_units(&dec("0.0000005"), 6).unwrap(), U256::ZERO);
    }

    #[test]
    fn negative_amounts_are_rejected() {
        assert!(to_base_units(&dec("-1"), 6).is_err());
        assert!(decimal_to_u256(&dec("-1")).is_err());
    }

    #[test]
    fn u256_round_trips_through_decimal() {
        let value = U256::from(123_456_789_000_000_000_000u128);
        assert_eq!(decimal_to_u256(&u256_to_decimal(value)).unwrap(), value);
    }

    #[test]
    fn positivity_check() {
        assert!(is_positive(&dec("0.1")));
        assert!(!is_positive(&dec("0")));
        assert!(!is_positive(&dec("-3")));
    }
}
