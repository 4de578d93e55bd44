//! Parameter checks shared by contract creation and order placement.

use hashperp_types::{ContractLimits, HashPerpError, Result, UserId};
use rust_decimal::Decimal;

/// Decimal places of one satoshi in BTC.
const SATS_DECIMALS: u32 = 8;

/// Strike in `(0, max_strike_rate]`.
pub fn validate_strike(limits: &ContractLimits, strike_rate: Decimal) -> Result<()> {
    if strike_rate <= Decimal::ZERO {
        return Err(HashPerpError::invalid("strike_rate", "must be positive"));
    }
    if strike_rate > limits.max_strike_rate {
        return Err(HashPerpError::invalid(
            "strike_rate",
            format!("{strike_rate} exceeds maximum {}", limits.max_strike_rate),
        ));
    }
    Ok(())
}

/// Size in `[dust_size, max_size]`, with each side's half a whole number
/// of satoshis.
pub fn validate_size(limits: &ContractLimits, size: Decimal) -> Result<()> {
    if size <= Decimal::ZERO {
        return Err(HashPerpError::invalid("size", "must be positive"));
    }
    if size < limits.dust_size {
        return Err(HashPerpError::invalid(
            "size",
            format!("{size} is below the dust limit {}", limits.dust_size),
        ));
    }
    if size > limits.max_size {
        return Err(HashPerpError::invalid(
            "size",
            format!("{size} exceeds maximum {}", limits.max_size),
        ));
    }
    let side = (size / Decimal::TWO).normalize();
    if side.scale() > SATS_DECIMALS {
        return Err(HashPerpError::invalid(
            "size",
            format!("{size} splits into {side} per side, finer than one satoshi"),
        ));
    }
    Ok(())
}

/// Expiry in `[current + min_expiry_blocks, current + max_expiry_blocks]`.
pub fn validate_expiry(limits: &ContractLimits, current_height: u64, expiry_height: u64) -> Result<()> {
    if expiry_height <= current_height {
        return Err(HashPerpError::invalid(
            "expiry_height",
            format!("{expiry_height} is not after the current height {current_height}"),
        ));
    }
    let earliest = current_height.saturating_add(limits.min_expiry_blocks);
    if expiry_height < earliest {
        return Err(HashPerpError::invalid(
            "expiry_height",
            format!("{expiry_height} is sooner than {earliest}"),
        ));
    }
    let latest = current_height.saturating_add(limits.max_expiry_blocks);
    if expiry_height > latest {
        return Err(HashPerpError::invalid(
            "expiry_height",
            format!("{expiry_height} is beyond {latest}"),
        ));
    }
    Ok(())
}

/// Everything a new contract must satisfy before keys are looked up.
pub fn validate_contract_parameters(
    limits: &ContractLimits,
    current_height: u64,
    strike_rate: Decimal,
    expiry_height: u64,
    size: Decimal,
) -> Result<()> {
    validate_strike(limits, strike_rate)?;
    validate_size(limits, size)?;
    validate_expiry(limits, current_height, expiry_height)
}

pub fn validate_counterparties(buyer: UserId, seller: UserId) -> Result<()> {
    if buyer == seller {
        return Err(HashPerpError::invalid(
            "seller_id",
            "buyer and seller must be different users",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> ContractLimits {
        ContractLimits::default()
    }

    #[test]
    fn strike_bounds() {
        assert!(validate_strike(&limits(), Decimal::new(1, 4)).is_ok());
        assert!(validate_strike(&limits(), Decimal::from(1_000)).is_ok());
        assert!(validate_strike(&limits(), Decimal::ZERO).is_err());
        assert!(validate_strike(&limits(), Decimal::new(-1, 4)).is_err());
        assert!(validate_strike(&limits(), Decimal::new(10_001, 1)).is_err());
    }

    #[test]
    fn size_bounds() {
        assert!(validate_size(&limits(), Decimal::new(1, 3)).is_ok());
        assert!(validate_size(&limits(), Decimal::from(100)).is_ok());
        let err = validate_size(&limits(), Decimal::new(9, 4)).unwrap_err();
        assert!(matches!(err, HashPerpError::InvalidParameters { field: "size", .. }));
        assert!(validate_size(&limits(), Decimal::new(1_001, 1)).is_err());
        assert!(validate_size(&limits(), Decimal::ZERO).is_err());
    }

    #[test]
    fn size_must_split_into_whole_satoshis() {
        // 0.50000002 per side
        assert!(validate_size(&limits(), Decimal::new(100_000_004, 8)).is_ok());
        // 0.123456789 BTC: finer than a satoshi outright
        let err = validate_size(&limits(), Decimal::new(123_456_789, 9)).unwrap_err();
        assert!(matches!(err, HashPerpError::InvalidParameters { field: "size", .. }));
        // 1.00000001 BTC: each half would be 0.500000005
        assert!(validate_size(&limits(), Decimal::new(100_000_001, 8)).is_err());
        // trailing zeros do not count
        assert!(validate_size(&limits(), Decimal::new(1_000_000_000, 9)).is_ok());
    }

    #[test]
    fn expiry_window() {
        let current = 840_000;
        assert!(validate_expiry(&limits(), current, current + 100).is_ok());
        assert!(validate_expiry(&limits(), current, current + 52_560).is_ok());
        assert!(validate_expiry(&limits(), current, current + 99).is_err());
        assert!(validate_expiry(&limits(), current, current + 52_561).is_err());
        assert!(validate_expiry(&limits(), current, current).is_err());
        assert!(validate_expiry(&limits(), current, current - 1).is_err());
    }

    #[test]
    fn counterparties_must_differ() {
        let user = UserId::new();
        assert!(validate_counterparties(user, user).is_err());
        assert!(validate_counterparties(user, UserId::new()).is_ok());
    }
}
