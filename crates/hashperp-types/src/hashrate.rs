//! Hash-rate economics: the BTC/PH/day metric contracts settle against.
//!
//! ```text
//! metric = BLOCKS_PER_DAY × subsidy(height) / hash_rate_PH
//! subsidy(height) = 50 BTC >> (height / 210_000)
//! hash_rate_PH = difficulty × 2^32 / 600 / 10^15
//! ```

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::constants::{BLOCKS_PER_DAY, HALVING_INTERVAL, INITIAL_SUBSIDY_BTC};
use crate::{HashPerpError, Result};

/// Block subsidy at `height`, in BTC.
#[must_use]
pub fn block_subsidy(height: u64) -> Decimal {
    let halvings = height / HALVING_INTERVAL;
    // 50 BTC in sats is 5e9 < 2^33, so after 33 halvings it is zero.
    if halvings >= 33 {
        return Decimal::ZERO;
    }
    let sats = (INITIAL_SUBSIDY_BTC * 100_000_000) >> halvings;
    Decimal::new(i64::try_from(sats).unwrap_or(0), 8).normalize()
}

/// BTC earned per PH/s per day at `height`.
pub fn btc_per_ph_day(height: u64, hash_rate_ph: Decimal) -> Result<Decimal> {
    if hash_rate_ph <= Decimal::ZERO {
        return Err(HashPerpError::invalid(
            "hash_rate",
            format!("must be positive, got {hash_rate_ph}"),
        ));
    }
    let daily_issuance = Decimal::from(BLOCKS_PER_DAY) * block_subsidy(height);
    daily_issuance
        .checked_div(hash_rate_ph)
        .ok_or_else(|| HashPerpError::Internal("metric division overflow".to_string()))
}

/// Convert a network difficulty into PH/s.
pub fn difficulty_to_ph(difficulty: Decimal) -> Result<Decimal> {
    if difficulty <= Decimal::ZERO {
        return Err(HashPerpError::invalid(
            "difficulty",
            format!("must be positive, got {difficulty}"),
        ));
    }
    let hashes_per_block = difficulty
        .checked_mul(Decimal::from(1u64 << 32))
        .ok_or_else(|| HashPerpError::Internal("difficulty overflow".to_string()))?;
    Ok(hashes_per_block / Decimal::from(600) / Decimal::from(1_000_000_000_000_000u64))
}

/// One observation of network hash rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashRateSample {
    pub height: u64,
    pub hash_rate_ph: Decimal,
    pub btc_per_ph_day: Decimal,
}

impl HashRateSample {
    pub fn at(height: u64, hash_rate_ph: Decimal) -> Result<Self> {
        Ok(Self {
            height,
            hash_rate_ph,
            btc_per_ph_day: btc_per_ph_day(height, hash_rate_ph)?,
        })
    }
}
