//! Engine configuration.
//!
//! Every field has a default, so a partial JSON document only overrides
//! what it names. [`EngineConfig::from_json_str`] validates before returning.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{HashPerpError, Result, constants};

/// Bounds applied to new contracts and orders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContractLimits {
    pub max_strike_rate: Decimal,
    pub dust_size: Decimal,
    pub max_size: Decimal,
    pub min_expiry_blocks: u64,
    pub max_expiry_blocks: u64,
}

impl Default for ContractLimits {
    fn default() -> Self {
        Self {
            max_strike_rate: constants::max_strike_rate(),
            dust_size: constants::dust_size(),
            max_size: constants::max_contract_size(),
            min_expiry_blocks: constants::MIN_EXPIRY_BLOCKS,
            max_expiry_blocks: constants::MAX_EXPIRY_BLOCKS,
        }
    }
}

/// Timelocks and fees governing exits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExitPolicy {
    /// CSV delay on the fallback branch of role paths and the timeout leaf.
    pub timeout_csv_blocks: u64,
    /// Sweeps open this many blocks before expiry.
    pub sweep_window_blocks: u64,
    /// The timeout exit opens this many blocks after expiry.
    pub timeout_exit_delay_blocks: u64,
    /// Early-exit fee as a fraction of notional.
    pub early_exit_fee_rate: Decimal,
}

impl Default for ExitPolicy {
    fn default() -> Self {
        Self {
            timeout_csv_blocks: constants::TIMEOUT_CSV_BLOCKS,
            sweep_window_blocks: constants::SWEEP_WINDOW_BLOCKS,
            timeout_exit_delay_blocks: constants::TIMEOUT_EXIT_DELAY_BLOCKS,
            early_exit_fee_rate: Decimal::new(
                i64::try_from(constants::EARLY_EXIT_FEE_PERCENT).unwrap_or(5),
                2,
            ),
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub limits: ContractLimits,
    pub exits: ExitPolicy,
    /// Entries kept by the broadcast journal before evicting the oldest.
    pub journal_capacity: usize,
    /// Seconds per block used to estimate expiry dates.
    pub block_interval_secs: i64,
    /// Lifetime of swap offers created without an explicit expiry.
    pub default_offer_ttl_secs: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            limits: ContractLimits::default(),
            exits: ExitPolicy::default(),
            journal_capacity: constants::DEFAULT_JOURNAL_CAPACITY,
            block_interval_secs: constants::BLOCK_INTERVAL_SECS,
            default_offer_ttl_secs: constants::DEFAULT_OFFER_TTL_SECS,
        }
    }
}

impl EngineConfig {
    /// Parse and validate a JSON configuration document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| HashPerpError::Configuration(format!("invalid config json: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let limits = &self.limits;
        if limits.max_strike_rate <= Decimal::ZERO {
            return Err(HashPerpError::Configuration(
                "limits.max_strike_rate must be positive".to_string(),
            ));
        }
        if limits.dust_size <= Decimal::ZERO || limits.dust_size > limits.max_size {
            return Err(HashPerpError::Configuration(format!(
                "limits.dust_size {} must be in (0, max_size {}]",
                limits.dust_size, limits.max_size
            )));
        }
        if limits.min_expiry_blocks == 0 || limits.min_expiry_blocks > limits.max_expiry_blocks {
            return Err(HashPerpError::Configuration(format!(
                "limits.min_expiry_blocks {} must be in [1, max_expiry_blocks {}]",
                limits.min_expiry_blocks, limits.max_expiry_blocks
            )));
        }
        let fee = self.exits.early_exit_fee_rate;
        if fee < Decimal::ZERO || fee >= Decimal::ONE {
            return Err(HashPerpError::Configuration(format!(
                "exits.early_exit_fee_rate {fee} must be in [0, 1)"
            )));
        }
        if self.exits.timeout_csv_blocks == 0 || self.exits.timeout_csv_blocks > 0xffff {
            return Err(HashPerpError::Configuration(
                "exits.timeout_csv_blocks must fit a 16-bit relative locktime".to_string(),
            ));
        }
        if self.journal_capacity == 0 {
            return Err(HashPerpError::Configuration(
                "journal_capacity must be non-zero".to_string(),
            ));
        }
        if self.block_interval_secs <= 0 || self.default_offer_ttl_secs <= 0 {
            return Err(HashPerpError::Configuration(
                "block_interval_secs and default_offer_ttl_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
