//! System-wide constants for HashPerp.

use rust_decimal::Decimal;

/// Expected blocks per day at the 10-minute target spacing.
pub const BLOCKS_PER_DAY: u64 = 144;

/// Target block interval in seconds.
pub const BLOCK_INTERVAL_SECS: i64 = 600;

/// Blocks between subsidy halvings.
pub const HALVING_INTERVAL: u64 = 210_000;

/// Initial block subsidy in BTC.
pub const INITIAL_SUBSIDY_BTC: u64 = 50;

/// Satoshis per bitcoin.
pub const SATS_PER_BTC: i64 = 100_000_000;

/// Minimum blocks between now and a new contract's expiry.
pub const MIN_EXPIRY_BLOCKS: u64 = 100;

/// Maximum blocks between now and a contract's expiry (about a year).
pub const MAX_EXPIRY_BLOCKS: u64 = 52_560;

/// Relative timelock (CSV) guarding the fallback branch of role paths.
pub const TIMEOUT_CSV_BLOCKS: u64 = 144;

/// Blocks before expiry during which VTXO sweeps are allowed.
pub const SWEEP_WINDOW_BLOCKS: u64 = 144;

/// Blocks after expiry before the timeout exit path opens.
pub const TIMEOUT_EXIT_DELAY_BLOCKS: u64 = 144;

/// Early-exit fee in percent of notional.
pub const EARLY_EXIT_FEE_PERCENT: u64 = 5;

/// Upper bound for strike rates in BTC/PH/day.
#[must_use]
pub fn max_strike_rate() -> Decimal {
    Decimal::new(1000, 0)
}

/// Smallest accepted contract size in BTC.
#[must_use]
pub fn dust_size() -> Decimal {
    Decimal::new(1, 3)
}

/// Largest accepted contract size in BTC.
#[must_use]
pub fn max_contract_size() -> Decimal {
    Decimal::new(100, 0)
}

/// Default capacity of the broadcast journal.
pub const DEFAULT_JOURNAL_CAPACITY: usize = 10_000;

/// Default lifetime of a swap offer when the caller gives none, in seconds.
pub const DEFAULT_OFFER_TTL_SECS: i64 = 24 * 3600;

/// Tapscript leaf version.
pub const TAPSCRIPT_LEAF_VERSION: u8 = 0xc0;
