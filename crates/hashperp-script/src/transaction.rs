//! Helpers over [`bitcoin::Transaction`]: ledger txids, consensus encoding
//! and satoshi amounts.

use bitcoin::consensus::encode;
use bitcoin::hashes::Hash;
use bitcoin::transaction::Version;
use bitcoin::{Amount, OutPoint, Transaction, absolute};
use hashperp_types::{HashPerpError, Result, Txid, VtxoId, constants::SATS_PER_BTC};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use crate::tagged::vtxo_anchor_txid;

/// Version 2 transaction with no inputs or outputs yet.
#[must_use]
pub fn unsigned(lock_time: absolute::LockTime) -> Transaction {
    Transaction {
        version: Version::TWO,
        lock_time,
        input: Vec::new(),
        output: Vec::new(),
    }
}

/// Txid of `tx`, witness excluded.
#[must_use]
pub fn txid(tx: &Transaction) -> Txid {
    Txid(tx.compute_txid().to_byte_array())
}

/// BIP144 serialization.
#[must_use]
pub fn to_bytes(tx: &Transaction) -> Vec<u8> {
    encode::serialize(tx)
}

#[must_use]
pub fn to_hex(tx: &Transaction) -> String {
    encode::serialize_hex(tx)
}

/// Parse a serialized transaction. Truncated input and trailing bytes are rejected.
pub fn from_bytes(raw: &[u8]) -> Result<Transaction> {
    encode::deserialize(raw)
        .map_err(|e| HashPerpError::Serialization(format!("malformed transaction: {e}")))
}

/// Sum of all output values in satoshis.
#[must_use]
pub fn output_sats(tx: &Transaction) -> u64 {
    tx.output.iter().map(|out| out.value.to_sat()).sum()
}

/// Virtual outpoint of a VTXO.
#[must_use]
pub fn vtxo_outpoint(vtxo_id: VtxoId) -> OutPoint {
    OutPoint::new(
        bitcoin::Txid::from_byte_array(vtxo_anchor_txid(vtxo_id)),
        0,
    )
}

/// Block-height `nLockTime`.
pub fn height_lock_time(height: u64) -> Result<absolute::LockTime> {
    u32::try_from(height)
        .ok()
        .and_then(|h| absolute::LockTime::from_height(h).ok())
        .ok_or_else(|| HashPerpError::Script(format!("height {height} is not a block locktime")))
}

/// Convert a BTC amount. Sub-satoshi precision is rejected.
pub fn btc_to_amount(btc: Decimal) -> Result<Amount> {
    if btc < Decimal::ZERO {
        return Err(HashPerpError::Script(format!("negative amount {btc}")));
    }
    let sats = btc * Decimal::from(SATS_PER_BTC);
    if sats.fract() != Decimal::ZERO {
        return Err(HashPerpError::Script(format!(
            "amount {btc} has sub-satoshi precision"
        )));
    }
    sats.to_u64()
        .map(Amount::from_sat)
        .ok_or_else(|| HashPerpError::Script(format!("amount {btc} out of range")))
}
