//! Chain oracle: the engine's only view of the Bitcoin chain.
//!
//! Calls are blocking. Read failures surface as
//! [`HashPerpError::OracleUnavailable`] and are retryable; the engine never
//! mutates state after a failed read.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};

use hashperp_script::transaction::{from_bytes, txid};
use hashperp_script::{SchnorrVerifier, Transaction};
use hashperp_types::{HashPerpError, Result, Txid, XOnlyKey};
use parking_lot::{Mutex, RwLock};
use rust_decimal::Decimal;
use tracing::debug;

/// Read and broadcast access to the chain.
pub trait ChainOracle: Send + Sync {
    fn current_height(&self) -> Result<u64>;

    /// Network hash rate in PH/s as of `height`.
    fn hash_rate_at(&self, height: u64) -> Result<Decimal>;

    /// Submit a serialized transaction; returns its txid.
    fn broadcast(&self, raw_tx: &[u8]) -> Result<Txid>;

    /// `None` when the transaction is unknown to the network.
    fn confirmations(&self, txid: &Txid) -> Result<Option<u32>>;

    /// BIP340 verification of `signature` over a 32-byte digest.
    fn verify_signature(&self, message: &[u8; 32], signature: &[u8], key: &XOnlyKey) -> bool;
}

// =================================================================
// Simulated chain
// =================================================================

#[derive(Debug, Default)]
struct Faults {
    failing_reads: u32,
    rejected_broadcasts: u32,
    /// Transactions that reach the mempool but whose submission reports an error.
    timed_out_broadcasts: u32,
}

/// In-process chain used by tests and local development.
///
/// Hash rate is a step function: a sample set at height `h` holds until the
/// next sample. Broadcast transactions are included at the height current
/// when they were submitted.
pub struct SimulatedChain {
    height: AtomicU64,
    hash_rates: RwLock<BTreeMap<u64, Decimal>>,
    default_hash_rate: Decimal,
    included: RwLock<HashMap<Txid, (u64, Transaction)>>,
    broadcast_log: Mutex<Vec<Txid>>,
    faults: Mutex<Faults>,
    verifier: SchnorrVerifier,
}

impl SimulatedChain {
    /// A chain at `height` with a flat 600 EH/s network.
    #[must_use]
    pub fn new(height: u64) -> Self {
        Self::with_hash_rate(height, Decimal::from(600_000))
    }

    #[must_use]
    pub fn with_hash_rate(height: u64, hash_rate_ph: Decimal) -> Self {
        Self {
            height: AtomicU64::new(height),
            hash_rates: RwLock::new(BTreeMap::new()),
            default_hash_rate: hash_rate_ph,
            included: RwLock::new(HashMap::new()),
            broadcast_log: Mutex::new(Vec::new()),
            faults: Mutex::new(Faults::default()),
            verifier: SchnorrVerifier::new(),
        }
    }

    pub fn set_height(&self, height: u64) {
        self.height.store(height, Ordering::SeqCst);
    }

    /// Mine `blocks` empty blocks; returns the new height.
    pub fn advance(&self, blocks: u64) -> u64 {
        self.height.fetch_add(blocks, Ordering::SeqCst) + blocks
    }

    /// Hash rate from `height` onwards, until the next sample.
    pub fn set_hash_rate(&self, height: u64, hash_rate_ph: Decimal) {
        self.hash_rates.write().insert(height, hash_rate_ph);
    }

    /// The next `n` reads fail with `OracleUnavailable`.
    pub fn fail_reads(&self, n: u32) {
        self.faults.lock().failing_reads = n;
    }

    /// The next `n` broadcasts are rejected and never reach the network.
    pub fn reject_broadcasts(&self, n: u32) {
        self.faults.lock().rejected_broadcasts = n;
    }

    /// The next `n` broadcasts land but report a timeout to the caller.
    pub fn time_out_broadcasts(&self, n: u32) {
        self.faults.lock().timed_out_broadcasts = n;
    }

    /// Every txid accepted, in submission order.
    #[must_use]
    pub fn broadcasts(&self) -> Vec<Txid> {
        self.broadcast_log.lock().clone()
    }

    #[must_use]
    pub fn transaction(&self, txid: &Txid) -> Option<Transaction> {
        self.included.read().get(txid).map(|(_, tx)| tx.clone())
    }

    fn check_read(&self, operation: &str) -> Result<()> {
        let mut faults = self.faults.lock();
        if faults.failing_reads > 0 {
            faults.failing_reads -= 1;
            return Err(HashPerpError::OracleUnavailable {
                operation: operation.to_string(),
                reason: "simulated outage".to_string(),
            });
        }
        Ok(())
    }
}

impl ChainOracle for SimulatedChain {
    fn current_height(&self) -> Result<u64> {
        self.check_read("current_height")?;
        Ok(self.height.load(Ordering::SeqCst))
    }

    fn hash_rate_at(&self, height: u64) -> Result<Decimal> {
        self.check_read("hash_rate_at")?;
        let tip = self.height.load(Ordering::SeqCst);
        if height > tip {
            return Err(HashPerpError::OracleUnavailable {
                operation: "hash_rate_at".to_string(),
                reason: format!("height {height} is above the tip {tip}"),
            });
        }
        Ok(self
            .hash_rates
            .read()
            .range(..=height)
            .next_back()
            .map_or(self.default_hash_rate, |(_, rate)| *rate))
    }

    fn broadcast(&self, raw_tx: &[u8]) -> Result<Txid> {
        let tx = from_bytes(raw_tx)?;
        let txid = txid(&tx);
        let (rejected, timed_out) = {
            let mut faults = self.faults.lock();
            if faults.rejected_broadcasts > 0 {
                faults.rejected_broadcasts -= 1;
                (true, false)
            } else if faults.timed_out_broadcasts > 0 {
                faults.timed_out_broadcasts -= 1;
                (false, true)
            } else {
                (false, false)
            }
        };
        if rejected {
            return Err(HashPerpError::BroadcastFailed {
                stage: "submit".to_string(),
                txid,
                reason: "rejected by simulated node".to_string(),
            });
        }

        let height = self.height.load(Ordering::SeqCst);
        let fresh = self
            .included
            .write()
            .insert(txid, (height, tx))
            .is_none();
        if fresh {
            self.broadcast_log.lock().push(txid);
        }
        debug!(%txid, height, fresh, "simulated broadcast");

        if timed_out {
            return Err(HashPerpError::OracleUnavailable {
                operation: "broadcast".to_string(),
                reason: "timed out waiting for node".to_string(),
            });
        }
        Ok(txid)
    }

    fn confirmations(&self, txid: &Txid) -> Result<Option<u32>> {
        self.check_read("confirmations")?;
        let tip = self.height.load(Ordering::SeqCst);
        Ok(self.included.read().get(txid).map(|(height, _)| {
            u32::try_from(tip.saturating_sub(*height)).unwrap_or(u32::MAX)
        }))
    }

    fn verify_signature(&self, message: &[u8; 32], signature: &[u8], key: &XOnlyKey) -> bool {
        self.verifier.verify(message, signature, key)
    }
}
