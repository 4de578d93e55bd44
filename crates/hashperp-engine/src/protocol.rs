//! Settlement protocol and idempotent broadcasting.
//!
//! ```text
//! setup ──► final ──► settlement
//! ```
//!
//! Stages are broadcast strictly in order. Each accepted stage is recorded
//! in the broadcast journal, so a retried settlement skips stages that
//! already reached the network and resumes at the first missing one.
//!
//! A broadcast that errors may still have landed (a timeout after the node
//! accepted it). Before reporting `BroadcastFailed` the broadcaster asks the
//! oracle whether the expected txid is known; if it is, the stage counts as
//! broadcast.

use std::sync::Arc;

use hashperp_script::transaction::{to_bytes, txid};
use hashperp_script::{SettlementChain, SettlementStage, Transaction};
use hashperp_types::{ContractId, HashPerpError, PreSignedExitId, Result, Txid, VtxoId};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::idempotency::IdempotencyJournal;
use crate::oracle::ChainOracle;

/// What a broadcast is for; one on-chain effect per key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BroadcastKey {
    Settlement(ContractId, SettlementStage),
    ContractExit(ContractId),
    Sweep(VtxoId),
    PresignedExit(PreSignedExitId),
}

impl BroadcastKey {
    #[must_use]
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Settlement(_, stage) => stage.as_str(),
            Self::ContractExit(_) => "exit",
            Self::Sweep(_) => "sweep",
            Self::PresignedExit(_) => "pre_signed_exit",
        }
    }
}

/// Txids of a completed settlement chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SettlementReceipt {
    pub setup_txid: Txid,
    pub final_txid: Txid,
    pub settlement_txid: Txid,
}

pub struct Broadcaster {
    oracle: Arc<dyn ChainOracle>,
    journal: Mutex<IdempotencyJournal<BroadcastKey, Txid>>,
}

impl Broadcaster {
    #[must_use]
    pub fn new(oracle: Arc<dyn ChainOracle>, capacity: usize) -> Self {
        Self {
            oracle,
            journal: Mutex::new(IdempotencyJournal::new(capacity)),
        }
    }

    /// Txid already broadcast for `key`, if any.
    #[must_use]
    pub fn recorded(&self, key: &BroadcastKey) -> Option<Txid> {
        self.journal.lock().get(key)
    }

    pub fn broadcast(&self, key: BroadcastKey, tx: &Transaction) -> Result<Txid> {
        self.broadcast_raw(key, &to_bytes(tx), txid(tx))
    }

    /// Broadcast serialized bytes whose txid is `expected`.
    pub fn broadcast_raw(&self, key: BroadcastKey, raw_tx: &[u8], expected: Txid) -> Result<Txid> {
        if let Some(txid) = self.recorded(&key) {
            debug!(?key, %txid, "already broadcast, skipping");
            return Ok(txid);
        }

        let txid = match self.oracle.broadcast(raw_tx) {
            Ok(txid) => txid,
            Err(err) => self.recheck(key, expected, &err)?,
        };
        // a concurrent retry may have recorded the same stage
        let mut journal = self.journal.lock();
        if !journal.contains(&key) {
            journal.record(key, txid)?;
        }
        debug!(?key, %txid, "broadcast accepted");
        Ok(txid)
    }

    fn recheck(&self, key: BroadcastKey, expected: Txid, err: &HashPerpError) -> Result<Txid> {
        match self.oracle.confirmations(&expected) {
            Ok(Some(confirmations)) => {
                warn!(
                    ?key,
                    txid = %expected,
                    confirmations,
                    error = %err,
                    "broadcast errored but transaction is known to the network"
                );
                Ok(expected)
            }
            Ok(None) => Err(broadcast_failed(key, expected, err.to_string())),
            Err(recheck_err) => Err(broadcast_failed(
                key,
                expected,
                format!("{err}; confirmation check failed: {recheck_err}"),
            )),
        }
    }

    /// Drive a settlement chain to the network, stage by stage.
    pub fn broadcast_settlement(
        &self,
        contract_id: ContractId,
        chain: &SettlementChain,
    ) -> Result<SettlementReceipt> {
        let mut txids = [Txid([0; 32]); 3];
        for (slot, stage) in SettlementStage::ORDER.into_iter().enumerate() {
            let key = BroadcastKey::Settlement(contract_id, stage);
            txids[slot] = self.broadcast(key, chain.stage(stage))?;
        }
        let receipt = SettlementReceipt {
            setup_txid: txids[0],
            final_txid: txids[1],
            settlement_txid: txids[2],
        };
        info!(
            %contract_id,
            setup = %receipt.setup_txid,
            final_tx = %receipt.final_txid,
            settlement = %receipt.settlement_txid,
            "settlement chain broadcast"
        );
        Ok(receipt)
    }

    #[must_use]
    pub fn journal_len(&self) -> usize {
        self.journal.lock().len()
    }
}

fn broadcast_failed(key: BroadcastKey, txid: Txid, reason: String) -> HashPerpError {
    warn!(?key, %txid, %reason, "broadcast failed");
    HashPerpError::BroadcastFailed {
        stage: key.stage().to_string(),
        txid,
        reason,
    }
}
