//! Escrowed exit transactions a VTXO owner signs ahead of time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ContractId, HashPerpError, PreSignedExitId, Result, Txid, UserId, VtxoId};

/// A fully signed exit transaction kept ready for an emergency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreSignedExit {
    pub id: PreSignedExitId,
    pub vtxo_id: VtxoId,
    pub contract_id: ContractId,
    pub user_id: UserId,
    /// BIP144 serialized transaction, hex.
    pub exit_tx_hex: String,
    pub exit_txid: Txid,
    pub created_at: DateTime<Utc>,
    pub used: bool,
    pub used_at: Option<DateTime<Utc>>,
}

impl PreSignedExit {
    #[must_use]
    pub fn new(
        vtxo_id: VtxoId,
        contract_id: ContractId,
        user_id: UserId,
        exit_tx_hex: String,
        exit_txid: Txid,
    ) -> Self {
        Self {
            id: PreSignedExitId::new(),
            vtxo_id,
            contract_id,
            user_id,
            exit_tx_hex,
            exit_txid,
            created_at: Utc::now(),
            used: false,
            used_at: None,
        }
    }

    /// One-way: a used exit can never be used again.
    pub fn mark_used(&mut self) -> Result<()> {
        if self.used {
            return Err(HashPerpError::PreSignedExitUsed(self.id));
        }
        self.used = true;
        self.used_at = Some(Utc::now());
        Ok(())
    }

    /// Raw transaction bytes.
    pub fn tx_bytes(&self) -> Result<Vec<u8>> {
        hex::decode(&self.exit_tx_hex)
            .map_err(|e| HashPerpError::Serialization(format!("exit tx hex: {e}")))
    }
}
