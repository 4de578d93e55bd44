//! # VTXO: a unit of collateral bound to one contract position
//!
//! A VTXO is immutable once created. The only mutation is its single,
//! one-way deactivation, which happens in exactly one of three ways:
//!
//! - **swap**: a successor in the same contract names it in `swapped_from`
//! - **rollover**: a successor in another contract names it in `rolled_from`
//! - **exit / sweep**: no successor; `exit_txid` is set
//!
//! Provenance links form a singly linked list that ends at the VTXO
//! created alongside the original contract.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{ContractId, HashPerpError, Position, Result, Txid, UserId, VtxoId};

/// Which Taproot leaf family this VTXO's collateral is locked under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScriptPathKind {
    /// Buyer's conditional win branch with CSV fallback to the seller.
    Buyer,
    /// Seller's conditional win branch with CSV fallback to the buyer.
    Seller,
    /// 2-of-2 cooperative settlement.
    Cooperative,
    /// CSV timeout path.
    Timeout,
    /// Single-key recovery.
    Sweep,
}

impl ScriptPathKind {
    #[must_use]
    pub fn for_position(position: Position) -> Self {
        match position {
            Position::Buyer => Self::Buyer,
            Position::Seller => Self::Seller,
        }
    }
}

impl std::fmt::Display for ScriptPathKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buyer => write!(f, "BUYER_PATH"),
            Self::Seller => write!(f, "SELLER_PATH"),
            Self::Cooperative => write!(f, "COOPERATIVE"),
            Self::Timeout => write!(f, "TIMEOUT"),
            Self::Sweep => write!(f, "SWEEP"),
        }
    }
}

/// A virtual transaction output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vtxo {
    pub id: VtxoId,
    pub contract_id: ContractId,
    pub owner_id: UserId,
    /// Collateral in BTC.
    pub amount: Decimal,
    pub script_path: ScriptPathKind,
    pub created_at: DateTime<Utc>,
    /// Owner's authorization for this VTXO (empty for contract-origin VTXOs).
    pub signature: Vec<u8>,
    /// P2TR scriptPubKey of the output holding the collateral.
    pub script_pubkey: Vec<u8>,
    pub active: bool,
    pub swapped_from: Option<VtxoId>,
    pub rolled_from: Option<VtxoId>,
    pub rolled_to: Option<VtxoId>,
    pub exit_txid: Option<Txid>,
    pub exited_at: Option<DateTime<Utc>>,
    pub deactivated_at: Option<DateTime<Utc>>,
    pub version: u64,
}

impl Vtxo {
    /// A new active VTXO with no provenance.
    #[must_use]
    pub fn new(
        contract_id: ContractId,
        owner_id: UserId,
        amount: Decimal,
        script_path: ScriptPathKind,
        signature: Vec<u8>,
    ) -> Self {
        Self {
            id: VtxoId::new(),
            contract_id,
            owner_id,
            amount,
            script_path,
            created_at: Utc::now(),
            signature,
            script_pubkey: Vec::new(),
            active: true,
            swapped_from: None,
            rolled_from: None,
            rolled_to: None,
            exit_txid: None,
            exited_at: None,
            deactivated_at: None,
            version: 0,
        }
    }

    /// Successor in the same contract after an ownership transfer.
    #[must_use]
    pub fn swap_successor(&self, new_owner: UserId, signature: Vec<u8>) -> Self {
        let mut next = Self::new(
            self.contract_id,
            new_owner,
            self.amount,
            self.script_path,
            signature,
        );
        next.swapped_from = Some(self.id);
        next
    }

    /// Successor in another contract.
    #[must_use]
    pub fn rollover_successor(
        &self,
        contract_id: ContractId,
        script_path: ScriptPathKind,
        signature: Vec<u8>,
    ) -> Self {
        let mut next = Self::new(contract_id, self.owner_id, self.amount, script_path, signature);
        next.rolled_from = Some(self.id);
        next
    }

    /// The VTXO this one was derived from, if any.
    #[must_use]
    pub fn predecessor(&self) -> Option<VtxoId> {
        self.swapped_from.or(self.rolled_from)
    }

    fn deactivate(&mut self) -> Result<()> {
        if !self.active {
            return Err(HashPerpError::InvalidVtxoTransition {
                vtxo_id: self.id,
                reason: "already deactivated".to_string(),
            });
        }
        self.active = false;
        self.deactivated_at = Some(Utc::now());
        Ok(())
    }

    /// Deactivate because a swap successor now holds the position.
    pub fn retire_for_swap(&mut self) -> Result<()> {
        self.deactivate()
    }

    /// Deactivate because the position moved to `successor` in another contract.
    pub fn retire_for_rollover(&mut self, successor: VtxoId) -> Result<()> {
        self.deactivate()?;
        self.rolled_to = Some(successor);
        Ok(())
    }

    /// Deactivate because the collateral left via an on-chain transaction.
    pub fn retire_for_exit(&mut self, exit_txid: Txid) -> Result<()> {
        self.deactivate()?;
        self.exit_txid = Some(exit_txid);
        self.exited_at = self.deactivated_at;
        Ok(())
    }

    /// Deactivate because the contract settled through the coinflip chain.
    pub fn retire_for_settlement(&mut self, settlement_txid: Txid) -> Result<()> {
        self.retire_for_exit(settlement_txid)
    }

    /// Fail unless active.
    pub fn ensure_active(&self) -> Result<()> {
        if self.active {
            Ok(())
        } else {
            Err(HashPerpError::VtxoNotActive(self.id))
        }
    }
}

/// Canonical message a new owner signs to accept a VTXO.
///
/// Format: `SHA-256("hashperp:swap:v1:" || vtxo_id || new_owner || contract_id)`
#[must_use]
pub fn swap_authorization_message(
    vtxo_id: VtxoId,
    new_owner: UserId,
    contract_id: ContractId,
) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(b"hashperp:swap:v1:");
    hasher.update(vtxo_id.as_bytes());
    hasher.update(new_owner.as_bytes());
    hasher.update(contract_id.as_bytes());
    hasher.finalize().into()
}

/// Canonical message an owner signs to escrow a pre-signed exit.
///
/// Format: `SHA-256("hashperp:exit:v1:" || vtxo_id || owner || expiry_height)`
#[must_use]
pub fn exit_authorization_message(vtxo_id: VtxoId, owner: UserId, expiry_height: u64) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(b"hashperp:exit:v1:");
    hasher.update(vtxo_id.as_bytes());
    hasher.update(owner.as_bytes());
    hasher.update(expiry_height.to_le_bytes());
    hasher.finalize().into()
}

/// Canonical message an owner signs to carry a VTXO into another contract.
///
/// Format: `SHA-256("hashperp:rollover:v1:" || vtxo_id || owner || new_contract_id)`
#[must_use]
pub fn rollover_authorization_message(
    vtxo_id: VtxoId,
    owner: UserId,
    new_contract_id: ContractId,
) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(b"hashperp:rollover:v1:");
    hasher.update(vtxo_id.as_bytes());
    hasher.update(owner.as_bytes());
    hasher.update(new_contract_id.as_bytes());
    hasher.finalize().into()
}

/// Test helpers.
#[cfg(any(test, feature = "test-helpers"))]
impl Vtxo {
    pub fn dummy(contract_id: ContractId, owner_id: UserId) -> Self {
        Self::new(
            contract_id,
            owner_id,
            Decimal::new(5, 1),
            ScriptPathKind::Buyer,
            Vec::new(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_vtxo() -> Vtxo {
        Vtxo::dummy(ContractId::new(), UserId::new())
    }

    #[test]
    fn swap_successor_links_back() {
        let v = make_vtxo();
        let owner = UserId::new();
        let next = v.swap_successor(owner, vec![1, 2, 3]);
        assert_eq!(next.swapped_from, Some(v.id));
        assert_eq!(next.predecessor(), Some(v.id));
        assert_eq!(next.owner_id, owner);
        assert_eq!(next.amount, v.amount);
        assert!(next.active);
        assert_ne!(next.id, v.id);
        assert!(next.script_pubkey.is_empty());
    }

    #[test]
    fn rollover_successor_keeps_owner() {
        let v = make_vtxo();
        let target = ContractId::new();
        let next = v.rollover_successor(target, ScriptPathKind::Seller, vec![]);
        assert_eq!(next.contract_id, target);
        assert_eq!(next.owner_id, v.owner_id);
        assert_eq!(next.rolled_from, Some(v.id));
        assert_eq!(next.predecessor(), Some(v.id));
    }

    #[test]
    fn deactivation_is_one_way() {
        let mut v = make_vtxo();
        v.retire_for_swap().unwrap();
        assert!(!v.active);
        assert!(v.deactivated_at.is_some());
        let err = v.retire_for_exit(Txid([1u8; 32])).unwrap_err();
        assert!(matches!(err, HashPerpError::InvalidVtxoTransition { .. }));
        assert!(v.exit_txid.is_none());
    }

    #[test]
    fn exit_sets_txid() {
        let mut v = make_vtxo();
        v.retire_for_exit(Txid([9u8; 32])).unwrap();
        assert_eq!(v.exit_txid, Some(Txid([9u8; 32])));
        assert!(v.exited_at.is_some());
        assert!(matches!(v.ensure_active(), Err(HashPerpError::VtxoNotActive(_))));
    }

    #[test]
    fn rollover_records_forward_link() {
        let mut v = make_vtxo();
        let next = VtxoId::new();
        v.retire_for_rollover(next).unwrap();
        assert_eq!(v.rolled_to, Some(next));
    }

    #[test]
    fn authorization_messages_are_domain_separated() {
        let vtxo = VtxoId::new();
        let user = UserId::new();
        let contract = ContractId::new();
        let swap = swap_authorization_message(vtxo, user, contract);
        let roll = rollover_authorization_message(vtxo, user, contract);
        assert_ne!(swap, roll);
        assert_eq!(swap, swap_authorization_message(vtxo, user, contract));
        assert_ne!(
            exit_authorization_message(vtxo, user, 100),
            exit_authorization_message(vtxo, user, 101)
        );
    }
}
