//! Append-only audit ledger.
//!
//! Every state change of consequence writes exactly one [`LedgerEntry`] in
//! the same atomic unit as the change itself. Entries are never mutated,
//! except that callers may add `related` annotations before commit.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{ContractId, LedgerEntryId, Txid, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LedgerKind {
    ContractCreation,
    ContractSettlement,
    VtxoSwap,
    VtxoRollover,
    ContractRollover,
    ExitPathExecution,
    PositionSwap,
}

impl std::fmt::Display for LedgerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ContractCreation => write!(f, "CONTRACT_CREATION"),
            Self::ContractSettlement => write!(f, "CONTRACT_SETTLEMENT"),
            Self::VtxoSwap => write!(f, "VTXO_SWAP"),
            Self::VtxoRollover => write!(f, "VTXO_ROLLOVER"),
            Self::ContractRollover => write!(f, "CONTRACT_ROLLOVER"),
            Self::ExitPathExecution => write!(f, "EXIT_PATH_EXECUTION"),
            Self::PositionSwap => write!(f, "POSITION_SWAP"),
        }
    }
}

/// Whether the recorded action already happened on chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LedgerStatus {
    Prepared,
    Completed,
}

impl std::fmt::Display for LedgerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Prepared => write!(f, "PREPARED"),
            Self::Completed => write!(f, "COMPLETED"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: LedgerEntryId,
    pub kind: LedgerKind,
    pub status: Option<LedgerStatus>,
    pub timestamp: DateTime<Utc>,
    pub contract_id: Option<ContractId>,
    pub user_ids: Vec<UserId>,
    pub txid: Option<Txid>,
    pub amount: Option<Decimal>,
    pub rate: Option<Decimal>,
    pub block_height: Option<u64>,
    /// Free-form related entities (VTXO ids, initiator, audit reason, ...).
    pub related: BTreeMap<String, String>,
}

impl LedgerEntry {
    #[must_use]
    pub fn new(kind: LedgerKind) -> Self {
        Self {
            id: LedgerEntryId::new(),
            kind,
            status: None,
            timestamp: Utc::now(),
            contract_id: None,
            user_ids: Vec::new(),
            txid: None,
            amount: None,
            rate: None,
            block_height: None,
            related: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn contract(mut self, contract_id: ContractId) -> Self {
        self.contract_id = Some(contract_id);
        self
    }

    #[must_use]
    pub fn users(mut self, users: impl IntoIterator<Item = UserId>) -> Self {
        self.user_ids.extend(users);
        self
    }

    #[must_use]
    pub fn txid(mut self, txid: Txid) -> Self {
        self.txid = Some(txid);
        self
    }

    #[must_use]
    pub fn amount(mut self, amount: Decimal) -> Self {
        self.amount = Some(amount);
        self
    }

    #[must_use]
    pub fn rate(mut self, rate: Decimal) -> Self {
        self.rate = Some(rate);
        self
    }

    #[must_use]
    pub fn height(mut self, height: u64) -> Self {
        self.block_height = Some(height);
        self
    }

    #[must_use]
    pub fn status(mut self, status: LedgerStatus) -> Self {
        self.status = Some(status);
        self
    }

    #[must_use]
    pub fn with(mut self, key: &str, value: impl ToString) -> Self {
        self.related.insert(key.to_string(), value.to_string());
        self
    }

    /// Add a related annotation in place.
    pub fn annotate(&mut self, key: &str, value: impl ToString) {
        self.related.insert(key.to_string(), value.to_string());
    }

    #[must_use]
    pub fn involves(&self, user: UserId) -> bool {
        self.user_ids.contains(&user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_collects_fields() {
        let ct = ContractId::new();
        let user = UserId::new();
        let entry = LedgerEntry::new(LedgerKind::VtxoSwap)
            .contract(ct)
            .users([user])
            .amount(Decimal::ONE)
            .height(840_000)
            .with("position", "buyer");
        assert_eq!(entry.contract_id, Some(ct));
        assert!(entry.involves(user));
        assert_eq!(entry.related.get("position").map(String::as_str), Some("buyer"));
        assert_eq!(entry.block_height, Some(840_000));
        assert!(entry.status.is_none());
    }

    #[test]
    fn kind_display() {
        assert_eq!(LedgerKind::ExitPathExecution.to_string(), "EXIT_PATH_EXECUTION");
        assert_eq!(LedgerStatus::Prepared.to_string(), "PREPARED");
    }
}
