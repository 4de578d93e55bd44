//! # Contract: the bilateral hash-rate derivative
//!
//! ## State Machine
//!
//! ```text
//!  ┌─────────┐ both VTXOs ┌────────┐ settle / exit / rollover ┌──────────────────────────────┐
//!  │ PENDING ├───────────▶│ ACTIVE ├─────────────────────────▶│ SETTLED | EXITED | ROLLED_OVER│
//!  └─────────┘            └──┬──┬──┘                          └──────────────────────────────┘
//!                            │  │ first side swept   ┌────────────────────┐ second side ┌───────────┐
//!                            │  └───────────────────▶│ SETTLEMENT_PENDING ├────────────▶│ COMPLETED │
//!                            │ near expiry           └────────────────────┘             └───────────┘
//!                            ▼
//!                    ┌─────────────────┐
//!                    │ CLOSE_TO_EXPIRY │ (still live, same exits as ACTIVE)
//!                    └─────────────────┘
//! ```
//!
//! A PENDING contract whose funded side sweeps out before the other side is
//! ever bound goes straight to COMPLETED.
//!
//! Transitions are monotonic: nothing ever returns to ACTIVE.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{ContractId, HashPerpError, Result, Txid, UserId, VtxoId};

/// CALL pays the buyer when the rate rises, PUT when it falls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum ContractKind {
    Call,
    Put,
}

impl std::fmt::Display for ContractKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Call => write!(f, "CALL"),
            Self::Put => write!(f, "PUT"),
        }
    }
}

/// Lifecycle status of a contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContractStatus {
    Pending,
    Active,
    CloseToExpiry,
    SettlementPending,
    SettlementInProgress,
    Settled,
    Exited,
    RolledOver,
    Completed,
}

impl ContractStatus {
    /// Can a contract move from this status to `target`?
    #[must_use]
    pub fn can_transition_to(&self, target: Self) -> bool {
        use ContractStatus::{
            Active, CloseToExpiry, Completed, Exited, Pending, RolledOver, Settled,
            SettlementInProgress, SettlementPending,
        };
        matches!(
            (self, target),
            (Pending, Active | Completed)
                | (
                    Active,
                    CloseToExpiry
                        | SettlementPending
                        | SettlementInProgress
                        | Settled
                        | Exited
                        | RolledOver
                )
                | (
                    CloseToExpiry,
                    SettlementPending | SettlementInProgress | Settled | Exited | RolledOver
                )
                | (SettlementInProgress, Settled)
                | (SettlementPending, Completed)
        )
    }

    /// Live contracts hold two active VTXOs and accept swaps, exits and settlement.
    #[must_use]
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Active | Self::CloseToExpiry)
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Settled | Self::Exited | Self::RolledOver | Self::Completed
        )
    }
}

impl std::fmt::Display for ContractStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Active => write!(f, "ACTIVE"),
            Self::CloseToExpiry => write!(f, "CLOSE_TO_EXPIRY"),
            Self::SettlementPending => write!(f, "SETTLEMENT_PENDING"),
            Self::SettlementInProgress => write!(f, "SETTLEMENT_IN_PROGRESS"),
            Self::Settled => write!(f, "SETTLED"),
            Self::Exited => write!(f, "EXITED"),
            Self::RolledOver => write!(f, "ROLLED_OVER"),
            Self::Completed => write!(f, "COMPLETED"),
        }
    }
}

/// One of the two sides of a contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum Position {
    Buyer,
    Seller,
}

impl Position {
    #[must_use]
    pub fn counterparty(self) -> Self {
        match self {
            Self::Buyer => Self::Seller,
            Self::Seller => Self::Buyer,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Buyer => "buyer",
            Self::Seller => "seller",
        }
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A bilateral hash-rate derivative position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contract {
    pub id: ContractId,
    pub kind: ContractKind,
    /// Strike in BTC per PH/s per day.
    pub strike_rate: Decimal,
    pub expiry_height: u64,
    /// Estimated wall-clock time of `expiry_height`.
    pub expiry_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub status: ContractStatus,
    pub buyer_id: UserId,
    pub seller_id: UserId,
    /// Notional in BTC. Immutable after creation.
    pub size: Decimal,
    pub buyer_vtxo: Option<VtxoId>,
    pub seller_vtxo: Option<VtxoId>,
    pub settlement_txid: Option<Txid>,
    pub settlement_rate: Option<Decimal>,
    pub rolled_over_to: Option<ContractId>,
    pub rolled_over_from: Option<ContractId>,
    pub buyer_exited: bool,
    pub seller_exited: bool,
    pub buyer_exit_txid: Option<Txid>,
    pub seller_exit_txid: Option<Txid>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Optimistic concurrency counter, bumped by the store on every update.
    pub version: u64,
}

impl Contract {
    /// A fresh PENDING contract with no VTXOs bound yet.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn pending(
        kind: ContractKind,
        strike_rate: Decimal,
        expiry_height: u64,
        expiry_date: DateTime<Utc>,
        buyer_id: UserId,
        seller_id: UserId,
        size: Decimal,
    ) -> Self {
        Self {
            id: ContractId::new(),
            kind,
            strike_rate,
            expiry_height,
            expiry_date,
            created_at: Utc::now(),
            status: ContractStatus::Pending,
            buyer_id,
            seller_id,
            size,
            buyer_vtxo: None,
            seller_vtxo: None,
            settlement_txid: None,
            settlement_rate: None,
            rolled_over_to: None,
            rolled_over_from: None,
            buyer_exited: false,
            seller_exited: false,
            buyer_exit_txid: None,
            seller_exit_txid: None,
            completed_at: None,
            version: 0,
        }
    }

    /// Collateral posted by each side.
    #[must_use]
    pub fn side_collateral(&self) -> Decimal {
        self.size / Decimal::TWO
    }

    #[must_use]
    pub fn party(&self, position: Position) -> UserId {
        match position {
            Position::Buyer => self.buyer_id,
            Position::Seller => self.seller_id,
        }
    }

    #[must_use]
    pub fn vtxo(&self, position: Position) -> Option<VtxoId> {
        match position {
            Position::Buyer => self.buyer_vtxo,
            Position::Seller => self.seller_vtxo,
        }
    }

    /// Which side does `user` hold? Buyer wins ties for self-contracts, which
    /// creation rejects anyway.
    #[must_use]
    pub fn position_of(&self, user: UserId) -> Option<Position> {
        if self.buyer_id == user {
            Some(Position::Buyer)
        } else if self.seller_id == user {
            Some(Position::Seller)
        } else {
            None
        }
    }

    #[must_use]
    pub fn position_of_vtxo(&self, vtxo_id: VtxoId) -> Option<Position> {
        if self.buyer_vtxo == Some(vtxo_id) {
            Some(Position::Buyer)
        } else if self.seller_vtxo == Some(vtxo_id) {
            Some(Position::Seller)
        } else {
            None
        }
    }

    /// Bind a VTXO and its owner to one side.
    pub fn bind(&mut self, position: Position, owner: UserId, vtxo_id: VtxoId) {
        match position {
            Position::Buyer => {
                self.buyer_id = owner;
                self.buyer_vtxo = Some(vtxo_id);
            }
            Position::Seller => {
                self.seller_id = owner;
                self.seller_vtxo = Some(vtxo_id);
            }
        }
    }

    /// Record that one side left the contract. Clears the VTXO pointer.
    pub fn mark_side_exited(&mut self, position: Position, exit_txid: Option<Txid>) {
        match position {
            Position::Buyer => {
                self.buyer_exited = true;
                self.buyer_exit_txid = exit_txid;
                self.buyer_vtxo = None;
            }
            Position::Seller => {
                self.seller_exited = true;
                self.seller_exit_txid = exit_txid;
                self.seller_vtxo = None;
            }
        }
    }

    #[must_use]
    pub fn both_sides_exited(&self) -> bool {
        self.buyer_exited && self.seller_exited
    }

    /// Winning side for a given settlement metric.
    ///
    /// CALL: buyer wins iff metric > strike. PUT: buyer wins iff metric < strike.
    /// Equality goes to the seller in both cases.
    #[must_use]
    pub fn winner_for(&self, metric: Decimal) -> Position {
        let buyer_wins = match self.kind {
            ContractKind::Call => metric > self.strike_rate,
            ContractKind::Put => metric < self.strike_rate,
        };
        if buyer_wins {
            Position::Buyer
        } else {
            Position::Seller
        }
    }

    /// Move to `target`, enforcing the transition table.
    pub fn transition_to(&mut self, target: ContractStatus) -> Result<()> {
        if !self.status.can_transition_to(target) {
            return Err(HashPerpError::InvalidContractStatus {
                contract_id: self.id,
                actual: self.status,
                required: transition_requirement(target),
            });
        }
        self.status = target;
        Ok(())
    }

    /// Fail unless the contract is live.
    pub fn ensure_live(&self) -> Result<()> {
        if self.status.is_live() {
            Ok(())
        } else {
            Err(HashPerpError::InvalidContractStatus {
                contract_id: self.id,
                actual: self.status,
                required: "ACTIVE or CLOSE_TO_EXPIRY",
            })
        }
    }
}

fn transition_requirement(target: ContractStatus) -> &'static str {
    match target {
        ContractStatus::Pending => "none (PENDING is initial)",
        ContractStatus::Active => "PENDING",
        ContractStatus::Completed => "PENDING or SETTLEMENT_PENDING",
        ContractStatus::Settled => "ACTIVE, CLOSE_TO_EXPIRY or SETTLEMENT_IN_PROGRESS",
        ContractStatus::CloseToExpiry => "ACTIVE",
        ContractStatus::SettlementPending
        | ContractStatus::SettlementInProgress
        | ContractStatus::Exited
        | ContractStatus::RolledOver => "ACTIVE or CLOSE_TO_EXPIRY",
    }
}

/// Test helpers.
#[cfg(any(test, feature = "test-helpers"))]
impl Contract {
    pub fn dummy(kind: ContractKind, strike_rate: Decimal, expiry_height: u64) -> Self {
        Self::pending(
            kind,
            strike_rate,
            expiry_height,
            Utc::now(),
            UserId::new(),
            UserId::new(),
            Decimal::ONE,
        )
    }
}
