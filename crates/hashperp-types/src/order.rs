//! Order types for the HashPerp order book.
//!
//! Orders are bucketed by `(ContractKind, expiry_height)`. A BUY is an offer
//! to take the buyer side of a contract at `strike_rate` or better; a SELL
//! the seller side.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{ContractId, ContractKind, HashPerpError, OrderId, Position, Result, UserId};

/// Which side of the book this order is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// Contract position this side ends up holding.
    #[must_use]
    pub fn position(self) -> Position {
        match self {
            Self::Buy => Position::Buyer,
            Self::Sell => Position::Seller,
        }
    }

    #[must_use]
    pub fn opposite(self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
        }
    }
}

/// Lifecycle status of an order. OPEN is the only non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum OrderStatus {
    Open,
    Matched,
    Canceled,
    Expired,
}

impl OrderStatus {
    #[must_use]
    pub fn can_transition_to(&self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Open, Self::Matched | Self::Canceled | Self::Expired)
        )
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => write!(f, "OPEN"),
            Self::Matched => write!(f, "MATCHED"),
            Self::Canceled => write!(f, "CANCELED"),
            Self::Expired => write!(f, "EXPIRED"),
        }
    }
}

/// Book partition key: orders only cross within the same bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct OrderBucket {
    pub kind: ContractKind,
    pub expiry_height: u64,
}

impl std::fmt::Display for OrderBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.kind, self.expiry_height)
    }
}

/// A standing order to open one side of a contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub side: OrderSide,
    pub kind: ContractKind,
    pub strike_rate: Decimal,
    pub expiry_height: u64,
    pub size: Decimal,
    pub status: OrderStatus,
    pub matched_order: Option<OrderId>,
    pub contract_id: Option<ContractId>,
    /// Arrival sequence; lower sequences have time priority.
    pub sequence: u64,
    /// Parent order whose unfilled remainder this order carries.
    pub residual_of: Option<OrderId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
}

impl Order {
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn open(
        user_id: UserId,
        side: OrderSide,
        kind: ContractKind,
        strike_rate: Decimal,
        expiry_height: u64,
        size: Decimal,
        sequence: u64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: OrderId::new(),
            user_id,
            side,
            kind,
            strike_rate,
            expiry_height,
            size,
            status: OrderStatus::Open,
            matched_order: None,
            contract_id: None,
            sequence,
            residual_of: None,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    #[must_use]
    pub fn bucket(&self) -> OrderBucket {
        OrderBucket {
            kind: self.kind,
            expiry_height: self.expiry_height,
        }
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.status == OrderStatus::Open
    }

    /// The OPEN remainder after `filled` of this order's size was matched.
    ///
    /// Keeps the parent's sequence so the remainder does not lose its place.
    /// A remainder below `min_size` could never open a contract, so none is
    /// produced and the parent closes fully matched.
    #[must_use]
    pub fn residual(&self, filled: Decimal, min_size: Decimal) -> Option<Self> {
        let remaining = self.size - filled;
        if remaining <= Decimal::ZERO || remaining < min_size {
            return None;
        }
        let mut rest = Self::open(
            self.user_id,
            self.side,
            self.kind,
            self.strike_rate,
            self.expiry_height,
            remaining,
            self.sequence,
        );
        rest.residual_of = Some(self.id);
        Some(rest)
    }

    /// Mark MATCHED against `counter`, producing `contract_id`.
    pub fn mark_matched(&mut self, counter: OrderId, contract_id: ContractId) -> Result<()> {
        self.transition_to(OrderStatus::Matched)?;
        self.matched_order = Some(counter);
        self.contract_id = Some(contract_id);
        Ok(())
    }

    pub fn transition_to(&mut self, target: OrderStatus) -> Result<()> {
        if !self.status.can_transition_to(target) {
            return Err(HashPerpError::InvalidOrderStatus {
                order_id: self.id,
                actual: self.status,
            });
        }
        self.status = target;
        self.updated_at = Utc::now();
        Ok(())
    }
}

/// Test helpers.
#[cfg(any(test, feature = "test-helpers"))]
impl Order {
    pub fn dummy(side: OrderSide, strike_rate: Decimal, size: Decimal, sequence: u64) -> Self {
        Self::open(
            UserId::new(),
            side,
            ContractKind::Call,
            strike_rate,
            1_000,
            size,
            sequence,
        )
    }

    pub fn dummy_for_user(
        user_id: UserId,
        side: OrderSide,
        strike_rate: Decimal,
        size: Decimal,
        sequence: u64,
    ) -> Self {
        let mut order = Self::dummy(side, strike_rate, size, sequence);
        order.user_id = user_id;
        order
    }
}
