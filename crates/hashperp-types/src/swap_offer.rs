//! Swap offers: off-chain proposals to transfer a VTXO (and so a contract
//! position) to another user.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{ContractId, HashPerpError, Position, Result, SwapOfferId, UserId, VtxoId};

/// Lifecycle status of a swap offer. OPEN is the only non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SwapOfferStatus {
    Open,
    Accepted,
    Canceled,
    Expired,
    Rejected,
}

impl SwapOfferStatus {
    #[must_use]
    pub fn can_transition_to(&self, target: Self) -> bool {
        matches!(
            (self, target),
            (
                Self::Open,
                Self::Accepted | Self::Canceled | Self::Expired | Self::Rejected
            )
        )
    }
}

impl std::fmt::Display for SwapOfferStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => write!(f, "OPEN"),
            Self::Accepted => write!(f, "ACCEPTED"),
            Self::Canceled => write!(f, "CANCELED"),
            Self::Expired => write!(f, "EXPIRED"),
            Self::Rejected => write!(f, "REJECTED"),
        }
    }
}

/// What accepting the offer does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SwapKind {
    /// Transfer one VTXO to the acceptor.
    Simple,
    /// Exchange the two sides of a contract between its participants.
    PositionSwap,
}

impl std::fmt::Display for SwapKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Simple => write!(f, "SIMPLE"),
            Self::PositionSwap => write!(f, "POSITION_SWAP"),
        }
    }
}

/// Terms of a position swap, captured when the requester opens it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionSwapTerms {
    pub requester_position: Position,
    pub counterparty_position: Position,
    pub requester_vtxo: VtxoId,
    pub counterparty_vtxo: VtxoId,
    /// Requester's signature accepting the counterparty VTXO.
    pub requester_signature: Vec<u8>,
}

/// An offer to hand a VTXO over to another user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwapOffer {
    pub id: SwapOfferId,
    pub offeror_id: UserId,
    pub vtxo_id: VtxoId,
    pub contract_id: ContractId,
    /// Asking rate (for a position swap, the rate differential).
    pub offered_rate: Decimal,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub status: SwapOfferStatus,
    pub acceptor_id: Option<UserId>,
    pub accepted_at: Option<DateTime<Utc>>,
    /// Only this user may accept, when set.
    pub target_user: Option<UserId>,
    pub kind: SwapKind,
    pub position_swap: Option<PositionSwapTerms>,
    pub version: u64,
}

impl SwapOffer {
    #[must_use]
    pub fn open(
        offeror_id: UserId,
        vtxo_id: VtxoId,
        contract_id: ContractId,
        offered_rate: Decimal,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: SwapOfferId::new(),
            offeror_id,
            vtxo_id,
            contract_id,
            offered_rate,
            created_at: Utc::now(),
            expires_at,
            status: SwapOfferStatus::Open,
            acceptor_id: None,
            accepted_at: None,
            target_user: None,
            kind: SwapKind::Simple,
            position_swap: None,
            version: 0,
        }
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.status == SwapOfferStatus::Open
    }

    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// May `user` accept this offer?
    #[must_use]
    pub fn admits(&self, user: UserId) -> bool {
        self.target_user.is_none_or(|target| target == user)
    }

    /// Fail unless OPEN.
    pub fn ensure_open(&self) -> Result<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(HashPerpError::InvalidOfferStatus {
                offer_id: self.id,
                actual: self.status,
            })
        }
    }

    pub fn transition_to(&mut self, target: SwapOfferStatus) -> Result<()> {
        if !self.status.can_transition_to(target) {
            return Err(HashPerpError::InvalidOfferStatus {
                offer_id: self.id,
                actual: self.status,
            });
        }
        self.status = target;
        Ok(())
    }

    pub fn accept(&mut self, acceptor: UserId) -> Result<()> {
        self.transition_to(SwapOfferStatus::Accepted)?;
        self.acceptor_id = Some(acceptor);
        self.accepted_at = Some(Utc::now());
        Ok(())
    }
}

/// Aggregate view of the open offers on one contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwapOfferMarketData {
    pub contract_id: ContractId,
    pub open_offers: usize,
    pub highest_rate: Option<Decimal>,
    pub lowest_rate: Option<Decimal>,
    pub average_rate: Option<Decimal>,
    pub median_rate: Option<Decimal>,
    /// Sum of offered rates accepted in the last 24 hours.
    pub accepted_volume_24h: Decimal,
    pub buyer_side_offers: usize,
    pub seller_side_offers: usize,
}

impl SwapOfferMarketData {
    /// Summarise `rates` (open offer rates, any order).
    #[must_use]
    pub fn from_rates(
        contract_id: ContractId,
        mut rates: Vec<Decimal>,
        accepted_volume_24h: Decimal,
        buyer_side_offers: usize,
        seller_side_offers: usize,
    ) -> Self {
        rates.sort();
        let open_offers = rates.len();
        let average_rate = if rates.is_empty() {
            None
        } else {
            let sum: Decimal = rates.iter().copied().sum();
            Some(sum / Decimal::from(open_offers))
        };
        let median_rate = match open_offers {
            0 => None,
            n if n % 2 == 1 => Some(rates[n / 2]),
            n => Some((rates[n / 2 - 1] + rates[n / 2]) / Decimal::TWO),
        };
        Self {
            contract_id,
            open_offers,
            highest_rate: rates.last().copied(),
            lowest_rate: rates.first().copied(),
            average_rate,
            median_rate,
            accepted_volume_24h,
            buyer_side_offers,
            seller_side_offers,
        }
    }
}

/// Test helpers.
#[cfg(any(test, feature = "test-helpers"))]
impl SwapOffer {
    pub fn dummy(expires_at: DateTime<Utc>) -> Self {
        Self::open(
            UserId::new(),
            VtxoId::new(),
            ContractId::new(),
            Decimal::new(1, 2),
            expires_at,
        )
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    #[test]
    fn second_accept_rejected() {
        let mut offer = SwapOffer::dummy(Utc::now() + Duration::hours(1));
        offer.accept(UserId::new()).unwrap();
        let err = offer.accept(UserId::new()).unwrap_err();
        assert!(matches!(
            err,
            HashPerpError::InvalidOfferStatus {
                actual: SwapOfferStatus::Accepted,
                ..
            }
        ));
    }

    #[test]
    fn expiry_check() {
        let now = Utc::now();
        let offer = SwapOffer::dummy(now - Duration::seconds(1));
        assert!(offer.is_expired_at(now));
        let offer = SwapOffer::dummy(now + Duration::minutes(5));
        assert!(!offer.is_expired_at(now));
    }

    #[test]
    fn target_user_enforced() {
        let mut offer = SwapOffer::dummy(Utc::now() + Duration::hours(1));
        let anyone = UserId::new();
        assert!(offer.admits(anyone));
        let target = UserId::new();
        offer.target_user = Some(target);
        assert!(offer.admits(target));
        assert!(!offer.admits(anyone));
    }

    #[test]
    fn market_data_odd_and_even() {
        let ct = ContractId::new();
        let odd = SwapOfferMarketData::from_rates(
            ct,
            vec![Decimal::new(3, 0), Decimal::ONE, Decimal::TWO],
            Decimal::ZERO,
            2,
            1,
        );
        assert_eq!(odd.median_rate, Some(Decimal::TWO));
        assert_eq!(odd.highest_rate, Some(Decimal::new(3, 0)));
        assert_eq!(odd.lowest_rate, Some(Decimal::ONE));
        assert_eq!(odd.average_rate, Some(Decimal::TWO));

        let even = SwapOfferMarketData::from_rates(
            ct,
            vec![Decimal::new(4, 0), Decimal::ONE],
            Decimal::ONE,
            0,
            2,
        );
        assert_eq!(even.median_rate, Some(Decimal::new(25, 1)));
        assert_eq!(even.open_offers, 2);
    }

    #[test]
    fn market_data_empty() {
        let data =
            SwapOfferMarketData::from_rates(ContractId::new(), vec![], Decimal::ZERO, 0, 0);
        assert_eq!(data.open_offers, 0);
        assert!(data.average_rate.is_none());
        assert!(data.median_rate.is_none());
    }
}
