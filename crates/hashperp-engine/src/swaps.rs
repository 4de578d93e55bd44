//! Swap-Offer Protocol.
//!
//! ## Offer lifecycle
//!
//! ```text
//! OPEN ──► ACCEPTED
//!   ├────► CANCELED   (offeror, or superseded by a newer offer on the VTXO)
//!   ├────► EXPIRED    (on access after expires_at, or by cleanup)
//!   └────► REJECTED   (target of a direct offer)
//! ```
//!
//! ## Position swap saga
//!
//! A position swap exchanges both sides of a contract between its two
//! participants in two swaps:
//!
//! 1. the requester's VTXO goes to the acceptor
//! 2. the acceptor's VTXO goes to the requester, and the offer is accepted
//!
//! Each completed step is journaled under `(offer, step)`. A retry skips
//! journaled steps. When step 2 fails, step 1 is compensated by swapping its
//! successor back to the requester; when that fails as well the caller gets
//! [`HashPerpError::Inconsistent`] with everything needed to reconcile.

use std::sync::{Arc, OnceLock};

use chrono::{DateTime, Duration, Utc};
use hashperp_types::{
    ContractId, HashPerpError, LedgerEntry, LedgerKind, PositionSwapTerms, Result, ScriptPathKind,
    SwapKind, SwapOffer, SwapOfferId, SwapOfferMarketData, SwapOfferStatus, UserId, Vtxo, VtxoId,
    swap_authorization_message,
};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use tracing::{error, info, warn};

use crate::context::EngineContext;
use crate::idempotency::IdempotencyJournal;
use crate::store::ChangeSet;
use crate::vtxos::{Authorization, VtxoEngine};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum SagaStep {
    First,
    Second,
}

pub struct SwapEngine {
    ctx: Arc<EngineContext>,
    vtxos: OnceLock<Arc<VtxoEngine>>,
    /// Successor VTXO of each completed saga step.
    saga: Mutex<IdempotencyJournal<(SwapOfferId, SagaStep), VtxoId>>,
}

impl SwapEngine {
    #[must_use]
    pub fn new(ctx: Arc<EngineContext>) -> Self {
        let capacity = ctx.config.journal_capacity;
        Self {
            ctx,
            vtxos: OnceLock::new(),
            saga: Mutex::new(IdempotencyJournal::new(capacity)),
        }
    }

    /// Wire the VTXO engine. May be called once.
    pub fn set_vtxo_engine(&self, vtxos: Arc<VtxoEngine>) -> Result<()> {
        self.vtxos
            .set(vtxos)
            .map_err(|_| HashPerpError::Configuration("VTXO engine already set".to_string()))
    }

    fn vtxo_engine(&self) -> Result<&VtxoEngine> {
        self.vtxos
            .get()
            .map(AsRef::as_ref)
            .ok_or_else(|| HashPerpError::Internal("swap engine has no VTXO engine".to_string()))
    }

    // =================================================================
    // Creating offers
    // =================================================================

    /// Offer `vtxo_id` to anyone at `rate`. Supersedes every other open
    /// offer on the same VTXO, position swap requests included.
    pub fn create_swap_offer(
        &self,
        offeror: UserId,
        vtxo_id: VtxoId,
        rate: Decimal,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<SwapOffer> {
        self.create_offer(offeror, vtxo_id, rate, expires_at, None)
    }

    /// Offer `vtxo_id` to `target` only.
    pub fn create_direct_swap_offer(
        &self,
        offeror: UserId,
        vtxo_id: VtxoId,
        rate: Decimal,
        expires_at: Option<DateTime<Utc>>,
        target: UserId,
    ) -> Result<SwapOffer> {
        if target == offeror {
            return Err(HashPerpError::invalid(
                "target_user",
                "cannot target the offeror",
            ));
        }
        self.create_offer(offeror, vtxo_id, rate, expires_at, Some(target))
    }

    fn create_offer(
        &self,
        offeror: UserId,
        vtxo_id: VtxoId,
        rate: Decimal,
        expires_at: Option<DateTime<Utc>>,
        target: Option<UserId>,
    ) -> Result<SwapOffer> {
        let ctx = &self.ctx;
        if rate <= Decimal::ZERO {
            return Err(HashPerpError::invalid("offered_rate", "must be positive"));
        }
        let expires_at = self.resolve_expiry(expires_at)?;
        let contract_id = ctx.vtxo(vtxo_id)?.contract_id;

        ctx.locks.with(&[contract_id], || {
            let vtxo = ctx.vtxo(vtxo_id)?;
            if vtxo.owner_id != offeror {
                return Err(HashPerpError::NotVtxoOwner {
                    vtxo_id,
                    user_id: offeror,
                });
            }
            vtxo.ensure_active()?;
            ctx.contract(contract_id)?.ensure_live()?;

            let mut offer = SwapOffer::open(offeror, vtxo_id, contract_id, rate, expires_at);
            offer.target_user = target;

            let mut changes = ChangeSet::new();
            let mut superseded = 0usize;
            for mut prior in ctx.store.swap_offers_by_vtxo(&vtxo_id)? {
                if prior.is_open() {
                    prior.transition_to(SwapOfferStatus::Canceled)?;
                    changes.update(prior);
                    superseded += 1;
                }
            }
            changes.insert(offer.clone());
            ctx.commit(changes)?;

            info!(
                offer_id = %offer.id,
                %vtxo_id,
                %rate,
                direct = target.is_some(),
                superseded,
                "swap offer created"
            );
            Ok(offer)
        })
    }

    fn resolve_expiry(&self, expires_at: Option<DateTime<Utc>>) -> Result<DateTime<Utc>> {
        let now = Utc::now();
        match expires_at {
            Some(at) if at <= now => Err(HashPerpError::invalid(
                "expires_at",
                "must be in the future",
            )),
            Some(at) => Ok(at),
            None => Duration::try_seconds(self.ctx.config.default_offer_ttl_secs)
                .and_then(|ttl| now.checked_add_signed(ttl))
                .ok_or_else(|| HashPerpError::Configuration("offer ttl out of range".to_string())),
        }
    }

    // =================================================================
    // Accepting
    // =================================================================

    /// Accept a simple offer; `signature` is the acceptor's over the swap message.
    pub fn accept_swap_offer(&self, offer_id: SwapOfferId, acceptor: UserId, signature: &[u8]) -> Result<Vtxo> {
        let ctx = &self.ctx;
        let vtxos = self.vtxo_engine()?;
        let contract_id = ctx.swap_offer(offer_id)?.contract_id;

        ctx.locks.with(&[contract_id], || {
            let mut offer = ctx.swap_offer(offer_id)?;
            offer.ensure_open()?;
            if offer.kind != SwapKind::Simple {
                return Err(HashPerpError::invalid(
                    "offer_id",
                    "position swaps are accepted with accept_position_swap",
                ));
            }
            self.expire_if_due(&mut offer)?;
            if !offer.admits(acceptor) {
                return Err(HashPerpError::NotOfferParty {
                    offer_id,
                    user_id: acceptor,
                });
            }
            if acceptor == offer.offeror_id {
                return Err(HashPerpError::invalid("acceptor_id", "cannot accept own offer"));
            }
            self.revalidate_simple(&mut offer)?;

            let mut plan = vtxos.prepare_swap(
                offer.vtxo_id,
                acceptor,
                Authorization::Signature(signature.to_vec()),
                false,
            )?;
            offer.accept(acceptor)?;
            plan.changes
                .annotate(plan.ledger_id, "swap_offer_id", offer_id)
                .annotate(plan.ledger_id, "offered_rate", offer.offered_rate)
                .update(offer.clone());
            ctx.commit(plan.changes)?;

            info!(
                %offer_id,
                old_vtxo = %offer.vtxo_id,
                new_vtxo = %plan.successor.id,
                %acceptor,
                rate = %offer.offered_rate,
                "swap offer accepted"
            );
            Ok(plan.successor)
        })
    }

    /// Mark an overdue offer EXPIRED and fail.
    fn expire_if_due(&self, offer: &mut SwapOffer) -> Result<()> {
        if !offer.is_expired_at(Utc::now()) {
            return Ok(());
        }
        offer.transition_to(SwapOfferStatus::Expired)?;
        let mut changes = ChangeSet::new();
        changes.update(offer.clone());
        self.ctx.commit(changes)?;
        info!(offer_id = %offer.id, "swap offer expired on access");
        Err(HashPerpError::SwapOfferExpired(offer.id))
    }

    /// The offered VTXO must still be the offeror's, active, in a live contract.
    /// If not, the offer is canceled and the reason returned.
    fn revalidate_simple(&self, offer: &mut SwapOffer) -> Result<()> {
        let ctx = &self.ctx;
        let vtxo = ctx.vtxo(offer.vtxo_id)?;
        let contract = ctx.contract(offer.contract_id)?;
        let stale = if !vtxo.active {
            Some(HashPerpError::VtxoNotActive(vtxo.id))
        } else if vtxo.owner_id != offer.offeror_id {
            Some(HashPerpError::NotVtxoOwner {
                vtxo_id: vtxo.id,
                user_id: offer.offeror_id,
            })
        } else {
            contract.ensure_live().err()
        };
        match stale {
            None => Ok(()),
            Some(err) => {
                self.cancel_stale(offer, &err)?;
                Err(err)
            }
        }
    }

    fn cancel_stale(&self, offer: &mut SwapOffer, reason: &HashPerpError) -> Result<()> {
        offer.transition_to(SwapOfferStatus::Canceled)?;
        let mut changes = ChangeSet::new();
        changes.update(offer.clone());
        self.ctx.commit(changes)?;
        warn!(offer_id = %offer.id, %reason, "swap offer canceled, VTXO or contract changed");
        Ok(())
    }

    // =================================================================
    // Cancel / reject
    // =================================================================

    pub fn cancel_swap_offer(&self, offer_id: SwapOfferId, user: UserId) -> Result<SwapOffer> {
        self.close_offer(offer_id, user, SwapOfferStatus::Canceled, |offer, user| {
            offer.offeror_id == user
        })
    }

    /// Decline a direct offer. Only its target may.
    pub fn reject_swap_offer(&self, offer_id: SwapOfferId, user: UserId) -> Result<SwapOffer> {
        self.close_offer(offer_id, user, SwapOfferStatus::Rejected, |offer, user| {
            offer.target_user == Some(user)
        })
    }

    fn close_offer(
        &self,
        offer_id: SwapOfferId,
        user: UserId,
        status: SwapOfferStatus,
        may_close: impl Fn(&SwapOffer, UserId) -> bool,
    ) -> Result<SwapOffer> {
        let ctx = &self.ctx;
        let contract_id = ctx.swap_offer(offer_id)?.contract_id;
        ctx.locks.with(&[contract_id], || {
            let mut offer = ctx.swap_offer(offer_id)?;
            if !may_close(&offer, user) {
                return Err(HashPerpError::NotOfferParty {
                    offer_id,
                    user_id: user,
                });
            }
            offer.transition_to(status)?;
            let mut changes = ChangeSet::new();
            changes.update(offer.clone());
            ctx.commit(changes)?;
            info!(%offer_id, %user, %status, "swap offer closed");
            Ok(offer)
        })
    }

    // =================================================================
    // Queries
    // =================================================================

    pub fn get_swap_offer(&self, offer_id: SwapOfferId) -> Result<SwapOffer> {
        self.ctx.swap_offer(offer_id)
    }

    /// Offers made by `user` when `as_offeror`, otherwise offers aimed at or
    /// accepted by `user`.
    pub fn swap_offers_by_user(&self, user: UserId, as_offeror: bool) -> Result<Vec<SwapOffer>> {
        let mut offers = self.ctx.store.swap_offers_by_user(&user)?;
        offers.retain(|o| (o.offeror_id == user) == as_offeror);
        Ok(offers)
    }

    pub fn swap_offers_by_contract(&self, contract_id: ContractId) -> Result<Vec<SwapOffer>> {
        self.ctx.store.swap_offers_by_contract(&contract_id)
    }

    pub fn open_offers_count(&self, contract_id: ContractId) -> Result<usize> {
        Ok(self
            .ctx
            .store
            .swap_offers_by_contract(&contract_id)?
            .iter()
            .filter(|o| o.is_open())
            .count())
    }

    /// Expire every OPEN offer past its deadline. Returns how many moved.
    pub fn cleanup_expired_offers(&self) -> Result<usize> {
        let ctx = &self.ctx;
        let now = Utc::now();
        let mut expired = 0;
        for candidate in ctx.store.open_swap_offers()? {
            if !candidate.is_expired_at(now) {
                continue;
            }
            let outcome = ctx.locks.with(&[candidate.contract_id], || {
                let mut offer = ctx.swap_offer(candidate.id)?;
                if !offer.is_open() {
                    return Ok(false);
                }
                offer.transition_to(SwapOfferStatus::Expired)?;
                let mut changes = ChangeSet::new();
                changes.update(offer);
                ctx.commit(changes)?;
                Ok(true)
            });
            match outcome {
                Ok(true) => expired += 1,
                Ok(false) => {}
                Err(err) => warn!(offer_id = %candidate.id, %err, "could not expire swap offer"),
            }
        }
        if expired > 0 {
            info!(expired, "expired swap offers cleaned up");
        }
        Ok(expired)
    }

    pub fn market_data(&self, contract_id: ContractId) -> Result<SwapOfferMarketData> {
        let ctx = &self.ctx;
        ctx.contract(contract_id)?;
        let now = Utc::now();
        let day_ago = now - Duration::hours(24);

        let mut rates = Vec::new();
        let mut accepted_volume = Decimal::ZERO;
        let (mut buyer_side, mut seller_side) = (0, 0);
        for offer in ctx.store.swap_offers_by_contract(&contract_id)? {
            if offer.status == SwapOfferStatus::Accepted
                && offer.accepted_at.is_some_and(|at| at >= day_ago)
            {
                accepted_volume += offer.offered_rate;
            }
            if !offer.is_open() || offer.is_expired_at(now) {
                continue;
            }
            rates.push(offer.offered_rate);
            match ctx.vtxo(offer.vtxo_id)?.script_path {
                ScriptPathKind::Buyer => buyer_side += 1,
                ScriptPathKind::Seller => seller_side += 1,
                ScriptPathKind::Cooperative | ScriptPathKind::Timeout | ScriptPathKind::Sweep => {}
            }
        }
        Ok(SwapOfferMarketData::from_rates(
            contract_id,
            rates,
            accepted_volume,
            buyer_side,
            seller_side,
        ))
    }

    // =================================================================
    // Position swap
    // =================================================================

    /// Propose swapping sides with the counterparty. `requester_signature`
    /// authorizes receiving the counterparty's VTXO.
    pub fn request_contract_position_swap(
        &self,
        contract_id: ContractId,
        requester: UserId,
        differential: Decimal,
        expires_at: Option<DateTime<Utc>>,
        requester_signature: &[u8],
    ) -> Result<SwapOffer> {
        let ctx = &self.ctx;
        if differential < Decimal::ZERO {
            return Err(HashPerpError::invalid("offered_rate", "must not be negative"));
        }
        let expires_at = self.resolve_expiry(expires_at)?;

        ctx.locks.with(&[contract_id], || {
            let contract = ctx.contract(contract_id)?;
            contract.ensure_live()?;
            let requester_position =
                contract
                    .position_of(requester)
                    .ok_or(HashPerpError::NotParticipant {
                        contract_id,
                        user_id: requester,
                    })?;
            let counterparty_position = requester_position.counterparty();
            let bound = |position| {
                contract.vtxo(position).ok_or_else(|| {
                    HashPerpError::Internal(format!(
                        "live contract {contract_id} has no {position} VTXO"
                    ))
                })
            };
            let requester_vtxo = bound(requester_position)?;
            let counterparty_vtxo = bound(counterparty_position)?;

            let message = swap_authorization_message(counterparty_vtxo, requester, contract_id);
            ctx.verify_signature(requester, &message, requester_signature, "position swap request")?;

            let mut offer = SwapOffer::open(
                requester,
                requester_vtxo,
                contract_id,
                differential,
                expires_at,
            );
            offer.kind = SwapKind::PositionSwap;
            offer.target_user = Some(contract.party(counterparty_position));
            offer.position_swap = Some(PositionSwapTerms {
                requester_position,
                counterparty_position,
                requester_vtxo,
                counterparty_vtxo,
                requester_signature: requester_signature.to_vec(),
            });

            let mut changes = ChangeSet::new();
            let superseded = self.supersede_for_position_swap(&mut changes, requester_vtxo)?;
            changes.insert(offer.clone());
            ctx.commit(changes)?;

            info!(
                offer_id = %offer.id,
                %contract_id,
                %requester,
                %requester_position,
                superseded,
                "position swap requested"
            );
            Ok(offer)
        })
    }

    /// One open request per VTXO: a live position swap request blocks a new
    /// one, overdue ones expire and simple offers on the VTXO are canceled.
    fn supersede_for_position_swap(&self, changes: &mut ChangeSet, vtxo_id: VtxoId) -> Result<usize> {
        let now = Utc::now();
        let mut superseded = 0usize;
        for mut prior in self.ctx.store.swap_offers_by_vtxo(&vtxo_id)? {
            if !prior.is_open() {
                continue;
            }
            if prior.is_expired_at(now) {
                prior.transition_to(SwapOfferStatus::Expired)?;
            } else if prior.kind == SwapKind::PositionSwap {
                return Err(HashPerpError::Duplicate {
                    entity: "open position swap request",
                    id: vtxo_id.to_string(),
                });
            } else {
                prior.transition_to(SwapOfferStatus::Canceled)?;
                superseded += 1;
            }
            changes.update(prior);
        }
        Ok(superseded)
    }

    /// Run the position-swap saga. `signature` is the acceptor's over the
    /// swap message for the requester's VTXO.
    pub fn accept_position_swap(&self, offer_id: SwapOfferId, acceptor: UserId, signature: &[u8]) -> Result<SwapOffer> {
        let ctx = &self.ctx;
        let vtxos = self.vtxo_engine()?;
        let contract_id = ctx.swap_offer(offer_id)?.contract_id;

        ctx.locks.with(&[contract_id], || {
            let mut offer = ctx.swap_offer(offer_id)?;
            offer.ensure_open()?;
            let terms = offer.position_swap.clone().ok_or_else(|| {
                HashPerpError::invalid("offer_id", "not a position swap offer")
            })?;
            self.expire_if_due(&mut offer)?;
            if !offer.admits(acceptor) {
                return Err(HashPerpError::NotOfferParty {
                    offer_id,
                    user_id: acceptor,
                });
            }
            let requester = offer.offeror_id;

            // Step 1: requester's VTXO to the acceptor.
            let journaled = self.saga.lock().get(&(offer_id, SagaStep::First));
            let first = if let Some(successor) = journaled {
                successor
            } else {
                let requester_vtxo = self.revalidate_position_swap(&mut offer, &terms, None)?;
                let plan = vtxos.prepare_swap(
                    requester_vtxo,
                    acceptor,
                    Authorization::Signature(signature.to_vec()),
                    true,
                )?;
                ctx.commit(plan.changes)?;
                self.saga
                    .lock()
                    .record((offer_id, SagaStep::First), plan.successor.id)?;
                info!(%offer_id, step = ?SagaStep::First, successor = %plan.successor.id, "position swap step applied");
                plan.successor.id
            };

            // Step 2: acceptor's VTXO to the requester, offer accepted.
            match self.second_step(vtxos, &offer, &terms, acceptor, first) {
                Ok(accepted) => Ok(accepted),
                Err(err) => Err(self.compensate(vtxos, &offer, &terms, first, requester, err)),
            }
        })
    }

    fn second_step(
        &self,
        vtxos: &VtxoEngine,
        offer: &SwapOffer,
        terms: &PositionSwapTerms,
        acceptor: UserId,
        first: VtxoId,
    ) -> Result<SwapOffer> {
        let ctx = &self.ctx;
        let mut offer = ctx.swap_offer(offer.id)?;
        self.revalidate_position_swap(&mut offer, terms, Some(first))?;
        let requester = offer.offeror_id;
        let requester_old_vtxo = ctx
            .vtxo(first)?
            .swapped_from
            .unwrap_or(terms.requester_vtxo);
        let mut plan = vtxos.prepare_swap(
            terms.counterparty_vtxo,
            requester,
            Authorization::Signature(terms.requester_signature.clone()),
            true,
        )?;
        offer.accept(acceptor)?;

        let contract = ctx.contract(offer.contract_id)?;
        let entry = LedgerEntry::new(LedgerKind::PositionSwap)
            .contract(offer.contract_id)
            .users([requester, acceptor])
            .amount(contract.size)
            .rate(offer.offered_rate)
            .with("swap_offer_id", offer.id)
            .with("requester", requester)
            .with("acceptor", acceptor)
            .with("requester_old_position", terms.requester_position)
            .with("requester_new_position", terms.counterparty_position)
            .with("requester_old_vtxo", requester_old_vtxo)
            .with("requester_new_vtxo", plan.successor.id)
            .with("acceptor_old_vtxo", terms.counterparty_vtxo)
            .with("acceptor_new_vtxo", first);
        plan.changes
            .annotate(plan.ledger_id, "swap_offer_id", offer.id)
            .update(offer.clone())
            .append(entry);
        ctx.commit(plan.changes)?;
        self.saga
            .lock()
            .record((offer.id, SagaStep::Second), plan.successor.id)?;

        info!(
            offer_id = %offer.id,
            contract_id = %offer.contract_id,
            %requester,
            %acceptor,
            "position swap completed"
        );
        ctx.swap_offer(offer.id)
    }

    /// Undo step 1 after step 2 failed with `cause`. Returns the error to
    /// surface: `cause` when the undo worked, `Inconsistent` when it did not.
    fn compensate(
        &self,
        vtxos: &VtxoEngine,
        offer: &SwapOffer,
        terms: &PositionSwapTerms,
        first: VtxoId,
        requester: UserId,
        cause: HashPerpError,
    ) -> HashPerpError {
        warn!(offer_id = %offer.id, %cause, "position swap step 2 failed, compensating step 1");
        let undo = vtxos
            .prepare_swap(first, requester, Authorization::Compensation, true)
            .and_then(|plan| self.ctx.commit(plan.changes).map(|()| plan.successor.id));
        match undo {
            Ok(restored) => {
                self.saga.lock().forget(&(offer.id, SagaStep::First));
                info!(offer_id = %offer.id, %restored, "position swap step 1 compensated");
                cause
            }
            Err(undo_err) => {
                error!(offer_id = %offer.id, %cause, %undo_err, "position swap compensation failed");
                HashPerpError::Inconsistent {
                    operation: "position_swap",
                    detail: format!("step 2 failed ({cause}); compensation failed ({undo_err})"),
                    entities: vec![
                        offer.id.to_string(),
                        offer.contract_id.to_string(),
                        terms.requester_vtxo.to_string(),
                        terms.counterparty_vtxo.to_string(),
                        first.to_string(),
                    ],
                }
            }
        }
    }

    /// Both sides must still sit where the offer expects them; returns the
    /// VTXO now on the requester's side. Before step 1 that side must still
    /// be held by the requester (possibly through a compensated successor);
    /// after it, by the step-1 successor `first`. A mismatch before step 1
    /// cancels the offer.
    fn revalidate_position_swap(
        &self,
        offer: &mut SwapOffer,
        terms: &PositionSwapTerms,
        first: Option<VtxoId>,
    ) -> Result<VtxoId> {
        let contract = self.ctx.contract(offer.contract_id)?;
        let requester_slot = contract.vtxo(terms.requester_position);
        let requester_side_moved = match first {
            Some(expected) => requester_slot != Some(expected),
            None => {
                requester_slot.is_none()
                    || contract.party(terms.requester_position) != offer.offeror_id
            }
        };
        let stale = if let Err(err) = contract.ensure_live() {
            Some(err)
        } else if requester_side_moved {
            Some(HashPerpError::InvalidVtxoTransition {
                vtxo_id: terms.requester_vtxo,
                reason: "requester side changed since the offer was made".to_string(),
            })
        } else if contract.vtxo(terms.counterparty_position) != Some(terms.counterparty_vtxo) {
            Some(HashPerpError::InvalidVtxoTransition {
                vtxo_id: terms.counterparty_vtxo,
                reason: "counterparty side changed since the offer was made".to_string(),
            })
        } else {
            None
        };
        match (stale, requester_slot) {
            (None, Some(slot)) => Ok(slot),
            (None, None) => Err(HashPerpError::Internal(format!(
                "contract {} lost its {} VTXO",
                contract.id, terms.requester_position
            ))),
            // step 2 failures are compensated by the caller and keep the offer OPEN
            (Some(err), _) if first.is_some() => Err(err),
            (Some(err), _) => {
                self.cancel_stale(offer, &err)?;
                Err(err)
            }
        }
    }
}
