//! Contract Engine: creation, settlement, exits and rollover.
//!
//! ## Lifecycle
//!
//! ```text
//! PENDING ──► ACTIVE ──► CLOSE_TO_EXPIRY ─┐
//!               │                         ├──► SETTLED
//!               └─────────────────────────┼──► EXITED
//!                                         ├──► ROLLED_OVER
//!                                         └──► SETTLEMENT_PENDING ──► COMPLETED
//! ```
//!
//! Every mutation runs under the contract's lock and lands as one
//! [`ChangeSet`]. Chain effects (broadcasts) happen before the commit and
//! are journaled, so a failed commit can be retried without a second
//! broadcast.

use std::sync::Arc;

use chrono::Utc;
use hashperp_types::{
    Contract, ContractId, ContractKind, ContractStatus, ExitPath, ExitPolicy, HashPerpError,
    LedgerEntry, LedgerKind, LedgerStatus, Position, Result, ScriptPathKind, Txid, UserId, Vtxo,
    btc_per_ph_day,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::context::EngineContext;
use crate::protocol::BroadcastKey;
use crate::store::ChangeSet;
use crate::validation::{validate_contract_parameters, validate_counterparties};
use crate::vtxos::{collateral_vtxo, lock_script};

/// Economic terms shared by contracts and the orders that create them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractTerms {
    pub kind: ContractKind,
    pub strike_rate: Decimal,
    pub expiry_height: u64,
    pub size: Decimal,
}

/// Outcome of an exit through any path.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExitReceipt {
    pub contract: Contract,
    pub path: ExitPath,
    pub exit_txid: Txid,
    pub initiator: UserId,
    /// Early exits only: what the initiator receives.
    pub settlement_amount: Option<Decimal>,
    /// Early exits only.
    pub exit_fee: Option<Decimal>,
}

/// Early-exit economics for one side at a given rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EarlyExitQuote {
    pub rate: Decimal,
    pub fee: Decimal,
    pub profit: Decimal,
    /// `clamp(size/2 + profit - fee, 0, size)`, rounded to the satoshi.
    pub settlement_amount: Decimal,
}

impl EarlyExitQuote {
    /// Quote for `position` leaving `contract` when the metric is `rate`.
    #[must_use]
    pub fn compute(contract: &Contract, position: Position, rate: Decimal, fee_rate: Decimal) -> Self {
        let size = contract.size;
        let fee = size * fee_rate;
        let in_the_money = rate != contract.strike_rate && contract.winner_for(rate) == position;
        let profit = if in_the_money {
            (rate - contract.strike_rate).abs() / contract.strike_rate * size
        } else {
            Decimal::ZERO
        };
        let settlement_amount = (contract.side_collateral() + profit - fee)
            .clamp(Decimal::ZERO, size)
            .round_dp(8);
        Self {
            rate,
            fee,
            profit,
            settlement_amount,
        }
    }
}

pub struct ContractEngine {
    ctx: Arc<EngineContext>,
}

impl ContractEngine {
    #[must_use]
    pub fn new(ctx: Arc<EngineContext>) -> Self {
        Self { ctx }
    }

    // =================================================================
    // Creation
    // =================================================================

    /// Create an ACTIVE contract with both collateral VTXOs.
    pub fn create_contract(&self, buyer: UserId, seller: UserId, terms: ContractTerms) -> Result<Contract> {
        let (contract, changes) = self.stage_contract(buyer, seller, terms)?;
        self.ctx.commit(changes)?;
        info!(
            contract_id = %contract.id,
            kind = %contract.kind,
            strike = %contract.strike_rate,
            expiry = contract.expiry_height,
            size = %contract.size,
            "contract created"
        );
        Ok(contract)
    }

    /// Validate and build a new ACTIVE contract without committing it, so
    /// callers can fold their own changes into the same unit.
    pub(crate) fn stage_contract(
        &self,
        buyer: UserId,
        seller: UserId,
        terms: ContractTerms,
    ) -> Result<(Contract, ChangeSet)> {
        let ctx = &self.ctx;
        let (mut contract, current) = self.pending_contract(buyer, seller, terms)?;
        let keys = ctx.participants(&contract)?;

        let buyer_vtxo = collateral_vtxo(ctx, &contract, &keys, Position::Buyer)?;
        let seller_vtxo = collateral_vtxo(ctx, &contract, &keys, Position::Seller)?;
        contract.bind(Position::Buyer, buyer, buyer_vtxo.id);
        contract.bind(Position::Seller, seller, seller_vtxo.id);
        contract.transition_to(ContractStatus::Active)?;

        let entry = LedgerEntry::new(LedgerKind::ContractCreation)
            .contract(contract.id)
            .users([buyer, seller])
            .amount(contract.size)
            .rate(contract.strike_rate)
            .height(current)
            .with("buyer_vtxo", buyer_vtxo.id)
            .with("seller_vtxo", seller_vtxo.id);

        let mut changes = ChangeSet::new();
        changes
            .insert(contract.clone())
            .insert(buyer_vtxo)
            .insert(seller_vtxo)
            .append(entry);
        Ok((contract, changes))
    }

    /// Create a PENDING contract with only `funded` collateralised. The other
    /// slot stays reserved for its party until a VTXO is rolled into it.
    pub fn open_contract(
        &self,
        buyer: UserId,
        seller: UserId,
        terms: ContractTerms,
        funded: Position,
    ) -> Result<Contract> {
        let ctx = &self.ctx;
        let (mut contract, current) = self.pending_contract(buyer, seller, terms)?;
        let keys = ctx.participants(&contract)?;
        let vtxo = collateral_vtxo(ctx, &contract, &keys, funded)?;
        contract.bind(funded, contract.party(funded), vtxo.id);

        let entry = LedgerEntry::new(LedgerKind::ContractCreation)
            .contract(contract.id)
            .users([buyer, seller])
            .amount(contract.size)
            .rate(contract.strike_rate)
            .height(current)
            .status(LedgerStatus::Prepared)
            .with("funded_position", funded)
            .with(&format!("{funded}_vtxo"), vtxo.id);

        let mut changes = ChangeSet::new();
        changes.insert(contract.clone()).insert(vtxo).append(entry);
        ctx.commit(changes)?;

        info!(contract_id = %contract.id, %funded, "contract opened, awaiting counterparty collateral");
        Ok(contract)
    }

    fn pending_contract(&self, buyer: UserId, seller: UserId, terms: ContractTerms) -> Result<(Contract, u64)> {
        let ctx = &self.ctx;
        let current = ctx.current_height()?;
        validate_contract_parameters(
            &ctx.config.limits,
            current,
            terms.strike_rate,
            terms.expiry_height,
            terms.size,
        )?;
        validate_counterparties(buyer, seller)?;
        ctx.public_key(buyer)?;
        ctx.public_key(seller)?;
        let contract = Contract::pending(
            terms.kind,
            terms.strike_rate,
            terms.expiry_height,
            ctx.expiry_date(current, terms.expiry_height),
            buyer,
            seller,
            terms.size,
        );
        Ok((contract, current))
    }

    // =================================================================
    // Queries
    // =================================================================

    pub fn get_contract(&self, id: ContractId) -> Result<Contract> {
        self.ctx.contract(id)
    }

    pub fn contracts_by_user(&self, user: UserId, status: Option<ContractStatus>) -> Result<Vec<Contract>> {
        let mut contracts = self.ctx.store.contracts_by_user(&user)?;
        if let Some(status) = status {
            contracts.retain(|c| c.status == status);
        }
        Ok(contracts)
    }

    // =================================================================
    // Settlement
    // =================================================================

    /// Settle at expiry through the three-stage chain. The winner takes the
    /// full notional.
    pub fn settle_contract(&self, id: ContractId) -> Result<Contract> {
        let ctx = &self.ctx;
        ctx.locks.with(&[id], || {
            let mut contract = ctx.contract(id)?;
            contract.ensure_live()?;
            let current = ctx.current_height()?;
            if current < contract.expiry_height {
                return Err(HashPerpError::SettlementNotDue {
                    contract_id: id,
                    expiry_height: contract.expiry_height,
                    current_height: current,
                });
            }

            let hash_rate = ctx.oracle.hash_rate_at(contract.expiry_height)?;
            let metric = btc_per_ph_day(contract.expiry_height, hash_rate)?;
            let winner = contract.winner_for(metric);

            let (mut buyer_vtxo, mut seller_vtxo) = self.live_vtxos(&contract)?;
            let keys = ctx.participants(&contract)?;
            let chain = ctx
                .scripts
                .settlement_chain(&contract, &keys, &buyer_vtxo, &seller_vtxo, winner)?;
            let receipt = ctx.broadcaster.broadcast_settlement(id, &chain)?;

            buyer_vtxo.retire_for_settlement(receipt.settlement_txid)?;
            seller_vtxo.retire_for_settlement(receipt.settlement_txid)?;
            contract.transition_to(ContractStatus::Settled)?;
            contract.settlement_txid = Some(receipt.settlement_txid);
            contract.settlement_rate = Some(metric);
            contract.completed_at = Some(Utc::now());

            let entry = LedgerEntry::new(LedgerKind::ContractSettlement)
                .contract(id)
                .users([contract.buyer_id, contract.seller_id])
                .txid(receipt.settlement_txid)
                .amount(contract.size)
                .rate(metric)
                .height(contract.expiry_height)
                .with("buyer_vtxo", buyer_vtxo.id)
                .with("seller_vtxo", seller_vtxo.id)
                .with("winner_id", contract.party(winner))
                .with("loser_id", contract.party(winner.counterparty()))
                .with("setup_txid", receipt.setup_txid)
                .with("final_txid", receipt.final_txid)
                .with("hash_rate_ph", hash_rate);

            let mut changes = ChangeSet::new();
            changes
                .update(contract)
                .update(buyer_vtxo)
                .update(seller_vtxo)
                .append(entry);
            ctx.commit(changes)?;

            info!(contract_id = %id, %metric, %winner, txid = %receipt.settlement_txid, "contract settled");
            ctx.contract(id)
        })
    }

    // =================================================================
    // Exits
    // =================================================================

    /// Voluntary early exit at the current metric, less the exit fee.
    pub fn exit_contract(&self, id: ContractId, user: UserId) -> Result<ExitReceipt> {
        self.execute_exit_path(id, user, ExitPath::EarlyExit)
    }

    pub fn execute_exit_path(&self, id: ContractId, user: UserId, path: ExitPath) -> Result<ExitReceipt> {
        self.ctx.locks.with(&[id], || self.exit_locked(id, user, path))
    }

    fn exit_locked(&self, id: ContractId, user: UserId, path: ExitPath) -> Result<ExitReceipt> {
        let ctx = &self.ctx;
        let mut contract = ctx.contract(id)?;
        let initiator = contract.position_of(user).ok_or(HashPerpError::NotParticipant {
            contract_id: id,
            user_id: user,
        })?;
        contract.ensure_live()?;
        let current = ctx.current_height()?;
        check_exit_window(&ctx.config.exits, &contract, path, current)?;

        let quote = if path == ExitPath::EarlyExit {
            let rate = btc_per_ph_day(current, ctx.oracle.hash_rate_at(current)?)?;
            Some(EarlyExitQuote::compute(
                &contract,
                initiator,
                rate,
                ctx.config.exits.early_exit_fee_rate,
            ))
        } else {
            None
        };

        let (mut buyer_vtxo, mut seller_vtxo) = self.live_vtxos(&contract)?;
        let keys = ctx.participants(&contract)?;
        let payouts = match &quote {
            Some(quote) => vec![
                (keys.key(initiator), quote.settlement_amount),
                (
                    keys.key(initiator.counterparty()),
                    contract.size - quote.settlement_amount,
                ),
            ],
            None => vec![
                (keys.buyer, buyer_vtxo.amount),
                (keys.seller, seller_vtxo.amount),
            ],
        };
        let tx = ctx.scripts.exit_transaction(
            &contract,
            &keys,
            &[(&buyer_vtxo, Position::Buyer), (&seller_vtxo, Position::Seller)],
            path.leaf(initiator),
            &payouts,
        )?;
        let txid = ctx.broadcaster.broadcast(BroadcastKey::ContractExit(id), &tx)?;

        buyer_vtxo.retire_for_exit(txid)?;
        seller_vtxo.retire_for_exit(txid)?;
        contract.transition_to(ContractStatus::Exited)?;
        contract.buyer_exited = true;
        contract.seller_exited = true;
        contract.buyer_exit_txid = Some(txid);
        contract.seller_exit_txid = Some(txid);
        contract.completed_at = Some(Utc::now());

        let counterparty = contract.party(initiator.counterparty());
        let mut entry = LedgerEntry::new(LedgerKind::ExitPathExecution)
            .contract(id)
            .users([user, counterparty])
            .txid(txid)
            .amount(contract.size)
            .height(current)
            .status(LedgerStatus::Completed)
            .with("path_type", path.as_str())
            .with("reason", path.audit_reason())
            .with("buyer_vtxo", buyer_vtxo.id)
            .with("seller_vtxo", seller_vtxo.id)
            .with("initiator", user)
            .with("counterparty", counterparty);
        entry = match path {
            ExitPath::Timeout => {
                entry.with("blocks_since_expiry", current.saturating_sub(contract.expiry_height))
            }
            ExitPath::ForcedSettlement => entry.with("initiated_by", initiator),
            ExitPath::DisputeResolution => entry.with("dispute_initiator", user),
            ExitPath::EarlyExit | ExitPath::MutualAgreement | ExitPath::EmergencyExit => entry,
        };
        if let Some(quote) = &quote {
            entry = entry
                .rate(quote.rate)
                .with("exit_fee", quote.fee)
                .with("settlement_amount", quote.settlement_amount)
                .with("exit_initiator", user)
                .with("current_btc_ph_day", quote.rate);
        }

        let mut changes = ChangeSet::new();
        changes
            .update(contract)
            .update(buyer_vtxo)
            .update(seller_vtxo)
            .append(entry);
        ctx.commit(changes)?;

        info!(contract_id = %id, %path, initiator = %user, %txid, "contract exited");
        Ok(ExitReceipt {
            contract: ctx.contract(id)?,
            path,
            exit_txid: txid,
            initiator: user,
            settlement_amount: quote.map(|q| q.settlement_amount),
            exit_fee: quote.map(|q| q.fee),
        })
    }

    // =================================================================
    // Rollover
    // =================================================================

    /// Carry a live contract to `new_expiry` with fresh VTXOs.
    pub fn rollover_contract(&self, id: ContractId, new_expiry: u64) -> Result<Contract> {
        let ctx = &self.ctx;
        ctx.locks.with(&[id], || {
            let mut old = ctx.contract(id)?;
            old.ensure_live()?;
            let current = ctx.current_height()?;
            let horizon = current.saturating_add(ctx.config.limits.max_expiry_blocks);
            if new_expiry <= current || new_expiry <= old.expiry_height || new_expiry > horizon {
                return Err(HashPerpError::invalid(
                    "new_expiry_height",
                    format!(
                        "{new_expiry} must be after {} and the current height {current}, and at most {horizon}",
                        old.expiry_height
                    ),
                ));
            }

            let (mut old_buyer, mut old_seller) = self.live_vtxos(&old)?;
            let mut next = Contract::pending(
                old.kind,
                old.strike_rate,
                new_expiry,
                ctx.expiry_date(current, new_expiry),
                old.buyer_id,
                old.seller_id,
                old.size,
            );
            next.rolled_over_from = Some(old.id);

            let keys = ctx.participants(&next)?;
            let mut new_buyer = old_buyer.rollover_successor(next.id, ScriptPathKind::Buyer, Vec::new());
            new_buyer.script_pubkey = lock_script(ctx, &next, &keys, Position::Buyer)?;
            let mut new_seller =
                old_seller.rollover_successor(next.id, ScriptPathKind::Seller, Vec::new());
            new_seller.script_pubkey = lock_script(ctx, &next, &keys, Position::Seller)?;
            next.bind(Position::Buyer, new_buyer.owner_id, new_buyer.id);
            next.bind(Position::Seller, new_seller.owner_id, new_seller.id);
            next.transition_to(ContractStatus::Active)?;

            old_buyer.retire_for_rollover(new_buyer.id)?;
            old_seller.retire_for_rollover(new_seller.id)?;
            old.rolled_over_to = Some(next.id);
            old.transition_to(ContractStatus::RolledOver)?;

            let entry = LedgerEntry::new(LedgerKind::ContractRollover)
                .contract(next.id)
                .users([next.buyer_id, next.seller_id])
                .amount(next.size)
                .rate(next.strike_rate)
                .height(current)
                .with("old_contract", old.id)
                .with("new_contract", next.id)
                .with("old_expiry", old.expiry_height)
                .with("new_expiry", new_expiry)
                .with("old_buyer_vtxo", old_buyer.id)
                .with("new_buyer_vtxo", new_buyer.id)
                .with("old_seller_vtxo", old_seller.id)
                .with("new_seller_vtxo", new_seller.id);

            let mut changes = ChangeSet::new();
            changes
                .insert(next.clone())
                .insert(new_buyer)
                .insert(new_seller)
                .update(old)
                .update(old_buyer)
                .update(old_seller)
                .append(entry);
            ctx.commit(changes)?;

            info!(old_contract = %id, new_contract = %next.id, new_expiry, "contract rolled over");
            Ok(next)
        })
    }

    // =================================================================
    // Maintenance
    // =================================================================

    /// Move ACTIVE contracts inside the sweep window to CLOSE_TO_EXPIRY.
    pub fn mark_expiring_contracts(&self) -> Result<Vec<ContractId>> {
        let ctx = &self.ctx;
        let current = ctx.current_height()?;
        let window = ctx.config.exits.sweep_window_blocks;
        let mut marked = Vec::new();
        for candidate in ctx.store.contracts_by_status(ContractStatus::Active)? {
            if candidate.expiry_height.saturating_sub(current) > window {
                continue;
            }
            let moved = ctx.locks.with(&[candidate.id], || {
                let mut contract = ctx.contract(candidate.id)?;
                if contract.status != ContractStatus::Active {
                    return Ok(false);
                }
                contract.transition_to(ContractStatus::CloseToExpiry)?;
                let mut changes = ChangeSet::new();
                changes.update(contract);
                ctx.commit(changes)?;
                Ok(true)
            })?;
            if moved {
                info!(contract_id = %candidate.id, expiry = candidate.expiry_height, "contract close to expiry");
                marked.push(candidate.id);
            }
        }
        Ok(marked)
    }

    /// Both bound VTXOs of a live contract, each required active.
    fn live_vtxos(&self, contract: &Contract) -> Result<(Vtxo, Vtxo)> {
        let load = |position: Position| -> Result<Vtxo> {
            let id = contract.vtxo(position).ok_or_else(|| {
                warn!(contract_id = %contract.id, %position, "live contract without a VTXO");
                HashPerpError::Internal(format!(
                    "contract {} has no {position} VTXO",
                    contract.id
                ))
            })?;
            let vtxo = self.ctx.vtxo(id)?;
            vtxo.ensure_active()?;
            Ok(vtxo)
        };
        Ok((load(Position::Buyer)?, load(Position::Seller)?))
    }
}

/// Timelock gates for the exit paths that have one.
fn check_exit_window(policy: &ExitPolicy, contract: &Contract, path: ExitPath, current: u64) -> Result<()> {
    let opens_at = match path {
        ExitPath::Timeout => contract
            .expiry_height
            .saturating_add(policy.timeout_exit_delay_blocks),
        ExitPath::ForcedSettlement => contract.expiry_height,
        ExitPath::EarlyExit
        | ExitPath::MutualAgreement
        | ExitPath::DisputeResolution
        | ExitPath::EmergencyExit => return Ok(()),
    };
    if current < opens_at {
        return Err(HashPerpError::ExitPathUnavailable {
            path: path.as_str().to_string(),
            reason: format!("opens at height {opens_at}, chain is at {current}"),
        });
    }
    Ok(())
}
