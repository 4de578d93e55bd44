//! VTXO Engine: ownership transfer, rollover, sweeps and pre-signed exits.
//!
//! A VTXO is never mutated in place once it has a successor. Swaps and
//! rollovers retire the source and insert a successor whose provenance
//! pointer (`swapped_from` / `rolled_from`) links back, so the full chain
//! of custody is walkable with [`VtxoEngine::vtxo_history`].

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use hashperp_script::{Participants, transaction};
use hashperp_types::{
    Contract, ContractId, ContractStatus, HashPerpError, LedgerEntry, LedgerEntryId, LedgerKind,
    LedgerStatus, Position, PreSignedExit, PreSignedExitId, Result, ScriptPathKind, Txid, UserId,
    Vtxo, VtxoId, exit_authorization_message, rollover_authorization_message,
    swap_authorization_message,
};
use tracing::{debug, info, warn};

use crate::context::EngineContext;
use crate::protocol::BroadcastKey;
use crate::store::ChangeSet;

/// A fresh collateral VTXO for `position`, locked to its output's script pubkey.
pub(crate) fn collateral_vtxo(
    ctx: &EngineContext,
    contract: &Contract,
    keys: &Participants,
    position: Position,
) -> Result<Vtxo> {
    let mut vtxo = Vtxo::new(
        contract.id,
        contract.party(position),
        contract.side_collateral(),
        ScriptPathKind::for_position(position),
        Vec::new(),
    );
    vtxo.script_pubkey = lock_script(ctx, contract, keys, position)?;
    Ok(vtxo)
}

/// scriptPubKey of the output backing `position` under the current keys.
pub(crate) fn lock_script(
    ctx: &EngineContext,
    contract: &Contract,
    keys: &Participants,
    position: Position,
) -> Result<Vec<u8>> {
    Ok(ctx
        .scripts
        .vtxo_output(contract, keys, position)?
        .script_pubkey()
        .to_bytes())
}

/// How a swap is authorized.
#[derive(Debug, Clone)]
pub(crate) enum Authorization {
    /// BIP340 signature by the new owner over the swap message.
    Signature(Vec<u8>),
    /// Undoing an earlier step of a saga that was itself authorized.
    Compensation,
}

/// A validated swap, ready to commit.
pub(crate) struct SwapPlan {
    pub changes: ChangeSet,
    pub successor: Vtxo,
    pub ledger_id: LedgerEntryId,
}

pub struct VtxoEngine {
    ctx: Arc<EngineContext>,
}

impl VtxoEngine {
    #[must_use]
    pub fn new(ctx: Arc<EngineContext>) -> Self {
        Self { ctx }
    }

    // =================================================================
    // Creation & queries
    // =================================================================

    /// Fund the empty `position` of a PENDING contract. Activates the
    /// contract once both sides are bound.
    pub fn create_vtxo(&self, contract_id: ContractId, owner: UserId, position: Position) -> Result<Vtxo> {
        let ctx = &self.ctx;
        ctx.locks.with(&[contract_id], || {
            let mut contract = ctx.contract(contract_id)?;
            if contract.status != ContractStatus::Pending {
                return Err(HashPerpError::InvalidContractStatus {
                    contract_id,
                    actual: contract.status,
                    required: "PENDING",
                });
            }
            if contract.vtxo(position).is_some() {
                return Err(HashPerpError::PositionOccupied {
                    contract_id,
                    position: position.to_string(),
                });
            }
            if contract.party(position) != owner {
                return Err(HashPerpError::NotParticipant {
                    contract_id,
                    user_id: owner,
                });
            }

            let keys = ctx.participants(&contract)?;
            let vtxo = collateral_vtxo(ctx, &contract, &keys, position)?;
            contract.bind(position, owner, vtxo.id);
            let activated = activate_if_bound(&mut contract)?;

            let mut changes = ChangeSet::new();
            changes.update(contract).insert(vtxo.clone());
            ctx.commit(changes)?;

            info!(%contract_id, vtxo_id = %vtxo.id, %position, activated, "collateral VTXO created");
            Ok(vtxo)
        })
    }

    pub fn get_vtxo(&self, id: VtxoId) -> Result<Vtxo> {
        self.ctx.vtxo(id)
    }

    pub fn vtxos_by_contract(&self, contract_id: ContractId) -> Result<Vec<Vtxo>> {
        self.ctx.store.vtxos_by_contract(&contract_id)
    }

    pub fn vtxos_by_user(&self, user: UserId, only_active: bool) -> Result<Vec<Vtxo>> {
        let mut vtxos = self.ctx.store.vtxos_by_owner(&user)?;
        if only_active {
            vtxos.retain(|v| v.active);
        }
        Ok(vtxos)
    }

    /// Does `user` own `vtxo_id` and is it still active?
    pub fn verify_vtxo_ownership(&self, vtxo_id: VtxoId, user: UserId) -> Result<bool> {
        let vtxo = self.ctx.vtxo(vtxo_id)?;
        Ok(vtxo.active && vtxo.owner_id == user)
    }

    pub fn active_vtxo_count(&self, contract_id: ContractId) -> Result<usize> {
        Ok(self
            .ctx
            .store
            .vtxos_by_contract(&contract_id)?
            .iter()
            .filter(|v| v.active)
            .count())
    }

    /// The VTXOs currently bound to a contract's two sides, buyer first.
    pub fn vtxos_for_settlement(&self, contract_id: ContractId) -> Result<Vec<Vtxo>> {
        let contract = self.ctx.contract(contract_id)?;
        [Position::Buyer, Position::Seller]
            .into_iter()
            .filter_map(|position| contract.vtxo(position))
            .map(|id| self.ctx.vtxo(id))
            .collect()
    }

    pub fn presigned_exits_for_vtxo(&self, vtxo_id: VtxoId) -> Result<Vec<PreSignedExit>> {
        self.ctx.store.presigned_exits_by_vtxo(&vtxo_id)
    }

    /// Chain of custody ending at `vtxo_id`, oldest first.
    ///
    /// A dangling predecessor link ends the walk early; the partial chain is
    /// returned.
    pub fn vtxo_history(&self, vtxo_id: VtxoId) -> Result<Vec<Vtxo>> {
        let mut chain = vec![self.ctx.vtxo(vtxo_id)?];
        let mut seen = HashSet::from([vtxo_id]);
        while let Some(prev) = chain.last().and_then(Vtxo::predecessor) {
            if !seen.insert(prev) {
                warn!(%vtxo_id, %prev, "cycle in VTXO history");
                break;
            }
            match self.ctx.store.vtxo(&prev)? {
                Some(vtxo) => chain.push(vtxo),
                None => {
                    warn!(%vtxo_id, missing = %prev, "broken VTXO history link");
                    break;
                }
            }
        }
        chain.reverse();
        Ok(chain)
    }

    // =================================================================
    // Swap
    // =================================================================

    /// Transfer `vtxo_id` to `new_owner`, who signs the swap message.
    pub fn swap_vtxo(&self, vtxo_id: VtxoId, new_owner: UserId, signature: &[u8]) -> Result<Vtxo> {
        let ctx = &self.ctx;
        let contract_id = ctx.vtxo(vtxo_id)?.contract_id;
        ctx.locks.with(&[contract_id], || {
            let plan = self.prepare_swap(
                vtxo_id,
                new_owner,
                Authorization::Signature(signature.to_vec()),
                false,
            )?;
            ctx.commit(plan.changes)?;
            info!(%vtxo_id, successor = %plan.successor.id, %new_owner, "VTXO swapped");
            Ok(plan.successor)
        })
    }

    /// Validate a swap and stage its effects. Callers hold the contract lock
    /// and commit `changes`, optionally merged with their own.
    pub(crate) fn prepare_swap(
        &self,
        vtxo_id: VtxoId,
        new_owner: UserId,
        authorization: Authorization,
        allow_counterparty: bool,
    ) -> Result<SwapPlan> {
        let ctx = &self.ctx;
        let mut vtxo = ctx.vtxo(vtxo_id)?;
        vtxo.ensure_active()?;
        let mut contract = ctx.contract(vtxo.contract_id)?;
        contract.ensure_live()?;
        let position = contract.position_of_vtxo(vtxo_id).ok_or_else(|| {
            HashPerpError::InvalidVtxoTransition {
                vtxo_id,
                reason: format!("not bound to contract {}", contract.id),
            }
        })?;

        let old_owner = vtxo.owner_id;
        if new_owner == old_owner {
            return Err(HashPerpError::invalid(
                "new_owner_id",
                "already owns the VTXO",
            ));
        }
        if !allow_counterparty && contract.party(position.counterparty()) == new_owner {
            return Err(HashPerpError::invalid(
                "new_owner_id",
                "already holds the opposite side of the contract",
            ));
        }
        ctx.public_key(new_owner)?;

        let signature = match authorization {
            Authorization::Signature(signature) => {
                let message = swap_authorization_message(vtxo_id, new_owner, contract.id);
                ctx.verify_signature(new_owner, &message, &signature, "vtxo swap")?;
                signature
            }
            Authorization::Compensation => Vec::new(),
        };

        let mut successor = vtxo.swap_successor(new_owner, signature);
        vtxo.retire_for_swap()?;
        contract.bind(position, new_owner, successor.id);
        let keys = ctx.participants(&contract)?;
        successor.script_pubkey = lock_script(ctx, &contract, &keys, position)?;

        let entry = LedgerEntry::new(LedgerKind::VtxoSwap)
            .contract(contract.id)
            .users([old_owner, new_owner])
            .amount(successor.amount)
            .with("old_vtxo", vtxo_id)
            .with("new_vtxo", successor.id)
            .with("position", position)
            .with("old_owner", old_owner)
            .with("new_owner", new_owner);
        let ledger_id = entry.id;

        let mut changes = ChangeSet::new();
        changes
            .update(contract)
            .update(vtxo)
            .insert(successor.clone())
            .append(entry);

        debug!(%vtxo_id, successor = %successor.id, %old_owner, %new_owner, "swap prepared");
        Ok(SwapPlan {
            changes,
            successor,
            ledger_id,
        })
    }

    // =================================================================
    // Rollover
    // =================================================================

    /// Carry one side's collateral from its contract into the empty slot of
    /// `new_contract_id` reserved for the same owner.
    pub fn rollover_vtxo(&self, vtxo_id: VtxoId, new_contract_id: ContractId, signature: &[u8]) -> Result<Vtxo> {
        let ctx = &self.ctx;
        let old_contract_id = ctx.vtxo(vtxo_id)?.contract_id;
        if old_contract_id == new_contract_id {
            return Err(HashPerpError::invalid(
                "new_contract_id",
                "VTXO already belongs to this contract",
            ));
        }
        ctx.locks.with(&[old_contract_id, new_contract_id], || {
            let mut vtxo = ctx.vtxo(vtxo_id)?;
            vtxo.ensure_active()?;
            let mut old = ctx.contract(vtxo.contract_id)?;
            if !old.status.is_live() && old.status != ContractStatus::SettlementPending {
                return Err(HashPerpError::InvalidContractStatus {
                    contract_id: old.id,
                    actual: old.status,
                    required: "ACTIVE, CLOSE_TO_EXPIRY or SETTLEMENT_PENDING",
                });
            }
            let old_position = old.position_of_vtxo(vtxo_id).ok_or_else(|| {
                HashPerpError::InvalidVtxoTransition {
                    vtxo_id,
                    reason: format!("not bound to contract {}", old.id),
                }
            })?;

            let mut new = ctx.contract(new_contract_id)?;
            if new.status != ContractStatus::Pending && !new.status.is_live() {
                return Err(HashPerpError::InvalidContractStatus {
                    contract_id: new.id,
                    actual: new.status,
                    required: "PENDING, ACTIVE or CLOSE_TO_EXPIRY",
                });
            }
            let owner = vtxo.owner_id;
            let position = target_slot(&new, owner)?;
            if vtxo.amount != new.side_collateral() {
                return Err(HashPerpError::invalid(
                    "amount",
                    format!(
                        "VTXO holds {} but contract {} needs {} per side",
                        vtxo.amount,
                        new.id,
                        new.side_collateral()
                    ),
                ));
            }
            let message = rollover_authorization_message(vtxo_id, owner, new.id);
            ctx.verify_signature(owner, &message, signature, "vtxo rollover")?;

            let mut successor = vtxo.rollover_successor(
                new.id,
                ScriptPathKind::for_position(position),
                signature.to_vec(),
            );
            vtxo.retire_for_rollover(successor.id)?;
            release_side(&mut old, old_position, None)?;
            new.bind(position, owner, successor.id);
            successor.script_pubkey = lock_script(ctx, &new, &ctx.participants(&new)?, position)?;
            let activated = activate_if_bound(&mut new)?;

            let entry = LedgerEntry::new(LedgerKind::VtxoRollover)
                .contract(new.id)
                .users([owner])
                .amount(successor.amount)
                .with("old_contract", old.id)
                .with("new_contract", new.id)
                .with("old_vtxo", vtxo_id)
                .with("new_vtxo", successor.id)
                .with("old_position", old_position)
                .with("new_position", position);

            let mut changes = ChangeSet::new();
            changes
                .update(old)
                .update(new)
                .update(vtxo)
                .insert(successor.clone())
                .append(entry);
            ctx.commit(changes)?;

            info!(
                %vtxo_id,
                successor = %successor.id,
                from = %old_contract_id,
                to = %new_contract_id,
                activated,
                "VTXO rolled over"
            );
            Ok(successor)
        })
    }

    // =================================================================
    // Unilateral exits
    // =================================================================

    /// Escrow a fully signed sweep of `vtxo_id` for later broadcast.
    pub fn create_presigned_exit_transaction(&self, vtxo_id: VtxoId, signature: &[u8]) -> Result<PreSignedExit> {
        let ctx = &self.ctx;
        let vtxo = ctx.vtxo(vtxo_id)?;
        vtxo.ensure_active()?;
        let contract = ctx.contract(vtxo.contract_id)?;
        let position = contract.position_of_vtxo(vtxo_id).ok_or_else(|| {
            HashPerpError::InvalidVtxoTransition {
                vtxo_id,
                reason: format!("not bound to contract {}", contract.id),
            }
        })?;
        let message = exit_authorization_message(vtxo_id, vtxo.owner_id, contract.expiry_height);
        ctx.verify_signature(vtxo.owner_id, &message, signature, "pre-signed exit")?;

        let keys = ctx.participants(&contract)?;
        let tx = ctx
            .scripts
            .sweep_transaction(&contract, &keys, &vtxo, position, Some(signature))?;
        let exit = PreSignedExit::new(
            vtxo_id,
            contract.id,
            vtxo.owner_id,
            transaction::to_hex(&tx),
            transaction::txid(&tx),
        );

        let entry = LedgerEntry::new(LedgerKind::ExitPathExecution)
            .contract(contract.id)
            .users([vtxo.owner_id])
            .txid(exit.exit_txid)
            .amount(vtxo.amount)
            .status(LedgerStatus::Prepared)
            .with("vtxo_id", vtxo_id)
            .with("exit_type", "pre_signed")
            .with("exit_tx_id", exit.exit_txid)
            .with("owner_id", vtxo.owner_id);

        let mut changes = ChangeSet::new();
        changes.insert(exit.clone()).append(entry);
        ctx.commit(changes)?;

        info!(%vtxo_id, exit_id = %exit.id, txid = %exit.exit_txid, "pre-signed exit escrowed");
        Ok(exit)
    }

    /// Broadcast an escrowed exit and retire its VTXO. Unlike a plain sweep
    /// there is no window check: the owner signed it in advance.
    pub fn execute_presigned_exit(&self, exit_id: PreSignedExitId) -> Result<Txid> {
        let ctx = &self.ctx;
        let contract_id = ctx.presigned_exit(exit_id)?.contract_id;
        ctx.locks.with(&[contract_id], || {
            let mut exit = ctx.presigned_exit(exit_id)?;
            if exit.used {
                return Err(HashPerpError::PreSignedExitUsed(exit_id));
            }
            let mut vtxo = ctx.vtxo(exit.vtxo_id)?;
            vtxo.ensure_active()?;
            let mut contract = ctx.contract(contract_id)?;
            ensure_sweepable(&contract)?;

            let txid = ctx.broadcaster.broadcast_raw(
                BroadcastKey::PresignedExit(exit_id),
                &exit.tx_bytes()?,
                exit.exit_txid,
            )?;
            exit.mark_used()?;

            let mut changes = self.retire_swept(&mut contract, &mut vtxo, txid, "pre_signed")?;
            changes.update(exit);
            ctx.commit(changes)?;

            info!(%exit_id, vtxo_id = %vtxo.id, %txid, "pre-signed exit executed");
            Ok(txid)
        })
    }

    /// Unilaterally sweep a VTXO back to its owner near or after expiry.
    pub fn execute_vtxo_sweep(&self, vtxo_id: VtxoId) -> Result<Txid> {
        let ctx = &self.ctx;
        let contract_id = ctx.vtxo(vtxo_id)?.contract_id;
        ctx.locks.with(&[contract_id], || {
            let mut vtxo = ctx.vtxo(vtxo_id)?;
            vtxo.ensure_active()?;
            let mut contract = ctx.contract(contract_id)?;
            ensure_sweepable(&contract)?;
            if contract.status != ContractStatus::SettlementPending {
                let current = ctx.current_height()?;
                let opens_at = contract
                    .expiry_height
                    .saturating_sub(ctx.config.exits.sweep_window_blocks);
                if current < opens_at {
                    return Err(HashPerpError::SweepWindowClosed {
                        vtxo_id,
                        blocks_to_expiry: contract.expiry_height - current,
                    });
                }
            }

            let position = contract.position_of_vtxo(vtxo_id).ok_or_else(|| {
                HashPerpError::InvalidVtxoTransition {
                    vtxo_id,
                    reason: format!("not bound to contract {contract_id}"),
                }
            })?;
            let keys = ctx.participants(&contract)?;
            let tx = ctx
                .scripts
                .sweep_transaction(&contract, &keys, &vtxo, position, None)?;
            let txid = ctx.broadcaster.broadcast(BroadcastKey::Sweep(vtxo_id), &tx)?;

            let changes = self.retire_swept(&mut contract, &mut vtxo, txid, "vtxo_sweep")?;
            ctx.commit(changes)?;

            info!(%vtxo_id, %contract_id, %txid, status = %contract.status, "VTXO swept");
            Ok(txid)
        })
    }

    /// Retire a swept VTXO and release its side of the contract.
    fn retire_swept(
        &self,
        contract: &mut Contract,
        vtxo: &mut Vtxo,
        txid: Txid,
        exit_type: &str,
    ) -> Result<ChangeSet> {
        let position = contract.position_of_vtxo(vtxo.id).ok_or_else(|| {
            HashPerpError::InvalidVtxoTransition {
                vtxo_id: vtxo.id,
                reason: format!("not bound to contract {}", contract.id),
            }
        })?;
        vtxo.retire_for_exit(txid)?;
        release_side(contract, position, Some(txid))?;

        let entry = LedgerEntry::new(LedgerKind::ExitPathExecution)
            .contract(contract.id)
            .users([vtxo.owner_id])
            .txid(txid)
            .amount(vtxo.amount)
            .height(self.ctx.current_height()?)
            .status(LedgerStatus::Completed)
            .with("vtxo_id", vtxo.id)
            .with("exit_type", exit_type)
            .with("position", position)
            .with("owner_id", vtxo.owner_id);

        let mut changes = ChangeSet::new();
        changes
            .update(contract.clone())
            .update(vtxo.clone())
            .append(entry);
        Ok(changes)
    }
}

/// Sweeps need a live contract, one already winding down, or a PENDING one
/// whose funded side wants its collateral back.
fn ensure_sweepable(contract: &Contract) -> Result<()> {
    if contract.status.is_live()
        || matches!(
            contract.status,
            ContractStatus::SettlementPending | ContractStatus::Pending
        )
    {
        Ok(())
    } else {
        Err(HashPerpError::InvalidContractStatus {
            contract_id: contract.id,
            actual: contract.status,
            required: "PENDING, ACTIVE, CLOSE_TO_EXPIRY or SETTLEMENT_PENDING",
        })
    }
}

/// The empty slot of `contract` reserved for `owner`.
fn target_slot(contract: &Contract, owner: UserId) -> Result<Position> {
    let reserved: Vec<Position> = [Position::Buyer, Position::Seller]
        .into_iter()
        .filter(|p| contract.party(*p) == owner)
        .collect();
    if reserved.is_empty() {
        return Err(HashPerpError::NotParticipant {
            contract_id: contract.id,
            user_id: owner,
        });
    }
    reserved
        .iter()
        .copied()
        .find(|p| contract.vtxo(*p).is_none())
        .ok_or_else(|| HashPerpError::PositionOccupied {
            contract_id: contract.id,
            position: reserved[0].to_string(),
        })
}

/// Mark one side exited: the first side moves the contract to
/// SETTLEMENT_PENDING, the second completes it. A PENDING contract has only
/// one funded side, so releasing it completes the contract.
fn release_side(contract: &mut Contract, position: Position, txid: Option<Txid>) -> Result<()> {
    contract.mark_side_exited(position, txid);
    if contract.status == ContractStatus::Pending {
        contract.mark_side_exited(position.counterparty(), None);
    }
    if contract.status.is_live() {
        contract.transition_to(ContractStatus::SettlementPending)?;
    }
    if contract.both_sides_exited() {
        contract.transition_to(ContractStatus::Completed)?;
        contract.completed_at = Some(Utc::now());
    }
    Ok(())
}

/// PENDING → ACTIVE once both sides hold a VTXO.
fn activate_if_bound(contract: &mut Contract) -> Result<bool> {
    if contract.status == ContractStatus::Pending
        && contract.buyer_vtxo.is_some()
        && contract.seller_vtxo.is_some()
    {
        contract.transition_to(ContractStatus::Active)?;
        return Ok(true);
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use hashperp_types::ContractKind;
    use rust_decimal::Decimal;

    use super::*;

    fn bound_contract() -> Contract {
        let mut c = Contract::dummy(ContractKind::Call, Decimal::new(1, 4), 900_000);
        c.bind(Position::Buyer, c.buyer_id, VtxoId::new());
        c.bind(Position::Seller, c.seller_id, VtxoId::new());
        c.transition_to(ContractStatus::Active).unwrap();
        c
    }

    #[test]
    fn first_release_pends_second_completes() {
        let mut c = bound_contract();
        release_side(&mut c, Position::Buyer, Some(Txid([1; 32]))).unwrap();
        assert_eq!(c.status, ContractStatus::SettlementPending);
        assert!(c.buyer_vtxo.is_none());
        assert!(c.completed_at.is_none());

        release_side(&mut c, Position::Seller, Some(Txid([2; 32]))).unwrap();
        assert_eq!(c.status, ContractStatus::Completed);
        assert!(c.completed_at.is_some());
        assert_eq!(c.seller_exit_txid, Some(Txid([2; 32])));
    }

    #[test]
    fn releasing_the_funded_side_completes_a_pending_contract() {
        let mut c = Contract::dummy(ContractKind::Call, Decimal::new(1, 4), 900_000);
        c.bind(Position::Seller, c.seller_id, VtxoId::new());
        assert!(ensure_sweepable(&c).is_ok());

        release_side(&mut c, Position::Seller, Some(Txid([3; 32]))).unwrap();
        assert_eq!(c.status, ContractStatus::Completed);
        assert!(c.buyer_exited && c.seller_exited);
        assert_eq!(c.buyer_exit_txid, None);
        assert_eq!(c.seller_exit_txid, Some(Txid([3; 32])));
        assert!(c.completed_at.is_some());
    }

    #[test]
    fn target_slot_rules() {
        let mut c = Contract::dummy(ContractKind::Put, Decimal::new(1, 4), 900_000);
        let buyer = c.buyer_id;
        assert_eq!(target_slot(&c, buyer).unwrap(), Position::Buyer);

        c.bind(Position::Buyer, buyer, VtxoId::new());
        let err = target_slot(&c, buyer).unwrap_err();
        assert!(matches!(err, HashPerpError::PositionOccupied { .. }));

        let err = target_slot(&c, UserId::new()).unwrap_err();
        assert!(matches!(err, HashPerpError::NotParticipant { .. }));
    }

    #[test]
    fn activation_needs_both_sides() {
        let mut c = Contract::dummy(ContractKind::Call, Decimal::new(1, 4), 900_000);
        c.bind(Position::Seller, c.seller_id, VtxoId::new());
        assert!(!activate_if_bound(&mut c).unwrap());
        assert_eq!(c.status, ContractStatus::Pending);
        c.bind(Position::Buyer, c.buyer_id, VtxoId::new());
        assert!(activate_if_bound(&mut c).unwrap());
        assert_eq!(c.status, ContractStatus::Active);
    }

    #[test]
    fn settled_contracts_are_not_sweepable() {
        let mut c = bound_contract();
        assert!(ensure_sweepable(&c).is_ok());
        c.transition_to(ContractStatus::Settled).unwrap();
        assert!(ensure_sweepable(&c).is_err());
    }
}
