//! Service facade: one entry point wiring every engine to a shared context.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use hashperp_types::{
    Contract, ContractId, ContractKind, ContractStatus, EngineConfig, ExitPath, HashPerpError,
    HashRateSample, LedgerEntry, LedgerEntryId, LedgerKind, Order, OrderId, OrderSide,
    OrderStatus, Position, PreSignedExit, PreSignedExitId, Result, SwapOffer, SwapOfferId,
    SwapOfferMarketData, Txid, UserId, Vtxo, VtxoId, XOnlyKey,
};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, warn};

use crate::context::EngineContext;
use crate::contracts::{ContractEngine, ContractTerms, ExitReceipt};
use crate::oracle::ChainOracle;
use crate::orders::{MatchReport, OrderBookSnapshot, OrderEngine};
use crate::store::Store;
use crate::swaps::SwapEngine;
use crate::validation::{validate_contract_parameters, validate_counterparties};
use crate::vtxos::VtxoEngine;

/// Liveness of the two external boundaries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub healthy: bool,
    pub chain_height: Option<u64>,
    pub oracle_error: Option<String>,
    pub store_error: Option<String>,
    /// Broadcasts remembered by the idempotency journal.
    pub journaled_broadcasts: usize,
}

pub struct HashPerpService {
    ctx: Arc<EngineContext>,
    contracts: Arc<ContractEngine>,
    vtxos: Arc<VtxoEngine>,
    swaps: SwapEngine,
    orders: OrderEngine,
}

impl HashPerpService {
    pub fn new(config: EngineConfig, store: Arc<dyn Store>, oracle: Arc<dyn ChainOracle>) -> Result<Self> {
        let ctx = Arc::new(EngineContext::new(config, store, oracle)?);
        let contracts = Arc::new(ContractEngine::new(Arc::clone(&ctx)));
        let vtxos = Arc::new(VtxoEngine::new(Arc::clone(&ctx)));
        let swaps = SwapEngine::new(Arc::clone(&ctx));
        swaps.set_vtxo_engine(Arc::clone(&vtxos))?;
        let orders = OrderEngine::new(Arc::clone(&ctx), Arc::clone(&contracts));
        info!(
            journal_capacity = ctx.config.journal_capacity,
            timeout_csv_blocks = ctx.config.exits.timeout_csv_blocks,
            "hashperp service started"
        );
        Ok(Self {
            ctx,
            contracts,
            vtxos,
            swaps,
            orders,
        })
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.ctx.config
    }

    // =================================================================
    // Participants & chain
    // =================================================================

    pub fn register_public_key(&self, user: UserId, key: XOnlyKey) -> Result<()> {
        self.ctx.store.register_public_key(user, key)
    }

    pub fn current_height(&self) -> Result<u64> {
        self.ctx.current_height()
    }

    /// Parameter checks a UI can run before submitting a contract.
    pub fn validate_contract_parameters(&self, buyer: UserId, seller: UserId, terms: &ContractTerms) -> Result<()> {
        validate_contract_parameters(
            &self.ctx.config.limits,
            self.ctx.current_height()?,
            terms.strike_rate,
            terms.expiry_height,
            terms.size,
        )?;
        validate_counterparties(buyer, seller)
    }

    pub fn current_hash_rate(&self) -> Result<HashRateSample> {
        let height = self.ctx.current_height()?;
        self.hash_rate_at(height)
    }

    pub fn hash_rate_at(&self, height: u64) -> Result<HashRateSample> {
        HashRateSample::at(height, self.ctx.oracle.hash_rate_at(height)?)
    }

    pub fn healthcheck(&self) -> HealthReport {
        let (chain_height, oracle_error) = match self.ctx.current_height() {
            Ok(height) => (Some(height), None),
            Err(err) => (None, Some(err.to_string())),
        };
        let store_error = self.ctx.store.open_orders().err().map(|e| e.to_string());
        let healthy = oracle_error.is_none() && store_error.is_none();
        if !healthy {
            warn!(?oracle_error, ?store_error, "healthcheck failed");
        }
        HealthReport {
            healthy,
            chain_height,
            oracle_error,
            store_error,
            journaled_broadcasts: self.ctx.broadcaster.journal_len(),
        }
    }

    // =================================================================
    // Contracts
    // =================================================================

    pub fn create_contract(&self, buyer: UserId, seller: UserId, terms: ContractTerms) -> Result<Contract> {
        self.contracts.create_contract(buyer, seller, terms)
    }

    pub fn open_contract(
        &self,
        buyer: UserId,
        seller: UserId,
        terms: ContractTerms,
        funded: Position,
    ) -> Result<Contract> {
        self.contracts.open_contract(buyer, seller, terms, funded)
    }

    pub fn get_contract(&self, id: ContractId) -> Result<Contract> {
        self.contracts.get_contract(id)
    }

    pub fn contracts_by_user(&self, user: UserId, status: Option<ContractStatus>) -> Result<Vec<Contract>> {
        self.contracts.contracts_by_user(user, status)
    }

    pub fn settle_contract(&self, id: ContractId) -> Result<Contract> {
        self.contracts.settle_contract(id)
    }

    pub fn exit_contract(&self, id: ContractId, user: UserId) -> Result<ExitReceipt> {
        self.contracts.exit_contract(id, user)
    }

    pub fn execute_exit_path(&self, id: ContractId, user: UserId, path: ExitPath) -> Result<ExitReceipt> {
        self.contracts.execute_exit_path(id, user, path)
    }

    pub fn rollover_contract(&self, id: ContractId, new_expiry: u64) -> Result<Contract> {
        self.contracts.rollover_contract(id, new_expiry)
    }

    pub fn mark_expiring_contracts(&self) -> Result<Vec<ContractId>> {
        self.contracts.mark_expiring_contracts()
    }

    // =================================================================
    // VTXOs
    // =================================================================

    pub fn create_vtxo(&self, contract_id: ContractId, owner: UserId, position: Position) -> Result<Vtxo> {
        self.vtxos.create_vtxo(contract_id, owner, position)
    }

    pub fn get_vtxo(&self, id: VtxoId) -> Result<Vtxo> {
        self.vtxos.get_vtxo(id)
    }

    pub fn vtxos_by_contract(&self, contract_id: ContractId) -> Result<Vec<Vtxo>> {
        self.vtxos.vtxos_by_contract(contract_id)
    }

    pub fn vtxos_by_user(&self, user: UserId, only_active: bool) -> Result<Vec<Vtxo>> {
        self.vtxos.vtxos_by_user(user, only_active)
    }

    pub fn swap_vtxo(&self, vtxo_id: VtxoId, new_owner: UserId, signature: &[u8]) -> Result<Vtxo> {
        self.vtxos.swap_vtxo(vtxo_id, new_owner, signature)
    }

    pub fn rollover_vtxo(&self, vtxo_id: VtxoId, new_contract_id: ContractId, signature: &[u8]) -> Result<Vtxo> {
        self.vtxos.rollover_vtxo(vtxo_id, new_contract_id, signature)
    }

    pub fn create_presigned_exit_transaction(&self, vtxo_id: VtxoId, signature: &[u8]) -> Result<PreSignedExit> {
        self.vtxos.create_presigned_exit_transaction(vtxo_id, signature)
    }

    pub fn execute_presigned_exit(&self, exit_id: PreSignedExitId) -> Result<Txid> {
        self.vtxos.execute_presigned_exit(exit_id)
    }

    pub fn execute_vtxo_sweep(&self, vtxo_id: VtxoId) -> Result<Txid> {
        self.vtxos.execute_vtxo_sweep(vtxo_id)
    }

    pub fn vtxo_history(&self, vtxo_id: VtxoId) -> Result<Vec<Vtxo>> {
        self.vtxos.vtxo_history(vtxo_id)
    }

    pub fn verify_vtxo_ownership(&self, vtxo_id: VtxoId, user: UserId) -> Result<bool> {
        self.vtxos.verify_vtxo_ownership(vtxo_id, user)
    }

    pub fn active_vtxo_count(&self, contract_id: ContractId) -> Result<usize> {
        self.vtxos.active_vtxo_count(contract_id)
    }

    pub fn vtxos_for_settlement(&self, contract_id: ContractId) -> Result<Vec<Vtxo>> {
        self.vtxos.vtxos_for_settlement(contract_id)
    }

    pub fn presigned_exits_for_vtxo(&self, vtxo_id: VtxoId) -> Result<Vec<PreSignedExit>> {
        self.vtxos.presigned_exits_for_vtxo(vtxo_id)
    }

    // =================================================================
    // Swap offers
    // =================================================================

    pub fn create_swap_offer(
        &self,
        offeror: UserId,
        vtxo_id: VtxoId,
        rate: Decimal,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<SwapOffer> {
        self.swaps.create_swap_offer(offeror, vtxo_id, rate, expires_at)
    }

    pub fn create_direct_swap_offer(
        &self,
        offeror: UserId,
        vtxo_id: VtxoId,
        rate: Decimal,
        expires_at: Option<DateTime<Utc>>,
        target: UserId,
    ) -> Result<SwapOffer> {
        self.swaps
            .create_direct_swap_offer(offeror, vtxo_id, rate, expires_at, target)
    }

    pub fn accept_swap_offer(&self, offer_id: SwapOfferId, acceptor: UserId, signature: &[u8]) -> Result<Vtxo> {
        self.swaps.accept_swap_offer(offer_id, acceptor, signature)
    }

    pub fn cancel_swap_offer(&self, offer_id: SwapOfferId, user: UserId) -> Result<SwapOffer> {
        self.swaps.cancel_swap_offer(offer_id, user)
    }

    pub fn reject_swap_offer(&self, offer_id: SwapOfferId, user: UserId) -> Result<SwapOffer> {
        self.swaps.reject_swap_offer(offer_id, user)
    }

    pub fn get_swap_offer(&self, offer_id: SwapOfferId) -> Result<SwapOffer> {
        self.swaps.get_swap_offer(offer_id)
    }

    pub fn swap_offers_by_user(&self, user: UserId, as_offeror: bool) -> Result<Vec<SwapOffer>> {
        self.swaps.swap_offers_by_user(user, as_offeror)
    }

    pub fn swap_offers_by_contract(&self, contract_id: ContractId) -> Result<Vec<SwapOffer>> {
        self.swaps.swap_offers_by_contract(contract_id)
    }

    pub fn open_offers_count(&self, contract_id: ContractId) -> Result<usize> {
        self.swaps.open_offers_count(contract_id)
    }

    pub fn cleanup_expired_offers(&self) -> Result<usize> {
        self.swaps.cleanup_expired_offers()
    }

    pub fn swap_offer_market_data(&self, contract_id: ContractId) -> Result<SwapOfferMarketData> {
        self.swaps.market_data(contract_id)
    }

    pub fn request_contract_position_swap(
        &self,
        contract_id: ContractId,
        requester: UserId,
        differential: Decimal,
        expires_at: Option<DateTime<Utc>>,
        requester_signature: &[u8],
    ) -> Result<SwapOffer> {
        self.swaps.request_contract_position_swap(
            contract_id,
            requester,
            differential,
            expires_at,
            requester_signature,
        )
    }

    pub fn accept_position_swap(&self, offer_id: SwapOfferId, acceptor: UserId, signature: &[u8]) -> Result<SwapOffer> {
        self.swaps.accept_position_swap(offer_id, acceptor, signature)
    }

    // =================================================================
    // Orders
    // =================================================================

    pub fn place_order(
        &self,
        user: UserId,
        side: OrderSide,
        kind: ContractKind,
        strike_rate: Decimal,
        expiry_height: u64,
        size: Decimal,
    ) -> Result<Order> {
        self.orders
            .place_order(user, side, kind, strike_rate, expiry_height, size)
    }

    pub fn match_orders(&self) -> Result<MatchReport> {
        self.orders.match_orders()
    }

    pub fn cancel_order(&self, order_id: OrderId, user: UserId) -> Result<Order> {
        self.orders.cancel_order(order_id, user)
    }

    pub fn get_order(&self, order_id: OrderId) -> Result<Order> {
        self.orders.get_order(order_id)
    }

    pub fn orders_by_user(&self, user: UserId, status: Option<OrderStatus>) -> Result<Vec<Order>> {
        self.orders.orders_by_user(user, status)
    }

    pub fn get_order_book(&self, kind: ContractKind, expiry_height: u64) -> Result<OrderBookSnapshot> {
        self.orders.get_order_book(kind, expiry_height)
    }

    // =================================================================
    // Ledger
    // =================================================================

    pub fn ledger_entry(&self, id: LedgerEntryId) -> Result<LedgerEntry> {
        self.ctx
            .store
            .ledger_entry(&id)?
            .ok_or(HashPerpError::LedgerEntryNotFound(id))
    }

    pub fn ledger_by_contract(&self, contract_id: ContractId) -> Result<Vec<LedgerEntry>> {
        self.ctx.store.ledger_by_contract(&contract_id)
    }

    /// Entries involving `user`, optionally restricted to `kinds`.
    pub fn ledger_by_user(&self, user: UserId, kinds: &[LedgerKind]) -> Result<Vec<LedgerEntry>> {
        let mut entries = self.ctx.store.ledger_by_user(&user)?;
        if !kinds.is_empty() {
            entries.retain(|e| kinds.contains(&e.kind));
        }
        Ok(entries)
    }

    pub fn ledger_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<LedgerEntry>> {
        if to < from {
            return Err(HashPerpError::invalid("to", "must not precede from"));
        }
        self.ctx.store.ledger_between(from, to)
    }
}
