//! Shared state handed to every engine.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use hashperp_script::{Participants, ScriptEngine};
use hashperp_types::{
    Contract, ContractId, EngineConfig, HashPerpError, Order, OrderId, PreSignedExit,
    PreSignedExitId, Result, SwapOffer, SwapOfferId, UserId, Vtxo, VtxoId, XOnlyKey,
};
use tracing::warn;

use crate::locks::ContractLocks;
use crate::oracle::ChainOracle;
use crate::protocol::Broadcaster;
use crate::store::{ChangeSet, Store};

pub struct EngineContext {
    pub config: EngineConfig,
    pub store: Arc<dyn Store>,
    pub oracle: Arc<dyn ChainOracle>,
    pub scripts: ScriptEngine,
    pub locks: ContractLocks,
    pub broadcaster: Broadcaster,
}

impl EngineContext {
    pub fn new(
        config: EngineConfig,
        store: Arc<dyn Store>,
        oracle: Arc<dyn ChainOracle>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            scripts: ScriptEngine::new(config.exits.timeout_csv_blocks),
            broadcaster: Broadcaster::new(Arc::clone(&oracle), config.journal_capacity),
            locks: ContractLocks::new(),
            config,
            store,
            oracle,
        })
    }

    // =================================================================
    // Chain
    // =================================================================

    pub fn current_height(&self) -> Result<u64> {
        self.oracle.current_height()
    }

    /// Wall-clock estimate for `expiry_height` seen from `current_height`.
    #[must_use]
    pub fn expiry_date(&self, current_height: u64, expiry_height: u64) -> DateTime<Utc> {
        let blocks = i64::try_from(expiry_height.saturating_sub(current_height)).unwrap_or(i64::MAX);
        let secs = blocks.saturating_mul(self.config.block_interval_secs);
        Duration::try_seconds(secs)
            .and_then(|delta| Utc::now().checked_add_signed(delta))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Fail unless `signature` is a valid BIP340 signature by `user` over `message`.
    pub fn verify_signature(
        &self,
        user: UserId,
        message: &[u8; 32],
        signature: &[u8],
        purpose: &str,
    ) -> Result<()> {
        if signature.is_empty() {
            return Err(HashPerpError::InvalidSignature {
                reason: format!("{purpose}: empty signature"),
            });
        }
        let key = self.public_key(user)?;
        if self.oracle.verify_signature(message, signature, &key) {
            Ok(())
        } else {
            warn!(%user, purpose, "signature rejected");
            Err(HashPerpError::InvalidSignature {
                reason: format!("{purpose}: not signed by {user}"),
            })
        }
    }

    // =================================================================
    // Lookups that fail with NotFound
    // =================================================================

    pub fn public_key(&self, user: UserId) -> Result<XOnlyKey> {
        self.store
            .public_key(&user)?
            .ok_or(HashPerpError::PublicKeyNotFound(user))
    }

    /// Current keys of both contract parties.
    pub fn participants(&self, contract: &Contract) -> Result<Participants> {
        Ok(Participants {
            buyer: self.public_key(contract.buyer_id)?,
            seller: self.public_key(contract.seller_id)?,
        })
    }

    pub fn contract(&self, id: ContractId) -> Result<Contract> {
        self.store
            .contract(&id)?
            .ok_or(HashPerpError::ContractNotFound(id))
    }

    pub fn vtxo(&self, id: VtxoId) -> Result<Vtxo> {
        self.store.vtxo(&id)?.ok_or(HashPerpError::VtxoNotFound(id))
    }

    pub fn order(&self, id: OrderId) -> Result<Order> {
        self.store.order(&id)?.ok_or(HashPerpError::OrderNotFound(id))
    }

    pub fn swap_offer(&self, id: SwapOfferId) -> Result<SwapOffer> {
        self.store
            .swap_offer(&id)?
            .ok_or(HashPerpError::SwapOfferNotFound(id))
    }

    pub fn presigned_exit(&self, id: PreSignedExitId) -> Result<PreSignedExit> {
        self.store
            .presigned_exit(&id)?
            .ok_or(HashPerpError::PreSignedExitNotFound(id))
    }

    pub fn commit(&self, changes: ChangeSet) -> Result<()> {
        self.store.commit(changes)
    }
}
