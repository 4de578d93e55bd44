//! Shared harness for the engine integration tests: a service over the
//! simulated chain and the in-memory store, plus signing parties.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use hashperp_engine::{ContractTerms, HashPerpService, InMemoryStore, SimulatedChain};
use hashperp_script::TestSigner;
use hashperp_types::{
    Contract, ContractId, ContractKind, EngineConfig, LedgerEntry, LedgerKind, UserId, VtxoId,
    XOnlyKey,
    exit_authorization_message, rollover_authorization_message, swap_authorization_message,
};
use rust_decimal::Decimal;
use tracing_subscriber::EnvFilter;

/// Tip of the simulated chain when a harness starts. Subsidy is 3.125 BTC.
pub const START_HEIGHT: u64 = 840_000;

/// Network hash rate (PH/s) that puts the metric at 0.00012 BTC/PH/day
/// during the 3.125 BTC subsidy era.
pub fn hash_rate_for_0_00012() -> Decimal {
    Decimal::from(3_750_000)
}

/// 0.00010 BTC/PH/day.
pub fn strike() -> Decimal {
    Decimal::new(10, 5)
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// A registered user with a signing key.
pub struct Party {
    pub id: UserId,
    signer: TestSigner,
}

impl Party {
    pub fn key(&self) -> XOnlyKey {
        self.signer.xonly()
    }

    pub fn sign_swap(&self, vtxo_id: VtxoId, contract_id: ContractId) -> Vec<u8> {
        self.signer
            .sign(&swap_authorization_message(vtxo_id, self.id, contract_id))
    }

    pub fn sign_rollover(&self, vtxo_id: VtxoId, new_contract_id: ContractId) -> Vec<u8> {
        self.signer
            .sign(&rollover_authorization_message(vtxo_id, self.id, new_contract_id))
    }

    pub fn sign_exit(&self, vtxo_id: VtxoId, expiry_height: u64) -> Vec<u8> {
        self.signer
            .sign(&exit_authorization_message(vtxo_id, self.id, expiry_height))
    }

    /// Signature over an arbitrary digest, for negative tests.
    pub fn sign_raw(&self, message: &[u8; 32]) -> Vec<u8> {
        self.signer.sign(message)
    }
}

pub struct Harness {
    pub service: HashPerpService,
    pub chain: Arc<SimulatedChain>,
    pub store: Arc<InMemoryStore>,
    next_seed: AtomicU8,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_chain(SimulatedChain::new(START_HEIGHT))
    }

    /// Chain whose hash rate puts the metric at 0.00012 from the start.
    pub fn at_metric_0_00012() -> Self {
        Self::with_chain(SimulatedChain::with_hash_rate(
            START_HEIGHT,
            hash_rate_for_0_00012(),
        ))
    }

    pub fn with_chain(chain: SimulatedChain) -> Self {
        init_tracing();
        let chain = Arc::new(chain);
        let store = Arc::new(InMemoryStore::new());
        let service = HashPerpService::new(EngineConfig::default(), store.clone(), chain.clone())
            .expect("service wiring");
        Self {
            service,
            chain,
            store,
            next_seed: AtomicU8::new(1),
        }
    }

    /// A fresh user with a registered key.
    pub fn party(&self) -> Party {
        let seed = self.next_seed.fetch_add(1, Ordering::SeqCst);
        let signer = TestSigner::from_seed(seed);
        let id = UserId::new();
        self.service
            .register_public_key(id, signer.xonly())
            .expect("register key");
        Party { id, signer }
    }

    pub fn terms(kind: ContractKind, blocks_to_expiry: u64) -> ContractTerms {
        ContractTerms {
            kind,
            strike_rate: strike(),
            expiry_height: START_HEIGHT + blocks_to_expiry,
            size: Decimal::ONE,
        }
    }

    /// ACTIVE 1 BTC CALL at strike 0.00010.
    pub fn call_contract(&self, buyer: &Party, seller: &Party, blocks_to_expiry: u64) -> Contract {
        self.service
            .create_contract(
                buyer.id,
                seller.id,
                Self::terms(ContractKind::Call, blocks_to_expiry),
            )
            .expect("create contract")
    }

    pub fn ledger_of_kind(&self, contract_id: ContractId, kind: LedgerKind) -> Vec<LedgerEntry> {
        self.service
            .ledger_by_contract(contract_id)
            .expect("ledger")
            .into_iter()
            .filter(|e| e.kind == kind)
            .collect()
    }
}
