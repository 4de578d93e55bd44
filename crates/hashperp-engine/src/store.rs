//! Persistence boundary.
//!
//! Reads are typed lookups per entity. Every write goes through
//! [`Store::commit`], which applies a [`ChangeSet`] all-or-nothing:
//!
//! - **inserts** fail with `Duplicate` if the id exists
//! - **updates** carry the version they were read at; a mismatch fails the
//!   whole set with `VersionConflict`, otherwise the stored version is bumped
//! - **ledger** entries are appended; **annotations** add keys to entries
//!   already on the ledger

use chrono::{DateTime, Utc};
use hashperp_types::{
    Contract, ContractId, ContractStatus, LedgerEntry, LedgerEntryId, Order, OrderId,
    PreSignedExit, PreSignedExitId, Result, SwapOffer, SwapOfferId, UserId, Vtxo, VtxoId,
    XOnlyKey,
};

/// One persisted entity.
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Contract(Contract),
    Vtxo(Vtxo),
    Order(Order),
    SwapOffer(SwapOffer),
    PreSignedExit(PreSignedExit),
}

impl Record {
    #[must_use]
    pub fn entity(&self) -> &'static str {
        match self {
            Self::Contract(_) => "contract",
            Self::Vtxo(_) => "vtxo",
            Self::Order(_) => "order",
            Self::SwapOffer(_) => "swap_offer",
            Self::PreSignedExit(_) => "presigned_exit",
        }
    }

    #[must_use]
    pub fn id(&self) -> String {
        match self {
            Self::Contract(c) => c.id.to_string(),
            Self::Vtxo(v) => v.id.to_string(),
            Self::Order(o) => o.id.to_string(),
            Self::SwapOffer(s) => s.id.to_string(),
            Self::PreSignedExit(e) => e.id.to_string(),
        }
    }
}

macro_rules! record_from {
    ($($ty:ident),*) => {
        $(impl From<$ty> for Record {
            fn from(value: $ty) -> Self {
                Self::$ty(value)
            }
        })*
    };
}

record_from!(Contract, Vtxo, Order, SwapOffer, PreSignedExit);

/// A unit of work applied atomically by [`Store::commit`].
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    pub inserts: Vec<Record>,
    pub updates: Vec<Record>,
    pub ledger: Vec<LedgerEntry>,
    pub annotations: Vec<(LedgerEntryId, String, String)>,
}

impl ChangeSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, record: impl Into<Record>) -> &mut Self {
        self.inserts.push(record.into());
        self
    }

    /// `record` must carry the version it was read at.
    pub fn update(&mut self, record: impl Into<Record>) -> &mut Self {
        self.updates.push(record.into());
        self
    }

    pub fn append(&mut self, entry: LedgerEntry) -> &mut Self {
        self.ledger.push(entry);
        self
    }

    pub fn annotate(&mut self, entry: LedgerEntryId, key: &str, value: impl ToString) -> &mut Self {
        self.annotations
            .push((entry, key.to_string(), value.to_string()));
        self
    }

    /// Fold `other` into this set.
    pub fn merge(&mut self, other: Self) -> &mut Self {
        self.inserts.extend(other.inserts);
        self.updates.extend(other.updates);
        self.ledger.extend(other.ledger);
        self.annotations.extend(other.annotations);
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inserts.is_empty()
            && self.updates.is_empty()
            && self.ledger.is_empty()
            && self.annotations.is_empty()
    }
}

/// Storage used by every engine.
pub trait Store: Send + Sync {
    // =================================================================
    // Contracts
    // =================================================================
    fn contract(&self, id: &ContractId) -> Result<Option<Contract>>;
    fn contracts_by_user(&self, user: &UserId) -> Result<Vec<Contract>>;
    fn contracts_by_status(&self, status: ContractStatus) -> Result<Vec<Contract>>;

    // =================================================================
    // VTXOs
    // =================================================================
    fn vtxo(&self, id: &VtxoId) -> Result<Option<Vtxo>>;
    fn vtxos_by_contract(&self, contract: &ContractId) -> Result<Vec<Vtxo>>;
    fn vtxos_by_owner(&self, owner: &UserId) -> Result<Vec<Vtxo>>;

    // =================================================================
    // Orders
    // =================================================================
    fn order(&self, id: &OrderId) -> Result<Option<Order>>;
    fn orders_by_user(&self, user: &UserId) -> Result<Vec<Order>>;
    fn open_orders(&self) -> Result<Vec<Order>>;
    /// Monotonic arrival sequence for time priority.
    fn next_order_sequence(&self) -> Result<u64>;

    // =================================================================
    // Swap offers
    // =================================================================
    fn swap_offer(&self, id: &SwapOfferId) -> Result<Option<SwapOffer>>;
    fn swap_offers_by_vtxo(&self, vtxo: &VtxoId) -> Result<Vec<SwapOffer>>;
    fn swap_offers_by_contract(&self, contract: &ContractId) -> Result<Vec<SwapOffer>>;
    /// Offers the user made, was targeted by, or accepted.
    fn swap_offers_by_user(&self, user: &UserId) -> Result<Vec<SwapOffer>>;
    fn open_swap_offers(&self) -> Result<Vec<SwapOffer>>;

    // =================================================================
    // Pre-signed exits
    // =================================================================
    fn presigned_exit(&self, id: &PreSignedExitId) -> Result<Option<PreSignedExit>>;
    fn presigned_exits_by_vtxo(&self, vtxo: &VtxoId) -> Result<Vec<PreSignedExit>>;

    // =================================================================
    // Ledger
    // =================================================================
    fn ledger_entry(&self, id: &LedgerEntryId) -> Result<Option<LedgerEntry>>;
    fn ledger_by_contract(&self, contract: &ContractId) -> Result<Vec<LedgerEntry>>;
    fn ledger_by_user(&self, user: &UserId) -> Result<Vec<LedgerEntry>>;
    /// Entries with `from <= timestamp < to`, oldest first.
    fn ledger_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<LedgerEntry>>;

    // =================================================================
    // Keys
    // =================================================================
    fn register_public_key(&self, user: UserId, key: XOnlyKey) -> Result<()>;
    fn public_key(&self, user: &UserId) -> Result<Option<XOnlyKey>>;

    /// Apply `changes` atomically.
    fn commit(&self, changes: ChangeSet) -> Result<()>;
}
