//! In-memory reference [`Store`].
//!
//! All tables sit behind one `RwLock`, so a commit is validated and applied
//! under a single write guard: readers see either none or all of a change
//! set.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use hashperp_types::{
    Contract, ContractId, ContractStatus, HashPerpError, LedgerEntry, LedgerEntryId, Order,
    OrderId, OrderStatus, PreSignedExit, PreSignedExitId, Result, SwapOffer, SwapOfferId, UserId,
    Vtxo, VtxoId, XOnlyKey,
};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::store::{ChangeSet, Record, Store};

#[derive(Debug, Default)]
struct Tables {
    contracts: HashMap<ContractId, Contract>,
    vtxos: HashMap<VtxoId, Vtxo>,
    orders: HashMap<OrderId, Order>,
    offers: HashMap<SwapOfferId, SwapOffer>,
    exits: HashMap<PreSignedExitId, PreSignedExit>,
    ledger: Vec<LedgerEntry>,
    ledger_index: HashMap<LedgerEntryId, usize>,
    keys: HashMap<UserId, XOnlyKey>,
}

impl Tables {
    fn exists(&self, record: &Record) -> bool {
        match record {
            Record::Contract(c) => self.contracts.contains_key(&c.id),
            Record::Vtxo(v) => self.vtxos.contains_key(&v.id),
            Record::Order(o) => self.orders.contains_key(&o.id),
            Record::SwapOffer(s) => self.offers.contains_key(&s.id),
            Record::PreSignedExit(e) => self.exits.contains_key(&e.id),
        }
    }

    /// Stored version, `None` if absent. Pre-signed exits are unversioned.
    fn stored_version(&self, record: &Record) -> Option<u64> {
        match record {
            Record::Contract(c) => self.contracts.get(&c.id).map(|s| s.version),
            Record::Vtxo(v) => self.vtxos.get(&v.id).map(|s| s.version),
            Record::Order(o) => self.orders.get(&o.id).map(|s| s.version),
            Record::SwapOffer(s) => self.offers.get(&s.id).map(|s| s.version),
            Record::PreSignedExit(e) => self.exits.get(&e.id).map(|_| 0),
        }
    }

    fn put(&mut self, record: Record, bump: bool) {
        let step = u64::from(bump);
        match record {
            Record::Contract(mut c) => {
                c.version += step;
                self.contracts.insert(c.id, c);
            }
            Record::Vtxo(mut v) => {
                v.version += step;
                self.vtxos.insert(v.id, v);
            }
            Record::Order(mut o) => {
                o.version += step;
                self.orders.insert(o.id, o);
            }
            Record::SwapOffer(mut s) => {
                s.version += step;
                self.offers.insert(s.id, s);
            }
            Record::PreSignedExit(e) => {
                self.exits.insert(e.id, e);
            }
        }
    }
}

fn record_version(record: &Record) -> u64 {
    match record {
        Record::Contract(c) => c.version,
        Record::Vtxo(v) => v.version,
        Record::Order(o) => o.version,
        Record::SwapOffer(s) => s.version,
        Record::PreSignedExit(_) => 0,
    }
}

/// Commit fault plan: let `skip` commits through, then fail `fail`.
#[derive(Debug, Default)]
struct FaultPlan {
    skip: usize,
    fail: usize,
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
    sequence: AtomicU64,
    faults: Mutex<FaultPlan>,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// After `skip` successful commits, the next `fail` commits are rejected
    /// with a persistence error and leave no trace.
    pub fn fail_commits(&self, skip: usize, fail: usize) {
        *self.faults.lock() = FaultPlan { skip, fail };
    }

    /// Number of ledger entries.
    #[must_use]
    pub fn ledger_len(&self) -> usize {
        self.tables.read().ledger.len()
    }

    fn injected_fault(&self) -> bool {
        let mut plan = self.faults.lock();
        if plan.skip > 0 {
            plan.skip -= 1;
            return false;
        }
        if plan.fail > 0 {
            plan.fail -= 1;
            return true;
        }
        false
    }
}

fn sorted_by_time<T>(mut items: Vec<T>, key: impl Fn(&T) -> DateTime<Utc>) -> Vec<T> {
    items.sort_by_key(|item| key(item));
    items
}

impl Store for InMemoryStore {
    fn contract(&self, id: &ContractId) -> Result<Option<Contract>> {
        Ok(self.tables.read().contracts.get(id).cloned())
    }

    fn contracts_by_user(&self, user: &UserId) -> Result<Vec<Contract>> {
        let tables = self.tables.read();
        let found = tables
            .contracts
            .values()
            .filter(|c| c.buyer_id == *user || c.seller_id == *user)
            .cloned()
            .collect();
        Ok(sorted_by_time(found, |c| c.created_at))
    }

    fn contracts_by_status(&self, status: ContractStatus) -> Result<Vec<Contract>> {
        let tables = self.tables.read();
        let found = tables
            .contracts
            .values()
            .filter(|c| c.status == status)
            .cloned()
            .collect();
        Ok(sorted_by_time(found, |c| c.created_at))
    }

    fn vtxo(&self, id: &VtxoId) -> Result<Option<Vtxo>> {
        Ok(self.tables.read().vtxos.get(id).cloned())
    }

    fn vtxos_by_contract(&self, contract: &ContractId) -> Result<Vec<Vtxo>> {
        let tables = self.tables.read();
        let found = tables
            .vtxos
            .values()
            .filter(|v| v.contract_id == *contract)
            .cloned()
            .collect();
        Ok(sorted_by_time(found, |v| v.created_at))
    }

    fn vtxos_by_owner(&self, owner: &UserId) -> Result<Vec<Vtxo>> {
        let tables = self.tables.read();
        let found = tables
            .vtxos
            .values()
            .filter(|v| v.owner_id == *owner)
            .cloned()
            .collect();
        Ok(sorted_by_time(found, |v| v.created_at))
    }

    fn order(&self, id: &OrderId) -> Result<Option<Order>> {
        Ok(self.tables.read().orders.get(id).cloned())
    }

    fn orders_by_user(&self, user: &UserId) -> Result<Vec<Order>> {
        let tables = self.tables.read();
        let mut found: Vec<Order> = tables
            .orders
            .values()
            .filter(|o| o.user_id == *user)
            .cloned()
            .collect();
        found.sort_by_key(|o| (o.sequence, o.created_at));
        Ok(found)
    }

    fn open_orders(&self) -> Result<Vec<Order>> {
        let tables = self.tables.read();
        let mut found: Vec<Order> = tables
            .orders
            .values()
            .filter(|o| o.status == OrderStatus::Open)
            .cloned()
            .collect();
        found.sort_by_key(|o| (o.sequence, o.created_at));
        Ok(found)
    }

    fn next_order_sequence(&self) -> Result<u64> {
        Ok(self.sequence.fetch_add(1, Ordering::SeqCst))
    }

    fn swap_offer(&self, id: &SwapOfferId) -> Result<Option<SwapOffer>> {
        Ok(self.tables.read().offers.get(id).cloned())
    }

    fn swap_offers_by_vtxo(&self, vtxo: &VtxoId) -> Result<Vec<SwapOffer>> {
        let tables = self.tables.read();
        let found = tables
            .offers
            .values()
            .filter(|s| s.vtxo_id == *vtxo)
            .cloned()
            .collect();
        Ok(sorted_by_time(found, |s| s.created_at))
    }

    fn swap_offers_by_contract(&self, contract: &ContractId) -> Result<Vec<SwapOffer>> {
        let tables = self.tables.read();
        let found = tables
            .offers
            .values()
            .filter(|s| s.contract_id == *contract)
            .cloned()
            .collect();
        Ok(sorted_by_time(found, |s| s.created_at))
    }

    fn swap_offers_by_user(&self, user: &UserId) -> Result<Vec<SwapOffer>> {
        let tables = self.tables.read();
        let found = tables
            .offers
            .values()
            .filter(|s| {
                s.offeror_id == *user
                    || s.target_user == Some(*user)
                    || s.acceptor_id == Some(*user)
            })
            .cloned()
            .collect();
        Ok(sorted_by_time(found, |s| s.created_at))
    }

    fn open_swap_offers(&self) -> Result<Vec<SwapOffer>> {
        let tables = self.tables.read();
        let found = tables
            .offers
            .values()
            .filter(|s| s.is_open())
            .cloned()
            .collect();
        Ok(sorted_by_time(found, |s| s.created_at))
    }

    fn presigned_exit(&self, id: &PreSignedExitId) -> Result<Option<PreSignedExit>> {
        Ok(self.tables.read().exits.get(id).cloned())
    }

    fn presigned_exits_by_vtxo(&self, vtxo: &VtxoId) -> Result<Vec<PreSignedExit>> {
        let tables = self.tables.read();
        let found = tables
            .exits
            .values()
            .filter(|e| e.vtxo_id == *vtxo)
            .cloned()
            .collect();
        Ok(sorted_by_time(found, |e| e.created_at))
    }

    fn ledger_entry(&self, id: &LedgerEntryId) -> Result<Option<LedgerEntry>> {
        let tables = self.tables.read();
        Ok(tables
            .ledger_index
            .get(id)
            .and_then(|i| tables.ledger.get(*i))
            .cloned())
    }

    fn ledger_by_contract(&self, contract: &ContractId) -> Result<Vec<LedgerEntry>> {
        let tables = self.tables.read();
        Ok(tables
            .ledger
            .iter()
            .filter(|e| e.contract_id == Some(*contract))
            .cloned()
            .collect())
    }

    fn ledger_by_user(&self, user: &UserId) -> Result<Vec<LedgerEntry>> {
        let tables = self.tables.read();
        Ok(tables
            .ledger
            .iter()
            .filter(|e| e.involves(*user))
            .cloned()
            .collect())
    }

    fn ledger_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<LedgerEntry>> {
        let tables = self.tables.read();
        Ok(tables
            .ledger
            .iter()
            .filter(|e| e.timestamp >= from && e.timestamp < to)
            .cloned()
            .collect())
    }

    fn register_public_key(&self, user: UserId, key: XOnlyKey) -> Result<()> {
        self.tables.write().keys.insert(user, key);
        Ok(())
    }

    fn public_key(&self, user: &UserId) -> Result<Option<XOnlyKey>> {
        Ok(self.tables.read().keys.get(user).copied())
    }

    fn commit(&self, changes: ChangeSet) -> Result<()> {
        let mut tables = self.tables.write();

        // validate everything before touching anything
        for record in &changes.inserts {
            if tables.exists(record) {
                return Err(HashPerpError::Duplicate {
                    entity: record.entity(),
                    id: record.id(),
                });
            }
        }
        for record in &changes.updates {
            match tables.stored_version(record) {
                Some(stored) if stored == record_version(record) => {}
                Some(stored) => {
                    warn!(
                        entity = record.entity(),
                        id = %record.id(),
                        stored,
                        presented = record_version(record),
                        "stale write rejected"
                    );
                    return Err(HashPerpError::VersionConflict {
                        entity: record.entity(),
                        id: record.id(),
                    });
                }
                None => {
                    return Err(HashPerpError::Persistence(format!(
                        "update of missing {} {}",
                        record.entity(),
                        record.id()
                    )));
                }
            }
        }
        for entry in &changes.ledger {
            if tables.ledger_index.contains_key(&entry.id) {
                return Err(HashPerpError::Duplicate {
                    entity: "ledger_entry",
                    id: entry.id.to_string(),
                });
            }
        }
        for (id, _, _) in &changes.annotations {
            let pending = changes.ledger.iter().any(|e| e.id == *id);
            if !pending && !tables.ledger_index.contains_key(id) {
                return Err(HashPerpError::LedgerEntryNotFound(*id));
            }
        }
        if self.injected_fault() {
            warn!("injected commit fault");
            return Err(HashPerpError::Persistence("injected commit fault".to_string()));
        }

        let (inserts, updates, entries) = (
            changes.inserts.len(),
            changes.updates.len(),
            changes.ledger.len(),
        );
        for record in changes.inserts {
            tables.put(record, false);
        }
        for record in changes.updates {
            tables.put(record, true);
        }
        for entry in changes.ledger {
            let index = tables.ledger.len();
            tables.ledger_index.insert(entry.id, index);
            tables.ledger.push(entry);
        }
        for (id, key, value) in changes.annotations {
            if let Some(index) = tables.ledger_index.get(&id).copied() {
                tables.ledger[index].related.insert(key, value);
            }
        }
        debug!(inserts, updates, entries, "committed change set");
        Ok(())
    }
}
