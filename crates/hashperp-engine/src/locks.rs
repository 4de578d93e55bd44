//! Per-contract single-writer locks.
//!
//! Every state-changing operation runs inside [`ContractLocks::with`] for the
//! contracts it touches. Multi-contract operations take their locks in id
//! order, so two rollovers between the same pair of contracts cannot
//! deadlock.

use std::collections::HashMap;
use std::sync::Arc;

use hashperp_types::{ContractId, Result};
use parking_lot::Mutex;

#[derive(Debug, Default)]
pub struct ContractLocks {
    slots: Mutex<HashMap<ContractId, Arc<Mutex<()>>>>,
}

impl ContractLocks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, id: ContractId) -> Arc<Mutex<()>> {
        Arc::clone(self.slots.lock().entry(id).or_default())
    }

    /// Run `f` holding the locks of every contract in `ids`.
    pub fn with<T>(&self, ids: &[ContractId], f: impl FnOnce() -> Result<T>) -> Result<T> {
        let mut ids = ids.to_vec();
        ids.sort_unstable();
        ids.dedup();
        let slots: Vec<Arc<Mutex<()>>> = ids.iter().map(|id| self.slot(*id)).collect();
        let _guards: Vec<_> = slots.iter().map(|slot| slot.lock()).collect();
        f()
    }

    /// Number of contracts that have been locked at least once.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.lock().is_empty()
    }
}
