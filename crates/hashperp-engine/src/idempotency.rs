//! Bounded idempotency journal.
//!
//! Remembers the outcome of steps that already happened so a retry returns
//! the recorded outcome instead of repeating the side effect. Used for
//! broadcasts (keyed by contract and stage) and for position-swap saga steps
//! (keyed by offer and step).
//!
//! The journal is an LRU-style bounded cache so memory stays predictable in
//! long-running nodes; evicted keys simply lose their protection.

use std::collections::{HashMap, VecDeque};
use std::fmt::Debug;
use std::hash::Hash;

use hashperp_types::{HashPerpError, Result};

pub struct IdempotencyJournal<K, V> {
    /// Recorded outcomes.
    entries: HashMap<K, V>,
    /// Insertion order for eviction (front = oldest).
    order: VecDeque<K>,
    max_size: usize,
}

impl<K, V> IdempotencyJournal<K, V>
where
    K: Copy + Eq + Hash + Debug,
    V: Clone,
{
    /// A journal holding at most `max_size` outcomes (at least one).
    #[must_use]
    pub fn new(max_size: usize) -> Self {
        let max_size = max_size.max(1);
        Self {
            entries: HashMap::with_capacity(max_size.min(1024)),
            order: VecDeque::with_capacity(max_size.min(1024)),
            max_size,
        }
    }

    /// Record the outcome of `key`.
    ///
    /// # Errors
    /// Returns [`HashPerpError::Duplicate`] if `key` is already recorded.
    pub fn record(&mut self, key: K, outcome: V) -> Result<()> {
        if self.entries.contains_key(&key) {
            return Err(HashPerpError::Duplicate {
                entity: "journal_entry",
                id: format!("{key:?}"),
            });
        }

        // Evict oldest if at capacity.
        if self.entries.len() >= self.max_size {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }

        self.entries.insert(key, outcome);
        self.order.push_back(key);
        Ok(())
    }

    #[must_use]
    pub fn get(&self, key: &K) -> Option<V> {
        self.entries.get(key).cloned()
    }

    #[must_use]
    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Drop `key`, e.g. after its step was compensated.
    pub fn forget(&mut self, key: &K) -> Option<V> {
        let outcome = self.entries.remove(key)?;
        self.order.retain(|k| k != key);
        Some(outcome)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
