//! Per-session memory of which changes have already been reported.
//!
//! The ledger maps a compound key (file fingerprint ++ revision context) to the
//! last record observed for it. `reconcile` diffs a fresh observation set against
//! that memory and returns only what the subscribers have not heard about yet,
//! plus removal events for keys that dropped out.

use std::collections::{BTreeMap, BTreeSet};

use crate::types::ChangeRecord;

#[derive(Debug, Default, Clone)]
pub struct Ledger {
    entries: BTreeMap<String, ChangeRecord>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Diff `observations` against the ledger and bring the ledger up to date.
    ///
    /// Returned delta: first-seen records in observation order (`is_new = true`),
    /// then one removal event (`delete_item = true`) per key that was tracked
    /// before but is absent now. Afterwards the ledger's key set is exactly the
    /// set of keys in `observations`.
    pub fn reconcile<I>(&mut self, observations: I) -> Vec<ChangeRecord>
    where
        I: IntoIterator<Item = ChangeRecord>,
    {
        let mut removal_candidates: BTreeSet<String> = self.entries.keys().cloned().collect();
        let mut delta = Vec::new();

        for mut record in observations {
            let key = record.compound_key();
            removal_candidates.remove(&key);

            record.is_new = !self.entries.contains_key(&key);
            record.delete_item = false;
            if record.is_new {
                delta.push(record.clone());
            }
            // Upsert refreshes status/time without ever duplicating a key.
            self.entries.insert(key, record);
        }

        for key in removal_candidates {
            if let Some(mut stale) = self.entries.remove(&key) {
                stale.is_new = false;
                stale.delete_item = true;
                delta.push(stale);
            }
        }

        tracing::debug!(
            delta = delta.len(),
            tracked = self.entries.len(),
            "ledger reconciled"
        );
        delta
    }

    /// Forget everything. The next reconcile reports every observation as new.
    pub fn reset(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, compound_key: &str) -> bool {
        self.entries.contains_key(compound_key)
    }

    pub fn get(&self, compound_key: &str) -> Option<&ChangeRecord> {
        self.entries.get(compound_key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}
