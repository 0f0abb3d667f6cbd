use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::period_key::PeriodKey;

#[derive(PartialEq, Debug, Clone)]
pub struct StoredKey {
    pub key: PeriodKey,
    pub discovered_at: DateTime<Utc>,
}

/// Result of offering a key to the store, carrying its position.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum Insertion {
    Added(usize),
    Known(usize),
}

/// Append-only list of infected period keys in discovery order.
///
/// Keys are deduplicated by their bytes, so a position handed out once keeps
/// referring to the same key for the lifetime of the store.
#[derive(Default, Debug)]
pub struct InfectedKeyStore {
    entries: Vec<StoredKey>,
    positions: HashMap<PeriodKey, usize>,
}

impl InfectedKeyStore {
    pub fn from_keys<I>(keys: I, discovered_at: DateTime<Utc>) -> InfectedKeyStore
    where
        I: IntoIterator<Item = PeriodKey>,
    {
        let mut store = InfectedKeyStore::default();
        for key in keys {
            store.insert(key, discovered_at);
        }
        store
    }

    pub fn insert(&mut self, key: PeriodKey, discovered_at: DateTime<Utc>) -> Insertion {
        if let Some(&index) = self.positions.get(&key) {
            return Insertion::Known(index);
        }
        let index = self.entries.len();
        self.positions.insert(key.clone(), index);
        self.entries.push(StoredKey { key, discovered_at });
        Insertion::Added(index)
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&PeriodKey> {
        self.entries.get(index).map(|e| &e.key)
    }

    #[must_use]
    pub fn entry(&self, index: usize) -> Option<&StoredKey> {
        self.entries.get(index)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &PeriodKey> {
        self.entries.iter().map(|e| &e.key)
    }
}
