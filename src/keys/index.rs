//! Reverse index from derived address to `(user tag, round)`
//!
//! Ownership checks would otherwise re-derive every round up to the bound for
//! every candidate address. Entries are written when an address is handed out
//! and, when a store is attached, persisted so the index survives restarts.

use crate::database::{AddressIndexOperations, SharedDatabase};
use crate::errors::AppResult;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    /// Hex SHA-256 of the owning user id
    pub user_tag: String,
    pub round: u32,
}

#[derive(Clone, Default)]
pub struct AddressIndex {
    entries: Arc<Mutex<HashMap<String, IndexEntry>>>,
    store: Option<SharedDatabase>,
}

impl AddressIndex {
    /// In-memory only
    pub fn new() -> Self {
        Self::default()
    }

    /// Backed by the durable store; existing rows are loaded eagerly
    pub fn with_store(store: SharedDatabase) -> AppResult<Self> {
        let rows = {
            let db = store.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            db.load_derived_addresses()?
        };

        let entries: HashMap<String, IndexEntry> = rows
            .into_iter()
            .map(|(address, user_tag, round)| (address, IndexEntry { user_tag, round }))
            .collect();
        info!("Address index warmed with {} entries", entries.len());

        Ok(Self {
            entries: Arc::new(Mutex::new(entries)),
            store: Some(store),
        })
    }

    pub fn record(&self, address: &str, user_tag: &str, round: u32) -> AppResult<()> {
        let entry = IndexEntry {
            user_tag: user_tag.to_string(),
            round,
        };

        if self.lookup(address).as_ref() == Some(&entry) {
            return Ok(());
        }

        if let Some(store) = &self.store {
            let mut db = store.lock().unwrap_or_else(|p| p.into_inner());
            db.record_derived_address(address, user_tag, round)?;
        }
        self.entries
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(address.to_string(), entry);
        debug!("Indexed {} (round {})", address, round);
        Ok(())
    }

    pub fn lookup(&self, address: &str) -> Option<IndexEntry> {
        self.entries
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(address)
            .cloned()
    }

    /// Every indexed address belonging to `user_tag`, ordered by round
    pub fn addresses_for(&self, user_tag: &str) -> Vec<String> {
        let entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        let mut owned: Vec<(&String, u32)> = entries
            .iter()
            .filter(|(_, entry)| entry.user_tag == user_tag)
            .map(|(address, entry)| (address, entry.round))
            .collect();
        owned.sort_by_key(|(_, round)| *round);
        owned.into_iter().map(|(address, _)| address.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;

    #[test]
    fn test_record_and_lookup() {
        let index = AddressIndex::new();
        index.record("addr-1", "tag", 1).unwrap();
        index.record("addr-3", "tag", 3).unwrap();
        index.record("addr-2", "tag", 2).unwrap();
        index.record("other", "other-tag", 1).unwrap();

        assert_eq!(index.lookup("addr-2").unwrap().round, 2);
        assert!(index.lookup("missing").is_none());
        assert_eq!(index.addresses_for("tag"), vec!["addr-1", "addr-2", "addr-3"]);
        assert_eq!(index.len(), 4);
    }

    #[test]
    fn test_store_backed_index_survives_reload() {
        let db: SharedDatabase = Arc::new(Mutex::new(Database::new(":memory:").unwrap()));

        let index = AddressIndex::with_store(db.clone()).unwrap();
        assert!(index.is_empty());
        index.record("addr-1", "tag", 7).unwrap();

        let reloaded = AddressIndex::with_store(db).unwrap();
        assert_eq!(
            reloaded.lookup("addr-1"),
            Some(IndexEntry {
                user_tag: "tag".to_string(),
                round: 7
            })
        );
    }

    #[test]
    fn test_failed_store_write_leaves_index_untouched() {
        let db: SharedDatabase = Arc::new(Mutex::new(Database::new(":memory:").unwrap()));
        let index = AddressIndex::with_store(db.clone()).unwrap();
        db.lock()
            .unwrap()
            .connection()
            .execute("DROP TABLE derived_addresses", [])
            .unwrap();

        assert!(index.record("addr-1", "tag", 1).is_err());
        assert!(index.lookup("addr-1").is_none());
        assert!(index.is_empty());
    }
}
