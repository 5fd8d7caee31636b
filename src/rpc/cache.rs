use crate::transaction::{RawTransaction, Txid};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

/// Parent transactions kept before the least recently used is dropped
pub const DEFAULT_CACHE_CAPACITY: usize = 10_000;

#[derive(Default)]
struct Entries {
    transactions: HashMap<Txid, (RawTransaction, u64)>,
    /// Last-use tick to txid, oldest first
    recency: BTreeMap<u64, Txid>,
    tick: u64,
}

impl Entries {
    fn touch(&mut self, txid: &Txid) -> Option<RawTransaction> {
        self.tick += 1;
        let tick = self.tick;
        let (transaction, last_used) = self.transactions.get_mut(txid)?;
        self.recency.remove(&*last_used);
        *last_used = tick;
        self.recency.insert(tick, *txid);
        Some(transaction.clone())
    }

    fn insert(&mut self, txid: Txid, transaction: RawTransaction, capacity: usize) {
        self.tick += 1;
        if let Some((_, last_used)) = self.transactions.insert(txid, (transaction, self.tick)) {
            self.recency.remove(&last_used);
        }
        self.recency.insert(self.tick, txid);

        while self.transactions.len() > capacity {
            let Some((_, evicted)) = self.recency.pop_first() else {
                break;
            };
            self.transactions.remove(&evicted);
            debug!("Evicted transaction from cache: {}", evicted);
        }
    }
}

/// Thread-safe raw transaction cache, bounded with least-recently-used eviction
///
/// History reconstruction resolves every input of every payment through its
/// parent transaction; the same parents come up again and again.
#[derive(Clone)]
pub struct TransactionCache {
    entries: Arc<Mutex<Entries>>,
    capacity: usize,
    hits: Arc<Mutex<u64>>,
    misses: Arc<Mutex<u64>>,
}

impl Default for TransactionCache {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CACHE_CAPACITY)
    }
}

impl TransactionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Arc::default(),
            capacity: capacity.max(1),
            hits: Arc::default(),
            misses: Arc::default(),
        }
    }

    pub fn get(&self, txid: &Txid) -> Option<RawTransaction> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        match entries.touch(txid) {
            Some(transaction) => {
                *self.hits.lock().unwrap_or_else(PoisonError::into_inner) += 1;
                debug!("Cache hit for transaction: {}", txid);
                Some(transaction)
            }
            None => {
                *self.misses.lock().unwrap_or_else(PoisonError::into_inner) += 1;
                debug!("Cache miss for transaction: {}", txid);
                None
            }
        }
    }

    pub fn put(&self, txid: Txid, transaction: RawTransaction) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(txid, transaction, self.capacity);
        debug!("Cached transaction: {}", txid);
    }

    pub fn get_stats(&self) -> CacheStats {
        let hits = *self.hits.lock().unwrap_or_else(PoisonError::into_inner);
        let misses = *self.misses.lock().unwrap_or_else(PoisonError::into_inner);
        CacheStats { hits, misses }
    }

    pub fn size(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .transactions
            .len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Cache performance statistics
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

impl CacheStats {
    /// Hit rate as a percentage
    pub fn hit_rate(&self) -> f64 {
        if self.hits + self.misses == 0 {
            0.0
        } else {
            (self.hits as f64 / (self.hits + self.misses) as f64) * 100.0
        }
    }

    pub fn total_requests(&self) -> u64 {
        self.hits + self.misses
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::{RawInput, RawOutput};

    fn dummy_transaction(seed: u8) -> RawTransaction {
        RawTransaction {
            inputs: vec![RawInput::spending(Txid::from_wire_bytes([seed; 32]), 0)],
            outputs: vec![RawOutput {
                amount: 100_000,
                script: vec![0x51],
            }],
            ..RawTransaction::default()
        }
    }

    #[test]
    fn test_cache_basic_operations() {
        let cache = TransactionCache::new();
        let transaction = dummy_transaction(1);
        let txid = transaction.txid();

        assert!(cache.get(&txid).is_none());

        cache.put(txid, transaction.clone());
        assert_eq!(cache.get(&txid), Some(transaction));

        let stats = cache.get_stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hit_rate(), 50.0);
    }

    #[test]
    fn test_cache_stats() {
        let cache = TransactionCache::new();
        let first = dummy_transaction(1);
        let second = dummy_transaction(2);
        let (first_id, second_id) = (first.txid(), second.txid());

        cache.put(first_id, first);
        cache.put(second_id, second);

        cache.get(&first_id);
        cache.get(&first_id);
        cache.get(&second_id);
        cache.get(&Txid::from_wire_bytes([9; 32]));

        let stats = cache.get_stats();
        assert_eq!(stats.hits, 3);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hit_rate(), 75.0);
        assert_eq!(stats.total_requests(), 4);
        assert_eq!(cache.size(), 2);
    }

    #[test]
    fn test_cache_evicts_least_recently_used() {
        let cache = TransactionCache::with_capacity(2);
        let first = dummy_transaction(1);
        let second = dummy_transaction(2);
        let third = dummy_transaction(3);
        let (first_id, second_id, third_id) = (first.txid(), second.txid(), third.txid());

        cache.put(first_id, first);
        cache.put(second_id, second);
        assert!(cache.get(&first_id).is_some());

        cache.put(third_id, third);
        assert_eq!(cache.size(), 2);
        assert!(cache.get(&second_id).is_none());
        assert!(cache.get(&first_id).is_some());
        assert!(cache.get(&third_id).is_some());
    }

    #[test]
    fn test_cache_reinsert_does_not_grow() {
        let cache = TransactionCache::with_capacity(2);
        let transaction = dummy_transaction(1);
        for _ in 0..5 {
            cache.put(transaction.txid(), transaction.clone());
        }
        assert_eq!(cache.size(), 1);
        assert_eq!(cache.capacity(), 2);
    }
}
