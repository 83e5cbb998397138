//! Time-based pool eviction state.
//!
//! The core's background task calls `clean` on a fixed tick; evicted hashes
//! are remembered for one more expiry window so a relayed copy of an expired
//! transaction is not immediately re-admitted.

use crate::pool::TransactionPool;
use primitives::H256;
use std::collections::HashMap;

pub struct PoolCleaner {
    recently_deleted: HashMap<H256, u64>,
    timeout: u64,
}

impl PoolCleaner {
    pub fn new(timeout: u64) -> Self {
        PoolCleaner {
            recently_deleted: HashMap::new(),
            timeout,
        }
    }

    /// Whether `hash` was evicted less than one expiry window ago.
    pub fn is_recently_deleted(&self, hash: &H256, now: u64) -> bool {
        match self.recently_deleted.get(hash) {
            Some(deleted_at) => now.saturating_sub(*deleted_at) < self.timeout,
            None => false,
        }
    }

    /// Evicts every entry whose age reached the expiry, records the evicted
    /// hashes, and purges stale records of earlier evictions. Returns the
    /// hashes removed in this sweep.
    pub fn clean(&mut self, pool: &mut TransactionPool, now: u64) -> Vec<H256> {
        let mut deleted = Vec::new();
        for hash in pool.hashes_by_priority() {
            let receive_time = pool
                .receive_time(&hash)
                .expect("priority index mirrors the entry map; qed");
            if now.saturating_sub(receive_time) >= self.timeout {
                debug!(target: "miner", "deleting expired transaction {} from pool", hash);
                self.recently_deleted.insert(hash, now);
                pool.remove(&hash);
                deleted.push(hash);
            }
        }

        let timeout = self.timeout;
        self.recently_deleted
            .retain(|_, deleted_at| now.saturating_sub(*deleted_at) < timeout);
        deleted
    }
}

#[cfg(test)]
mod tests {
    use super::PoolCleaner;
    use crate::pool::TransactionPool;
    use chain::{
        CachedTransaction, KeyInput, KeyOutput, Transaction, TransactionInput, TransactionOutput,
        TransactionOutputTarget,
    };
    use crypto::{generate_keys, KeyImage};
    use storage::ValidatorState;

    fn transfer(image: u8) -> CachedTransaction {
        let (_, key) = generate_keys(b"cleaner-out");
        CachedTransaction::new(Transaction {
            inputs: vec![TransactionInput::Key(KeyInput {
                amount: 100,
                output_offsets: vec![0],
                key_image: KeyImage([image; 32]),
            })],
            outputs: vec![TransactionOutput {
                amount: 50,
                target: TransactionOutputTarget::Key(KeyOutput { key }),
            }],
            signatures: vec![vec![Default::default()]],
            ..Default::default()
        })
    }

    fn push_at(pool: &mut TransactionPool, tx: &CachedTransaction, time: u64) {
        let state = ValidatorState::from_transaction(tx.transaction());
        assert!(pool.push(tx.clone(), state, time));
    }

    #[test]
    fn evicts_exactly_at_expiry() {
        let mut pool = TransactionPool::new();
        let mut cleaner = PoolCleaner::new(100);

        let fresh = transfer(1);
        let stale = transfer(2);
        push_at(&mut pool, &fresh, 901); // age 99 at t=1000
        push_at(&mut pool, &stale, 900); // age 100 at t=1000

        let deleted = cleaner.clean(&mut pool, 1000);
        assert_eq!(deleted, vec![stale.hash()]);
        assert!(pool.contains(&fresh.hash()));
        assert!(!pool.contains(&stale.hash()));
    }

    #[test]
    fn recently_deleted_window() {
        let mut pool = TransactionPool::new();
        let mut cleaner = PoolCleaner::new(100);

        let tx = transfer(3);
        push_at(&mut pool, &tx, 0);
        cleaner.clean(&mut pool, 100);

        assert!(cleaner.is_recently_deleted(&tx.hash(), 150));
        assert!(!cleaner.is_recently_deleted(&tx.hash(), 200));

        // the record itself expires out of the set on a later sweep
        cleaner.clean(&mut pool, 250);
        assert!(!cleaner.is_recently_deleted(&tx.hash(), 150));
    }
}
