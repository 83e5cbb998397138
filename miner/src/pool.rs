//! The mempool: admitted but not yet included transactions.
//!
//! Entries are indexed three ways: by hash (unique), by selection priority
//! (fee rate descending, then size ascending, then arrival), and by payment
//! id (non-unique). The union of all entries' spent sets is kept as one
//! `ValidatorState` that must stay internally conflict-free.

use chain::{extra_payment_id, CachedTransaction};
use primitives::H256;
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use storage::ValidatorState;

#[derive(Debug, Clone)]
pub struct PendingTransaction {
    pub receive_time: u64,
    pub transaction: CachedTransaction,
    pub payment_id: Option<H256>,
}

/// Ordering key of the priority index. `fee/size` ratios are compared by
/// 128-bit cross multiplication so no precision is lost.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PriorityKey {
    fee: u64,
    size: u64,
    receive_time: u64,
    hash: H256,
}

impl PriorityKey {
    fn rate_cmp(&self, other: &PriorityKey) -> Ordering {
        let own = u128::from(self.fee) * u128::from(other.size);
        let their = u128::from(other.fee) * u128::from(self.size);
        own.cmp(&their)
    }
}

impl Ord for PriorityKey {
    fn cmp(&self, other: &PriorityKey) -> Ordering {
        // more profitable first, then smaller, then older
        other
            .rate_cmp(self)
            .then_with(|| self.size.cmp(&other.size))
            .then_with(|| self.receive_time.cmp(&other.receive_time))
            .then_with(|| self.hash.cmp(&other.hash))
    }
}

impl PartialOrd for PriorityKey {
    fn partial_cmp(&self, other: &PriorityKey) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Default)]
pub struct TransactionPool {
    entries: HashMap<H256, PendingTransaction>,
    priority: BTreeSet<PriorityKey>,
    payment_ids: HashMap<H256, Vec<H256>>,
    state: ValidatorState,
}

impl TransactionPool {
    pub fn new() -> Self {
        TransactionPool::default()
    }

    fn priority_key(entry: &PendingTransaction) -> PriorityKey {
        PriorityKey {
            fee: entry.transaction.fee(),
            size: entry.transaction.size() as u64,
            receive_time: entry.receive_time,
            hash: entry.transaction.hash(),
        }
    }

    /// Admits a transaction whose spends do not conflict with the pool.
    /// Returns false on a duplicate hash or a spent-set intersection.
    pub fn push(
        &mut self,
        transaction: CachedTransaction,
        transaction_state: ValidatorState,
        receive_time: u64,
    ) -> bool {
        let hash = transaction.hash();
        if self.entries.contains_key(&hash) {
            debug!(target: "miner", "push: transaction {} already present in pool", hash);
            return false;
        }

        if self.state.intersects(&transaction_state) {
            debug!(target: "miner", "push: transaction {} conflicts with pool spent set", hash);
            return false;
        }

        let payment_id = extra_payment_id(&transaction.transaction().extra);
        let entry = PendingTransaction {
            receive_time,
            transaction,
            payment_id,
        };

        self.state.merge(&transaction_state);
        self.priority.insert(Self::priority_key(&entry));
        if let Some(payment_id) = payment_id {
            self.payment_ids.entry(payment_id).or_default().push(hash);
        }
        self.entries.insert(hash, entry);

        debug!(target: "miner", "pushed transaction {} to pool", hash);
        true
    }

    pub fn remove(&mut self, hash: &H256) -> Option<CachedTransaction> {
        let entry = match self.entries.remove(hash) {
            Some(entry) => entry,
            None => {
                debug!(target: "miner", "remove: transaction {} not found", hash);
                return None;
            }
        };

        self.priority.remove(&Self::priority_key(&entry));
        if let Some(payment_id) = entry.payment_id {
            if let Some(hashes) = self.payment_ids.get_mut(&payment_id) {
                hashes.retain(|candidate| candidate != hash);
                if hashes.is_empty() {
                    self.payment_ids.remove(&payment_id);
                }
            }
        }

        let spent = ValidatorState::from_transaction(entry.transaction.transaction());
        self.state.subtract(&spent);

        debug!(target: "miner", "transaction {} removed from pool", hash);
        Some(entry.transaction)
    }

    pub fn contains(&self, hash: &H256) -> bool {
        self.entries.contains_key(hash)
    }

    pub fn get(&self, hash: &H256) -> Option<&CachedTransaction> {
        self.entries.get(hash).map(|entry| &entry.transaction)
    }

    pub fn receive_time(&self, hash: &H256) -> Option<u64> {
        self.entries.get(hash).map(|entry| entry.receive_time)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn state(&self) -> &ValidatorState {
        &self.state
    }

    /// Hashes in selection-priority order.
    pub fn hashes_by_priority(&self) -> Vec<H256> {
        self.priority.iter().map(|key| key.hash).collect()
    }

    /// Entries in selection-priority order.
    pub fn transactions_by_priority(&self) -> Vec<&PendingTransaction> {
        self.priority
            .iter()
            .map(|key| {
                self.entries
                    .get(&key.hash)
                    .expect("priority index mirrors the entry map; qed")
            })
            .collect()
    }

    pub fn hashes_by_payment_id(&self, payment_id: &H256) -> Vec<H256> {
        self.payment_ids
            .get(payment_id)
            .cloned()
            .unwrap_or_default()
    }
}
