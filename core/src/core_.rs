use crate::error::CoreError;
use crate::message_queue::MessageQueue;
use crate::messages::{BlockchainMessage, DeleteTransactionReason};
use crate::sync_types::{
    strip_signatures, BlockFullInfo, BlockShortInfo, QueryBlocksResult, QueryBlocksShortResult,
    TransactionPrefixInfo,
};
use crate::time::{RealTimeProvider, TimeProvider};
use chain::{
    AccountPublicAddress, BlockTemplate, CachedBlock, CachedTransaction, ParentBlock, RawBlock,
};
use chain::constants::{
    BLOCK_MAJOR_VERSION_1, BLOCK_MAJOR_VERSION_2, BLOCK_MAJOR_VERSION_3, BLOCK_MINOR_VERSION_0,
    BLOCK_MINOR_VERSION_1,
};
use crypto::{check_hash, PublicKey};
use db::{restore_cached_transactions, Segment, SegmentId, SegmentTree};
use miner::{fill_block_template, PoolCleaner, TransactionPool};
use network::{Currency, UpgradeManager};
use parking_lot::{Condvar, Mutex};
use primitives::{Bytes, H256};
use rand::seq::SliceRandom;
use ser::{deserialize, serialize, serialized_size};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use storage::{BlockchainStorage, ChainAccess, ValidatorState};
use verification::{
    median_value, validate_block, validate_transaction, work_required, AddBlockError,
    AddBlockResult, BlockValidationError, Checkpoints,
};

const BLOCKS_IDS_SYNCHRONIZING_DEFAULT_COUNT: usize = 10_000;
const BLOCKS_SYNCHRONIZING_DEFAULT_COUNT: usize = 100;
const EVENT_QUEUE_CAPACITY: usize = 1024;
const COINBASE_SIZING_TRIES: usize = 10;

/// One unlocked output offered for ring mixing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RandomOutput {
    pub global_index: u32,
    pub key: PublicKey,
}

struct CoreInner {
    tree: SegmentTree,
    storage: BlockchainStorage,
    pool: TransactionPool,
    pool_cleaner: PoolCleaner,
    checkpoints: Checkpoints,
    upgrades: UpgradeManager,
    queues: Vec<Arc<MessageQueue<BlockchainMessage>>>,
    block_median_size: u64,
    initialized: bool,
}

/// The blockchain core. Owns the segment tree, the canonical raw store, the
/// transaction pool and the event queues; one lock serializes all of it.
pub struct Core {
    currency: Currency,
    time: Arc<dyn TimeProvider>,
    inner: Mutex<CoreInner>,
    cleaner_stop: Arc<(Mutex<bool>, Condvar)>,
    cleaner_handle: Mutex<Option<JoinHandle<()>>>,
}

fn notify(queues: &[Arc<MessageQueue<BlockchainMessage>>], message: BlockchainMessage) {
    for queue in queues {
        if let Err(err) = queue.push(message.clone()) {
            warn!(target: "core", "failed to notify observer: {}", err);
        }
    }
}

fn raw_block_hash(raw_block: &RawBlock) -> Result<H256, CoreError> {
    CachedBlock::from_binary(&raw_block.block)
        .map(|block| block.hash())
        .map_err(|_| CoreError::CorruptedBlockchain)
}

impl Core {
    pub fn new(
        currency: Currency,
        checkpoints: Checkpoints,
        storage: BlockchainStorage,
        root_segment: Segment,
    ) -> Core {
        Core::with_time_provider(
            currency,
            checkpoints,
            storage,
            root_segment,
            Arc::new(RealTimeProvider),
        )
    }

    pub fn with_time_provider(
        currency: Currency,
        checkpoints: Checkpoints,
        storage: BlockchainStorage,
        root_segment: Segment,
        time: Arc<dyn TimeProvider>,
    ) -> Core {
        let upgrades = UpgradeManager::for_currency(&currency);
        let pool_cleaner = PoolCleaner::new(currency.mempool_tx_live_time());

        Core {
            currency,
            time,
            inner: Mutex::new(CoreInner {
                tree: SegmentTree::new(root_segment),
                storage,
                pool: TransactionPool::new(),
                pool_cleaner,
                checkpoints,
                upgrades,
                queues: Vec::new(),
                block_median_size: 0,
                initialized: false,
            }),
            cleaner_stop: Arc::new((Mutex::new(false), Condvar::new())),
            cleaner_handle: Mutex::new(None),
        }
    }

    pub fn currency(&self) -> &Currency {
        &self.currency
    }

    pub fn make_queue(&self) -> Arc<MessageQueue<BlockchainMessage>> {
        let queue = Arc::new(MessageQueue::new(EVENT_QUEUE_CAPACITY));
        self.inner.lock().queues.push(queue.clone());
        queue
    }

    pub fn remove_queue(&self, queue: &Arc<MessageQueue<BlockchainMessage>>) {
        self.inner
            .lock()
            .queues
            .retain(|candidate| !Arc::ptr_eq(candidate, queue));
    }

    /// Subscribes for the lifetime of the returned guard.
    pub fn queue_guard(&self) -> QueueGuard {
        QueueGuard {
            core: self,
            queue: self.make_queue(),
        }
    }

    /// Opens the chain: seeds genesis on first start and reconciles the raw
    /// store with the root segment cache.
    pub fn load(&self) -> Result<(), CoreError> {
        let inner = &mut *self.inner.lock();
        assert!(!inner.initialized, "core is loaded once");

        if inner.storage.block_count() == 0 {
            let raw = RawBlock {
                block: serialize(self.currency.genesis_block()),
                transactions: Vec::new(),
            };
            inner
                .storage
                .push_block(raw)
                .map_err(|_| CoreError::CorruptedBlockchain)?;
        }

        if inner.tree.cache(inner.tree.root()).is_empty() {
            self.push_genesis(inner)?;
        }

        let storage_count = inner.storage.block_count();
        let cache_count = self.root_block_count(inner);
        debug!(
            target: "core",
            "raw store blocks: {}, root segment blocks: {}",
            storage_count, cache_count
        );

        if storage_count > cache_count {
            info!(target: "core", "importing blocks from the raw store");
            self.import_blocks_from_storage(inner)?;
        } else if storage_count < cache_count {
            let cut_from = self.find_common_root(inner)? + 1;
            info!(
                target: "core",
                "root segment is ahead of the raw store, cutting from height {}", cut_from
            );
            let root = inner.tree.root();
            inner.tree.cut_from(root, cut_from);
            if self.root_block_count(inner) != inner.storage.block_count() {
                return Err(CoreError::CorruptedBlockchain);
            }
        } else {
            let top_raw = inner
                .storage
                .block_at(storage_count - 1)
                .map_err(|_| CoreError::CorruptedBlockchain)?;
            let cache_top = inner
                .tree
                .cache(inner.tree.root())
                .block_hash_at(storage_count - 1)
                .ok_or(CoreError::CorruptedBlockchain)?;
            if raw_block_hash(&top_raw)? != cache_top {
                info!(
                    target: "core",
                    "raw store and root segment diverge, reimporting from the common root"
                );
                self.import_blocks_from_storage(inner)?;
            }
        }

        self.update_block_median_size(inner);
        inner.initialized = true;
        Ok(())
    }

    fn root_block_count(&self, inner: &CoreInner) -> u32 {
        inner.tree.cache(inner.tree.root()).block_count()
    }

    fn push_genesis(&self, inner: &mut CoreInner) -> Result<(), CoreError> {
        let genesis = CachedBlock::new(self.currency.genesis_block().clone());
        let size = self.currency.genesis_coinbase_size() as u64;
        let (_, emission_change) = self
            .currency
            .block_reward(BLOCK_MAJOR_VERSION_1, 0, 0, 0, 0)
            .expect("the genesis coinbase never hits the size penalty; qed");
        let raw = RawBlock {
            block: serialize(genesis.block()),
            transactions: Vec::new(),
        };

        let root = inner.tree.root();
        inner
            .tree
            .push_block_to(root, &genesis, &[], ValidatorState::default(), size, emission_change, 1, raw)
            .map_err(|_| CoreError::CorruptedBlockchain)
    }

    /// Deepest height at which the raw store and the root segment agree.
    fn find_common_root(&self, inner: &mut CoreInner) -> Result<u32, CoreError> {
        let storage_count = inner.storage.block_count();
        let cache_count = self.root_block_count(inner);
        assert!(storage_count > 0 && cache_count > 0);

        let genesis_raw = inner
            .storage
            .block_at(0)
            .map_err(|_| CoreError::CorruptedBlockchain)?;
        let root = inner.tree.root();
        if Some(raw_block_hash(&genesis_raw)?) != inner.tree.cache(root).block_hash_at(0) {
            return Err(CoreError::CorruptedBlockchain);
        }

        let mut left = 0u32;
        let mut right = std::cmp::min(storage_count - 1, cache_count - 1);
        while left != right {
            let probe = left + (right - left) / 2 + 1;
            let raw = inner
                .storage
                .block_at(probe)
                .map_err(|_| CoreError::CorruptedBlockchain)?;
            if Some(raw_block_hash(&raw)?) == inner.tree.cache(root).block_hash_at(probe) {
                left = probe;
            } else {
                right = probe - 1;
            }
        }

        Ok(left)
    }

    fn import_blocks_from_storage(&self, inner: &mut CoreInner) -> Result<(), CoreError> {
        let common = self.find_common_root(inner)?;
        let root = inner.tree.root();
        inner.tree.cut_from(root, common + 1);

        let raw_common = inner
            .storage
            .block_at(common)
            .map_err(|_| CoreError::CorruptedBlockchain)?;
        let mut previous_hash = raw_block_hash(&raw_common)?;

        let block_count = inner.storage.block_count();
        for height in common + 1..block_count {
            let raw = inner
                .storage
                .block_at(height)
                .map_err(|_| CoreError::CorruptedBlockchain)?;
            let block =
                CachedBlock::from_binary(&raw.block).map_err(|_| CoreError::CorruptedBlockchain)?;
            if block.block().previous_block_hash != previous_hash {
                error!(
                    target: "core",
                    "corrupted raw store: block at height {} does not chain to its parent; resynchronize",
                    height
                );
                return Err(CoreError::CorruptedBlockchain);
            }
            previous_hash = block.hash();

            let transactions = restore_cached_transactions(&raw.transactions)
                .map_err(|_| CoreError::CorruptedBlockchain)?;
            let cumulative_size = block.coinbase_binary_size() as u64
                + transactions.iter().map(|tx| tx.size() as u64).sum::<u64>();

            let mut state = ValidatorState::default();
            for transaction in &transactions {
                state.merge(&ValidatorState::from_transaction(transaction.transaction()));
            }
            let fee: u64 = transactions.iter().map(|tx| tx.fee()).sum();

            let (difficulty, emission_change) = {
                let view = inner.tree.view(root, &self.currency);
                let difficulty = work_required(&view, height - 1, &self.currency);
                let sizes = view.last_block_sizes(
                    self.currency.reward_blocks_window(),
                    height - 1,
                    true,
                );
                let (_, emission_change) = self
                    .currency
                    .block_reward(
                        block.block().major_version,
                        median_value(&sizes) as usize,
                        cumulative_size as usize,
                        view.already_generated_coins(height - 1),
                        fee,
                    )
                    .ok_or(CoreError::CorruptedBlockchain)?;
                (difficulty, emission_change)
            };

            inner
                .tree
                .push_block_to(
                    root,
                    &block,
                    &transactions,
                    state,
                    cumulative_size,
                    emission_change,
                    difficulty,
                    raw,
                )
                .map_err(|_| CoreError::CorruptedBlockchain)?;

            if height % 1000 == 0 {
                info!(target: "core", "imported block {} / {}", height, block_count - 1);
            }
        }

        Ok(())
    }

    /// Drops alternative chains, fuses the canonical path into the root and
    /// flushes the root segment.
    pub fn save(&self) -> Result<(), CoreError> {
        let inner = &mut *self.inner.lock();
        self.ensure_initialized(inner)?;

        inner.tree.delete_alternative_chains();
        inner
            .tree
            .merge_main_segments()
            .map_err(|_| CoreError::CorruptedBlockchain)?;
        inner
            .tree
            .segment(inner.tree.root())
            .save()
            .map_err(|_| CoreError::CorruptedBlockchain)?;
        Ok(())
    }

    fn ensure_initialized(&self, inner: &CoreInner) -> Result<(), CoreError> {
        if inner.initialized {
            Ok(())
        } else {
            Err(CoreError::NotInitialized)
        }
    }

    /// Spawns the background pool cleaner ticking at `interval`.
    pub fn start_pool_cleaner(self: &Arc<Self>, interval: Duration) {
        let core = self.clone();
        let stop = self.cleaner_stop.clone();
        let handle = std::thread::Builder::new()
            .name("pool-cleaner".into())
            .spawn(move || {
                let (lock, wakeup) = &*stop;
                loop {
                    let mut stopped = lock.lock();
                    if *stopped {
                        break;
                    }
                    wakeup.wait_for(&mut stopped, interval);
                    if *stopped {
                        break;
                    }
                    drop(stopped);
                    core.clean_pool();
                }
                debug!(target: "core", "pool cleaner stopped");
            })
            .expect("spawning the cleaner thread never fails; qed");

        *self.cleaner_handle.lock() = Some(handle);
    }

    /// Stops the cleaner and waits for it to exit.
    pub fn shutdown(&self) {
        {
            let (lock, wakeup) = &*self.cleaner_stop;
            *lock.lock() = true;
            wakeup.notify_all();
        }
        if let Some(handle) = self.cleaner_handle.lock().take() {
            let _ = handle.join();
        }
    }

    /// One cleaner sweep: evicts expired pool entries and announces them.
    pub fn clean_pool(&self) {
        let inner = &mut *self.inner.lock();
        if !inner.initialized {
            return;
        }

        let now = self.time.now();
        let CoreInner {
            ref mut pool,
            ref mut pool_cleaner,
            ref queues,
            ..
        } = *inner;
        let deleted = pool_cleaner.clean(pool, now);
        if !deleted.is_empty() {
            notify(
                queues,
                BlockchainMessage::DeleteTransaction {
                    hashes: deleted,
                    reason: DeleteTransactionReason::Outdated,
                },
            );
        }
    }

    pub fn add_block(&self, raw_block: RawBlock) -> Result<AddBlockResult, AddBlockError> {
        let block = CachedBlock::from_binary(&raw_block.block)
            .map_err(|_| AddBlockError::DeserializationFailed)?;
        let inner = &mut *self.inner.lock();
        assert!(inner.initialized, "core is not initialized");
        self.add_block_locked(inner, block, raw_block)
    }

    /// Assembles a raw block for a mined template, pulling the referenced
    /// transactions out of the pool.
    pub fn submit_block(&self, template_bytes: &[u8]) -> Result<AddBlockResult, AddBlockError> {
        let block = CachedBlock::from_binary(template_bytes)
            .map_err(|_| AddBlockError::DeserializationFailed)?;

        let inner = &mut *self.inner.lock();
        assert!(inner.initialized, "core is not initialized");

        let mut transactions = Vec::with_capacity(block.block().transaction_hashes.len());
        for hash in &block.block().transaction_hashes {
            match inner.pool.get(hash) {
                Some(transaction) => transactions.push(transaction.binary().clone()),
                None => {
                    warn!(target: "core", "transaction {} is absent in transaction pool", hash);
                    return Err(BlockValidationError::TransactionAbsentInPool.into());
                }
            }
        }

        let raw_block = RawBlock {
            block: template_bytes.into(),
            transactions,
        };
        self.add_block_locked(inner, block, raw_block)
    }

    fn add_block_locked(
        &self,
        inner: &mut CoreInner,
        block: CachedBlock,
        raw_block: RawBlock,
    ) -> Result<AddBlockResult, AddBlockError> {
        let block_hash = block.hash();
        debug!(target: "core", "request to add block {}", block_hash);

        if inner.tree.find_segment_with_block(&block_hash).is_some() {
            debug!(target: "core", "block {} already exists", block_hash);
            return Ok(AddBlockResult::AlreadyExists);
        }

        let previous_hash = block.block().previous_block_hash;
        let parent_segment = match inner.tree.find_segment_with_block(&previous_hash) {
            Some(segment) => segment,
            None => {
                warn!(target: "core", "block {} rejected as orphaned", block_hash);
                return Err(AddBlockError::RejectedAsOrphaned);
            }
        };

        if raw_block.transactions.len() != block.block().transaction_hashes.len() {
            return Err(AddBlockError::DeserializationFailed);
        }
        let mut transactions = Vec::with_capacity(raw_block.transactions.len());
        for (blob, expected_hash) in raw_block
            .transactions
            .iter()
            .zip(block.block().transaction_hashes.iter())
        {
            if blob.len() > self.currency.max_transaction_size() {
                warn!(target: "core", "raw transaction size {} is too big", blob.len());
                return Err(AddBlockError::DeserializationFailed);
            }
            let transaction = CachedTransaction::from_binary(blob)
                .map_err(|_| AddBlockError::DeserializationFailed)?;
            if transaction.hash() != *expected_hash {
                return Err(AddBlockError::DeserializationFailed);
            }
            transactions.push(transaction);
        }

        let cumulative_size = block.coinbase_binary_size() as u64
            + transactions.iter().map(|tx| tx.size() as u64).sum::<u64>();

        let previous_height = inner
            .tree
            .cache(parent_segment)
            .block_height(&previous_hash)
            .expect("the parent segment was found by this hash; qed");
        let height = previous_height + 1;
        let add_on_top = inner.tree.cache(parent_segment).top_height() == Some(previous_height);
        let now = self.time.now();

        // validation against the chain as of the parent
        let (difficulty, validator_state, emission_change) = {
            let view = inner.tree.view(parent_segment, &self.currency);

            let miner_reward = validate_block(
                &block,
                &view,
                previous_height,
                cumulative_size as usize,
                &self.currency,
                &inner.upgrades,
                now,
            )?;

            let difficulty = work_required(&view, previous_height, &self.currency);
            if difficulty == 0 {
                debug!(target: "core", "block {} has difficulty overhead", block_hash);
                return Err(BlockValidationError::DifficultyOverhead.into());
            }

            let mut validator_state = ValidatorState::default();
            let mut fee = 0u64;
            for transaction in &transactions {
                fee += validate_transaction(
                    transaction,
                    &mut validator_state,
                    &view,
                    &inner.checkpoints,
                    previous_height,
                    now,
                )
                .map_err(|err| {
                    debug!(
                        target: "core",
                        "failed to validate transaction {}: {}",
                        transaction.hash(),
                        err
                    );
                    err
                })?;
            }

            let sizes = view.last_block_sizes(
                self.currency.reward_blocks_window(),
                previous_height,
                true,
            );
            let (reward, emission_change) = self
                .currency
                .block_reward(
                    block.block().major_version,
                    median_value(&sizes) as usize,
                    cumulative_size as usize,
                    view.already_generated_coins(previous_height),
                    fee,
                )
                .ok_or(BlockValidationError::CumulativeBlockSizeTooBig)?;

            if miner_reward != reward {
                warn!(
                    target: "core",
                    "block reward mismatch for {}: expected {}, got {}",
                    block_hash, reward, miner_reward
                );
                return Err(BlockValidationError::BlockRewardMismatch.into());
            }

            if inner.checkpoints.is_in_checkpoint_zone(height) {
                if !inner.checkpoints.check_block(height, &block_hash) {
                    return Err(BlockValidationError::CheckpointBlockHashMismatch.into());
                }
            } else if !check_hash(&block.proof_of_work(), difficulty) {
                warn!(target: "core", "proof of work too weak for block {}", block_hash);
                return Err(BlockValidationError::ProofOfWorkTooWeak.into());
            }

            (difficulty, validator_state, emission_change)
        };

        let mut result = AddBlockResult::AddedToAlternative;
        let mut switch_info: Option<(u32, Vec<H256>)> = None;

        if add_on_top {
            if inner.tree.child_count(parent_segment) == 0 {
                if parent_segment == inner.tree.canonical_leaf() {
                    // the main chain grows in place
                    inner
                        .storage
                        .push_block(raw_block.clone())
                        .expect("raw store push is atomic or recoverable on reopen; qed");
                    inner
                        .tree
                        .push_block_to(
                            parent_segment,
                            &block,
                            &transactions,
                            validator_state,
                            cumulative_size,
                            emission_change,
                            difficulty,
                            raw_block,
                        )
                        .expect("a fully validated block always pushes; qed");

                    let included: Vec<H256> = block
                        .block()
                        .transaction_hashes
                        .iter()
                        .filter(|hash| inner.pool.remove(*hash).is_some())
                        .cloned()
                        .collect();
                    if !included.is_empty() {
                        notify(
                            &inner.queues,
                            BlockchainMessage::DeleteTransaction {
                                hashes: included,
                                reason: DeleteTransactionReason::InBlock,
                            },
                        );
                    }

                    self.actualize_pool(inner);
                    result = AddBlockResult::AddedToMain;
                    debug!(target: "core", "block {} added to main chain at height {}", block_hash, height);
                    if height % 100 == 0 {
                        info!(target: "core", "block {} added to main chain at height {}", block_hash, height);
                    }
                } else {
                    // a non-canonical leaf grows; it may overtake the main chain
                    inner
                        .tree
                        .push_block_to(
                            parent_segment,
                            &block,
                            &transactions,
                            validator_state,
                            cumulative_size,
                            emission_change,
                            difficulty,
                            raw_block,
                        )
                        .expect("a fully validated block always pushes; qed");
                    warn!(
                        target: "core",
                        "block {} added to alternative chain at height {}", block_hash, height
                    );

                    let alternative_difficulty = inner
                        .tree
                        .view(parent_segment, &self.currency)
                        .top_cumulative_difficulty();
                    let canonical_difficulty = inner
                        .tree
                        .view(inner.tree.canonical_leaf(), &self.currency)
                        .top_cumulative_difficulty();

                    if alternative_difficulty > canonical_difficulty {
                        switch_info = Some(self.switch_to_leaf(inner, parent_segment));
                        result = AddBlockResult::AddedToAlternativeAndSwitched;
                        info!(
                            target: "core",
                            "switched to alternative chain, new top block {} at height {}",
                            block_hash, height
                        );
                    }
                }
            } else {
                // another block at the same height: a fresh leaf off this top
                let child = inner.tree.add_child(parent_segment, height);
                inner
                    .tree
                    .push_block_to(
                        child,
                        &block,
                        &transactions,
                        validator_state,
                        cumulative_size,
                        emission_change,
                        difficulty,
                        raw_block,
                    )
                    .expect("a fully validated block always pushes; qed");
                debug!(target: "core", "adding alternative block {}", block_hash);
            }
            self.update_block_median_size(inner);
        } else {
            // fork below the segment top: carve the suffix off, then grow a
            // new leaf at the fork height
            debug!(target: "core", "adding alternative block {}", block_hash);
            inner.tree.split_segment(parent_segment, height);
            let child = inner.tree.add_child(parent_segment, height);
            inner
                .tree
                .push_block_to(
                    child,
                    &block,
                    &transactions,
                    validator_state,
                    cumulative_size,
                    emission_change,
                    difficulty,
                    raw_block,
                )
                .expect("a fully validated block always pushes; qed");
        }

        debug!(target: "core", "block {} successfully added", block_hash);
        match result {
            AddBlockResult::AddedToMain => {
                notify(
                    &inner.queues,
                    BlockchainMessage::NewBlock {
                        height,
                        hash: block_hash,
                    },
                );
            }
            AddBlockResult::AddedToAlternative => {
                notify(
                    &inner.queues,
                    BlockchainMessage::NewAlternativeBlock {
                        height,
                        hash: block_hash,
                    },
                );
            }
            AddBlockResult::AddedToAlternativeAndSwitched => {
                let (common_root_height, hashes_on_new_branch) =
                    switch_info.expect("a switch always records its branch; qed");
                notify(
                    &inner.queues,
                    BlockchainMessage::ChainSwitch {
                        common_root_height,
                        hashes_on_new_branch,
                    },
                );
            }
            AddBlockResult::AlreadyExists => unreachable!("handled before validation"),
        }
        Ok(result)
    }

    /// Promotes `leaf` to canonical, actualizes the pool, rescues the
    /// abandoned branch's transactions and rewrites the raw store tail.
    /// Returns the common root height and the hashes on the winning branch
    /// for the `ChainSwitch` announcement.
    fn switch_to_leaf(&self, inner: &mut CoreInner, leaf: SegmentId) -> (u32, Vec<H256>) {
        // the winning branch: every segment between the leaf and the old
        // canonical chain, recorded before the main-chain set flips
        let mut branch: Vec<SegmentId> = Vec::new();
        let mut current = Some(leaf);
        while let Some(id) = current {
            if inner.tree.is_in_main_chain(id) {
                break;
            }
            branch.push(id);
            current = inner.tree.parent(id);
        }
        branch.reverse();
        assert!(!branch.is_empty());

        let common_root_height = inner.tree.cache(branch[0]).start_height() - 1;
        let mut hashes_on_new_branch = Vec::new();
        for id in &branch {
            let cache = inner.tree.cache(*id);
            let start = cache.start_height();
            for h in start..start + cache.block_count() {
                hashes_on_new_branch.push(
                    cache
                        .block_hash_at(h)
                        .expect("heights below block_count are owned; qed"),
                );
            }
        }

        let position = inner
            .tree
            .leaves()
            .iter()
            .position(|candidate| *candidate == leaf)
            .expect("a just-pushed leaf is always registered; qed");
        assert_ne!(position, 0);

        inner.tree.promote_leaf(position);
        self.actualize_pool(inner);

        let abandoned = inner.tree.leaves()[position];
        self.copy_transactions_to_pool(inner, abandoned);

        let split_height = common_root_height + 1;
        self.switch_main_chain_storage(inner, split_height);
        self.update_block_median_size(inner);

        (common_root_height, hashes_on_new_branch)
    }

    /// Rewrites the raw store tail to match the canonical chain from
    /// `split_height` up.
    fn switch_main_chain_storage(&self, inner: &mut CoreInner, split_height: u32) {
        assert!(inner.storage.block_count() > split_height);

        let blocks_to_pop = inner.storage.block_count() - split_height;
        for _ in 0..blocks_to_pop {
            inner
                .storage
                .pop_block()
                .expect("the raw store holds at least split_height blocks; qed");
        }

        let top = inner
            .tree
            .view(inner.tree.canonical_leaf(), &self.currency)
            .top_height();
        for height in split_height..=top {
            let segment = inner
                .tree
                .find_main_segment_with_height(height)
                .expect("canonical heights are always owned; qed");
            let raw = inner
                .tree
                .cache(segment)
                .raw_block(height)
                .expect("pushed blocks keep their raw form; qed")
                .clone();
            inner
                .storage
                .push_block(raw)
                .expect("raw store push is atomic or recoverable on reopen; qed");
        }
    }

    /// Re-admits every pool transaction through the normal admission path;
    /// the ones that no longer validate are dropped with a `NotActual`
    /// notification.
    fn actualize_pool(&self, inner: &mut CoreInner) {
        let now = self.time.now();
        let hashes = inner.pool.hashes_by_priority();
        for hash in hashes {
            let transaction = inner
                .pool
                .remove(&hash)
                .expect("the priority index mirrors the entry map; qed");
            if !self.try_admit(inner, transaction, now) {
                notify(
                    &inner.queues,
                    BlockchainMessage::DeleteTransaction {
                        hashes: vec![hash],
                        reason: DeleteTransactionReason::NotActual,
                    },
                );
            }
        }
    }

    /// Moves the transactions of an abandoned branch back into the pool,
    /// subject to normal admission. No `AddTransaction` events here.
    fn copy_transactions_to_pool(&self, inner: &mut CoreInner, leaf: SegmentId) {
        let now = self.time.now();
        let mut segments = Vec::new();
        let mut current = Some(leaf);
        while let Some(id) = current {
            if inner.tree.is_in_main_chain(id) {
                break;
            }
            segments.push(id);
            current = inner.tree.parent(id);
        }

        for segment in segments {
            let blobs: Vec<Bytes> = inner
                .tree
                .cache(segment)
                .transaction_hashes()
                .iter()
                .filter_map(|hash| inner.tree.cache(segment).raw_transaction_by_hash(hash))
                .collect();
            for blob in blobs {
                match CachedTransaction::from_binary(&blob) {
                    Ok(transaction) => {
                        self.try_admit(inner, transaction, now);
                    }
                    Err(_) => {
                        error!(target: "core", "corrupted transaction blob on abandoned branch");
                    }
                }
            }
        }
    }

    /// The admission path shared by public submission, pool actualization
    /// and branch rescue. Pool-validates against the canonical top.
    fn try_admit(&self, inner: &mut CoreInner, transaction: CachedTransaction, now: u64) -> bool {
        let hash = transaction.hash();

        let mut state = ValidatorState::default();
        {
            let view = inner.tree.view(inner.tree.canonical_leaf(), &self.currency);
            let top_height = view.top_height();
            let fee = match validate_transaction(
                &transaction,
                &mut state,
                &view,
                &inner.checkpoints,
                top_height,
                now,
            ) {
                Ok(fee) => fee,
                Err(err) => {
                    warn!(target: "core", "transaction {} is not valid for pool: {}", hash, err);
                    return false;
                }
            };

            let max_size = self
                .currency
                .max_transaction_allowed_size(inner.block_median_size as usize);
            if transaction.size() > max_size {
                warn!(
                    target: "core",
                    "transaction {} is too big: {} bytes, allowed {}",
                    hash,
                    transaction.size(),
                    max_size
                );
                return false;
            }

            let is_fusion = fee == 0
                && self
                    .currency
                    .is_fusion_transaction(transaction.transaction(), transaction.size());
            if !is_fusion && fee < self.currency.minimum_fee() {
                warn!(
                    target: "core",
                    "transaction {} fee {} is below the floor and it is not a fusion transaction",
                    hash, fee
                );
                return false;
            }
        }

        if inner.pool_cleaner.is_recently_deleted(&hash, now) {
            debug!(target: "core", "transaction {} was recently evicted, refusing", hash);
            return false;
        }

        inner.pool.push(transaction, state, now)
    }

    /// Admits a raw transaction into the pool, announcing success.
    pub fn add_transaction_to_pool(&self, blob: &[u8]) -> bool {
        let transaction = match CachedTransaction::from_binary(blob) {
            Ok(transaction) => transaction,
            Err(_) => {
                warn!(target: "core", "couldn't add transaction to pool: deserialization error");
                return false;
            }
        };
        let hash = transaction.hash();

        let inner = &mut *self.inner.lock();
        assert!(inner.initialized, "core is not initialized");

        if !self.try_admit(inner, transaction, self.time.now()) {
            return false;
        }

        notify(
            &inner.queues,
            BlockchainMessage::AddTransaction {
                hashes: vec![hash],
            },
        );
        debug!(target: "core", "transaction {} has been added to pool", hash);
        true
    }

    fn update_block_median_size(&self, inner: &mut CoreInner) {
        let view = inner.tree.view(inner.tree.canonical_leaf(), &self.currency);
        let top = view.top_height();
        let sizes = view.last_block_sizes(self.currency.reward_blocks_window(), top, true);
        let zone = self
            .currency
            .full_reward_zone_by_version(inner.upgrades.block_major_version_at(top + 1))
            as u64;
        inner.block_median_size = std::cmp::max(median_value(&sizes), zone);
    }

    fn block_size_limit(&self, inner: &CoreInner, height: u32) -> usize {
        let zone = self
            .currency
            .full_reward_zone_by_version(inner.upgrades.block_major_version_at(height));
        let view = inner.tree.view(inner.tree.canonical_leaf(), &self.currency);
        let sizes = view.last_block_sizes(
            self.currency.reward_blocks_window(),
            view.top_height(),
            true,
        );
        std::cmp::max(median_value(&sizes) as usize, zone) * 2
    }

    /// Builds a mining template. The coinbase is sized by a two-phase fixed
    /// point: the reward depends on the block size, which depends on the
    /// coinbase size, which depends on the reward's decomposition.
    pub fn get_block_template(
        &self,
        miner_address: &AccountPublicAddress,
        extra_nonce: &[u8],
    ) -> Result<(BlockTemplate, u64, u32), CoreError> {
        let inner = &mut *self.inner.lock();
        self.ensure_initialized(inner)?;

        let view = inner.tree.view(inner.tree.canonical_leaf(), &self.currency);
        let previous_height = view.top_height();
        let height = previous_height + 1;

        let difficulty = work_required(&view, previous_height, &self.currency);
        if difficulty == 0 {
            error!(target: "core", "difficulty overhead");
            return Err(CoreError::DifficultyOverhead);
        }

        let major_version = inner.upgrades.block_major_version_at(height);
        let minor_version = if major_version == BLOCK_MAJOR_VERSION_1 {
            if self.currency.upgrade_height(BLOCK_MAJOR_VERSION_2).is_none() {
                BLOCK_MINOR_VERSION_1
            } else {
                BLOCK_MINOR_VERSION_0
            }
        } else if major_version == BLOCK_MAJOR_VERSION_2
            && self.currency.upgrade_height(BLOCK_MAJOR_VERSION_3).is_none()
        {
            BLOCK_MINOR_VERSION_1
        } else {
            BLOCK_MINOR_VERSION_0
        };

        let mut template = BlockTemplate {
            major_version,
            minor_version,
            timestamp: self.time.now(),
            previous_block_hash: view.top_hash(),
            nonce: 0,
            parent_block: if major_version >= BLOCK_MAJOR_VERSION_2 {
                Some(ParentBlock::default())
            } else {
                None
            },
            base_transaction: Default::default(),
            transaction_hashes: Vec::new(),
        };

        let median_size = self.block_size_limit(inner, height) / 2;
        let already_generated_coins = view.already_generated_coins(previous_height);
        drop(view);

        let selected = fill_block_template(
            &inner.pool,
            median_size,
            self.currency.max_block_cumulative_size(height),
            &self.currency,
        );
        template.transaction_hashes = selected.hashes.clone();

        // phase one: a provisional coinbase sized for the bare transactions
        let coinbase = self
            .currency
            .construct_miner_tx(
                major_version,
                height,
                median_size,
                already_generated_coins,
                selected.transactions_size,
                selected.fee,
                miner_address,
                extra_nonce,
            )
            .ok_or(CoreError::TemplateConstructionFailed)?;

        let mut cumulative_size = selected.transactions_size + serialized_size(&coinbase);
        for attempt in 0..COINBASE_SIZING_TRIES {
            let mut coinbase = self
                .currency
                .construct_miner_tx(
                    major_version,
                    height,
                    median_size,
                    already_generated_coins,
                    cumulative_size,
                    selected.fee,
                    miner_address,
                    extra_nonce,
                )
                .ok_or(CoreError::TemplateConstructionFailed)?;

            let coinbase_size = serialized_size(&coinbase);
            if coinbase_size > cumulative_size - selected.transactions_size {
                cumulative_size = selected.transactions_size + coinbase_size;
                continue;
            }

            if coinbase_size < cumulative_size - selected.transactions_size {
                let delta = cumulative_size - selected.transactions_size - coinbase_size;
                coinbase
                    .extra
                    .extend(std::iter::repeat(0u8).take(delta));
                // the varint length prefix of extra may grow by one byte
                if cumulative_size != selected.transactions_size + serialized_size(&coinbase) {
                    if cumulative_size + 1
                        != selected.transactions_size + serialized_size(&coinbase)
                    {
                        error!(
                            target: "core",
                            "unexpected miner transaction size while sizing the coinbase"
                        );
                        return Err(CoreError::TemplateConstructionFailed);
                    }
                    coinbase.extra.pop();
                    if cumulative_size != selected.transactions_size + serialized_size(&coinbase)
                    {
                        trace!(
                            target: "core",
                            "miner transaction sizing retry {} with delta {}",
                            attempt, delta
                        );
                        cumulative_size += delta - 1;
                        continue;
                    }
                }
            }

            debug_assert_eq!(
                cumulative_size,
                selected.transactions_size + serialized_size(&coinbase)
            );
            template.base_transaction = coinbase;
            return Ok((template, difficulty, height));
        }

        error!(target: "core", "failed to size the coinbase in {} tries", COINBASE_SIZING_TRIES);
        Err(CoreError::TemplateConstructionFailed)
    }

    pub fn top_block_height(&self) -> Result<u32, CoreError> {
        let inner = self.inner.lock();
        self.ensure_initialized(&inner)?;
        Ok(inner
            .tree
            .view(inner.tree.canonical_leaf(), &self.currency)
            .top_height())
    }

    pub fn top_block_hash(&self) -> Result<H256, CoreError> {
        let inner = self.inner.lock();
        self.ensure_initialized(&inner)?;
        Ok(inner
            .tree
            .view(inner.tree.canonical_leaf(), &self.currency)
            .top_hash())
    }

    pub fn block_hash_at(&self, height: u32) -> Result<Option<H256>, CoreError> {
        let inner = self.inner.lock();
        self.ensure_initialized(&inner)?;
        Ok(inner
            .tree
            .view(inner.tree.canonical_leaf(), &self.currency)
            .block_hash_at(height))
    }

    pub fn has_block(&self, hash: &H256) -> Result<bool, CoreError> {
        let inner = self.inner.lock();
        self.ensure_initialized(&inner)?;
        Ok(inner.tree.find_segment_with_block(hash).is_some())
    }

    pub fn block_height(&self, hash: &H256) -> Result<Option<u32>, CoreError> {
        let inner = self.inner.lock();
        self.ensure_initialized(&inner)?;
        Ok(inner
            .tree
            .find_segment_with_block(hash)
            .and_then(|segment| inner.tree.cache(segment).block_height(hash)))
    }

    pub fn has_transaction(&self, hash: &H256) -> Result<bool, CoreError> {
        let inner = self.inner.lock();
        self.ensure_initialized(&inner)?;
        Ok(inner.tree.find_segment_with_transaction(hash).is_some()
            || inner.pool.contains(hash))
    }

    pub fn block_by_height(&self, height: u32) -> Result<Option<BlockTemplate>, CoreError> {
        let inner = self.inner.lock();
        self.ensure_initialized(&inner)?;
        let segment = match inner.tree.find_main_segment_with_height(height) {
            Some(segment) => segment,
            None => return Ok(None),
        };
        let raw = inner
            .tree
            .cache(segment)
            .raw_block(height)
            .ok_or(CoreError::CorruptedBlockchain)?;
        Ok(Some(
            deserialize(&raw.block).map_err(|_| CoreError::CorruptedBlockchain)?,
        ))
    }

    pub fn block_by_hash(&self, hash: &H256) -> Result<Option<BlockTemplate>, CoreError> {
        let height = {
            let inner = self.inner.lock();
            self.ensure_initialized(&inner)?;
            match inner
                .tree
                .find_main_segment_with_block(hash)
                .and_then(|segment| inner.tree.cache(segment).block_height(hash))
            {
                Some(height) => height,
                None => return Ok(None),
            }
        };
        self.block_by_height(height)
    }

    /// Raw blocks `[min_height, min_height + count)` from the canonical
    /// chain.
    pub fn blocks_in_range(&self, min_height: u32, count: usize) -> Result<Vec<RawBlock>, CoreError> {
        let inner = self.inner.lock();
        self.ensure_initialized(&inner)?;

        let top = inner
            .tree
            .view(inner.tree.canonical_leaf(), &self.currency)
            .top_height();
        let mut blocks = Vec::new();
        let mut height = min_height;
        while height <= top && blocks.len() < count {
            let segment = inner
                .tree
                .find_main_segment_with_height(height)
                .ok_or(CoreError::CorruptedBlockchain)?;
            blocks.push(
                inner
                    .tree
                    .cache(segment)
                    .raw_block(height)
                    .ok_or(CoreError::CorruptedBlockchain)?
                    .clone(),
            );
            height += 1;
        }
        Ok(blocks)
    }

    /// Looks hashes up across the whole forest, partitioning into found raw
    /// blocks and missed hashes.
    pub fn blocks_by_hashes(
        &self,
        hashes: &[H256],
    ) -> Result<(Vec<RawBlock>, Vec<H256>), CoreError> {
        let inner = self.inner.lock();
        self.ensure_initialized(&inner)?;

        let mut found = Vec::new();
        let mut missed = Vec::new();
        for hash in hashes {
            match inner.tree.find_segment_with_block(hash) {
                Some(segment) => {
                    let cache = inner.tree.cache(segment);
                    let height = cache
                        .block_height(hash)
                        .ok_or(CoreError::CorruptedBlockchain)?;
                    found.push(
                        cache
                            .raw_block(height)
                            .ok_or(CoreError::CorruptedBlockchain)?
                            .clone(),
                    );
                }
                None => missed.push(*hash),
            }
        }
        Ok((found, missed))
    }

    fn find_blockchain_supplement(
        &self,
        inner: &CoreInner,
        known_hashes: &[H256],
    ) -> Result<u32, CoreError> {
        for hash in known_hashes {
            if let Some(segment) = inner.tree.find_main_segment_with_block(hash) {
                return Ok(inner
                    .tree
                    .cache(segment)
                    .block_height(hash)
                    .expect("the segment was found by this hash; qed"));
            }
        }
        Err(CoreError::GenesisMismatch)
    }

    /// Chunked sync response with full raw blocks past the timestamp offset.
    pub fn query_blocks(
        &self,
        known_hashes: &[H256],
        timestamp: u64,
    ) -> Result<QueryBlocksResult, CoreError> {
        let inner = self.inner.lock();
        self.ensure_initialized(&inner)?;

        let current_height = inner
            .tree
            .view(inner.tree.canonical_leaf(), &self.currency)
            .top_height();
        let start_height = self.find_blockchain_supplement(&inner, known_hashes)?;
        let full_offset = std::cmp::max(
            inner
                .tree
                .timestamp_lower_bound(timestamp)
                .unwrap_or(current_height + 1),
            start_height,
        );

        let mut entries: Vec<BlockFullInfo> = inner
            .tree
            .block_hashes(
                start_height,
                std::cmp::min(
                    (full_offset - start_height) as usize,
                    BLOCKS_IDS_SYNCHRONIZING_DEFAULT_COUNT,
                ),
            )
            .into_iter()
            .map(|block_id| BlockFullInfo {
                block_id,
                raw_block: None,
            })
            .collect();

        if start_height + entries.len() as u32 == full_offset && full_offset <= current_height {
            let limit = std::cmp::min(
                full_offset + BLOCKS_SYNCHRONIZING_DEFAULT_COUNT as u32 - 1,
                current_height,
            );
            for height in full_offset..=limit {
                let segment = inner
                    .tree
                    .find_main_segment_with_height(height)
                    .ok_or(CoreError::CorruptedBlockchain)?;
                let cache = inner.tree.cache(segment);
                entries.push(BlockFullInfo {
                    block_id: cache
                        .block_hash_at(height)
                        .ok_or(CoreError::CorruptedBlockchain)?,
                    raw_block: Some(
                        cache
                            .raw_block(height)
                            .ok_or(CoreError::CorruptedBlockchain)?
                            .clone(),
                    ),
                });
            }
        }

        Ok(QueryBlocksResult {
            start_height,
            current_height,
            full_offset,
            entries,
        })
    }

    /// Chunked sync response carrying transaction prefixes instead of full
    /// blobs.
    pub fn query_blocks_lite(
        &self,
        known_hashes: &[H256],
        timestamp: u64,
    ) -> Result<QueryBlocksShortResult, CoreError> {
        let inner = self.inner.lock();
        self.ensure_initialized(&inner)?;

        let current_height = inner
            .tree
            .view(inner.tree.canonical_leaf(), &self.currency)
            .top_height();
        let start_height = self.find_blockchain_supplement(&inner, known_hashes)?;
        let full_offset = std::cmp::max(
            inner
                .tree
                .timestamp_lower_bound(timestamp)
                .unwrap_or(current_height + 1),
            start_height,
        );

        let mut entries: Vec<BlockShortInfo> = inner
            .tree
            .block_hashes(
                start_height,
                std::cmp::min(
                    (full_offset - start_height) as usize,
                    BLOCKS_IDS_SYNCHRONIZING_DEFAULT_COUNT,
                ),
            )
            .into_iter()
            .map(|block_id| BlockShortInfo {
                block_id,
                block: None,
                transaction_prefixes: Vec::new(),
            })
            .collect();

        if start_height + entries.len() as u32 == full_offset && full_offset <= current_height {
            let limit = std::cmp::min(
                full_offset + BLOCKS_SYNCHRONIZING_DEFAULT_COUNT as u32 - 1,
                current_height,
            );
            for height in full_offset..=limit {
                let segment = inner
                    .tree
                    .find_main_segment_with_height(height)
                    .ok_or(CoreError::CorruptedBlockchain)?;
                let cache = inner.tree.cache(segment);
                let raw = cache
                    .raw_block(height)
                    .ok_or(CoreError::CorruptedBlockchain)?;

                let mut prefixes = Vec::with_capacity(raw.transactions.len());
                for blob in &raw.transactions {
                    let transaction = CachedTransaction::from_binary(blob)
                        .map_err(|_| CoreError::CorruptedBlockchain)?;
                    prefixes.push(TransactionPrefixInfo {
                        transaction_hash: transaction.hash(),
                        transaction_prefix: strip_signatures(
                            transaction.transaction().clone(),
                        ),
                    });
                }

                entries.push(BlockShortInfo {
                    block_id: cache
                        .block_hash_at(height)
                        .ok_or(CoreError::CorruptedBlockchain)?,
                    block: Some(raw.block.clone()),
                    transaction_prefixes: prefixes,
                });
            }
        }

        Ok(QueryBlocksShortResult {
            start_height,
            current_height,
            full_offset,
            entries,
        })
    }

    /// Looks transactions up on the canonical chain first, then on the
    /// alternative branches; unfound hashes are reported back.
    pub fn transactions(&self, hashes: &[H256]) -> Result<(Vec<Bytes>, Vec<H256>), CoreError> {
        let inner = self.inner.lock();
        self.ensure_initialized(&inner)?;

        let mut found = Vec::new();
        let mut missed = Vec::new();
        for hash in hashes {
            match inner
                .tree
                .find_segment_with_transaction(hash)
                .and_then(|segment| inner.tree.cache(segment).raw_transaction_by_hash(hash))
            {
                Some(blob) => found.push(blob),
                None => missed.push(*hash),
            }
        }
        Ok((found, missed))
    }

    pub fn transaction_global_indexes(&self, hash: &H256) -> Result<Option<Vec<u32>>, CoreError> {
        let inner = self.inner.lock();
        self.ensure_initialized(&inner)?;
        Ok(inner
            .tree
            .find_segment_with_transaction(hash)
            .and_then(|segment| {
                inner
                    .tree
                    .cache(segment)
                    .transaction_global_indexes(hash)
                    .map(|indexes| indexes.to_vec())
            }))
    }

    /// Samples `count` unlocked key outputs of `amount` for ring mixing.
    pub fn random_outputs(&self, amount: u64, count: usize) -> Result<Vec<RandomOutput>, CoreError> {
        let inner = self.inner.lock();
        self.ensure_initialized(&inner)?;

        if count == 0 {
            return Ok(Vec::new());
        }

        let view = inner.tree.view(inner.tree.canonical_leaf(), &self.currency);
        let top = view.top_height();
        let unlock_window = self.currency.mined_money_unlock_window();
        if top < unlock_window * 2 {
            debug!(target: "core", "blockchain height is below the mined money unlock window");
            return Ok(Vec::new());
        }

        let now = self.time.now();
        let total = view.key_outputs_count(amount, top);
        let mut candidates: Vec<u32> = (0..total).collect();
        candidates.shuffle(&mut rand::thread_rng());

        let mut outputs = Vec::with_capacity(count);
        for global_index in candidates {
            match storage::extract_key_output_keys(&view, amount, top, &[global_index], now) {
                Ok(keys) => {
                    outputs.push(RandomOutput {
                        global_index,
                        key: keys[0],
                    });
                    if outputs.len() == count {
                        break;
                    }
                }
                Err(_) => continue,
            }
        }

        if outputs.len() < count {
            debug!(
                target: "core",
                "too few unlocked outputs of amount {}: wanted {}, found {}",
                amount, count, outputs.len()
            );
            return Ok(Vec::new());
        }

        outputs.sort_by_key(|output| output.global_index);
        Ok(outputs)
    }

    /// The exponentially thinning chain locator used by sync requests.
    pub fn build_sparse_chain(&self) -> Result<Vec<H256>, CoreError> {
        let inner = self.inner.lock();
        self.ensure_initialized(&inner)?;

        let view = inner.tree.view(inner.tree.canonical_leaf(), &self.currency);
        let top = view.top_height();
        let mut sparse = vec![view.top_hash()];

        let mut step = 1u32;
        while step < top {
            if let Some(hash) = view.block_hash_at(top - step) {
                sparse.push(hash);
            }
            step = step.saturating_mul(2);
        }

        let genesis = view
            .block_hash_at(0)
            .expect("an initialized chain owns its genesis; qed");
        if sparse.last() != Some(&genesis) {
            sparse.push(genesis);
        }
        Ok(sparse)
    }

    pub fn difficulty_for_next_block(&self) -> Result<u64, CoreError> {
        let inner = self.inner.lock();
        self.ensure_initialized(&inner)?;
        let view = inner.tree.view(inner.tree.canonical_leaf(), &self.currency);
        Ok(work_required(&view, view.top_height(), &self.currency))
    }

    pub fn block_difficulty(&self, height: u32) -> Result<u64, CoreError> {
        let inner = self.inner.lock();
        self.ensure_initialized(&inner)?;
        let view = inner.tree.view(inner.tree.canonical_leaf(), &self.currency);
        let difficulties = view.last_cumulative_difficulties(2, height, true);
        match difficulties.as_slice() {
            [previous, current] => Ok(current - previous),
            [only] => Ok(*only),
            _ => Err(CoreError::CorruptedBlockchain),
        }
    }

    pub fn total_generated_amount(&self) -> Result<u64, CoreError> {
        let inner = self.inner.lock();
        self.ensure_initialized(&inner)?;
        let view = inner.tree.view(inner.tree.canonical_leaf(), &self.currency);
        Ok(view.already_generated_coins(view.top_height()))
    }

    pub fn pool_transaction_count(&self) -> Result<usize, CoreError> {
        let inner = self.inner.lock();
        self.ensure_initialized(&inner)?;
        Ok(inner.pool.len())
    }

    pub fn pool_transaction_hashes(&self) -> Result<Vec<H256>, CoreError> {
        let inner = self.inner.lock();
        self.ensure_initialized(&inner)?;
        Ok(inner.pool.hashes_by_priority())
    }

    /// Difference between the caller's known pool and ours; the flag reports
    /// whether the caller's chain tip is still current.
    pub fn pool_changes(
        &self,
        last_block_hash: &H256,
        known_hashes: &[H256],
    ) -> Result<(bool, Vec<Bytes>, Vec<H256>), CoreError> {
        let inner = self.inner.lock();
        self.ensure_initialized(&inner)?;

        let pool_hashes = inner.pool.hashes_by_priority();
        let added: Vec<Bytes> = pool_hashes
            .iter()
            .filter(|hash| !known_hashes.contains(*hash))
            .filter_map(|hash| inner.pool.get(hash).map(|tx| tx.binary().clone()))
            .collect();
        let deleted: Vec<H256> = known_hashes
            .iter()
            .filter(|hash| !inner.pool.contains(*hash))
            .cloned()
            .collect();

        let top = inner
            .tree
            .view(inner.tree.canonical_leaf(), &self.currency)
            .top_hash();
        Ok((top == *last_block_hash, added, deleted))
    }

    pub fn block_hashes_by_timestamps(
        &self,
        timestamp_begin: u64,
        seconds_count: u64,
    ) -> Result<Vec<H256>, CoreError> {
        let inner = self.inner.lock();
        self.ensure_initialized(&inner)?;

        if seconds_count == 0 {
            return Ok(Vec::new());
        }
        let end = timestamp_begin.saturating_add(seconds_count - 1);
        let mut hashes = Vec::new();
        let mut path = inner.tree.chain_ids(inner.tree.canonical_leaf());
        path.reverse();
        for id in path {
            hashes.extend(
                inner
                    .tree
                    .cache(id)
                    .block_hashes_by_timestamps(timestamp_begin, end),
            );
        }
        Ok(hashes)
    }

    /// Transactions tagged with `payment_id`, from the canonical chain and
    /// the pool.
    pub fn transaction_hashes_by_payment_id(
        &self,
        payment_id: &H256,
    ) -> Result<Vec<H256>, CoreError> {
        let inner = self.inner.lock();
        self.ensure_initialized(&inner)?;

        let mut hashes = Vec::new();
        for id in inner.tree.chain_ids(inner.tree.canonical_leaf()) {
            hashes.extend_from_slice(inner.tree.cache(id).payment_id_transactions(payment_id));
        }
        hashes.extend(inner.pool.hashes_by_payment_id(payment_id));
        Ok(hashes)
    }

    pub fn alternative_block_count(&self) -> Result<usize, CoreError> {
        let inner = self.inner.lock();
        self.ensure_initialized(&inner)?;
        Ok(inner
            .tree
            .segment_ids()
            .into_iter()
            .filter(|id| !inner.tree.is_in_main_chain(*id))
            .map(|id| inner.tree.cache(id).block_count() as usize)
            .sum())
    }

    pub fn block_count(&self) -> Result<u32, CoreError> {
        Ok(self.top_block_height()? + 1)
    }
}

/// Unsubscribes its queue from the core on drop.
pub struct QueueGuard<'a> {
    core: &'a Core,
    queue: Arc<MessageQueue<BlockchainMessage>>,
}

impl<'a> QueueGuard<'a> {
    pub fn queue(&self) -> &Arc<MessageQueue<BlockchainMessage>> {
        &self.queue
    }
}

impl<'a> Drop for QueueGuard<'a> {
    fn drop(&mut self) {
        self.core.remove_queue(&self.queue);
    }
}
