//! In-memory indexes for one contiguous range of block heights.
//!
//! A segment owns every index for its heights and nothing else; queries that
//! logically span a whole chain are stitched together from ancestor segments
//! by the segment tree. Public operations assume the core-wide lock is held,
//! the cache itself does no locking.

use crate::error::Error;
use chain::{
    extra_payment_id, CachedBlock, CachedTransaction, MultisignatureOutput, TransactionOutputTarget,
};
use crypto::KeyImage;
use primitives::{Bytes, H256};
use ser::serialize;
use std::collections::{BTreeMap, HashMap};
use storage::{
    CachedBlockInfo, CachedTransactionInfo, PackedOutputIndex, PushedBlockInfo, ValidatorState,
};

/// Global output counts of the ancestor chain, prepared by the tree before a
/// push so newly seen amounts start their numbering where the ancestors
/// left off.
#[derive(Debug, Default, Clone)]
pub struct OutputBaseCounts {
    pub key: HashMap<u64, u32>,
    pub multisignature: HashMap<u64, u32>,
}

/// Result of a single-segment output lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputLookup {
    Found(PackedOutputIndex),
    /// The index precedes this segment's numbering; an ancestor owns it.
    AskParent,
    /// The index is beyond anything assigned on this chain.
    Missing,
}

#[derive(Debug, Default, Clone)]
struct OutputsForAmount {
    start_index: u32,
    outputs: Vec<PackedOutputIndex>,
}

impl OutputsForAmount {
    fn total(&self) -> u32 {
        self.start_index + self.outputs.len() as u32
    }

    /// Number of own outputs at heights `<= up_to` (outputs are appended in
    /// height order).
    fn visible(&self, up_to_height: u32) -> usize {
        self.outputs
            .partition_point(|packed| packed.block_height <= up_to_height)
    }

    fn lookup(&self, global_index: u32, up_to_height: u32) -> OutputLookup {
        if global_index < self.start_index {
            return OutputLookup::AskParent;
        }
        let position = (global_index - self.start_index) as usize;
        if position >= self.visible(up_to_height) {
            return OutputLookup::Missing;
        }
        OutputLookup::Found(self.outputs[position])
    }
}

pub struct SegmentCache {
    start_height: u32,
    /// Stats of the block right below `start_height`. `None` only for the
    /// root segment. Stable because a parent with children is frozen.
    parent_base: Option<CachedBlockInfo>,
    block_infos: Vec<CachedBlockInfo>,
    block_tx_hashes: Vec<Vec<H256>>,
    block_index: HashMap<H256, u32>,
    transactions: HashMap<H256, CachedTransactionInfo>,
    spent_key_images: HashMap<KeyImage, u32>,
    spent_multisignatures: BTreeMap<(u64, u32), u32>,
    key_outputs: HashMap<u64, OutputsForAmount>,
    multisignature_outputs: HashMap<u64, OutputsForAmount>,
    payment_ids: HashMap<H256, Vec<H256>>,
    timestamps: BTreeMap<u64, Vec<H256>>,
    pushed: Vec<PushedBlockInfo>,
}

pub fn restore_cached_transactions(blobs: &[Bytes]) -> Result<Vec<CachedTransaction>, Error> {
    blobs
        .iter()
        .map(|blob| CachedTransaction::from_binary(blob).map_err(Error::from))
        .collect()
}

impl SegmentCache {
    pub fn new(start_height: u32, parent_base: Option<CachedBlockInfo>) -> Self {
        SegmentCache {
            start_height,
            parent_base,
            block_infos: Vec::new(),
            block_tx_hashes: Vec::new(),
            block_index: HashMap::new(),
            transactions: HashMap::new(),
            spent_key_images: HashMap::new(),
            spent_multisignatures: BTreeMap::new(),
            key_outputs: HashMap::new(),
            multisignature_outputs: HashMap::new(),
            payment_ids: HashMap::new(),
            timestamps: BTreeMap::new(),
            pushed: Vec::new(),
        }
    }

    /// Rebuilds a root segment from its persisted push history.
    pub fn from_pushed(start_height: u32, pushed: Vec<PushedBlockInfo>) -> Result<Self, Error> {
        assert_eq!(start_height, 0, "only the root segment is restored from disk");
        let mut cache = SegmentCache::new(start_height, None);
        let base = OutputBaseCounts::default();
        for info in pushed {
            let block = CachedBlock::from_binary(&info.raw_block.block)?;
            let transactions = restore_cached_transactions(&info.raw_block.transactions)?;
            cache.push_block(
                &block,
                &transactions,
                info.validator_state.clone(),
                info.block_size,
                info.emission_change,
                info.block_difficulty,
                info.raw_block.clone(),
                &base,
            )?;
        }
        Ok(cache)
    }

    pub fn start_height(&self) -> u32 {
        self.start_height
    }

    pub fn block_count(&self) -> u32 {
        self.block_infos.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.block_infos.is_empty()
    }

    pub fn top_height(&self) -> Option<u32> {
        if self.is_empty() {
            None
        } else {
            Some(self.start_height + self.block_count() - 1)
        }
    }

    pub fn contains_height(&self, height: u32) -> bool {
        height >= self.start_height && height < self.start_height + self.block_count()
    }

    pub fn parent_base(&self) -> Option<&CachedBlockInfo> {
        self.parent_base.as_ref()
    }

    pub fn info_at(&self, height: u32) -> Option<&CachedBlockInfo> {
        if !self.contains_height(height) {
            return None;
        }
        Some(&self.block_infos[(height - self.start_height) as usize])
    }

    pub fn block_hash_at(&self, height: u32) -> Option<H256> {
        self.info_at(height).map(|info| info.block_hash)
    }

    pub fn block_height(&self, hash: &H256) -> Option<u32> {
        self.block_index.get(hash).cloned()
    }

    pub fn has_block(&self, hash: &H256) -> bool {
        self.block_index.contains_key(hash)
    }

    pub fn has_transaction(&self, hash: &H256) -> bool {
        self.transactions.contains_key(hash)
    }

    pub fn transaction_info(&self, hash: &H256) -> Option<&CachedTransactionInfo> {
        self.transactions.get(hash)
    }

    pub fn transaction_count(&self) -> usize {
        self.transactions.len()
    }

    /// Hashes of all non-coinbase transactions in this segment.
    pub fn transaction_hashes(&self) -> Vec<H256> {
        self.block_tx_hashes
            .iter()
            .flat_map(|hashes| hashes.iter().skip(1).cloned())
            .collect()
    }

    pub fn block_transaction_hashes(&self, height: u32) -> Option<&[H256]> {
        if !self.contains_height(height) {
            return None;
        }
        Some(&self.block_tx_hashes[(height - self.start_height) as usize])
    }

    pub fn transaction_global_indexes(&self, hash: &H256) -> Option<&[u32]> {
        self.transactions
            .get(hash)
            .map(|info| info.global_indexes.as_slice())
    }

    pub fn payment_id_transactions(&self, payment_id: &H256) -> &[H256] {
        self.payment_ids
            .get(payment_id)
            .map(|hashes| hashes.as_slice())
            .unwrap_or(&[])
    }

    pub fn key_image_spent_height(&self, image: &KeyImage) -> Option<u32> {
        self.spent_key_images.get(image).cloned()
    }

    pub fn multisignature_spent_height(&self, amount: u64, output_index: u32) -> Option<u32> {
        self.spent_multisignatures
            .get(&(amount, output_index))
            .cloned()
    }

    pub fn key_output_lookup(
        &self,
        amount: u64,
        global_index: u32,
        up_to_height: u32,
    ) -> OutputLookup {
        match self.key_outputs.get(&amount) {
            Some(entry) => entry.lookup(global_index, up_to_height),
            None => OutputLookup::AskParent,
        }
    }

    pub fn key_outputs_total(&self, amount: u64) -> Option<u32> {
        self.key_outputs.get(&amount).map(OutputsForAmount::total)
    }

    pub fn key_outputs_count_limited(&self, amount: u64, up_to_height: u32) -> Option<u32> {
        self.key_outputs
            .get(&amount)
            .map(|entry| entry.start_index + entry.visible(up_to_height) as u32)
    }

    pub fn multisignature_output_lookup(
        &self,
        amount: u64,
        global_index: u32,
        up_to_height: u32,
    ) -> OutputLookup {
        match self.multisignature_outputs.get(&amount) {
            Some(entry) => entry.lookup(global_index, up_to_height),
            None => OutputLookup::AskParent,
        }
    }

    pub fn multisignature_outputs_total(&self, amount: u64) -> Option<u32> {
        self.multisignature_outputs
            .get(&amount)
            .map(OutputsForAmount::total)
    }

    /// Resolves a packed location into the transaction info it points at.
    pub fn resolve_output(
        &self,
        packed: PackedOutputIndex,
    ) -> Option<(&CachedTransactionInfo, &H256)> {
        let hashes = self.block_transaction_hashes(packed.block_height)?;
        let hash = hashes.get(packed.transaction_index as usize)?;
        let info = self.transactions.get(hash)?;
        Some((info, hash))
    }

    pub fn multisignature_output_at(
        &self,
        packed: PackedOutputIndex,
    ) -> Option<(MultisignatureOutput, u64)> {
        let (info, _) = self.resolve_output(packed)?;
        match info
            .outputs
            .get(packed.output_index as usize)
            .map(|output| &output.target)
        {
            Some(TransactionOutputTarget::Multisignature(output)) => {
                Some((output.clone(), info.unlock_time))
            }
            _ => None,
        }
    }

    /// Height of the first own block with `timestamp >= timestamp`.
    pub fn timestamp_lower_bound(&self, timestamp: u64) -> Option<u32> {
        self.timestamps
            .range(timestamp..)
            .flat_map(|(_, hashes)| hashes.iter())
            .filter_map(|hash| self.block_height(hash))
            .min()
    }

    pub fn block_hashes_by_timestamps(&self, begin: u64, end_inclusive: u64) -> Vec<H256> {
        self.timestamps
            .range(begin..=end_inclusive)
            .flat_map(|(_, hashes)| hashes.iter().cloned())
            .collect()
    }

    pub fn pushed_info(&self, height: u32) -> Option<&PushedBlockInfo> {
        if !self.contains_height(height) {
            return None;
        }
        Some(&self.pushed[(height - self.start_height) as usize])
    }

    pub fn raw_block(&self, height: u32) -> Option<&chain::RawBlock> {
        self.pushed_info(height).map(|info| &info.raw_block)
    }

    /// Raw bytes of the transaction at `(height, index)`; index 0 is the
    /// coinbase, which is re-serialized out of the block blob.
    pub fn raw_transaction(&self, height: u32, transaction_index: u16) -> Option<Bytes> {
        let raw_block = self.raw_block(height)?;
        if transaction_index == 0 {
            let block = CachedBlock::from_binary(&raw_block.block).ok()?;
            Some(serialize(&block.block().base_transaction))
        } else {
            raw_block
                .transactions
                .get(transaction_index as usize - 1)
                .cloned()
        }
    }

    pub fn raw_transaction_by_hash(&self, hash: &H256) -> Option<Bytes> {
        let info = self.transactions.get(hash)?;
        self.raw_transaction(info.block_height, info.transaction_index)
    }

    fn previous_info(&self) -> Option<&CachedBlockInfo> {
        self.block_infos.last().or(self.parent_base.as_ref())
    }

    fn check_no_spent_duplicates(&self, state: &ValidatorState) -> Result<(), Error> {
        for image in &state.spent_key_images {
            if self.spent_key_images.contains_key(image) {
                return Err(Error::DuplicateSpentEntry);
            }
        }
        for usage in &state.spent_multisignature_outputs {
            if self.spent_multisignatures.contains_key(usage) {
                return Err(Error::DuplicateSpentEntry);
            }
        }
        Ok(())
    }

    /// Appends a fully validated block and updates every index. Fails before
    /// any mutation, so the caller observes the update as atomic.
    pub fn push_block(
        &mut self,
        block: &CachedBlock,
        transactions: &[CachedTransaction],
        validator_state: ValidatorState,
        block_size: u64,
        emission_change: i64,
        block_difficulty: u64,
        raw_block: chain::RawBlock,
        base_counts: &OutputBaseCounts,
    ) -> Result<(), Error> {
        let height = self.start_height + self.block_count();

        if let Some(previous) = self.previous_info() {
            if block.block().previous_block_hash != previous.block_hash {
                return Err(Error::InvalidPushHeight);
            }
        }

        self.check_no_spent_duplicates(&validator_state)?;

        let previous = self.previous_info().cloned().unwrap_or_default();
        let info = CachedBlockInfo {
            block_hash: block.hash(),
            timestamp: block.block().timestamp,
            cumulative_difficulty: previous.cumulative_difficulty + block_difficulty,
            already_generated_coins: (previous.already_generated_coins as i128
                + emission_change as i128) as u64,
            already_generated_transactions: previous.already_generated_transactions
                + 1
                + transactions.len() as u64,
            block_size,
        };

        let coinbase = CachedTransaction::new(block.block().base_transaction.clone());
        let mut tx_hashes = Vec::with_capacity(transactions.len() + 1);

        for (index, transaction) in
            std::iter::once(&coinbase).chain(transactions.iter()).enumerate()
        {
            let hash = transaction.hash();
            let tx = transaction.transaction();
            let mut global_indexes = Vec::with_capacity(tx.outputs.len());
            for (output_index, output) in tx.outputs.iter().enumerate() {
                let packed = PackedOutputIndex {
                    block_height: height,
                    transaction_index: index as u16,
                    output_index: output_index as u16,
                };
                let entry = match output.target {
                    TransactionOutputTarget::Key(_) => {
                        self.key_outputs.entry(output.amount).or_insert_with(|| {
                            OutputsForAmount {
                                start_index: base_counts
                                    .key
                                    .get(&output.amount)
                                    .cloned()
                                    .unwrap_or(0),
                                outputs: Vec::new(),
                            }
                        })
                    }
                    TransactionOutputTarget::Multisignature(_) => self
                        .multisignature_outputs
                        .entry(output.amount)
                        .or_insert_with(|| OutputsForAmount {
                            start_index: base_counts
                                .multisignature
                                .get(&output.amount)
                                .cloned()
                                .unwrap_or(0),
                            outputs: Vec::new(),
                        }),
                };
                global_indexes.push(entry.total());
                entry.outputs.push(packed);
            }

            self.transactions.insert(
                hash,
                CachedTransactionInfo {
                    block_height: height,
                    transaction_index: index as u16,
                    unlock_time: tx.unlock_time,
                    outputs: tx.outputs.clone(),
                    global_indexes,
                },
            );

            if let Some(payment_id) = extra_payment_id(&tx.extra) {
                self.payment_ids.entry(payment_id).or_default().push(hash);
            }

            tx_hashes.push(hash);
        }

        for image in &validator_state.spent_key_images {
            self.spent_key_images.insert(*image, height);
        }
        for usage in &validator_state.spent_multisignature_outputs {
            self.spent_multisignatures.insert(*usage, height);
        }

        self.block_index.insert(info.block_hash, height);
        self.timestamps
            .entry(info.timestamp)
            .or_default()
            .push(info.block_hash);
        self.block_infos.push(info);
        self.block_tx_hashes.push(tx_hashes);
        self.pushed.push(PushedBlockInfo {
            raw_block,
            validator_state,
            block_size,
            emission_change,
            block_difficulty,
        });

        Ok(())
    }

    /// Carves off every index entry with height `>= height` into a new
    /// segment; both halves stay independently usable.
    pub fn split(&mut self, height: u32) -> SegmentCache {
        assert!(height > self.start_height, "the lower half may not be empty");
        assert!(self.contains_height(height), "split height must be owned");

        let offset = (height - self.start_height) as usize;
        let parent_base = self.block_infos[offset - 1].clone();

        let mut upper = SegmentCache::new(height, Some(parent_base));
        upper.block_infos = self.block_infos.split_off(offset);
        upper.block_tx_hashes = self.block_tx_hashes.split_off(offset);
        upper.pushed = self.pushed.split_off(offset);

        // hash -> height entries follow their blocks
        let (keep, moved): (HashMap<_, _>, HashMap<_, _>) = self
            .block_index
            .drain()
            .partition(|(_, block_height)| *block_height < height);
        self.block_index = keep;
        upper.block_index = moved;

        let (keep, moved): (HashMap<_, _>, HashMap<_, _>) = self
            .transactions
            .drain()
            .partition(|(_, info)| info.block_height < height);
        self.transactions = keep;
        upper.transactions = moved;

        let spent_images = std::mem::take(&mut self.spent_key_images);
        for (image, spent_height) in spent_images {
            if spent_height < height {
                self.spent_key_images.insert(image, spent_height);
            } else {
                upper.spent_key_images.insert(image, spent_height);
            }
        }

        let spent_multisignatures = std::mem::take(&mut self.spent_multisignatures);
        for (usage, spent_height) in spent_multisignatures {
            if spent_height < height {
                self.spent_multisignatures.insert(usage, spent_height);
            } else {
                upper.spent_multisignatures.insert(usage, spent_height);
            }
        }

        Self::split_outputs(&mut self.key_outputs, &mut upper.key_outputs, height);
        Self::split_outputs(
            &mut self.multisignature_outputs,
            &mut upper.multisignature_outputs,
            height,
        );

        let payment_ids = std::mem::take(&mut self.payment_ids);
        for (payment_id, hashes) in payment_ids {
            for hash in hashes {
                let target = if upper.transactions.contains_key(&hash) {
                    &mut upper.payment_ids
                } else {
                    &mut self.payment_ids
                };
                target.entry(payment_id).or_default().push(hash);
            }
        }

        let timestamps = std::mem::take(&mut self.timestamps);
        for (timestamp, hashes) in timestamps {
            for hash in hashes {
                let target = if upper.block_index.contains_key(&hash) {
                    &mut upper.timestamps
                } else {
                    &mut self.timestamps
                };
                target.entry(timestamp).or_default().push(hash);
            }
        }

        upper
    }

    fn split_outputs(
        lower: &mut HashMap<u64, OutputsForAmount>,
        upper: &mut HashMap<u64, OutputsForAmount>,
        height: u32,
    ) {
        let mut emptied = Vec::new();
        for (amount, entry) in lower.iter_mut() {
            // outputs are sorted by (height, tx, out); binary split point
            let cut = entry
                .outputs
                .partition_point(|packed| packed.block_height < height);
            if cut == entry.outputs.len() {
                continue;
            }
            let moved = entry.outputs.split_off(cut);
            upper.insert(
                *amount,
                OutputsForAmount {
                    start_index: entry.start_index + entry.outputs.len() as u32,
                    outputs: moved,
                },
            );
            if entry.outputs.is_empty() {
                emptied.push(*amount);
            }
        }
        for amount in emptied {
            lower.remove(&amount);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chain::{
        BlockTemplate, KeyOutput, Transaction, TransactionInput, TransactionOutput,
        TransactionOutputTarget,
    };
    use crypto::generate_keys;

    fn coinbase(height: u32, amounts: &[u64]) -> Transaction {
        let (_, key) = generate_keys(format!("cb-{}", height).as_bytes());
        Transaction {
            inputs: vec![TransactionInput::Coinbase { height }],
            outputs: amounts
                .iter()
                .map(|amount| TransactionOutput {
                    amount: *amount,
                    target: TransactionOutputTarget::Key(KeyOutput { key }),
                })
                .collect(),
            signatures: vec![vec![]],
            ..Default::default()
        }
    }

    fn block_at(parent: Option<&CachedBlock>, height: u32, amounts: &[u64]) -> CachedBlock {
        CachedBlock::new(BlockTemplate {
            timestamp: 100 + u64::from(height),
            previous_block_hash: parent.map(|p| p.hash()).unwrap_or_default(),
            base_transaction: coinbase(height, amounts),
            ..Default::default()
        })
    }

    fn push(
        cache: &mut SegmentCache,
        block: &CachedBlock,
        state: ValidatorState,
        difficulty: u64,
    ) {
        cache
            .push_block(
                block,
                &[],
                state,
                100,
                50,
                difficulty,
                chain::RawBlock::default(),
                &OutputBaseCounts::default(),
            )
            .unwrap();
    }

    fn build_chain(cache: &mut SegmentCache, count: u32) -> Vec<CachedBlock> {
        let mut blocks: Vec<CachedBlock> = Vec::new();
        for height in 0..count {
            let block = block_at(blocks.last(), height, &[10, 20]);
            push(cache, &block, ValidatorState::default(), 1 + u64::from(height));
            blocks.push(block);
        }
        blocks
    }

    #[test]
    fn push_updates_all_indexes() {
        let mut cache = SegmentCache::new(0, None);
        let blocks = build_chain(&mut cache, 3);

        assert_eq!(cache.block_count(), 3);
        assert_eq!(cache.top_height(), Some(2));
        assert_eq!(cache.block_height(&blocks[1].hash()), Some(1));
        assert_eq!(cache.block_hash_at(2), Some(blocks[2].hash()));

        // cumulative difficulty: 1 + 2 + 3
        assert_eq!(cache.info_at(2).unwrap().cumulative_difficulty, 6);
        // generated coins: 3 * 50
        assert_eq!(cache.info_at(2).unwrap().already_generated_coins, 150);

        // each block minted outputs of amounts 10 and 20
        assert_eq!(cache.key_outputs_total(10), Some(3));
        assert_eq!(cache.key_outputs_total(20), Some(3));
        assert_eq!(cache.key_outputs_total(30), None);
    }

    #[test]
    fn duplicate_key_image_is_rejected() {
        let mut cache = SegmentCache::new(0, None);
        let blocks = build_chain(&mut cache, 2);

        let image = crypto::KeyImage([9; 32]);
        let mut state = ValidatorState::default();
        state.spent_key_images.insert(image);

        let b2 = block_at(Some(&blocks[1]), 2, &[10]);
        push(&mut cache, &b2, state.clone(), 1);

        let b3 = block_at(Some(&b2), 3, &[10]);
        let result = cache.push_block(
            &b3,
            &[],
            state,
            100,
            50,
            1,
            chain::RawBlock::default(),
            &OutputBaseCounts::default(),
        );
        assert!(matches!(result, Err(Error::DuplicateSpentEntry)));
        // failed push leaves the cache untouched
        assert_eq!(cache.top_height(), Some(2));
    }

    #[test]
    fn wrong_parent_is_rejected() {
        let mut cache = SegmentCache::new(0, None);
        let blocks = build_chain(&mut cache, 2);

        let stray = block_at(Some(&blocks[0]), 2, &[10]);
        let result = cache.push_block(
            &stray,
            &[],
            ValidatorState::default(),
            100,
            50,
            1,
            chain::RawBlock::default(),
            &OutputBaseCounts::default(),
        );
        assert!(matches!(result, Err(Error::InvalidPushHeight)));
    }

    #[test]
    fn global_indexes_are_assigned_in_order() {
        let mut cache = SegmentCache::new(0, None);
        let blocks = build_chain(&mut cache, 2);

        let coinbase_hash_0 = cache.block_transaction_hashes(0).unwrap()[0];
        let info = cache.transaction_info(&coinbase_hash_0).unwrap();
        assert_eq!(info.global_indexes, vec![0, 0]);

        let coinbase_hash_1 = cache.block_transaction_hashes(1).unwrap()[0];
        let info = cache.transaction_info(&coinbase_hash_1).unwrap();
        assert_eq!(info.global_indexes, vec![1, 1]);
        drop(blocks);
    }

    #[test]
    fn split_then_reassemble_preserves_state() {
        let mut cache = SegmentCache::new(0, None);
        build_chain(&mut cache, 5);

        let full_outputs_10 = cache.key_outputs_total(10);
        let full_top = cache.top_height();

        let upper = cache.split(3);
        assert_eq!(cache.top_height(), Some(2));
        assert_eq!(upper.start_height(), 3);
        assert_eq!(upper.top_height(), Some(4));
        assert_eq!(upper.parent_base().unwrap().block_hash, cache.block_hash_at(2).unwrap());

        // numbering continues across the split
        assert_eq!(cache.key_outputs_total(10), Some(3));
        assert_eq!(upper.key_outputs_total(10), full_outputs_10);

        // both halves answer queries for their own heights only
        assert!(cache.info_at(3).is_none());
        assert!(upper.info_at(2).is_none());
        assert_eq!(full_top, Some(4));

        // the upper half keeps the push history needed for a later merge
        assert!(upper.pushed_info(3).is_some());
        assert!(upper.pushed_info(4).is_some());
        assert!(cache.pushed_info(3).is_none());
    }

    #[test]
    fn split_partitions_spent_sets() {
        let mut cache = SegmentCache::new(0, None);
        let blocks = build_chain(&mut cache, 2);

        let early = crypto::KeyImage([1; 32]);
        let late = crypto::KeyImage([2; 32]);

        let mut state = ValidatorState::default();
        state.spent_key_images.insert(early);
        let b2 = block_at(Some(&blocks[1]), 2, &[10]);
        push(&mut cache, &b2, state, 1);

        let mut state = ValidatorState::default();
        state.spent_key_images.insert(late);
        let b3 = block_at(Some(&b2), 3, &[10]);
        push(&mut cache, &b3, state, 1);

        let upper = cache.split(3);
        assert_eq!(cache.key_image_spent_height(&early), Some(2));
        assert_eq!(cache.key_image_spent_height(&late), None);
        assert_eq!(upper.key_image_spent_height(&late), Some(3));
        assert_eq!(upper.key_image_spent_height(&early), None);
    }

    #[test]
    fn output_lookup_respects_height_bound() {
        let mut cache = SegmentCache::new(0, None);
        build_chain(&mut cache, 3);

        // amount 10 got one output per block, global indexes 0..=2
        assert!(matches!(
            cache.key_output_lookup(10, 2, 2),
            OutputLookup::Found(_)
        ));
        // an output minted at height 2 is invisible when validating at 1
        assert_eq!(cache.key_output_lookup(10, 2, 1), OutputLookup::Missing);
        assert_eq!(cache.key_output_lookup(10, 5, 2), OutputLookup::Missing);
        assert_eq!(cache.key_outputs_count_limited(10, 1), Some(2));
    }
}
