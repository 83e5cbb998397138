use crate::miner_address;
use chain::{BlockTemplate, CachedBlock, CachedTransaction, RawBlock, Transaction};
use crypto::check_hash;
use network::{Currency, UpgradeManager};
use primitives::H256;
use ser::{serialize, serialized_size};

/// A block the builder has produced, together with the chain state needed to
/// extend it.
pub struct BuiltBlock {
    pub cached: CachedBlock,
    pub raw: RawBlock,
    pub parent: Option<usize>,
    pub height: u32,
    pub timestamp: u64,
    pub difficulty: u64,
    pub cumulative_difficulty: u64,
    pub generated_coins: u64,
    pub block_size: u64,
}

/// Grows a tree of fully valid blocks. Block 0 is always the currency's
/// genesis; every other block is identified by the index `generate_*`
/// returned, so forks are built by naming an older parent.
pub struct ChainBuilder {
    currency: Currency,
    upgrades: UpgradeManager,
    blocks: Vec<BuiltBlock>,
}

impl ChainBuilder {
    pub fn new(currency: Currency) -> ChainBuilder {
        let upgrades = UpgradeManager::for_currency(&currency);
        let genesis_template = currency.genesis_block().clone();
        let genesis_size = serialized_size(&genesis_template.base_transaction) as u64;
        let (_, emission) = currency
            .block_reward(1, 0, 0, 0, 0)
            .expect("genesis reward always computes");
        let raw = RawBlock {
            block: serialize(&genesis_template),
            transactions: Vec::new(),
        };
        let timestamp = genesis_template.timestamp;

        ChainBuilder {
            currency,
            upgrades,
            blocks: vec![BuiltBlock {
                cached: CachedBlock::new(genesis_template),
                raw,
                parent: None,
                height: 0,
                timestamp,
                difficulty: 1,
                cumulative_difficulty: 1,
                generated_coins: emission as u64,
                block_size: genesis_size,
            }],
        }
    }

    pub fn currency(&self) -> &Currency {
        &self.currency
    }

    pub fn block(&self, id: usize) -> &BuiltBlock {
        &self.blocks[id]
    }

    pub fn raw(&self, id: usize) -> RawBlock {
        self.blocks[id].raw.clone()
    }

    pub fn hash(&self, id: usize) -> H256 {
        self.blocks[id].cached.hash()
    }

    pub fn tip(&self) -> usize {
        self.blocks.len() - 1
    }

    /// Ids from genesis to `id` along parent links.
    pub fn path(&self, id: usize) -> Vec<usize> {
        let mut path = Vec::new();
        let mut current = Some(id);
        while let Some(block) = current {
            path.push(block);
            current = self.blocks[block].parent;
        }
        path.reverse();
        path
    }

    /// Raw blocks of the path to `id`, genesis first.
    pub fn raw_path(&self, id: usize) -> Vec<RawBlock> {
        self.path(id)
            .into_iter()
            .map(|block| self.blocks[block].raw.clone())
            .collect()
    }

    fn last_window<F>(&self, parent: usize, count: usize, skip_genesis: bool, f: F) -> Vec<u64>
    where
        F: Fn(&BuiltBlock) -> u64,
    {
        let mut path = self.path(parent);
        if skip_genesis {
            path.retain(|id| self.blocks[*id].height > 0);
        }
        let skip = path.len().saturating_sub(count);
        path.into_iter()
            .skip(skip)
            .map(|id| f(&self.blocks[id]))
            .collect()
    }

    fn difficulty_for_next(&self, parent: usize) -> u64 {
        let count = std::cmp::min(
            self.blocks[parent].height as usize,
            self.currency.difficulty_blocks_count(),
        );
        let timestamps = self.last_window(parent, count, true, |block| block.timestamp);
        let difficulties =
            self.last_window(parent, count, true, |block| block.cumulative_difficulty);
        self.currency.next_difficulty(timestamps, difficulties)
    }

    fn median_size(&self, parent: usize) -> usize {
        let mut sizes = self.last_window(
            parent,
            self.currency.reward_blocks_window(),
            false,
            |block| block.block_size,
        );
        if sizes.is_empty() {
            return 0;
        }
        sizes.sort_unstable();
        let middle = sizes.len() / 2;
        let median = if sizes.len() % 2 == 1 {
            sizes[middle]
        } else {
            (sizes[middle - 1] + sizes[middle]) / 2
        };
        median as usize
    }

    pub fn generate_block(&mut self) -> usize {
        self.generate_block_on(self.tip())
    }

    pub fn generate_block_on(&mut self, parent: usize) -> usize {
        let timestamp = self.blocks[parent].timestamp + self.currency.difficulty_target();
        self.generate_block_at(parent, Vec::new(), timestamp)
    }

    /// Builds, rewards and mines a valid block with the given transactions
    /// on top of `parent`.
    pub fn generate_block_at(
        &mut self,
        parent: usize,
        transactions: Vec<Transaction>,
        timestamp: u64,
    ) -> usize {
        let parent_block = &self.blocks[parent];
        let height = parent_block.height + 1;
        let previous_block_hash = parent_block.cached.hash();
        let generated_coins = parent_block.generated_coins;
        let parent_id = parent;

        let cached_transactions: Vec<CachedTransaction> = transactions
            .iter()
            .cloned()
            .map(CachedTransaction::new)
            .collect();
        let fee: u64 = cached_transactions.iter().map(|tx| tx.fee()).sum();
        let transactions_size: u64 = cached_transactions.iter().map(|tx| tx.size() as u64).sum();

        let major_version = self.upgrades.block_major_version_at(height);
        let median_size = self.median_size(parent);
        let difficulty = self.difficulty_for_next(parent);
        assert!(difficulty > 0, "test chains never outgrow the retarget");

        // sizes in tests stay below the full reward zone, so the reward does
        // not depend on the final block size and one pass suffices
        let base_transaction = self
            .currency
            .construct_miner_tx(
                major_version,
                height,
                median_size,
                generated_coins,
                0,
                fee,
                &miner_address(),
                &[],
            )
            .expect("test blocks stay below the reward zone");

        let block_size = serialized_size(&base_transaction) as u64 + transactions_size;
        let (_, emission_change) = self
            .currency
            .block_reward(major_version, median_size, block_size as usize, generated_coins, fee)
            .expect("test blocks stay below the reward zone");

        let mut template = BlockTemplate {
            major_version,
            minor_version: 0,
            timestamp,
            previous_block_hash,
            nonce: 0,
            parent_block: if major_version >= 2 {
                Some(Default::default())
            } else {
                None
            },
            base_transaction,
            transaction_hashes: cached_transactions.iter().map(|tx| tx.hash()).collect(),
        };

        // mine: bump the nonce until the work hash meets the difficulty
        let cached = loop {
            let candidate = CachedBlock::new(template.clone());
            if check_hash(&candidate.proof_of_work(), difficulty) {
                break candidate;
            }
            template.nonce += 1;
        };

        let raw = RawBlock {
            block: serialize(cached.block()),
            transactions: cached_transactions
                .iter()
                .map(|tx| tx.binary().clone())
                .collect(),
        };

        self.blocks.push(BuiltBlock {
            raw,
            parent: Some(parent_id),
            height,
            timestamp,
            difficulty,
            cumulative_difficulty: self.blocks[parent_id].cumulative_difficulty + difficulty,
            generated_coins: (self.blocks[parent_id].generated_coins as i128
                + emission_change as i128) as u64,
            block_size,
            cached,
        });
        self.blocks.len() - 1
    }

    /// Global index the output `(block, tx_index, output_index)` gets on the
    /// chain ending at `tip`, mirroring the cache's `(height, tx, out)`
    /// assignment order.
    pub fn global_index_of(
        &self,
        tip: usize,
        block: usize,
        transaction_index: usize,
        output_index: usize,
    ) -> u32 {
        let target_amount = self.output_amount(block, transaction_index, output_index);
        let mut count = 0u32;
        for id in self.path(tip) {
            let built = &self.blocks[id];
            let transactions: Vec<Transaction> = std::iter::once(
                built.cached.block().base_transaction.clone(),
            )
            .chain(built.raw.transactions.iter().map(|blob| {
                ser::deserialize::<Transaction>(blob).expect("builder blobs round-trip")
            }))
            .collect();

            for (tx_index, transaction) in transactions.iter().enumerate() {
                for (out_index, output) in transaction.outputs.iter().enumerate() {
                    if output.amount != target_amount {
                        continue;
                    }
                    if !matches!(
                        output.target,
                        chain::TransactionOutputTarget::Key(_)
                    ) {
                        continue;
                    }
                    if id == block && tx_index == transaction_index && out_index == output_index
                    {
                        return count;
                    }
                    count += 1;
                }
            }
        }
        panic!("output not found on the chain to the given tip");
    }

    pub fn output_amount(
        &self,
        block: usize,
        transaction_index: usize,
        output_index: usize,
    ) -> u64 {
        let built = &self.blocks[block];
        let transaction = if transaction_index == 0 {
            built.cached.block().base_transaction.clone()
        } else {
            ser::deserialize::<Transaction>(&built.raw.transactions[transaction_index - 1])
                .expect("builder blobs round-trip")
        };
        transaction.outputs[output_index].amount
    }
}

#[cfg(test)]
mod tests {
    use super::ChainBuilder;
    use crate::test_currency;

    #[test]
    fn builds_linked_chain() {
        let mut builder = ChainBuilder::new(test_currency());
        let b1 = builder.generate_block();
        let b2 = builder.generate_block();

        assert_eq!(builder.block(b1).height, 1);
        assert_eq!(builder.block(b2).height, 2);
        assert_eq!(
            builder.block(b2).cached.block().previous_block_hash,
            builder.hash(b1)
        );
        assert_eq!(builder.path(b2), vec![0, b1, b2]);
    }

    #[test]
    fn forks_share_prefixes() {
        let mut builder = ChainBuilder::new(test_currency());
        let b1 = builder.generate_block();
        let b2 = builder.generate_block();
        let fork = builder.generate_block_on(b1);

        assert_eq!(builder.block(fork).height, 2);
        assert_ne!(builder.hash(fork), builder.hash(b2));
        assert_eq!(builder.path(fork), vec![0, b1, fork]);
    }

    #[test]
    fn global_indexes_are_stable_under_growth() {
        let mut builder = ChainBuilder::new(test_currency());
        let b1 = builder.generate_block();
        let b2 = builder.generate_block();

        let outputs_in_b1 = builder.block(b1).cached.block().base_transaction.outputs.len();
        assert!(outputs_in_b1 > 0);

        // numbering is append-only: extending the chain never renumbers an
        // already assigned output
        for index in 0..outputs_in_b1 {
            let at_b1 = builder.global_index_of(b1, b1, 0, index);
            let at_b2 = builder.global_index_of(b2, b1, 0, index);
            assert_eq!(at_b1, at_b2);
        }
    }
}
