//! Consensus arithmetic: emission, rewards, difficulty, size limits and the
//! fusion-transaction predicate. Everything here is deterministic; any
//! divergence forks the network.

use chain::constants::{BLOCK_MAJOR_VERSION_1, BLOCK_MAJOR_VERSION_2};
use chain::{
    append_extra_field, AccountPublicAddress, BlockTemplate, ExtraField, KeyOutput, Transaction,
    TransactionInput, TransactionOutput, TransactionOutputTarget,
};
use crypto::derive_output_key;
use once_cell::sync::OnceCell;
use primitives::H256;
use ser::serialized_size;

#[derive(Debug, Clone)]
pub struct Currency {
    money_supply: u64,
    emission_speed_factor: u8,
    difficulty_target: u64,
    difficulty_window: usize,
    difficulty_cut: usize,
    difficulty_lag: usize,
    timestamp_check_window: usize,
    block_future_time_limit: u64,
    mined_money_unlock_window: u32,
    reward_blocks_window: usize,
    full_reward_zone_v1: usize,
    full_reward_zone: usize,
    coinbase_blob_reserved_size: usize,
    max_block_size_initial: usize,
    max_block_size_growth_numerator: u64,
    max_block_size_growth_denominator: u64,
    max_transaction_size: usize,
    minimum_fee: u64,
    default_dust_threshold: u64,
    fusion_tx_max_size: usize,
    fusion_tx_min_input_count: usize,
    fusion_tx_min_in_out_count_ratio: usize,
    locked_tx_allowed_delta_blocks: u32,
    locked_tx_allowed_delta_seconds: u64,
    mempool_tx_live_time: u64,
    upgrade_height_v2: Option<u32>,
    upgrade_height_v3: Option<u32>,
    genesis_timestamp: u64,
    genesis: OnceCell<BlockTemplate>,
}

impl Currency {
    pub fn money_supply(&self) -> u64 {
        self.money_supply
    }

    pub fn difficulty_target(&self) -> u64 {
        self.difficulty_target
    }

    pub fn difficulty_window(&self) -> usize {
        self.difficulty_window
    }

    /// Number of trailing blocks the retarget consumes: the window plus the
    /// lag blocks that are dropped again before the computation.
    pub fn difficulty_blocks_count(&self) -> usize {
        self.difficulty_window + self.difficulty_lag
    }

    pub fn timestamp_check_window(&self) -> usize {
        self.timestamp_check_window
    }

    pub fn block_future_time_limit(&self) -> u64 {
        self.block_future_time_limit
    }

    pub fn mined_money_unlock_window(&self) -> u32 {
        self.mined_money_unlock_window
    }

    pub fn reward_blocks_window(&self) -> usize {
        self.reward_blocks_window
    }

    pub fn coinbase_blob_reserved_size(&self) -> usize {
        self.coinbase_blob_reserved_size
    }

    pub fn max_transaction_size(&self) -> usize {
        self.max_transaction_size
    }

    pub fn minimum_fee(&self) -> u64 {
        self.minimum_fee
    }

    pub fn default_dust_threshold(&self) -> u64 {
        self.default_dust_threshold
    }

    pub fn fusion_tx_max_size(&self) -> usize {
        self.fusion_tx_max_size
    }

    pub fn locked_tx_allowed_delta_blocks(&self) -> u32 {
        self.locked_tx_allowed_delta_blocks
    }

    pub fn locked_tx_allowed_delta_seconds(&self) -> u64 {
        self.locked_tx_allowed_delta_seconds
    }

    pub fn mempool_tx_live_time(&self) -> u64 {
        self.mempool_tx_live_time
    }

    pub fn upgrade_height(&self, major_version: u8) -> Option<u32> {
        match major_version {
            2 => self.upgrade_height_v2,
            3 => self.upgrade_height_v3,
            _ => None,
        }
    }

    pub fn full_reward_zone_by_version(&self, major_version: u8) -> usize {
        if major_version == BLOCK_MAJOR_VERSION_1 {
            self.full_reward_zone_v1
        } else {
            self.full_reward_zone
        }
    }

    /// Hard cap on a block's cumulative size, growing linearly with height.
    pub fn max_block_cumulative_size(&self, height: u32) -> usize {
        let growth = u64::from(height) * self.max_block_size_growth_numerator
            / self.max_block_size_growth_denominator;
        self.max_block_size_initial + growth as usize
    }

    /// Pool admission cap derived from the current median.
    pub fn max_transaction_allowed_size(&self, block_median_size: usize) -> usize {
        debug_assert!(block_median_size * 2 > self.coinbase_blob_reserved_size);
        block_median_size * 2 - self.coinbase_blob_reserved_size
    }

    fn base_reward(&self, already_generated_coins: u64) -> u64 {
        (self.money_supply - already_generated_coins) >> self.emission_speed_factor
    }

    fn penalized_amount(amount: u64, median_size: usize, block_size: usize) -> u64 {
        assert!(block_size <= 2 * median_size);
        if block_size <= median_size {
            return amount;
        }

        let median = median_size as u128;
        let size = block_size as u128;
        let product = u128::from(amount) * (size * (2 * median - size));
        (product / (median * median)) as u64
    }

    /// Coinbase reward and emission delta for a block of `current_block_size`
    /// against the recent `median_size`. `None` when the block is more than
    /// twice the effective median.
    pub fn block_reward(
        &self,
        major_version: u8,
        median_size: usize,
        current_block_size: usize,
        already_generated_coins: u64,
        fee: u64,
    ) -> Option<(u64, i64)> {
        let base = self.base_reward(already_generated_coins);
        let median = std::cmp::max(
            median_size,
            self.full_reward_zone_by_version(major_version),
        );
        if current_block_size > 2 * median {
            debug!(target: "currency", "block size {} exceeds twice the median {}", current_block_size, median);
            return None;
        }

        let penalized_base = Self::penalized_amount(base, median, current_block_size);
        let penalized_fee = if major_version >= BLOCK_MAJOR_VERSION_2 {
            Self::penalized_amount(fee, median, current_block_size)
        } else {
            fee
        };

        let reward = penalized_base + penalized_fee;
        let emission_change = penalized_base as i64 - (fee - penalized_fee) as i64;
        Some((reward, emission_change))
    }

    /// Next-block difficulty from ascending per-height timestamps and
    /// cumulative difficulties (up to `difficulty_blocks_count` of each).
    /// Returns 0 on arithmetic overflow, otherwise at least 1.
    pub fn next_difficulty(
        &self,
        mut timestamps: Vec<u64>,
        mut cumulative_difficulties: Vec<u64>,
    ) -> u64 {
        assert_eq!(timestamps.len(), cumulative_difficulties.len());

        // the lag excludes the newest blocks from the window
        if timestamps.len() > self.difficulty_window {
            timestamps.truncate(self.difficulty_window);
            cumulative_difficulties.truncate(self.difficulty_window);
        }

        let length = timestamps.len();
        if length <= 1 {
            return 1;
        }

        timestamps.sort_unstable();

        let stable_span = self.difficulty_window - 2 * self.difficulty_cut;
        let (cut_begin, cut_end) = if length <= stable_span {
            (0, length)
        } else {
            let cut_begin = (length - stable_span + 1) / 2;
            (cut_begin, cut_begin + stable_span)
        };

        let mut time_span = timestamps[cut_end - 1] - timestamps[cut_begin];
        if time_span == 0 {
            time_span = 1;
        }

        let total_work =
            cumulative_difficulties[cut_end - 1] - cumulative_difficulties[cut_begin];
        let work = u128::from(total_work) * u128::from(self.difficulty_target);
        let next = (work + u128::from(time_span) - 1) / u128::from(time_span);
        if next > u128::from(u64::max_value()) {
            return 0;
        }

        std::cmp::max(next as u64, 1)
    }

    /// True when `amount` is a single decimal digit times a power of ten.
    pub fn is_pretty_amount(amount: u64) -> bool {
        if amount == 0 {
            return false;
        }
        let mut amount = amount;
        while amount % 10 == 0 {
            amount /= 10;
        }
        amount < 10
    }

    fn is_amount_applicable_in_fusion_input(&self, amount: u64) -> bool {
        amount > self.default_dust_threshold && Self::is_pretty_amount(amount)
    }

    /// Splits `amount` into denominations: dust below the threshold is fused
    /// into a single leading piece, the rest are digit-times-power-of-ten
    /// chunks in increasing order.
    pub fn decompose_amount(&self, amount: u64) -> Vec<u64> {
        let mut chunks = Vec::new();
        let mut dust = 0u64;
        let mut order = 1u64;
        let mut rest = amount;
        while rest != 0 {
            let digit = rest % 10;
            rest /= 10;
            let piece = digit * order;
            order = order.saturating_mul(10);
            if piece == 0 {
                continue;
            }
            if piece < self.default_dust_threshold {
                dust += piece;
            } else {
                chunks.push(piece);
            }
        }

        let mut result = Vec::with_capacity(chunks.len() + 1);
        if dust != 0 {
            result.push(dust);
        }
        result.extend(chunks);
        result
    }

    /// A fusion transaction consolidates many decomposed inputs into few
    /// decomposed outputs for no fee; the predicate is what exempts it from
    /// the fee floor.
    pub fn is_fusion_transaction(&self, transaction: &Transaction, size: usize) -> bool {
        if size > self.fusion_tx_max_size {
            return false;
        }
        if transaction.inputs.len() < self.fusion_tx_min_input_count {
            return false;
        }
        if transaction.inputs.len()
            < transaction.outputs.len() * self.fusion_tx_min_in_out_count_ratio
        {
            return false;
        }

        let mut input_amount = 0u64;
        for input in &transaction.inputs {
            let amount = input.amount();
            if !self.is_amount_applicable_in_fusion_input(amount) {
                return false;
            }
            input_amount = match input_amount.checked_add(amount) {
                Some(sum) => sum,
                None => return false,
            };
        }

        let mut expected = self.decompose_amount(input_amount);
        expected.sort_unstable();
        let mut actual: Vec<u64> = transaction
            .outputs
            .iter()
            .map(|output| output.amount)
            .collect();
        actual.sort_unstable();

        expected == actual
    }

    /// Builds the coinbase transaction for a new block. The reward depends on
    /// `current_block_size`, which in turn depends on the coinbase size; the
    /// caller iterates this to a fixed point.
    pub fn construct_miner_tx(
        &self,
        major_version: u8,
        height: u32,
        median_size: usize,
        already_generated_coins: u64,
        current_block_size: usize,
        fee: u64,
        miner_address: &AccountPublicAddress,
        extra_nonce: &[u8],
    ) -> Option<Transaction> {
        let (reward, _) = self.block_reward(
            major_version,
            median_size,
            current_block_size,
            already_generated_coins,
            fee,
        )?;

        let mut extra = primitives::Bytes::new();
        let tx_public_key =
            derive_output_key(&miner_address.view_public_key, u64::from(height), u64::max_value());
        append_extra_field(&mut extra, &ExtraField::TxPublicKey(tx_public_key));
        if !extra_nonce.is_empty() {
            if extra_nonce.len() > 255 {
                return None;
            }
            append_extra_field(&mut extra, &ExtraField::Nonce(extra_nonce.to_vec()));
        }

        let outputs = self
            .decompose_amount(reward)
            .into_iter()
            .enumerate()
            .map(|(index, amount)| TransactionOutput {
                amount,
                target: TransactionOutputTarget::Key(KeyOutput {
                    key: derive_output_key(
                        &miner_address.spend_public_key,
                        u64::from(height),
                        index as u64,
                    ),
                }),
            })
            .collect();

        Some(Transaction {
            version: 1,
            unlock_time: u64::from(height) + u64::from(self.mined_money_unlock_window),
            inputs: vec![TransactionInput::Coinbase { height }],
            outputs,
            extra,
            signatures: vec![vec![]],
        })
    }

    /// The genesis block is derived from fixed parameters, so every node
    /// computes the same block and hash.
    pub fn genesis_block(&self) -> &BlockTemplate {
        self.genesis.get_or_init(|| {
            let miner_address = AccountPublicAddress::from_seed(b"umbra-genesis");
            let base_transaction = self
                .construct_miner_tx(1, 0, 0, 0, 0, 0, &miner_address, &[])
                .expect("genesis coinbase never hits the size penalty; qed");

            BlockTemplate {
                major_version: 1,
                minor_version: 0,
                timestamp: self.genesis_timestamp,
                previous_block_hash: H256::default(),
                nonce: 70,
                parent_block: None,
                base_transaction,
                transaction_hashes: Vec::new(),
            }
        })
    }

    pub fn genesis_block_hash(&self) -> H256 {
        chain::CachedBlock::new(self.genesis_block().clone()).hash()
    }

    pub fn genesis_coinbase_size(&self) -> usize {
        serialized_size(&self.genesis_block().base_transaction)
    }
}

pub struct CurrencyBuilder {
    currency: Currency,
}

impl Default for CurrencyBuilder {
    fn default() -> Self {
        CurrencyBuilder {
            currency: Currency {
                money_supply: u64::max_value(),
                emission_speed_factor: 18,
                difficulty_target: 120,
                difficulty_window: 720,
                difficulty_cut: 60,
                difficulty_lag: 15,
                timestamp_check_window: 60,
                block_future_time_limit: 60 * 60 * 2,
                mined_money_unlock_window: 10,
                reward_blocks_window: 100,
                full_reward_zone_v1: 20_000,
                full_reward_zone: 100_000,
                coinbase_blob_reserved_size: 600,
                max_block_size_initial: 100_000,
                max_block_size_growth_numerator: 100 * 1024,
                max_block_size_growth_denominator: 365 * 24 * 60 * 60 / 120,
                max_transaction_size: 1_000_000,
                minimum_fee: 1_000_000,
                default_dust_threshold: 1_000_000,
                fusion_tx_max_size: 30_000,
                fusion_tx_min_input_count: 12,
                fusion_tx_min_in_out_count_ratio: 4,
                locked_tx_allowed_delta_blocks: 1,
                locked_tx_allowed_delta_seconds: 120 * 1,
                mempool_tx_live_time: 60 * 60 * 24,
                upgrade_height_v2: None,
                upgrade_height_v3: None,
                genesis_timestamp: 1_514_764_800,
                genesis: OnceCell::new(),
            },
        }
    }
}

impl CurrencyBuilder {
    pub fn new() -> Self {
        CurrencyBuilder::default()
    }

    pub fn difficulty_target(mut self, target: u64) -> Self {
        self.currency.difficulty_target = target;
        self.currency.locked_tx_allowed_delta_seconds = target;
        self
    }

    pub fn difficulty_window(mut self, window: usize, cut: usize, lag: usize) -> Self {
        self.currency.difficulty_window = window;
        self.currency.difficulty_cut = cut;
        self.currency.difficulty_lag = lag;
        self
    }

    pub fn timestamp_check_window(mut self, window: usize) -> Self {
        self.currency.timestamp_check_window = window;
        self
    }

    pub fn mined_money_unlock_window(mut self, window: u32) -> Self {
        self.currency.mined_money_unlock_window = window;
        self
    }

    pub fn reward_blocks_window(mut self, window: usize) -> Self {
        self.currency.reward_blocks_window = window;
        self
    }

    pub fn minimum_fee(mut self, fee: u64) -> Self {
        self.currency.minimum_fee = fee;
        self
    }

    pub fn default_dust_threshold(mut self, threshold: u64) -> Self {
        self.currency.default_dust_threshold = threshold;
        self
    }

    pub fn fusion_tx_limits(mut self, max_size: usize, min_inputs: usize, ratio: usize) -> Self {
        self.currency.fusion_tx_max_size = max_size;
        self.currency.fusion_tx_min_input_count = min_inputs;
        self.currency.fusion_tx_min_in_out_count_ratio = ratio;
        self
    }

    pub fn mempool_tx_live_time(mut self, seconds: u64) -> Self {
        self.currency.mempool_tx_live_time = seconds;
        self
    }

    pub fn upgrade_heights(mut self, v2: Option<u32>, v3: Option<u32>) -> Self {
        self.currency.upgrade_height_v2 = v2;
        self.currency.upgrade_height_v3 = v3;
        self
    }

    pub fn build(self) -> Currency {
        self.currency
    }
}

#[cfg(test)]
mod tests {
    use super::{Currency, CurrencyBuilder};
    use chain::{KeyInput, Transaction, TransactionInput};

    fn currency() -> Currency {
        CurrencyBuilder::new().build()
    }

    #[test]
    fn base_reward_halves_by_shifting() {
        let currency = currency();
        let first = currency.block_reward(1, 0, 0, 0, 0).unwrap().0;
        assert_eq!(first, u64::max_value() >> 18);

        let later = currency
            .block_reward(1, 0, 0, u64::max_value() / 2, 0)
            .unwrap()
            .0;
        assert!(later < first);
    }

    #[test]
    fn oversized_block_gets_no_reward() {
        let currency = currency();
        // full reward zone v1 is 20_000, twice that is the hard edge
        assert!(currency.block_reward(1, 0, 40_001, 0, 0).is_none());
        assert!(currency.block_reward(1, 0, 40_000, 0, 0).is_some());
    }

    #[test]
    fn penalty_reduces_reward_above_median() {
        let currency = currency();
        let (full, _) = currency.block_reward(1, 0, 20_000, 0, 0).unwrap();
        let (penalized, _) = currency.block_reward(1, 0, 30_000, 0, 0).unwrap();
        assert!(penalized < full);

        // at exactly twice the median the reward vanishes
        let (zero, _) = currency.block_reward(1, 0, 40_000, 0, 0).unwrap();
        assert_eq!(zero, 0);
    }

    #[test]
    fn fee_is_not_penalized_before_v2() {
        let currency = currency();
        let fee = 1_000;
        let (v1_reward, _) = currency.block_reward(1, 0, 30_000, 0, fee).unwrap();
        let (v1_no_fee, _) = currency.block_reward(1, 0, 30_000, 0, 0).unwrap();
        assert_eq!(v1_reward - v1_no_fee, fee);
    }

    #[test]
    fn next_difficulty_is_at_least_one() {
        let currency = CurrencyBuilder::new().difficulty_target(120).build();
        assert_eq!(currency.next_difficulty(vec![], vec![]), 1);
        assert_eq!(currency.next_difficulty(vec![0], vec![1]), 1);

        // a single slow block pair: work 1 over a long span still yields 1
        assert_eq!(currency.next_difficulty(vec![0, 100_000], vec![1, 2]), 1);
    }

    #[test]
    fn next_difficulty_follows_block_rate() {
        let currency = CurrencyBuilder::new()
            .difficulty_target(120)
            .difficulty_window(8, 0, 0)
            .build();

        // blocks exactly on target at difficulty 1 keep difficulty 1
        let timestamps: Vec<u64> = (0..8).map(|i| i * 120).collect();
        let cumulative: Vec<u64> = (1..=8).collect();
        assert_eq!(currency.next_difficulty(timestamps, cumulative), 1);

        // blocks twice as fast double it
        let timestamps: Vec<u64> = (0..8).map(|i| i * 60).collect();
        let cumulative: Vec<u64> = (1..=8).collect();
        assert_eq!(currency.next_difficulty(timestamps, cumulative), 2);
    }

    #[test]
    fn difficulty_cut_trims_outliers() {
        let currency = CurrencyBuilder::new()
            .difficulty_target(120)
            .difficulty_window(6, 1, 0)
            .build();

        // one absurd timestamp at each end is cut away
        let timestamps = vec![0, 120, 240, 360, 480, 1_000_000];
        let cumulative = vec![1, 2, 3, 4, 5, 6];
        let next = currency.next_difficulty(timestamps, cumulative);
        assert!(next >= 1 && next < 10);
    }

    #[test]
    fn pretty_amounts() {
        assert!(Currency::is_pretty_amount(1));
        assert!(Currency::is_pretty_amount(900_000));
        assert!(Currency::is_pretty_amount(7_000_000_000));
        assert!(!Currency::is_pretty_amount(0));
        assert!(!Currency::is_pretty_amount(12));
        assert!(!Currency::is_pretty_amount(1_000_001));
    }

    #[test]
    fn decompose_covers_amount() {
        let currency = CurrencyBuilder::new().default_dust_threshold(1).build();
        let amount = 123_456_789u64;
        let chunks = currency.decompose_amount(amount);
        assert_eq!(chunks.iter().sum::<u64>(), amount);
        assert!(chunks.iter().all(|c| Currency::is_pretty_amount(*c)));
    }

    #[test]
    fn fusion_transaction_predicate() {
        let currency = CurrencyBuilder::new()
            .default_dust_threshold(10)
            .fusion_tx_limits(30_000, 4, 2)
            .build();

        let fusion_inputs = |amounts: &[u64]| -> Vec<TransactionInput> {
            amounts
                .iter()
                .map(|amount| {
                    TransactionInput::Key(KeyInput {
                        amount: *amount,
                        output_offsets: vec![0],
                        key_image: Default::default(),
                    })
                })
                .collect()
        };

        let inputs = fusion_inputs(&[100, 200, 300, 400]);
        let sum: u64 = 1000;
        let outputs = currency
            .decompose_amount(sum)
            .into_iter()
            .map(|amount| chain::TransactionOutput {
                amount,
                target: chain::TransactionOutputTarget::Key(chain::KeyOutput {
                    key: Default::default(),
                }),
            })
            .collect();
        let tx = Transaction {
            inputs,
            outputs,
            ..Default::default()
        };
        assert!(currency.is_fusion_transaction(&tx, 100));

        // too few inputs
        let small = Transaction {
            inputs: fusion_inputs(&[100, 900]),
            ..tx.clone()
        };
        assert!(!currency.is_fusion_transaction(&small, 100));

        // non-decomposed input amount
        let ugly = Transaction {
            inputs: fusion_inputs(&[101, 200, 300, 399]),
            ..tx.clone()
        };
        assert!(!currency.is_fusion_transaction(&ugly, 100));

        // oversized
        assert!(!currency.is_fusion_transaction(&tx, 30_001));
    }

    #[test]
    fn genesis_is_deterministic() {
        let a = currency();
        let b = currency();
        assert_eq!(a.genesis_block_hash(), b.genesis_block_hash());
        assert!(a.genesis_block().base_transaction.is_coinbase());
    }

    #[test]
    fn max_block_size_grows_with_height() {
        let currency = currency();
        assert!(currency.max_block_cumulative_size(0) < currency.max_block_cumulative_size(1_000_000));
    }
}
