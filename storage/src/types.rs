//! Model types shared between the chain caches, the validator and the pool.

use chain::{RawBlock, Transaction, TransactionInput, TransactionOutput};
use crypto::KeyImage;
use primitives::H256;
use ser::{Deserializable, Error as SerError, Reader, Serializable, Stream};
use std::collections::{BTreeSet, HashSet};

/// Working set of spent key images and multisignature output usages
/// accumulated while validating a group of transactions. Merged into the
/// owning chain segment (or the pool state) only after the whole group
/// validated.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ValidatorState {
    pub spent_key_images: HashSet<KeyImage>,
    pub spent_multisignature_outputs: BTreeSet<(u64, u32)>,
}

impl ValidatorState {
    /// Collects the spent set of a single transaction. The transaction is
    /// assumed to be semantically valid, so intra-tx duplicates are a bug.
    pub fn from_transaction(transaction: &Transaction) -> ValidatorState {
        let mut state = ValidatorState::default();
        for input in &transaction.inputs {
            match input {
                TransactionInput::Key(input) => {
                    let inserted = state.spent_key_images.insert(input.key_image);
                    debug_assert!(inserted, "validated transactions have unique key images");
                }
                TransactionInput::Multisignature(input) => {
                    let inserted = state
                        .spent_multisignature_outputs
                        .insert((input.amount, input.output_index));
                    debug_assert!(inserted, "validated transactions have unique output usages");
                }
                TransactionInput::Coinbase { .. } => {}
            }
        }
        state
    }

    pub fn merge(&mut self, other: &ValidatorState) {
        self.spent_key_images.extend(other.spent_key_images.iter());
        self.spent_multisignature_outputs
            .extend(other.spent_multisignature_outputs.iter());
    }

    pub fn intersects(&self, other: &ValidatorState) -> bool {
        self.spent_key_images
            .iter()
            .any(|image| other.spent_key_images.contains(image))
            || self
                .spent_multisignature_outputs
                .iter()
                .any(|usage| other.spent_multisignature_outputs.contains(usage))
    }

    pub fn subtract(&mut self, other: &ValidatorState) {
        for image in &other.spent_key_images {
            self.spent_key_images.remove(image);
        }
        for usage in &other.spent_multisignature_outputs {
            self.spent_multisignature_outputs.remove(usage);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.spent_key_images.is_empty() && self.spent_multisignature_outputs.is_empty()
    }
}

/// Location of an output: `(block_height, tx_index_in_block, output_index_in_tx)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PackedOutputIndex {
    pub block_height: u32,
    pub transaction_index: u16,
    pub output_index: u16,
}

impl PackedOutputIndex {
    pub fn pack(&self) -> u64 {
        (u64::from(self.block_height) << 32)
            | (u64::from(self.transaction_index) << 16)
            | u64::from(self.output_index)
    }

    pub fn unpack(packed: u64) -> PackedOutputIndex {
        PackedOutputIndex {
            block_height: (packed >> 32) as u32,
            transaction_index: ((packed >> 16) & 0xffff) as u16,
            output_index: (packed & 0xffff) as u16,
        }
    }
}

/// Per-block statistics kept by every chain segment.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CachedBlockInfo {
    pub block_hash: H256,
    pub timestamp: u64,
    pub cumulative_difficulty: u64,
    pub already_generated_coins: u64,
    pub already_generated_transactions: u64,
    /// Sum of transaction blob sizes including the coinbase.
    pub block_size: u64,
}

/// Per-transaction record kept by every chain segment.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedTransactionInfo {
    pub block_height: u32,
    pub transaction_index: u16,
    pub unlock_time: u64,
    pub outputs: Vec<TransactionOutput>,
    /// Global index assigned to each output within its amount class.
    pub global_indexes: Vec<u32>,
}

/// Everything needed to replay a block into another segment: the raw block
/// and the values computed when it was first validated.
#[derive(Debug, Clone, PartialEq)]
pub struct PushedBlockInfo {
    pub raw_block: RawBlock,
    pub validator_state: ValidatorState,
    pub block_size: u64,
    pub emission_change: i64,
    pub block_difficulty: u64,
}

fn zigzag_encode(value: i64) -> u64 {
    ((value << 1) ^ (value >> 63)) as u64
}

fn zigzag_decode(value: u64) -> i64 {
    ((value >> 1) as i64) ^ -((value & 1) as i64)
}

impl Serializable for ValidatorState {
    fn serialize(&self, stream: &mut Stream) {
        let mut images: Vec<KeyImage> = self.spent_key_images.iter().cloned().collect();
        images.sort();
        stream.append_list(&images);

        stream.append_varint(self.spent_multisignature_outputs.len() as u64);
        for (amount, index) in &self.spent_multisignature_outputs {
            stream.append(amount);
            stream.append(index);
        }
    }
}

impl Deserializable for ValidatorState {
    fn deserialize(reader: &mut Reader) -> Result<Self, SerError> {
        let images: Vec<KeyImage> = reader.read_list()?;
        let count = reader.read_varint()? as usize;
        if count > reader.remaining() {
            return Err(SerError::OversizedLength);
        }
        let mut usages = BTreeSet::new();
        for _ in 0..count {
            let amount = reader.read()?;
            let index = reader.read()?;
            usages.insert((amount, index));
        }

        Ok(ValidatorState {
            spent_key_images: images.into_iter().collect(),
            spent_multisignature_outputs: usages,
        })
    }
}

impl Serializable for PushedBlockInfo {
    fn serialize(&self, stream: &mut Stream) {
        stream.append(&self.raw_block);
        stream.append(&self.validator_state);
        stream.append(&self.block_size);
        stream.append_varint(zigzag_encode(self.emission_change));
        stream.append(&self.block_difficulty);
    }
}

impl Deserializable for PushedBlockInfo {
    fn deserialize(reader: &mut Reader) -> Result<Self, SerError> {
        Ok(PushedBlockInfo {
            raw_block: reader.read()?,
            validator_state: reader.read()?,
            block_size: reader.read()?,
            emission_change: zigzag_decode(reader.read_varint()?),
            block_difficulty: reader.read()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chain::KeyInput;
    use ser::{deserialize, serialize};

    #[test]
    fn packed_output_index_round_trip() {
        let index = PackedOutputIndex {
            block_height: 100_000,
            transaction_index: 17,
            output_index: 3,
        };
        assert_eq!(PackedOutputIndex::unpack(index.pack()), index);
    }

    #[test]
    fn validator_state_merge_and_intersect() {
        let tx = Transaction {
            inputs: vec![TransactionInput::Key(KeyInput {
                amount: 10,
                output_offsets: vec![0],
                key_image: crypto::KeyImage([7; 32]),
            })],
            ..Default::default()
        };

        let state = ValidatorState::from_transaction(&tx);
        let mut pool = ValidatorState::default();
        assert!(!pool.intersects(&state));
        pool.merge(&state);
        assert!(pool.intersects(&state));
        pool.subtract(&state);
        assert!(pool.is_empty());
    }

    #[test]
    fn pushed_block_info_round_trip() {
        let info = PushedBlockInfo {
            raw_block: RawBlock {
                block: vec![1, 2, 3].into(),
                transactions: vec![vec![4].into()],
            },
            validator_state: ValidatorState {
                spent_key_images: vec![crypto::KeyImage([1; 32])].into_iter().collect(),
                spent_multisignature_outputs: vec![(10, 0)].into_iter().collect(),
            },
            block_size: 500,
            emission_change: -25,
            block_difficulty: 3,
        };

        let bytes = serialize(&info);
        assert_eq!(deserialize::<PushedBlockInfo>(&bytes).unwrap(), info);
    }
}
