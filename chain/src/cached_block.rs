use crate::block::BlockTemplate;
use crate::transaction::TransactionInput;
use crypto::{fast_hash, pow_hash, tree_hash};
use once_cell::sync::OnceCell;
use primitives::{Bytes, H256};
use ser::{deserialize, serialize, serialized_size, Error as SerError, Stream};

/// A block template with lazily memoized derivatives: binary encoding, the
/// hashing blob, the block hash and the proof-of-work hash.
#[derive(Debug, Clone)]
pub struct CachedBlock {
    block: BlockTemplate,
    block_binary: OnceCell<Bytes>,
    hashing_blob: OnceCell<Bytes>,
    block_hash: OnceCell<H256>,
    proof_of_work: OnceCell<H256>,
}

impl CachedBlock {
    pub fn new(block: BlockTemplate) -> Self {
        CachedBlock {
            block,
            block_binary: OnceCell::new(),
            hashing_blob: OnceCell::new(),
            block_hash: OnceCell::new(),
            proof_of_work: OnceCell::new(),
        }
    }

    pub fn from_binary(binary: &[u8]) -> Result<Self, SerError> {
        let block = deserialize::<BlockTemplate>(binary)?;
        let cached = CachedBlock::new(block);
        let _ = cached.block_binary.set(binary.into());
        Ok(cached)
    }

    pub fn block(&self) -> &BlockTemplate {
        &self.block
    }

    /// Height encoded in the coinbase input, zero if malformed.
    pub fn height(&self) -> u32 {
        match self.block.base_transaction.inputs.first() {
            Some(TransactionInput::Coinbase { height }) => *height,
            _ => 0,
        }
    }

    pub fn block_binary(&self) -> &Bytes {
        self.block_binary.get_or_init(|| serialize(&self.block))
    }

    /// Header fields, the tree hash over coinbase + included transaction
    /// hashes, and the total transaction count. Both the identity hash and
    /// the work hash are computed over this blob.
    pub fn hashing_blob(&self) -> &Bytes {
        self.hashing_blob.get_or_init(|| {
            let mut stream = Stream::new();
            stream.append(&self.block.major_version);
            stream.append(&self.block.minor_version);
            stream.append(&self.block.timestamp);
            stream.append(&self.block.previous_block_hash);
            stream.append(&self.block.nonce);

            let mut hashes = Vec::with_capacity(self.block.transaction_hashes.len() + 1);
            hashes.push(fast_hash(&serialize(&self.block.base_transaction)));
            hashes.extend_from_slice(&self.block.transaction_hashes);
            stream.append(&tree_hash(&hashes));
            stream.append(&(hashes.len() as u64));

            stream.out()
        })
    }

    pub fn hash(&self) -> H256 {
        *self
            .block_hash
            .get_or_init(|| fast_hash(self.hashing_blob()))
    }

    pub fn proof_of_work(&self) -> H256 {
        *self
            .proof_of_work
            .get_or_init(|| pow_hash(self.hashing_blob()))
    }

    pub fn coinbase_binary_size(&self) -> usize {
        serialized_size(&self.block.base_transaction)
    }

    pub fn parent_block_binary_size(&self) -> usize {
        match &self.block.parent_block {
            Some(parent) => serialized_size(parent),
            None => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::CachedBlock;
    use crate::block::BlockTemplate;
    use crate::transaction::{Transaction, TransactionInput};
    use ser::serialize;

    fn block_at(height: u32) -> BlockTemplate {
        BlockTemplate {
            base_transaction: Transaction {
                inputs: vec![TransactionInput::Coinbase { height }],
                signatures: vec![vec![]],
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn hash_is_stable() {
        let cached = CachedBlock::new(block_at(3));
        assert_eq!(cached.hash(), cached.hash());
        assert_eq!(cached.height(), 3);
    }

    #[test]
    fn nonce_changes_both_hashes() {
        let mut block = block_at(3);
        let a = CachedBlock::new(block.clone());
        block.nonce = 1;
        let b = CachedBlock::new(block);
        assert_ne!(a.hash(), b.hash());
        assert_ne!(a.proof_of_work(), b.proof_of_work());
    }

    #[test]
    fn binary_matches_serialization() {
        let block = block_at(1);
        let bytes = serialize(&block);
        let cached = CachedBlock::from_binary(&bytes).unwrap();
        assert_eq!(cached.block_binary(), &bytes);
        assert_eq!(cached.block(), &block);
    }
}
