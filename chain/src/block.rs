use crate::constants::BLOCK_MAJOR_VERSION_2;
use crate::transaction::Transaction;
use primitives::H256;
use ser::{Deserializable, Error as SerError, Reader, Serializable, Stream};

/// Merge-mining stub carried by blocks of major version 2 and above.
#[derive(Debug, Clone, PartialEq)]
pub struct ParentBlock {
    pub major_version: u8,
    pub minor_version: u8,
    pub previous_block_hash: H256,
    pub transaction_count: u16,
    pub base_transaction: Transaction,
}

impl Default for ParentBlock {
    fn default() -> Self {
        ParentBlock {
            major_version: 1,
            minor_version: 0,
            previous_block_hash: H256::default(),
            transaction_count: 1,
            base_transaction: Transaction::default(),
        }
    }
}

/// Parsed block header plus coinbase and the hashes of included
/// transactions. The serialized form of this structure is the first blob of
/// a `RawBlock`.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockTemplate {
    pub major_version: u8,
    pub minor_version: u8,
    pub timestamp: u64,
    pub previous_block_hash: H256,
    pub nonce: u32,
    /// Present exactly when `major_version >= 2`.
    pub parent_block: Option<ParentBlock>,
    pub base_transaction: Transaction,
    pub transaction_hashes: Vec<H256>,
}

impl Default for BlockTemplate {
    fn default() -> Self {
        BlockTemplate {
            major_version: 1,
            minor_version: 0,
            timestamp: 0,
            previous_block_hash: H256::default(),
            nonce: 0,
            parent_block: None,
            base_transaction: Transaction::default(),
            transaction_hashes: Vec::new(),
        }
    }
}

impl Serializable for ParentBlock {
    fn serialize(&self, stream: &mut Stream) {
        stream.append(&self.major_version);
        stream.append(&self.minor_version);
        stream.append(&self.previous_block_hash);
        stream.append(&self.transaction_count);
        stream.append(&self.base_transaction);
    }
}

impl Deserializable for ParentBlock {
    fn deserialize(reader: &mut Reader) -> Result<Self, SerError> {
        Ok(ParentBlock {
            major_version: reader.read()?,
            minor_version: reader.read()?,
            previous_block_hash: reader.read()?,
            transaction_count: reader.read()?,
            base_transaction: reader.read()?,
        })
    }
}

impl Serializable for BlockTemplate {
    fn serialize(&self, stream: &mut Stream) {
        stream.append(&self.major_version);
        stream.append(&self.minor_version);
        stream.append(&self.timestamp);
        stream.append(&self.previous_block_hash);
        stream.append(&self.nonce);
        if self.major_version >= BLOCK_MAJOR_VERSION_2 {
            let parent = self
                .parent_block
                .as_ref()
                .expect("versioned blocks always carry a parent block; qed");
            stream.append(parent);
        }
        stream.append(&self.base_transaction);
        stream.append_list(&self.transaction_hashes);
    }
}

impl Deserializable for BlockTemplate {
    fn deserialize(reader: &mut Reader) -> Result<Self, SerError> {
        let major_version = reader.read()?;
        let minor_version = reader.read()?;
        let timestamp = reader.read()?;
        let previous_block_hash = reader.read()?;
        let nonce = reader.read()?;
        let parent_block = if major_version >= BLOCK_MAJOR_VERSION_2 {
            Some(reader.read()?)
        } else {
            None
        };

        Ok(BlockTemplate {
            major_version,
            minor_version,
            timestamp,
            previous_block_hash,
            nonce,
            parent_block,
            base_transaction: reader.read()?,
            transaction_hashes: reader.read_list()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::TransactionInput;
    use ser::{deserialize, serialize};

    #[test]
    fn v1_block_round_trip() {
        let block = BlockTemplate {
            timestamp: 1000,
            previous_block_hash: H256::from(9u8),
            nonce: 77,
            base_transaction: Transaction {
                inputs: vec![TransactionInput::Coinbase { height: 5 }],
                signatures: vec![vec![]],
                ..Default::default()
            },
            transaction_hashes: vec![H256::from(3u8)],
            ..Default::default()
        };

        let bytes = serialize(&block);
        assert_eq!(deserialize::<BlockTemplate>(&bytes).unwrap(), block);
    }

    #[test]
    fn v2_block_round_trip() {
        let block = BlockTemplate {
            major_version: 2,
            parent_block: Some(ParentBlock::default()),
            base_transaction: Transaction {
                inputs: vec![TransactionInput::Coinbase { height: 1 }],
                signatures: vec![vec![]],
                ..Default::default()
            },
            ..Default::default()
        };

        let bytes = serialize(&block);
        assert_eq!(deserialize::<BlockTemplate>(&bytes).unwrap(), block);
    }
}
