//! Chunked responses of the block synchronization queries.

use chain::{RawBlock, Transaction};
use primitives::{Bytes, H256};

/// A block id, optionally accompanied by the full raw block.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockFullInfo {
    pub block_id: H256,
    pub raw_block: Option<RawBlock>,
}

/// Transaction hash plus its prefix (signatures stripped).
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionPrefixInfo {
    pub transaction_hash: H256,
    pub transaction_prefix: Transaction,
}

/// A block id, optionally accompanied by the block blob and the prefixes of
/// its transactions.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockShortInfo {
    pub block_id: H256,
    pub block: Option<Bytes>,
    pub transaction_prefixes: Vec<TransactionPrefixInfo>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryBlocksResult {
    pub start_height: u32,
    pub current_height: u32,
    pub full_offset: u32,
    pub entries: Vec<BlockFullInfo>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryBlocksShortResult {
    pub start_height: u32,
    pub current_height: u32,
    pub full_offset: u32,
    pub entries: Vec<BlockShortInfo>,
}

pub fn strip_signatures(mut transaction: Transaction) -> Transaction {
    for group in &mut transaction.signatures {
        group.clear();
    }
    transaction
}
