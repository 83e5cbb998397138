//! Events the core announces to its observers. One tagged variant; large
//! payloads are carried by value, moves are cheap.

use primitives::H256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteTransactionReason {
    /// Included in an accepted block.
    InBlock,
    /// Expired out of the pool.
    Outdated,
    /// No longer valid against the canonical chain after a switch.
    NotActual,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BlockchainMessage {
    NewBlock {
        height: u32,
        hash: H256,
    },
    NewAlternativeBlock {
        height: u32,
        hash: H256,
    },
    ChainSwitch {
        common_root_height: u32,
        hashes_on_new_branch: Vec<H256>,
    },
    AddTransaction {
        hashes: Vec<H256>,
    },
    DeleteTransaction {
        hashes: Vec<H256>,
        reason: DeleteTransactionReason,
    },
}
