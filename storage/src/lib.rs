#[macro_use]
extern crate log;

extern crate byteorder;
extern crate thiserror;
extern crate umbra_chain as chain;
extern crate umbra_crypto as crypto;
extern crate umbra_primitives as primitives;
extern crate umbra_serialization as ser;

mod blockchain_storage;
mod chain_access;
mod error;
mod file_mapped_vector;
mod types;

pub use primitives::{bytes, hash};

pub use crate::blockchain_storage::{
    BlockchainStorage, MemoryBlockchainStorage, SwappedBlockchainStorage,
};
pub use crate::chain_access::{extract_key_output_keys, ChainAccess, ExtractOutputsResult};
pub use crate::error::Error;
pub use crate::file_mapped_vector::{FileMappedVector, FixedRecord, OpenMode};
pub use crate::types::{
    CachedBlockInfo, CachedTransactionInfo, PackedOutputIndex, PushedBlockInfo, ValidatorState,
};
