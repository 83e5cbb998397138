//! The blockchain core façade: one coordinator owning the segment tree, the
//! raw block store, the transaction pool and the event bus. Every public
//! mutation is serialized behind a single lock, so from the outside each
//! operation is atomic.

#[macro_use]
extern crate log;

extern crate parking_lot;
extern crate rand;
extern crate thiserror;
extern crate umbra_chain as chain;
extern crate umbra_crypto as crypto;
extern crate umbra_db as db;
extern crate umbra_miner as miner;
extern crate umbra_network as network;
extern crate umbra_primitives as primitives;
extern crate umbra_serialization as ser;
extern crate umbra_storage as storage;
extern crate umbra_verification as verification;

mod core_;
mod error;
mod message_queue;
mod messages;
mod sync_types;
mod time;

pub use primitives::{bytes, hash};

pub use crate::core_::{Core, QueueGuard, RandomOutput};
pub use crate::error::CoreError;
pub use crate::message_queue::{MessageQueue, QueueError};
pub use crate::messages::{BlockchainMessage, DeleteTransactionReason};
pub use crate::sync_types::{
    BlockFullInfo, BlockShortInfo, QueryBlocksResult, QueryBlocksShortResult,
    TransactionPrefixInfo,
};
pub use crate::time::{RealTimeProvider, TimeProvider};
