#[macro_use]
extern crate log;

extern crate umbra_chain as chain;
extern crate umbra_crypto as crypto;
extern crate umbra_network as network;
extern crate umbra_primitives as primitives;
extern crate umbra_serialization as ser;
extern crate umbra_storage as storage;

mod block_template;
mod pool;
mod pool_cleaner;

pub use primitives::{bytes, hash};

pub use crate::block_template::{fill_block_template, TemplateTransactions};
pub use crate::pool::{PendingTransaction, TransactionPool};
pub use crate::pool_cleaner::PoolCleaner;
