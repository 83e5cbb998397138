//! Consensus verification.
//!
//! Block-level and transaction-level predicates are pure given a chain view,
//! the height being validated and the injected clock. The core façade drives
//! them in the fixed order any divergence from which forks the network:
//! version, parent-block constraints, timestamps, coinbase shape, sizes,
//! difficulty, per-transaction validity, reward, checkpoint-or-work.

#[macro_use]
extern crate log;

extern crate thiserror;
extern crate umbra_chain as chain;
extern crate umbra_crypto as crypto;
extern crate umbra_network as network;
extern crate umbra_primitives as primitives;
extern crate umbra_serialization as ser;
extern crate umbra_storage as storage;

mod checkpoints;
mod error;
mod validator;
mod work;

pub use primitives::{bytes, hash};

pub use crate::checkpoints::Checkpoints;
pub use crate::error::{
    AddBlockError, AddBlockErrorCondition, AddBlockResult, BlockValidationError,
    TransactionValidationError,
};
pub use crate::validator::{validate_block, validate_semantic, validate_transaction};
pub use crate::work::{median_value, work_required};
