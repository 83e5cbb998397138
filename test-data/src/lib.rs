//! Builders producing fully valid chains and transactions for tests across
//! the workspace: correct rewards, difficulties, unlock times and real ring
//! signatures.

extern crate umbra_chain as chain;
extern crate umbra_crypto as crypto;
extern crate umbra_network as network;
extern crate umbra_primitives as primitives;
extern crate umbra_serialization as ser;

mod chain_builder;
mod transaction_builder;

pub use crate::chain_builder::{BuiltBlock, ChainBuilder};
pub use crate::transaction_builder::TransactionBuilder;

use chain::AccountPublicAddress;
use network::{Currency, CurrencyBuilder};

/// Address every test chain mines to.
pub fn miner_address() -> AccountPublicAddress {
    AccountPublicAddress::from_seed(b"test-miner")
}

/// A currency tuned for short test chains: tight difficulty window, short
/// unlock window, tiny fees.
pub fn test_currency() -> Currency {
    CurrencyBuilder::new()
        .difficulty_target(120)
        .difficulty_window(8, 1, 0)
        .timestamp_check_window(4)
        .mined_money_unlock_window(2)
        .reward_blocks_window(10)
        .minimum_fee(10)
        .default_dust_threshold(10)
        .mempool_tx_live_time(100)
        .build()
}
