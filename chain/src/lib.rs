extern crate once_cell;
extern crate umbra_crypto as crypto;
extern crate umbra_primitives as primitives;
extern crate umbra_serialization as ser;

pub mod constants;

mod account;
mod block;
mod extra;
mod raw_block;
mod transaction;

mod cached_block;
mod cached_transaction;

pub use primitives::{bytes, hash};

pub use crate::account::AccountPublicAddress;
pub use crate::block::{BlockTemplate, ParentBlock};
pub use crate::extra::{
    append_extra_field, extra_nonce_with_payment_id, extra_payment_id, extra_tx_public_key,
    ExtraField, ExtraParser,
};
pub use crate::raw_block::RawBlock;
pub use crate::transaction::{
    absolute_output_offsets, relative_output_offsets, KeyInput, KeyOutput, MultisignatureInput,
    MultisignatureOutput, Transaction, TransactionInput, TransactionOutput,
    TransactionOutputTarget,
};

pub use crate::cached_block::CachedBlock;
pub use crate::cached_transaction::CachedTransaction;
