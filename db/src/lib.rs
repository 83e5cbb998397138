#[macro_use]
extern crate log;

extern crate thiserror;
extern crate umbra_chain as chain;
extern crate umbra_crypto as crypto;
extern crate umbra_network as network;
extern crate umbra_primitives as primitives;
extern crate umbra_serialization as ser;
extern crate umbra_storage as storage;

mod error;
mod segment;
mod segment_cache;
mod segment_tree;

pub use primitives::{bytes, hash};

pub use crate::error::Error;
pub use crate::segment::{PersistentSegment, Segment};
pub use crate::segment_cache::{restore_cached_transactions, OutputBaseCounts, SegmentCache};
pub use crate::segment_tree::{ChainView, SegmentId, SegmentTree};
