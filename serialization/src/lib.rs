//! Canonical binary serialization.
//!
//! Every consensus object has exactly one valid encoding: integers are
//! minimally-encoded varints, collections are length-prefixed, and
//! deserialization consumes the whole input. Two semantically equal objects
//! therefore always produce byte-equal blobs, which is what makes object
//! hashes deterministic.

extern crate byteorder;
extern crate umbra_primitives as primitives;

mod reader;
mod stream;
mod varint;

pub use primitives::{bytes, hash};

pub use crate::reader::{deserialize, Deserializable, Error, Reader};
pub use crate::stream::{serialize, serialized_size, Serializable, Stream};
