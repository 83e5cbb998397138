//! Cryptographic primitives backing the node.
//!
//! The consensus layer treats everything here as opaque: a 32-byte hash, a
//! slower proof-of-work hash, curve keys with a point-validity check, single
//! signatures and linkable ring signatures with key images. The scheme
//! implemented here is self-contained over curve25519; swapping in another
//! primitive library only has to preserve these signatures.

extern crate blake2;
extern crate curve25519_dalek;
extern crate umbra_primitives as primitives;
extern crate umbra_serialization as ser;

mod hashes;
mod keys;
mod ring;

pub use primitives::hash::H256;

pub use crate::hashes::{check_hash, fast_hash, pow_hash, tree_hash};
pub use crate::keys::{
    check_key, check_signature, derive_output_key, derive_output_key_pair, generate_keys,
    generate_signature, key_image, KeyImage, PublicKey, SecretKey, Signature,
};
pub use crate::ring::{check_ring_signature, generate_ring_signature};
