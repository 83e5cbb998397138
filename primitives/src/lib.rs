extern crate rustc_hex;

pub mod bytes;
pub mod hash;

pub use crate::bytes::Bytes;
pub use crate::hash::H256;
