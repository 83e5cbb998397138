//! Fixed-size hash type used across the node.

use rustc_hex::{FromHex, FromHexError, ToHex};
use std::{fmt, ops, str};

/// 32-byte hash.
#[derive(Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct H256([u8; 32]);

impl H256 {
    pub const fn len() -> usize {
        32
    }

    pub fn from_slice(slice: &[u8]) -> H256 {
        assert_eq!(slice.len(), 32);
        let mut hash = H256::default();
        hash.0.copy_from_slice(slice);
        hash
    }

    pub fn from_hex(s: &str) -> Result<H256, FromHexError> {
        let bytes: Vec<u8> = s.from_hex()?;
        if bytes.len() != 32 {
            return Err(FromHexError::InvalidHexLength);
        }
        Ok(H256::from_slice(&bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.0.to_vec()
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }
}

impl From<[u8; 32]> for H256 {
    fn from(bytes: [u8; 32]) -> H256 {
        H256(bytes)
    }
}

impl From<H256> for [u8; 32] {
    fn from(hash: H256) -> [u8; 32] {
        hash.0
    }
}

impl From<u8> for H256 {
    fn from(byte: u8) -> H256 {
        let mut hash = H256::default();
        hash.0[0] = byte;
        hash
    }
}

impl ops::Deref for H256 {
    type Target = [u8; 32];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<[u8]> for H256 {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl str::FromStr for H256 {
    type Err = FromHexError;

    fn from_str(s: &str) -> Result<H256, FromHexError> {
        H256::from_hex(s)
    }
}

impl fmt::Debug for H256 {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0.to_hex::<String>())
    }
}

impl fmt::Display for H256 {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0.to_hex::<String>())
    }
}

#[cfg(test)]
mod tests {
    use super::H256;

    #[test]
    fn hex_round_trip() {
        let hash = H256::from_hex("0101010101010101010101010101010101010101010101010101010101010101")
            .unwrap();
        assert_eq!(
            format!("{}", hash),
            "0101010101010101010101010101010101010101010101010101010101010101"
        );
    }

    #[test]
    fn rejects_wrong_length() {
        assert!(H256::from_hex("0101").is_err());
    }

    #[test]
    fn zero_check() {
        assert!(H256::default().is_zero());
        assert!(!H256::from(1u8).is_zero());
    }
}
