//! Parsing and building of the free-form transaction `extra` field.
//!
//! The field is a concatenation of tagged sub-fields: zero padding, the
//! transaction public key, and an arbitrary nonce blob whose first byte may
//! mark a 32-byte payment id.

use crate::constants::{
    EXTRA_NONCE_PAYMENT_ID, EXTRA_TAG_NONCE, EXTRA_TAG_PADDING, EXTRA_TAG_TX_PUBLIC_KEY,
};
use crypto::PublicKey;
use primitives::{Bytes, H256};

#[derive(Debug, Clone, PartialEq)]
pub enum ExtraField {
    Padding(usize),
    TxPublicKey(PublicKey),
    Nonce(Vec<u8>),
}

/// Iterator over well-formed extra sub-fields. Parsing stops silently at the
/// first malformed byte; the remainder of `extra` is opaque by definition.
pub struct ExtraParser<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> ExtraParser<'a> {
    pub fn new(extra: &'a [u8]) -> Self {
        ExtraParser {
            data: extra,
            position: 0,
        }
    }
}

impl<'a> Iterator for ExtraParser<'a> {
    type Item = ExtraField;

    fn next(&mut self) -> Option<ExtraField> {
        if self.position >= self.data.len() {
            return None;
        }

        let tag = self.data[self.position];
        self.position += 1;

        match tag {
            EXTRA_TAG_PADDING => {
                let mut count = 1;
                while self.position < self.data.len() && self.data[self.position] == 0 {
                    self.position += 1;
                    count += 1;
                }
                Some(ExtraField::Padding(count))
            }
            EXTRA_TAG_TX_PUBLIC_KEY => {
                if self.position + 32 > self.data.len() {
                    self.position = self.data.len();
                    return None;
                }
                let mut key = PublicKey::default();
                key.0
                    .copy_from_slice(&self.data[self.position..self.position + 32]);
                self.position += 32;
                Some(ExtraField::TxPublicKey(key))
            }
            EXTRA_TAG_NONCE => {
                if self.position >= self.data.len() {
                    return None;
                }
                let len = self.data[self.position] as usize;
                self.position += 1;
                if self.position + len > self.data.len() {
                    self.position = self.data.len();
                    return None;
                }
                let nonce = self.data[self.position..self.position + len].to_vec();
                self.position += len;
                Some(ExtraField::Nonce(nonce))
            }
            _ => {
                self.position = self.data.len();
                None
            }
        }
    }
}

/// Extracts the payment id, if the extra carries a nonce blob tagged with one.
pub fn extra_payment_id(extra: &[u8]) -> Option<H256> {
    for field in ExtraParser::new(extra) {
        if let ExtraField::Nonce(nonce) = field {
            if nonce.len() == 33 && nonce[0] == EXTRA_NONCE_PAYMENT_ID {
                return Some(H256::from_slice(&nonce[1..]));
            }
        }
    }
    None
}

/// Extracts the transaction public key.
pub fn extra_tx_public_key(extra: &[u8]) -> Option<PublicKey> {
    for field in ExtraParser::new(extra) {
        if let ExtraField::TxPublicKey(key) = field {
            return Some(key);
        }
    }
    None
}

/// Builds an extra-nonce blob carrying `payment_id`.
pub fn extra_nonce_with_payment_id(payment_id: &H256) -> Vec<u8> {
    let mut nonce = Vec::with_capacity(33);
    nonce.push(EXTRA_NONCE_PAYMENT_ID);
    nonce.extend_from_slice(payment_id.as_bytes());
    nonce
}

/// Appends a tagged sub-field to an extra blob under construction.
pub fn append_extra_field(extra: &mut Bytes, field: &ExtraField) {
    match field {
        ExtraField::Padding(count) => {
            extra.extend(std::iter::repeat(0).take(*count));
        }
        ExtraField::TxPublicKey(key) => {
            extra.push(EXTRA_TAG_TX_PUBLIC_KEY);
            extra.extend_from_slice(&key.0);
        }
        ExtraField::Nonce(nonce) => {
            assert!(nonce.len() <= 255);
            extra.push(EXTRA_TAG_NONCE);
            extra.push(nonce.len() as u8);
            extra.extend_from_slice(nonce);
        }
    }
}
