//! Wire-format constants.

/// Input variant tags.
pub const INPUT_TAG_COINBASE: u8 = 0xff;
pub const INPUT_TAG_KEY: u8 = 0x02;
pub const INPUT_TAG_MULTISIGNATURE: u8 = 0x03;

/// Output target variant tags.
pub const OUTPUT_TAG_KEY: u8 = 0x02;
pub const OUTPUT_TAG_MULTISIGNATURE: u8 = 0x04;

/// Transaction extra field tags.
pub const EXTRA_TAG_PADDING: u8 = 0x00;
pub const EXTRA_TAG_TX_PUBLIC_KEY: u8 = 0x01;
pub const EXTRA_TAG_NONCE: u8 = 0x02;

/// First byte of an extra-nonce blob carrying a payment id.
pub const EXTRA_NONCE_PAYMENT_ID: u8 = 0x00;

/// Unlock times below this are block heights, above are unix timestamps.
pub const MAX_BLOCK_NUMBER: u64 = 500_000_000;

/// Serialized parent blocks above this size are rejected for versioned
/// blocks (major version >= 2).
pub const MAX_PARENT_BLOCK_SIZE: usize = 2048;

pub const BLOCK_MAJOR_VERSION_1: u8 = 1;
pub const BLOCK_MAJOR_VERSION_2: u8 = 2;
pub const BLOCK_MAJOR_VERSION_3: u8 = 3;

pub const BLOCK_MINOR_VERSION_0: u8 = 0;
pub const BLOCK_MINOR_VERSION_1: u8 = 1;
