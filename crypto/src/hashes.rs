use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use primitives::H256;

type Blake2b256 = Blake2b<U32>;

/// Object hash used for block and transaction identities.
pub fn fast_hash(data: &[u8]) -> H256 {
    let mut hasher = Blake2b256::new();
    hasher.update(data);
    H256::from_slice(&hasher.finalize())
}

/// Proof-of-work hash. Domain-separated from the identity hash so a block's
/// id never doubles as its work certificate.
pub fn pow_hash(data: &[u8]) -> H256 {
    let mut hasher = Blake2b256::new();
    hasher.update(b"umbra-pow");
    hasher.update(data);
    H256::from_slice(&hasher.finalize())
}

/// Binary tree hash over a non-empty list of hashes, pairing adjacent nodes
/// and carrying the odd tail up unchanged.
pub fn tree_hash(hashes: &[H256]) -> H256 {
    assert!(!hashes.is_empty());

    let mut layer: Vec<H256> = hashes.to_vec();
    while layer.len() > 1 {
        let mut next = Vec::with_capacity((layer.len() + 1) / 2);
        for pair in layer.chunks(2) {
            if pair.len() == 2 {
                let mut data = Vec::with_capacity(64);
                data.extend_from_slice(pair[0].as_bytes());
                data.extend_from_slice(pair[1].as_bytes());
                next.push(fast_hash(&data));
            } else {
                next.push(pair[0]);
            }
        }
        layer = next;
    }

    layer[0]
}

/// Checks `hash * difficulty < 2^256`, reading the hash as a little-endian
/// 256-bit integer. This is the standard CryptoNote work test.
pub fn check_hash(hash: &H256, difficulty: u64) -> bool {
    let bytes = hash.as_bytes();
    let mut words = [0u64; 4];
    for (i, word) in words.iter_mut().enumerate() {
        let mut value = 0u64;
        for j in (0..8).rev() {
            value = (value << 8) | u64::from(bytes[i * 8 + j]);
        }
        *word = value;
    }

    let mut carry = 0u64;
    for word in words.iter() {
        let product = u128::from(*word) * u128::from(difficulty) + u128::from(carry);
        carry = (product >> 64) as u64;
    }

    carry == 0
}
