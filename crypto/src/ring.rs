//! Linkable ring signatures in the CryptoNote layout: one `(c, r)` pair per
//! ring member, with the challenge closing over every member's commitments
//! and the key image tying rings spending the same output together.

use crate::keys::{
    decompress, decompress_scalar, hash_to_point, hash_to_scalar, KeyImage, PublicKey, SecretKey,
    Signature,
};
use curve25519_dalek::edwards::{CompressedEdwardsY, EdwardsPoint};
use curve25519_dalek::scalar::Scalar;
use primitives::H256;

fn challenge(prefix_hash: &H256, commitments: &[EdwardsPoint]) -> Scalar {
    let mut chunks: Vec<Vec<u8>> = Vec::with_capacity(commitments.len() + 1);
    chunks.push(prefix_hash.to_vec());
    for commitment in commitments {
        chunks.push(commitment.compress().to_bytes().to_vec());
    }
    let refs: Vec<&[u8]> = chunks.iter().map(|c| c.as_slice()).collect();
    hash_to_scalar(&refs)
}

/// Signs `prefix_hash` with the key at `secret_index` of `ring`.
pub fn generate_ring_signature(
    prefix_hash: &H256,
    image: &KeyImage,
    ring: &[PublicKey],
    secret: &SecretKey,
    secret_index: usize,
) -> Vec<Signature> {
    assert!(secret_index < ring.len());

    let x = Scalar::from_bytes_mod_order(secret.0);
    let image_point = CompressedEdwardsY(image.0)
        .decompress()
        .expect("key image produced by key_image() is a valid point; qed");

    let mut c = vec![Scalar::ZERO; ring.len()];
    let mut r = vec![Scalar::ZERO; ring.len()];
    let mut left = vec![EdwardsPoint::mul_base(&Scalar::ZERO); ring.len()];
    let mut right = left.clone();

    // decoy responses are derived, the real one is solved for below
    for i in 0..ring.len() {
        if i == secret_index {
            continue;
        }
        let tag = i as u64;
        c[i] = hash_to_scalar(&[b"decoy-c", &secret.0, prefix_hash.as_bytes(), &tag.to_le_bytes()]);
        r[i] = hash_to_scalar(&[b"decoy-r", &secret.0, prefix_hash.as_bytes(), &tag.to_le_bytes()]);
        let point = decompress(&ring[i]).expect("ring members are validated output keys; qed");
        left[i] = EdwardsPoint::vartime_double_scalar_mul_basepoint(&c[i], &point, &r[i]);
        right[i] = r[i] * hash_to_point(&ring[i]) + c[i] * image_point;
    }

    let k = hash_to_scalar(&[b"ring-nonce", &secret.0, prefix_hash.as_bytes()]);
    left[secret_index] = EdwardsPoint::mul_base(&k);
    right[secret_index] = k * hash_to_point(&ring[secret_index]);

    let mut commitments = left.clone();
    commitments.extend_from_slice(&right);
    let h = challenge(prefix_hash, &commitments);

    let decoy_sum: Scalar = c
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != secret_index)
        .map(|(_, ci)| *ci)
        .fold(Scalar::ZERO, |acc, ci| acc + ci);
    c[secret_index] = h - decoy_sum;
    r[secret_index] = k - c[secret_index] * x;

    (0..ring.len())
        .map(|i| Signature {
            c: c[i].to_bytes(),
            r: r[i].to_bytes(),
        })
        .collect()
}

/// Verifies a ring signature against the resolved output keys.
pub fn check_ring_signature(
    prefix_hash: &H256,
    image: &KeyImage,
    ring: &[PublicKey],
    signatures: &[Signature],
) -> bool {
    if ring.is_empty() || ring.len() != signatures.len() {
        return false;
    }

    let image_point = match CompressedEdwardsY(image.0).decompress() {
        Some(point) => point,
        None => return false,
    };

    let mut sum = Scalar::ZERO;
    let mut left = Vec::with_capacity(ring.len());
    let mut right = Vec::with_capacity(ring.len());
    for (key, signature) in ring.iter().zip(signatures.iter()) {
        let point = match decompress(key) {
            Some(point) => point,
            None => return false,
        };
        let c = match decompress_scalar(&signature.c) {
            Some(c) => c,
            None => return false,
        };
        let r = match decompress_scalar(&signature.r) {
            Some(r) => r,
            None => return false,
        };

        left.push(EdwardsPoint::vartime_double_scalar_mul_basepoint(
            &c, &point, &r,
        ));
        right.push(r * hash_to_point(key) + c * image_point);
        sum += c;
    }

    let mut commitments = left;
    commitments.extend_from_slice(&right);
    challenge(prefix_hash, &commitments) == sum
}

#[cfg(test)]
mod tests {
    use super::{check_ring_signature, generate_ring_signature};
    use crate::keys::{generate_keys, key_image};
    use crate::fast_hash;

    #[test]
    fn ring_of_one_round_trip() {
        let (secret, public) = generate_keys(b"solo");
        let image = key_image(&secret, &public);
        let prefix = fast_hash(b"tx prefix");

        let signatures = generate_ring_signature(&prefix, &image, &[public], &secret, 0);
        assert!(check_ring_signature(&prefix, &image, &[public], &signatures));
    }

    #[test]
    fn ring_of_three_round_trip_any_position() {
        let keys: Vec<_> = (0..3)
            .map(|i| generate_keys(format!("member-{}", i).as_bytes()))
            .collect();
        let ring: Vec<_> = keys.iter().map(|(_, p)| *p).collect();
        let prefix = fast_hash(b"prefix");

        for index in 0..3 {
            let (ref secret, ref public) = keys[index];
            let image = key_image(secret, public);
            let signatures = generate_ring_signature(&prefix, &image, &ring, secret, index);
            assert!(check_ring_signature(&prefix, &image, &ring, &signatures));
        }
    }

    #[test]
    fn wrong_message_fails() {
        let (secret, public) = generate_keys(b"solo");
        let image = key_image(&secret, &public);
        let prefix = fast_hash(b"tx prefix");
        let signatures = generate_ring_signature(&prefix, &image, &[public], &secret, 0);

        let other = fast_hash(b"another prefix");
        assert!(!check_ring_signature(&other, &image, &[public], &signatures));
    }

    #[test]
    fn wrong_image_fails() {
        let (secret, public) = generate_keys(b"solo");
        let (secret2, public2) = generate_keys(b"other");
        let image = key_image(&secret, &public);
        let foreign_image = key_image(&secret2, &public2);
        let prefix = fast_hash(b"tx prefix");
        let signatures = generate_ring_signature(&prefix, &image, &[public], &secret, 0);

        assert!(!check_ring_signature(&prefix, &foreign_image, &[public], &signatures));
    }

    #[test]
    fn signature_count_must_match_ring() {
        let (secret, public) = generate_keys(b"solo");
        let image = key_image(&secret, &public);
        let prefix = fast_hash(b"tx prefix");
        let signatures = generate_ring_signature(&prefix, &image, &[public], &secret, 0);

        assert!(!check_ring_signature(&prefix, &image, &[public, public], &signatures));
        assert!(!check_ring_signature(&prefix, &image, &[public], &[]));
    }
}
