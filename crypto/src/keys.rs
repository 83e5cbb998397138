use blake2::digest::consts::U64;
use blake2::{Blake2b, Digest};
use curve25519_dalek::edwards::{CompressedEdwardsY, EdwardsPoint};
use curve25519_dalek::scalar::Scalar;
use curve25519_dalek::traits::IsIdentity;
use primitives::H256;
use ser::{Deserializable, Error as SerError, Reader, Serializable, Stream};
use std::fmt;

type Blake2b512 = Blake2b<U64>;

/// Compressed curve point.
#[derive(Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PublicKey(pub [u8; 32]);

/// Curve scalar.
#[derive(Clone, Copy)]
pub struct SecretKey(pub [u8; 32]);

/// Linkability tag of a key input; unique per spent output.
#[derive(Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct KeyImage(pub [u8; 32]);

/// Schnorr signature component pair.
#[derive(Default, Clone, Copy, PartialEq, Eq)]
pub struct Signature {
    pub c: [u8; 32],
    pub r: [u8; 32],
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", H256::from(self.0))
    }
}

impl fmt::Debug for KeyImage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", H256::from(self.0))
    }
}

impl fmt::Display for KeyImage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", H256::from(self.0))
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}{}", H256::from(self.c), H256::from(self.r))
    }
}

pub(crate) fn hash_to_scalar(chunks: &[&[u8]]) -> Scalar {
    let mut hasher = Blake2b512::new();
    for chunk in chunks {
        hasher.update(chunk);
    }
    let mut wide = [0u8; 64];
    wide.copy_from_slice(&hasher.finalize());
    Scalar::from_bytes_mod_order_wide(&wide)
}

/// Deterministic stand-in for the currency's hash-to-point primitive.
pub(crate) fn hash_to_point(key: &PublicKey) -> EdwardsPoint {
    EdwardsPoint::mul_base(&hash_to_scalar(&[b"hp", &key.0]))
}

pub(crate) fn decompress(key: &PublicKey) -> Option<EdwardsPoint> {
    CompressedEdwardsY(key.0).decompress()
}

pub(crate) fn decompress_scalar(bytes: &[u8; 32]) -> Option<Scalar> {
    Option::<Scalar>::from(Scalar::from_canonical_bytes(*bytes))
}

/// A key is valid if it decompresses to a non-identity curve point.
pub fn check_key(key: &PublicKey) -> bool {
    match decompress(key) {
        Some(point) => !point.is_identity(),
        None => false,
    }
}

/// Derives a keypair from arbitrary seed bytes.
pub fn generate_keys(seed: &[u8]) -> (SecretKey, PublicKey) {
    let secret = hash_to_scalar(&[b"keys", seed]);
    let public = EdwardsPoint::mul_base(&secret).compress().to_bytes();
    (SecretKey(secret.to_bytes()), PublicKey(public))
}

/// Derives a per-output keypair bound to `(base, tag, index)`. The owner of
/// `base` re-derives the secret half to spend the output.
pub fn derive_output_key_pair(base: &PublicKey, tag: u64, index: u64) -> (SecretKey, PublicKey) {
    let scalar = hash_to_scalar(&[b"out", &base.0, &tag.to_le_bytes(), &index.to_le_bytes()]);
    let public = PublicKey(EdwardsPoint::mul_base(&scalar).compress().to_bytes());
    (SecretKey(scalar.to_bytes()), public)
}

/// Public half of [`derive_output_key_pair`]. Used by the miner transaction
/// builder where each coinbase output needs its own valid key.
pub fn derive_output_key(base: &PublicKey, tag: u64, index: u64) -> PublicKey {
    derive_output_key_pair(base, tag, index).1
}

/// Key image of a keypair: `x * Hp(P)`.
pub fn key_image(secret: &SecretKey, public: &PublicKey) -> KeyImage {
    let x = Scalar::from_bytes_mod_order(secret.0);
    let image = x * hash_to_point(public);
    KeyImage(image.compress().to_bytes())
}

/// Schnorr signature over `message` with commitment folded into the
/// challenge. The nonce is derived, not sampled.
pub fn generate_signature(message: &H256, public: &PublicKey, secret: &SecretKey) -> Signature {
    let x = Scalar::from_bytes_mod_order(secret.0);
    let k = hash_to_scalar(&[b"nonce", &secret.0, message.as_bytes()]);
    let commitment = EdwardsPoint::mul_base(&k).compress().to_bytes();
    let c = hash_to_scalar(&[message.as_bytes(), &public.0, &commitment]);
    let r = k - c * x;

    Signature {
        c: c.to_bytes(),
        r: r.to_bytes(),
    }
}

pub fn check_signature(message: &H256, public: &PublicKey, signature: &Signature) -> bool {
    let point = match decompress(public) {
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

    // K' = rG + cP; accept iff c == H(m, P, K')
    let commitment = EdwardsPoint::vartime_double_scalar_mul_basepoint(&c, &point, &r);
    let expected = hash_to_scalar(&[
        message.as_bytes(),
        &public.0,
        &commitment.compress().to_bytes(),
    ]);

    expected == c
}

impl Serializable for PublicKey {
    fn serialize(&self, stream: &mut Stream) {
        stream.append_slice(&self.0);
    }
}

impl Deserializable for PublicKey {
    fn deserialize(reader: &mut Reader) -> Result<Self, SerError> {
        let mut key = PublicKey::default();
        key.0.copy_from_slice(reader.read_slice(32)?);
        Ok(key)
    }
}

impl Serializable for KeyImage {
    fn serialize(&self, stream: &mut Stream) {
        stream.append_slice(&self.0);
    }
}

impl Deserializable for KeyImage {
    fn deserialize(reader: &mut Reader) -> Result<Self, SerError> {
        let mut image = KeyImage::default();
        image.0.copy_from_slice(reader.read_slice(32)?);
        Ok(image)
    }
}

impl Serializable for Signature {
    fn serialize(&self, stream: &mut Stream) {
        stream.append_slice(&self.c);
        stream.append_slice(&self.r);
    }
}

impl Deserializable for Signature {
    fn deserialize(reader: &mut Reader) -> Result<Self, SerError> {
        let mut signature = Signature::default();
        signature.c.copy_from_slice(reader.read_slice(32)?);
        signature.r.copy_from_slice(reader.read_slice(32)?);
        Ok(signature)
    }
}
