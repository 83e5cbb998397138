use crypto::{generate_keys, PublicKey};

/// Public half of an account: the pair of keys outputs are addressed to.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AccountPublicAddress {
    pub spend_public_key: PublicKey,
    pub view_public_key: PublicKey,
}

impl AccountPublicAddress {
    /// Deterministic address derivation from seed bytes.
    pub fn from_seed(seed: &[u8]) -> Self {
        let mut spend_seed = seed.to_vec();
        spend_seed.extend_from_slice(b"/spend");
        let mut view_seed = seed.to_vec();
        view_seed.extend_from_slice(b"/view");

        let (_, spend_public_key) = generate_keys(&spend_seed);
        let (_, view_public_key) = generate_keys(&view_seed);

        AccountPublicAddress {
            spend_public_key,
            view_public_key,
        }
    }
}
