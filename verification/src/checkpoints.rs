use primitives::H256;
use std::collections::BTreeMap;

/// Hard-coded block hashes below a horizon. Inside the checkpoint zone a
/// block's identity replaces its proof of work and ring signature checks.
#[derive(Debug, Default, Clone)]
pub struct Checkpoints {
    points: BTreeMap<u32, H256>,
}

impl Checkpoints {
    pub fn new() -> Self {
        Checkpoints::default()
    }

    pub fn add_checkpoint(&mut self, height: u32, hash_str: &str) -> bool {
        let hash = match H256::from_hex(hash_str) {
            Ok(hash) => hash,
            Err(_) => {
                error!(target: "checkpoints", "invalid checkpoint hash at height {}", height);
                return false;
            }
        };

        if self.points.contains_key(&height) {
            error!(target: "checkpoints", "duplicate checkpoint at height {}", height);
            return false;
        }

        self.points.insert(height, hash);
        true
    }

    pub fn add_checkpoint_hash(&mut self, height: u32, hash: H256) -> bool {
        if self.points.contains_key(&height) {
            return false;
        }
        self.points.insert(height, hash);
        true
    }

    pub fn is_in_checkpoint_zone(&self, height: u32) -> bool {
        match self.points.keys().next_back() {
            Some(last) => height <= *last,
            None => false,
        }
    }

    /// True when no checkpoint exists at `height` or the hash matches it.
    pub fn check_block(&self, height: u32, hash: &H256) -> bool {
        match self.points.get(&height) {
            None => true,
            Some(expected) if expected == hash => {
                info!(target: "checkpoints", "checkpoint passed for height {}", height);
                true
            }
            Some(expected) => {
                warn!(
                    target: "checkpoints",
                    "checkpoint failed for height {}: expected {}, fetched {}",
                    height, expected, hash
                );
                false
            }
        }
    }

    /// Whether an alternative block at `height` may attach to a chain of
    /// `chain_size` blocks: forks below the last checkpoint before the top
    /// are dead on arrival.
    pub fn is_alternative_block_allowed(&self, chain_size: u32, height: u32) -> bool {
        if chain_size == 0 {
            return false;
        }

        match self.points.range(..chain_size).next_back() {
            None => true,
            Some((checkpoint_height, _)) => *checkpoint_height < height,
        }
    }

    pub fn checkpoint_heights(&self) -> Vec<u32> {
        self.points.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::Checkpoints;
    use primitives::H256;

    const HASH_A: &str = "0101010101010101010101010101010101010101010101010101010101010101";

    #[test]
    fn add_and_check() {
        let mut checkpoints = Checkpoints::new();
        assert!(checkpoints.add_checkpoint(10, HASH_A));
        assert!(!checkpoints.add_checkpoint(10, HASH_A));
        assert!(!checkpoints.add_checkpoint(11, "not-hex"));

        let good = H256::from_hex(HASH_A).unwrap();
        assert!(checkpoints.check_block(10, &good));
        assert!(!checkpoints.check_block(10, &H256::from(2u8)));
        // heights without a point always pass
        assert!(checkpoints.check_block(9, &H256::from(2u8)));
    }

    #[test]
    fn zone_covers_up_to_last_point() {
        let mut checkpoints = Checkpoints::new();
        assert!(!checkpoints.is_in_checkpoint_zone(0));
        checkpoints.add_checkpoint(10, HASH_A);
        assert!(checkpoints.is_in_checkpoint_zone(10));
        assert!(checkpoints.is_in_checkpoint_zone(1));
        assert!(!checkpoints.is_in_checkpoint_zone(11));
    }

    #[test]
    fn alternative_blocks_below_checkpoints_are_refused() {
        let mut checkpoints = Checkpoints::new();
        checkpoints.add_checkpoint(10, HASH_A);

        // an empty chain never accepts alternatives
        assert!(!checkpoints.is_alternative_block_allowed(0, 5));

        // chain still below the checkpoint: anything goes
        assert!(checkpoints.is_alternative_block_allowed(5, 2));

        // chain past the checkpoint: forks must attach above it
        assert!(!checkpoints.is_alternative_block_allowed(20, 10));
        assert!(checkpoints.is_alternative_block_allowed(20, 11));
    }
}
