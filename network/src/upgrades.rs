use crate::currency::Currency;
use chain::constants::{BLOCK_MAJOR_VERSION_1, BLOCK_MAJOR_VERSION_2, BLOCK_MAJOR_VERSION_3};

/// Monotone list of `(major_version, upgrade_height)` pairs. The version
/// mandated at height `h` is the greatest registered version whose upgrade
/// height is strictly below `h`; before any upgrade it is 1.
#[derive(Debug, Default, Clone)]
pub struct UpgradeManager {
    upgrades: Vec<(u8, u32)>,
}

impl UpgradeManager {
    pub fn new() -> Self {
        UpgradeManager::default()
    }

    pub fn for_currency(currency: &Currency) -> Self {
        let mut manager = UpgradeManager::new();
        if let Some(height) = currency.upgrade_height(BLOCK_MAJOR_VERSION_2) {
            manager.add_major_block_version(BLOCK_MAJOR_VERSION_2, height);
        }
        if let Some(height) = currency.upgrade_height(BLOCK_MAJOR_VERSION_3) {
            manager.add_major_block_version(BLOCK_MAJOR_VERSION_3, height);
        }
        manager
    }

    pub fn add_major_block_version(&mut self, major_version: u8, upgrade_height: u32) {
        assert!(
            self.upgrades
                .last()
                .map(|(version, _)| *version < major_version)
                .unwrap_or(true),
            "upgrade versions must be registered in increasing order"
        );
        self.upgrades.push((major_version, upgrade_height));
    }

    pub fn block_major_version_at(&self, height: u32) -> u8 {
        for (version, upgrade_height) in self.upgrades.iter().rev() {
            if *upgrade_height < height {
                return *version;
            }
        }

        BLOCK_MAJOR_VERSION_1
    }
}

#[cfg(test)]
mod tests {
    use super::UpgradeManager;

    #[test]
    fn default_version_is_one() {
        let manager = UpgradeManager::new();
        assert_eq!(manager.block_major_version_at(0), 1);
        assert_eq!(manager.block_major_version_at(1_000_000), 1);
    }

    #[test]
    fn version_switches_after_upgrade_height() {
        let mut manager = UpgradeManager::new();
        manager.add_major_block_version(2, 100);
        manager.add_major_block_version(3, 200);

        assert_eq!(manager.block_major_version_at(100), 1);
        assert_eq!(manager.block_major_version_at(101), 2);
        assert_eq!(manager.block_major_version_at(200), 2);
        assert_eq!(manager.block_major_version_at(201), 3);
    }

    #[test]
    #[should_panic]
    fn versions_must_be_increasing() {
        let mut manager = UpgradeManager::new();
        manager.add_major_block_version(3, 100);
        manager.add_major_block_version(2, 200);
    }
}
