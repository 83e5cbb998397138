use crate::currency::{Currency, CurrencyBuilder};

/// Umbra network type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    Mainnet,
    Testnet,
}

impl Network {
    pub fn currency(&self) -> Currency {
        match self {
            Network::Mainnet => CurrencyBuilder::new()
                .upgrade_heights(Some(60_000), Some(120_000))
                .build(),
            Network::Testnet => CurrencyBuilder::new()
                .upgrade_heights(Some(100), Some(200))
                .minimum_fee(1_000)
                .build(),
        }
    }
}
