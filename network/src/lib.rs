#[macro_use]
extern crate log;

extern crate umbra_chain as chain;
extern crate umbra_crypto as crypto;
extern crate umbra_primitives as primitives;
extern crate umbra_serialization as ser;

mod currency;
mod network;
mod upgrades;

pub use primitives::{bytes, hash};

pub use crate::currency::{Currency, CurrencyBuilder};
pub use crate::network::Network;
pub use crate::upgrades::UpgradeManager;
