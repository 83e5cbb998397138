use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error("core is not initialized")]
    NotInitialized,
    /// Internal invariant violation: an index disagrees with the data it
    /// indexes, or the persisted state cannot be reconciled.
    #[error("blockchain storage is corrupted")]
    CorruptedBlockchain,
    /// A sync request carried known ids that do not connect to our genesis.
    #[error("genesis block hash was not found among known ids")]
    GenesisMismatch,
    /// The retarget produced no usable difficulty; fatal until the chain
    /// progresses.
    #[error("block difficulty overhead occurred")]
    DifficultyOverhead,
    #[error("failed to construct miner transaction")]
    TemplateConstructionFailed,
}
