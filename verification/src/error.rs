//! Two-level error scheme: fine-grained codes grouped into conditions.
//!
//! The numeric codes are part of the internal RPC boundary and must stay
//! stable; the display strings are descriptive only.

use thiserror::Error;

/// Successful outcomes of `add_block`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddBlockResult {
    AddedToMain,
    AddedToAlternative,
    AddedToAlternativeAndSwitched,
    AlreadyExists,
}

impl AddBlockResult {
    pub fn code(&self) -> u8 {
        match self {
            AddBlockResult::AddedToMain => 1,
            AddBlockResult::AddedToAlternative => 2,
            AddBlockResult::AddedToAlternativeAndSwitched => 3,
            AddBlockResult::AlreadyExists => 4,
        }
    }

    pub fn condition(&self) -> AddBlockErrorCondition {
        AddBlockErrorCondition::BlockAdded
    }
}

/// Rejections of `add_block`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AddBlockError {
    #[error("block rejected as orphaned")]
    RejectedAsOrphaned,
    #[error("deserialization error")]
    DeserializationFailed,
    #[error("block validation failed: {0}")]
    Block(#[from] BlockValidationError),
    #[error("transaction validation failed: {0}")]
    Transaction(#[from] TransactionValidationError),
}

impl AddBlockError {
    pub fn code(&self) -> u8 {
        match self {
            AddBlockError::RejectedAsOrphaned => 5,
            AddBlockError::DeserializationFailed => 6,
            AddBlockError::Block(err) => err.code(),
            AddBlockError::Transaction(err) => err.code(),
        }
    }

    pub fn condition(&self) -> AddBlockErrorCondition {
        match self {
            AddBlockError::RejectedAsOrphaned => AddBlockErrorCondition::BlockRejected,
            AddBlockError::DeserializationFailed => AddBlockErrorCondition::DeserializationFailed,
            AddBlockError::Block(_) => AddBlockErrorCondition::BlockValidationFailed,
            AddBlockError::Transaction(_) => {
                AddBlockErrorCondition::TransactionValidationFailed
            }
        }
    }
}

/// Equivalence classes callers match on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddBlockErrorCondition {
    BlockAdded,
    BlockRejected,
    BlockValidationFailed,
    TransactionValidationFailed,
    DeserializationFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BlockValidationError {
    #[error("wrong block version")]
    WrongVersion,
    #[error("parent block size is too big")]
    ParentBlockSizeTooBig,
    #[error("parent block has wrong version")]
    ParentBlockWrongVersion,
    #[error("timestamp is too far in future")]
    TimestampTooFarInFuture,
    #[error("timestamp is too far in past")]
    TimestampTooFarInPast,
    #[error("cumulative block size is too big")]
    CumulativeBlockSizeTooBig,
    #[error("block difficulty overhead occurred")]
    DifficultyOverhead,
    #[error("block reward doesn't match expected reward")]
    BlockRewardMismatch,
    #[error("checkpoint block hash mismatch")]
    CheckpointBlockHashMismatch,
    #[error("proof of work is too weak")]
    ProofOfWorkTooWeak,
    #[error("block's transaction is absent in transaction pool")]
    TransactionAbsentInPool,
}

impl BlockValidationError {
    pub fn code(&self) -> u8 {
        match self {
            BlockValidationError::WrongVersion => 1,
            BlockValidationError::ParentBlockSizeTooBig => 2,
            BlockValidationError::ParentBlockWrongVersion => 3,
            BlockValidationError::TimestampTooFarInFuture => 4,
            BlockValidationError::TimestampTooFarInPast => 5,
            BlockValidationError::CumulativeBlockSizeTooBig => 6,
            BlockValidationError::DifficultyOverhead => 7,
            BlockValidationError::BlockRewardMismatch => 8,
            BlockValidationError::CheckpointBlockHashMismatch => 9,
            BlockValidationError::ProofOfWorkTooWeak => 10,
            BlockValidationError::TransactionAbsentInPool => 11,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TransactionValidationError {
    #[error("transaction has no inputs")]
    EmptyInputs,
    #[error("transaction has input with unknown type")]
    InputUnknownType,
    #[error("transaction's input uses empty output")]
    InputEmptyOutputUsage,
    #[error("transaction has identical key images")]
    InputIdenticalKeyImages,
    #[error("transaction has identical output indexes")]
    InputIdenticalOutputIndexes,
    #[error("transaction uses spent key image")]
    InputKeyImageAlreadySpent,
    #[error("transaction uses spent multisignature output")]
    InputMultisignatureAlreadySpent,
    #[error("transaction has input with invalid global index")]
    InputInvalidGlobalIndex,
    #[error("transaction uses locked input")]
    InputSpendLockedOut,
    #[error("transaction has input with invalid signature")]
    InputInvalidSignatures,
    #[error("transaction has input with wrong signatures count")]
    InputWrongSignaturesCount,
    #[error("transaction's inputs sum overflow")]
    InputsAmountOverflow,
    #[error("wrong input count")]
    InputWrongCount,
    #[error("wrong input type")]
    InputUnexpectedType,
    #[error("base input has wrong block index")]
    BaseInputWrongBlockIndex,
    #[error("transaction has zero output amount")]
    OutputZeroAmount,
    #[error("transaction has output with invalid key")]
    OutputInvalidKey,
    #[error("transaction has output with invalid signatures count")]
    OutputInvalidRequiredSignaturesCount,
    #[error("transaction has unknown output type")]
    OutputUnknownType,
    #[error("transaction has outputs amount overflow")]
    OutputsAmountOverflow,
    #[error("transaction wrong amount")]
    WrongAmount,
    #[error("transaction has wrong unlock time")]
    WrongTransactionUnlockTime,
}

impl TransactionValidationError {
    pub fn code(&self) -> u8 {
        match self {
            TransactionValidationError::EmptyInputs => 1,
            TransactionValidationError::InputUnknownType => 2,
            TransactionValidationError::InputEmptyOutputUsage => 3,
            TransactionValidationError::InputIdenticalKeyImages => 4,
            TransactionValidationError::InputIdenticalOutputIndexes => 5,
            TransactionValidationError::InputKeyImageAlreadySpent => 6,
            TransactionValidationError::InputMultisignatureAlreadySpent => 7,
            TransactionValidationError::InputInvalidGlobalIndex => 8,
            TransactionValidationError::InputSpendLockedOut => 9,
            TransactionValidationError::InputInvalidSignatures => 10,
            TransactionValidationError::InputWrongSignaturesCount => 11,
            TransactionValidationError::InputsAmountOverflow => 12,
            TransactionValidationError::InputWrongCount => 13,
            TransactionValidationError::InputUnexpectedType => 14,
            TransactionValidationError::BaseInputWrongBlockIndex => 15,
            TransactionValidationError::OutputZeroAmount => 16,
            TransactionValidationError::OutputInvalidKey => 17,
            TransactionValidationError::OutputInvalidRequiredSignaturesCount => 18,
            TransactionValidationError::OutputUnknownType => 19,
            TransactionValidationError::OutputsAmountOverflow => 20,
            TransactionValidationError::WrongAmount => 21,
            TransactionValidationError::WrongTransactionUnlockTime => 22,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conditions_group_codes() {
        assert_eq!(
            AddBlockResult::AddedToMain.condition(),
            AddBlockErrorCondition::BlockAdded
        );
        assert_eq!(
            AddBlockResult::AlreadyExists.condition(),
            AddBlockErrorCondition::BlockAdded
        );
        assert_eq!(
            AddBlockError::RejectedAsOrphaned.condition(),
            AddBlockErrorCondition::BlockRejected
        );
        assert_eq!(
            AddBlockError::Block(BlockValidationError::WrongVersion).condition(),
            AddBlockErrorCondition::BlockValidationFailed
        );
        assert_eq!(
            AddBlockError::Transaction(TransactionValidationError::EmptyInputs).condition(),
            AddBlockErrorCondition::TransactionValidationFailed
        );
        assert_eq!(
            AddBlockError::DeserializationFailed.condition(),
            AddBlockErrorCondition::DeserializationFailed
        );
    }

    #[test]
    fn codes_are_stable() {
        assert_eq!(AddBlockResult::AddedToMain.code(), 1);
        assert_eq!(AddBlockError::DeserializationFailed.code(), 6);
        assert_eq!(BlockValidationError::TransactionAbsentInPool.code(), 11);
        assert_eq!(TransactionValidationError::WrongTransactionUnlockTime.code(), 22);
    }

    #[test]
    fn messages_are_descriptive() {
        assert_eq!(
            BlockValidationError::ProofOfWorkTooWeak.to_string(),
            "proof of work is too weak"
        );
        assert_eq!(
            TransactionValidationError::InputKeyImageAlreadySpent.to_string(),
            "transaction uses spent key image"
        );
    }
}
