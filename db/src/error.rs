use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// A spent key image or multisignature usage is already present in the
    /// segment or one of its ancestors.
    #[error("spent entry already recorded on this chain")]
    DuplicateSpentEntry,
    #[error("block does not extend the segment top")]
    InvalidPushHeight,
    #[error("corrupted chain data: {0}")]
    Corrupted(String),
    #[error(transparent)]
    Storage(#[from] storage::Error),
}

impl From<ser::Error> for Error {
    fn from(err: ser::Error) -> Error {
        Error::Corrupted(err.to_string())
    }
}
