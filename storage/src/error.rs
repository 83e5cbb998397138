use thiserror::Error;

/// Storage-level failures. Raw-store I/O errors are fatal to the caller; the
/// rename-based update protocol guarantees the on-disk state is recoverable
/// on the next open.
#[derive(Debug, Error)]
pub enum Error {
    #[error("storage is not initialized")]
    NotInitialized,
    #[error("storage is already initialized")]
    AlreadyInitialized,
    #[error("internal storage error: {0}")]
    Internal(String),
    #[error("I/O error: {0}")]
    Io(String),
    /// A failed file swap left the live handle pointing at the backup file;
    /// mutations are refused until the vector is reopened.
    #[error("vector is mapped to its backup file after a failed update")]
    MappedToBackup,
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::Io(err.to_string())
    }
}

impl From<ser::Error> for Error {
    fn from(err: ser::Error) -> Error {
        Error::Internal(err.to_string())
    }
}
