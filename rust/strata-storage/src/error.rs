use thiserror::Error;

/// The common error type used by this crate.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// The named store does not exist in this database.
    #[error("Store not found: {0}")]
    StoreNotFound(String),

    /// An error surfaced by a concrete storage backend (filesystem I/O,
    /// serialization, etc).
    #[error("Storage backend error: {0}")]
    Backend(String),

    /// Opening or switching the durable database did not complete within
    /// the readiness timeout.
    #[error("Durable store was not ready within {0:?}")]
    NotReady(std::time::Duration),
}
