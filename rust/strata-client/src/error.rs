use thiserror::Error;

use strata_remote::TransportError;
use strata_storage::StorageError;

/// The top-level error taxonomy for the data plane, composed via `From` at
/// this crate's boundary from each lower crate's own error type
/// (spec.md §7).
#[derive(Error, Debug, Clone)]
pub enum ActionError {
    /// A non-2xx HTTP response from the remote action endpoint.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// A unique-constraint or conflict violation that will never succeed
    /// on retry.
    #[error("conflict: {0}")]
    ConflictPermanent(String),

    /// A fetch failure, 5xx, or FK-constraint violation encountered during
    /// eventual consistency — worth retrying.
    #[error("transient network failure: {0}")]
    TransientNetwork(String),

    /// The server (or a local schema check) rejected the payload.
    #[error("validation failed: {0}")]
    ValidationFailed(String),

    /// A required `autoValue` field could not be resolved.
    #[error("could not resolve auto-value for field {0}")]
    AutoValueResolution(String),

    /// The durable store is missing or did not become ready within the
    /// configured timeout.
    #[error("durable store unavailable: {0}")]
    DurableUnavailable(#[from] StorageError),

    /// No action registry entry matches the requested action.
    #[error("unknown action: {0}")]
    UnknownAction(String),

    /// A junction auto-create/update/delete attempted to re-enter the
    /// action it was triggered from.
    #[error("recursion guard: {0} may not be invoked while processing its own junction fan-out")]
    RecursionGuard(String),
}

impl From<strata_sync::DeliveryFailure> for ActionError {
    fn from(failure: strata_sync::DeliveryFailure) -> Self {
        match strata_sync::classify(&failure) {
            strata_sync::Classification::Permanent => ActionError::ConflictPermanent(failure.message),
            strata_sync::Classification::Transient { .. } => ActionError::TransientNetwork(failure.message),
        }
    }
}
