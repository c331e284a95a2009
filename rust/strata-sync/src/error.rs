use thiserror::Error;

/// Errors surfaced directly by the sync queue itself (as opposed to
/// delivery failures reported by the caller-supplied [`crate::Deliverer`],
/// which are classified rather than propagated).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// A queued item exhausted its retry budget without being classified
    /// as permanent — surfaced so callers can decide whether to alert.
    #[error("item {0} exhausted its retry budget")]
    RetriesExhausted(String),
}

/// The outcome of one delivery attempt reported by a [`crate::Deliverer`],
/// used by [`crate::classify`] to decide whether to retry.
///
/// This is deliberately decoupled from `strata-remote`'s own error type:
/// the queue only needs the HTTP status (if any) and the message text that
/// the classification rules in spec.md §4.4 pattern-match against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryFailure {
    /// The HTTP status code, if the failure came from a response rather
    /// than a transport-level error (e.g. connection refused).
    pub status: Option<u16>,
    /// The error message, inspected for the substrings spec.md names
    /// explicitly (`"Foreign key constraint violated"`, `"already exists"`,
    /// `"Record to update/delete not found"`).
    pub message: String,
}

impl DeliveryFailure {
    /// Builds a delivery failure with no HTTP status (a transport-level
    /// failure such as a dropped connection).
    pub fn network(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
        }
    }

    /// Builds a delivery failure carrying an HTTP status code.
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            message: message.into(),
        }
    }
}
