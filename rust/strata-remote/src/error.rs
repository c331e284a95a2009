use thiserror::Error;

/// The error taxonomy for the remote action endpoint, per spec.md §7.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// A non-2xx HTTP response that does not match a more specific
    /// variant below. Carries the status code.
    #[error("remote action endpoint responded with status {0}")]
    Http(u16),

    /// A 409 response whose body contains "already exists" — never
    /// retried.
    #[error("conflict: {0}")]
    ConflictPermanent(String),

    /// A fetch-level failure (connection refused, DNS, timeout) rather
    /// than an HTTP response — worth retrying.
    #[error("network error: {0}")]
    Network(String),

    /// The response body could not be parsed as an [`crate::ActionResponse`].
    #[error("malformed response body: {0}")]
    MalformedResponse(String),

    /// `{success: false, error}` in an otherwise well-formed response.
    #[error("remote action failed: {0}")]
    ActionFailed(String),
}

impl TransportError {
    /// The HTTP status code carried by this error, if any — used by
    /// `strata-sync`'s classifier (via [`crate::TransportError::as_delivery_failure`])
    /// and by callers that want to branch on status directly.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http(status) => Some(*status),
            Self::ConflictPermanent(_) => Some(409),
            _ => None,
        }
    }
}
