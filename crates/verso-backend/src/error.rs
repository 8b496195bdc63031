use std::time::Duration;

/// Errors from backend operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    /// The backend could not be reached or refused the request.
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// The backend rejected the request because of load.
    #[error("backend throttled: {0}")]
    Throttled(String),

    /// The call did not complete within its timeout. The write may or may
    /// not have been applied.
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    /// The request itself was invalid (e.g. an oversized item).
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl BackendError {
    /// Whether retrying the same call can succeed.
    pub fn is_transient(&self) -> bool {
        !matches!(self, Self::InvalidRequest(_))
    }

    /// Whether the outcome of a write is unknown.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Result alias for backend operations.
pub type BackendResult<T> = Result<T, BackendError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        assert!(BackendError::Unavailable("down".into()).is_transient());
        assert!(BackendError::Throttled("slow down".into()).is_transient());
        let timeout = BackendError::Timeout {
            operation: "get_item",
            after: Duration::from_millis(5),
        };
        assert!(timeout.is_transient());
        assert!(timeout.is_timeout());
        assert!(!BackendError::InvalidRequest("too big".into()).is_transient());
    }
}
