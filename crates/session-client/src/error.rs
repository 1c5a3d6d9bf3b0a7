//! Error taxonomy of the request pipeline

/// Failures surfaced by `Pipeline::call()` and its JSON helpers.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No credential was present; the request was never sent.
    #[error("not authenticated")]
    Unauthenticated,

    /// Refresh was impossible or rejected; the session's store has been cleared.
    #[error("session expired")]
    SessionExpired,

    /// Non-2xx response handed back for the caller to interpret.
    #[error("request failed with status {status}")]
    RequestFailed { status: u16, body: String },

    /// Transport failure, surfaced as-is without retry.
    #[error("network error: {0}")]
    Network(String),

    #[error("invalid response body: {0}")]
    Decode(String),
}

impl Error {
    /// Whether the session is unusable until the user signs in again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Error::Unauthenticated | Error::SessionExpired)
    }
}

/// Result alias for pipeline operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_classification() {
        assert!(Error::Unauthenticated.is_terminal());
        assert!(Error::SessionExpired.is_terminal());
        assert!(!Error::Network("connection refused".into()).is_terminal());
        assert!(
            !Error::RequestFailed {
                status: 500,
                body: String::new()
            }
            .is_terminal()
        );
    }

    #[test]
    fn request_failed_display_includes_status() {
        let err = Error::RequestFailed {
            status: 404,
            body: "{\"message\":\"Role not found\"}".into(),
        };
        assert_eq!(err.to_string(), "request failed with status 404");
    }
}
