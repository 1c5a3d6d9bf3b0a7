//! Error types for credential exchange and storage

/// Errors from auth endpoint calls and session persistence.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Transport failure: the issuer never produced a response.
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// The issuer answered the refresh call with a non-2xx status.
    #[error("refresh rejected: {0}")]
    RefreshRejected(String),

    #[error("login rejected: {0}")]
    LoginRejected(String),

    #[error("invalid issuer response: {0}")]
    InvalidResponse(String),

    #[error("credential parse error: {0}")]
    CredentialParse(String),

    #[error("I/O error: {0}")]
    Io(String),
}

/// Result alias for auth operations.
pub type Result<T> = std::result::Result<T, Error>;
