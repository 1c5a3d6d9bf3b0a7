//! Route table validation errors

/// Errors raised while building a route table.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum Error {
    #[error("route prefix must start with '/': {0:?}")]
    InvalidPrefix(String),

    #[error("{field} must start with '/': {value:?}")]
    InvalidPath { field: &'static str, value: String },
}

/// Result alias for route table construction.
pub type Result<T> = std::result::Result<T, Error>;
