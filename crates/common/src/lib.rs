//! Shared types for the console session gateway

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
