//! Session credentials and identity-provider token exchange
//!
//! Holds the credential of one signed-in console session and talks to the
//! backend's auth endpoints. This crate has no dependency on the gateway
//! binary and can be tested on its own.
//!
//! Credential flow:
//! 1. Gateway calls `token::exchange_login()` with the user's email/password
//! 2. The returned `Credential` is placed in a `CredentialStore`
//! 3. On a 401 the request pipeline calls `token::refresh_token()`
//! 4. The new pair replaces both tokens via `Credential::rotate()`
//! 5. Logout or a rejected refresh empties the store with `CredentialStore::clear()`

pub mod constants;
pub mod credentials;
pub mod error;
pub mod persist;
pub mod token;

pub use constants::*;
pub use credentials::{Credential, CredentialStore, SessionView, Subject, now_millis};
pub use error::{Error, Result};
pub use token::{LoginRequest, LoginResponse, TokenPair, exchange_login, refresh_token};
