//! Authenticated request pipeline for the console backend
//!
//! Every backend call goes through `Pipeline::call()`, which attaches the
//! session's bearer token and, on a 401, performs exactly one
//! refresh-and-retry cycle before giving up on the session.
//!
//! Call lifecycle:
//! 1. No credential in the store -> `Unauthenticated`, nothing is sent
//! 2. Request sent with `Authorization: Bearer <access>`
//! 3. Any status other than 401 is returned untouched
//! 4. 401 -> `TokenRefresher::refresh()` once, store replaced, request re-sent
//! 5. Rejected refresh, missing refresh token or a second 401 -> store
//!    cleared, `SessionExpired`

pub mod error;
pub mod pipeline;
pub mod refresh;
pub mod request;

pub use error::{Error, Result};
pub use pipeline::Pipeline;
pub use refresh::{HttpRefresher, TokenRefresher};
pub use request::{ApiRequest, ApiResponse, Attempt, RequestAttempt};
