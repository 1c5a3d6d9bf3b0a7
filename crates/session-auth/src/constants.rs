//! Backend auth endpoint paths and defaults
//!
//! Paths are relative to the configured backend API URL.

/// Backend API URL used when neither config nor `CONSOLE_API_URL` set one
pub const DEFAULT_API_URL: &str = "http://localhost:3001";

/// Credential exchange (email + password for a token pair)
pub const LOGIN_PATH: &str = "/auth/login";

/// Refresh-token exchange
pub const REFRESH_PATH: &str = "/auth/refresh";

/// Server-side session invalidation
pub const LOGOUT_PATH: &str = "/auth/logout";

/// Join a base URL and an absolute path without doubling the slash.
pub fn endpoint_url(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
