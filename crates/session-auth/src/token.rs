//! Login and refresh exchanges against the backend's auth endpoints
//!
//! Both calls POST JSON to the backend API (`LOGIN_PATH`, `REFRESH_PATH`).
//! Neither retries: one request per call, and the caller decides what a
//! failure means for the session.

use common::Secret;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, warn};

use crate::constants::{LOGIN_PATH, REFRESH_PATH, endpoint_url};
use crate::credentials::{Credential, Subject};
use crate::error::{Error, Result};

/// Token pair returned by the refresh endpoint.
#[derive(Deserialize, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

impl std::fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .finish()
    }
}

/// Email/password body forwarded to the login endpoint.
#[derive(Debug, Deserialize, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: Secret<String>,
}

/// Body of a successful login response.
#[derive(Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub user: LoginUser,
}

impl std::fmt::Debug for LoginResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginResponse")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[REDACTED]"))
            .field("user", &self.user)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginUser {
    #[serde(deserialize_with = "id_as_string")]
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub email: String,
}

#[derive(Serialize)]
struct RefreshBody<'a> {
    refresh_token: &'a str,
    user_id: &'a str,
}

/// The backend reports user ids as either numbers or strings.
fn id_as_string<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<String, D::Error> {
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "user id must be a string or number, got {other}"
        ))),
    }
}

impl LoginResponse {
    pub fn into_credential(self) -> Credential {
        Credential::issue(
            self.access_token,
            self.refresh_token,
            Subject {
                id: self.user.id,
                name: self.user.username,
                email: self.user.email,
            },
        )
    }
}

/// Exchange email/password for the session's first credential.
///
/// A non-2xx response becomes `LoginRejected` carrying the backend's
/// `message` field when it sent one.
pub async fn exchange_login(
    client: &reqwest::Client,
    api_url: &str,
    request: &LoginRequest,
) -> Result<Credential> {
    let response = client
        .post(endpoint_url(api_url, LOGIN_PATH))
        .json(request)
        .send()
        .await
        .map_err(|e| Error::Http(format!("login request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let message = response
            .json::<serde_json::Value>()
            .await
            .ok()
            .and_then(|body| body.get("message").and_then(|m| m.as_str()).map(String::from))
            .unwrap_or_else(|| String::from("Invalid credentials"));
        warn!(%status, "login rejected by backend");
        return Err(Error::LoginRejected(message));
    }

    let login = response
        .json::<LoginResponse>()
        .await
        .map_err(|e| Error::InvalidResponse(format!("invalid login response: {e}")))?;

    if login.access_token.trim().is_empty() {
        return Err(Error::InvalidResponse(
            "login response carried an empty access_token".into(),
        ));
    }

    debug!(subject_id = %login.user.id, "login exchange succeeded");
    Ok(login.into_credential())
}

/// Exchange a refresh token for a new access/refresh pair.
///
/// Any non-2xx answer is a rejection; a stale refresh token is expected to
/// end up here and is not a client bug. Transport failures are reported as
/// `Http` so callers can tell them apart from a rejection.
pub async fn refresh_token(
    client: &reqwest::Client,
    api_url: &str,
    refresh: &str,
    subject_id: &str,
) -> Result<TokenPair> {
    let response = client
        .post(endpoint_url(api_url, REFRESH_PATH))
        .json(&RefreshBody {
            refresh_token: refresh,
            user_id: subject_id,
        })
        .send()
        .await
        .map_err(|e| Error::Http(format!("token refresh request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));
        return Err(Error::RefreshRejected(format!(
            "refresh endpoint returned {status}: {body}"
        )));
    }

    // A 2xx without a usable pair cannot be retried with the same token either
    let pair = response
        .json::<TokenPair>()
        .await
        .map_err(|e| Error::RefreshRejected(format!("invalid refresh response: {e}")))?;

    if pair.access_token.trim().is_empty() {
        return Err(Error::RefreshRejected(
            "refresh response carried an empty access_token".into(),
        ));
    }

    Ok(pair)
}
