//! Gateway request errors and their JSON rendering
//!
//! Every failure a handler returns is rendered as
//! `{"error":{"type":"...","message":"...","request_id":"req_..."}}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("not signed in")]
    Unauthenticated,

    #[error("session expired, sign in again")]
    SessionExpired,

    #[error("{0}")]
    LoginRejected(String),

    /// Non-2xx answer surfaced by a typed pipeline helper
    #[error("backend returned {status}")]
    Upstream { status: u16 },

    #[error("backend unreachable: {0}")]
    Backend(String),

    #[error("frontend unreachable: {0}")]
    Frontend(String),

    #[error("invalid backend response: {0}")]
    InvalidResponse(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl Error {
    pub fn status(&self) -> StatusCode {
        match self {
            Error::Unauthenticated | Error::SessionExpired | Error::LoginRejected(_) => {
                StatusCode::UNAUTHORIZED
            }
            Error::Upstream { status } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            Error::Backend(_) | Error::Frontend(_) | Error::InvalidResponse(_) => {
                StatusCode::BAD_GATEWAY
            }
            Error::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// Value of the `type` field in the JSON body.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Unauthenticated => "unauthenticated",
            Error::SessionExpired => "session_expired",
            Error::LoginRejected(_) => "login_rejected",
            Error::Upstream { .. } => "upstream_error",
            Error::Backend(_) => "backend_unreachable",
            Error::Frontend(_) => "frontend_unreachable",
            Error::InvalidResponse(_) => "invalid_response",
            Error::InvalidRequest(_) => "invalid_request",
        }
    }

    /// Whether the caller has to sign in again.
    pub fn ends_session(&self) -> bool {
        matches!(self, Error::Unauthenticated | Error::SessionExpired)
    }

    pub fn into_response_with_id(self, request_id: &str) -> Response {
        error_response(self.status(), self.kind(), &self.to_string(), request_id)
    }
}

impl From<session_client::Error> for Error {
    fn from(err: session_client::Error) -> Self {
        match err {
            session_client::Error::Unauthenticated => Error::Unauthenticated,
            session_client::Error::SessionExpired => Error::SessionExpired,
            session_client::Error::RequestFailed { status, .. } => Error::Upstream { status },
            session_client::Error::Network(msg) => Error::Backend(msg),
            session_client::Error::Decode(msg) => Error::InvalidResponse(msg),
        }
    }
}

impl From<session_auth::Error> for Error {
    fn from(err: session_auth::Error) -> Self {
        match err {
            session_auth::Error::LoginRejected(msg) => Error::LoginRejected(msg),
            session_auth::Error::RefreshRejected(_) => Error::SessionExpired,
            session_auth::Error::Http(msg) => Error::Backend(msg),
            other => Error::InvalidResponse(other.to_string()),
        }
    }
}

pub fn error_response(status: StatusCode, kind: &str, message: &str, request_id: &str) -> Response {
    let body = serde_json::json!({
        "error": {
            "type": kind,
            "message": message,
            "request_id": request_id,
        }
    });
    (
        status,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
        .into_response()
}

/// Fresh id for correlating an error body with the gateway's logs.
pub fn request_id() -> String {
    format!("req_{}", uuid::Uuid::new_v4().as_simple())
}
