//! Request and response values passed through the pipeline

use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{Error, Result};

/// One logical backend call. The body is kept as `Bytes` so the retry can
/// re-send it without re-serializing.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    /// Path relative to the backend base URL, or an absolute `http(s)://` URL
    pub endpoint: String,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

impl ApiRequest {
    pub fn new(method: Method, endpoint: impl Into<String>) -> Self {
        Self {
            method,
            endpoint: endpoint.into(),
            headers: HeaderMap::new(),
            body: None,
        }
    }

    pub fn get(endpoint: impl Into<String>) -> Self {
        Self::new(Method::GET, endpoint)
    }

    pub fn delete(endpoint: impl Into<String>) -> Self {
        Self::new(Method::DELETE, endpoint)
    }

    /// Serialize `body` as the JSON payload.
    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Self> {
        let bytes = serde_json::to_vec(body)
            .map_err(|e| Error::Decode(format!("serializing request body: {e}")))?;
        self.body = Some(Bytes::from(bytes));
        Ok(self)
    }

    pub fn body(mut self, body: Bytes) -> Self {
        self.body = Some(body);
        self
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }
}

/// Which send of a logical call this is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    First,
    /// The single re-send after a successful refresh
    Retry,
}

/// A send of an `ApiRequest`. Lives for one `call()` only.
#[derive(Debug, Clone, Copy)]
pub struct RequestAttempt<'a> {
    pub request: &'a ApiRequest,
    pub attempt: Attempt,
}

impl<'a> RequestAttempt<'a> {
    pub fn first(request: &'a ApiRequest) -> Self {
        Self {
            request,
            attempt: Attempt::First,
        }
    }

    /// The follow-up attempt, or `None` once the retry has been used.
    pub fn retry(&self) -> Option<Self> {
        match self.attempt {
            Attempt::First => Some(Self {
                request: self.request,
                attempt: Attempt::Retry,
            }),
            Attempt::Retry => None,
        }
    }

    /// 1 for the first send, 2 for the retry.
    pub fn number(&self) -> u8 {
        match self.attempt {
            Attempt::First => 1,
            Attempt::Retry => 2,
        }
    }
}

/// Fully read backend response.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ApiResponse {
    pub(crate) async fn read(response: reqwest::Response) -> Result<Self> {
        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|e| Error::Network(format!("reading response body: {e}")))?;
        Ok(Self {
            status,
            headers,
            body,
        })
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Turn a non-2xx response into `RequestFailed`.
    pub fn error_for_status(self) -> Result<Self> {
        if self.is_success() {
            return Ok(self);
        }
        Err(Error::RequestFailed {
            status: self.status.as_u16(),
            body: String::from_utf8_lossy(&self.body).into_owned(),
        })
    }

    /// Decode the body as JSON. `204 No Content` and empty bodies yield `None`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<Option<T>> {
        if self.status == StatusCode::NO_CONTENT || self.body.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }
        serde_json::from_slice(&self.body)
            .map(Some)
            .map_err(|e| Error::Decode(e.to_string()))
    }
}
