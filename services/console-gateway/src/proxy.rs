//! Forwarding to the backend API and to the console frontend
//!
//! `/api/*` calls go through the authenticated request pipeline with the
//! caller's session credential; the browser never sees a bearer token.
//! Permitted navigations are forwarded to the frontend as plain requests.

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum_extra::extract::CookieJar;
use bytes::Bytes;
use session_client::ApiRequest;
use tracing::{debug, error, instrument, warn};

use crate::AppState;
use crate::error::{Error, request_id};
use crate::sessions::{expired_cookie, session_id};

/// Headers to strip before forwarding (hop-by-hop per RFC 2616 Section 13.5.1)
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Set by the gateway on backend calls, never copied from the browser
const GATEWAY_OWNED_HEADERS: &[&str] = &["host", "cookie", "authorization", "content-length"];

pub const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Check if a header is hop-by-hop (should be stripped before forwarding)
pub fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP_HEADERS
        .iter()
        .any(|h| h.eq_ignore_ascii_case(name))
}

fn is_gateway_owned(name: &str) -> bool {
    GATEWAY_OWNED_HEADERS
        .iter()
        .any(|h| h.eq_ignore_ascii_case(name))
}

/// Browser headers safe to pass to the backend.
fn backend_headers(headers: &HeaderMap) -> HeaderMap {
    let mut forwarded = HeaderMap::new();
    for (name, value) in headers {
        if !is_hop_by_hop(name.as_str()) && !is_gateway_owned(name.as_str()) {
            forwarded.append(name.clone(), value.clone());
        }
    }
    forwarded
}

/// `/api/roles?page=2` becomes `/roles?page=2` on the backend.
fn backend_endpoint(uri: &Uri) -> String {
    let path = uri.path().strip_prefix("/api").unwrap_or(uri.path());
    let path = if path.is_empty() { "/" } else { path };
    match uri.query() {
        Some(query) => format!("{path}?{query}"),
        None => path.to_string(),
    }
}

fn relay(status: StatusCode, headers: &HeaderMap, body: Bytes, request_id: &str) -> Response {
    let mut response = Response::builder().status(status);
    for (name, value) in headers {
        if !is_hop_by_hop(name.as_str()) {
            response = response.header(name, value);
        }
    }
    response.body(Body::from(body)).unwrap_or_else(|e| {
        error!(error = %e, "failed to build relayed response");
        Error::InvalidResponse(e.to_string()).into_response_with_id(request_id)
    })
}

/// Forward `/api/{*path}` to the backend on behalf of the caller's session.
#[instrument(skip_all, fields(request_id = tracing::field::Empty, method = %request.method(), path = %request.uri().path()))]
pub async fn api_handler(State(state): State<AppState>, jar: CookieJar, request: Request) -> Response {
    let request_id = request_id();
    tracing::Span::current().record("request_id", request_id.as_str());

    let store = match session_id(&jar, &state.cookie_name) {
        Some(id) => state.sessions.get(&id).await,
        None => None,
    };
    let Some(store) = store else {
        debug!("api call without a session");
        return Error::Unauthenticated.into_response_with_id(&request_id);
    };

    let (parts, body) = request.into_parts();
    let body = match axum::body::to_bytes(body, MAX_BODY_BYTES).await {
        Ok(b) => b,
        Err(e) => {
            warn!(error = %e, "failed to read request body");
            return Error::InvalidRequest(format!("request body: {e}")).into_response_with_id(&request_id);
        }
    };

    let mut api_request = ApiRequest::new(parts.method, backend_endpoint(&parts.uri));
    api_request.headers = backend_headers(&parts.headers);
    if !body.is_empty() {
        api_request = api_request.body(body);
    }

    match state.pipeline.call(&store, api_request).await {
        Ok(response) => relay(response.status, &response.headers, response.body, &request_id),
        Err(e) => {
            let err = Error::from(e);
            if err.ends_session() {
                let jar = jar.remove(expired_cookie(&state.cookie_name));
                return (jar, err.into_response_with_id(&request_id)).into_response();
            }
            err.into_response_with_id(&request_id)
        }
    }
}

/// Forward a permitted navigation to the frontend and relay its answer.
pub async fn forward_to_frontend(state: &AppState, request: Request, request_id: &str) -> Response {
    let uri = request.uri().clone();
    let url = match uri.path_and_query() {
        Some(pq) => format!("{}{}", state.frontend_url.trim_end_matches('/'), pq),
        None => state.frontend_url.clone(),
    };

    let mut headers = HeaderMap::new();
    for (name, value) in request.headers() {
        if !is_hop_by_hop(name.as_str()) && !name.as_str().eq_ignore_ascii_case("host") {
            headers.append(name.clone(), value.clone());
        }
    }

    let method = request.method().clone();
    let body = match axum::body::to_bytes(request.into_body(), MAX_BODY_BYTES).await {
        Ok(b) => b,
        Err(e) => {
            return Error::InvalidRequest(format!("request body: {e}")).into_response_with_id(request_id);
        }
    };

    let result = state
        .http
        .request(method, &url)
        .headers(headers)
        .body(body)
        .send()
        .await;

    let upstream = match result {
        Ok(r) => r,
        Err(e) => {
            error!(error = %e, url = %url, "frontend request failed");
            return Error::Frontend(e.to_string()).into_response_with_id(request_id);
        }
    };

    let status = upstream.status();
    let resp_headers = upstream.headers().clone();
    match upstream.bytes().await {
        Ok(body) => relay(status, &resp_headers, body, request_id),
        Err(e) => {
            error!(error = %e, "failed to read frontend response body");
            Error::Frontend(format!("reading response: {e}")).into_response_with_id(request_id)
        }
    }
}
