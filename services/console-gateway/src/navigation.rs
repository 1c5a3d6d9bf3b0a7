//! Navigation gate
//!
//! Every request not claimed by another route is a page navigation. The
//! route table decides it from the path and whether the caller's session
//! currently holds a credential; nothing here touches the network before
//! the decision is made.
//!
//! The path is canonicalized first and the frontend only ever sees the
//! canonical form, so the path that was authorized is the path served.

use axum::extract::{Request, State};
use axum::http::Uri;
use axum::response::{IntoResponse, Redirect, Response};
use axum_extra::extract::CookieJar;
use route_gate::Decision;
use tracing::{debug, info};

use crate::AppState;
use crate::error::{Error, request_id};
use crate::metrics::record_navigation;
use crate::proxy::forward_to_frontend;
use crate::sessions::{expired_cookie, session_id};

/// Sign-in location carrying the originally requested page.
pub fn sign_in_redirect(sign_in_path: &str, original: &Uri) -> String {
    let target = original
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    format!("{sign_in_path}?callbackUrl={}", urlencoding::encode(target))
}

/// `uri` reduced to its canonical path, query kept.
pub fn canonical_uri(uri: &Uri) -> Result<Uri, Error> {
    let path = route_gate::normalize_path(uri.path());
    if path == uri.path() {
        return Ok(uri.clone());
    }
    let target = match uri.query() {
        Some(query) => format!("{path}?{query}"),
        None => path,
    };
    target
        .parse()
        .map_err(|e| Error::InvalidRequest(format!("request path: {e}")))
}

pub async fn navigation_handler(State(state): State<AppState>, jar: CookieJar, mut request: Request) -> Response {
    match canonical_uri(request.uri()) {
        Ok(uri) => *request.uri_mut() = uri,
        Err(e) => return e.into_response_with_id(&request_id()),
    }

    let cookie = session_id(&jar, &state.cookie_name);
    let credential_present = match &cookie {
        Some(id) => state
            .sessions
            .get(id)
            .await
            .is_some_and(|store| store.is_authenticated()),
        None => false,
    };

    let path = request.uri().path().to_string();
    let decision = state.routes.authorize(&path, credential_present);
    record_navigation(decision.label());

    match decision {
        Decision::Permit => {
            debug!(path = %path, "navigation permitted");
            forward_to_frontend(&state, request, &request_id()).await
        }
        Decision::DenyWithRedirect { location } => {
            info!(path = %path, "protected route without session, redirecting to sign-in");
            let redirect = Redirect::to(&sign_in_redirect(&location, request.uri()));
            if cookie.is_some() {
                // Stale cookie: its session is gone
                let jar = jar.remove(expired_cookie(&state.cookie_name));
                return (jar, redirect).into_response();
            }
            redirect.into_response()
        }
        Decision::Forward { location } => {
            debug!(path = %path, location = %location, "already signed in, forwarding to landing page");
            Redirect::to(&location).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn callback_url_is_encoded() {
        let uri: Uri = "/users/5?tab=roles".parse().unwrap();
        assert_eq!(
            sign_in_redirect("/login", &uri),
            "/login?callbackUrl=%2Fusers%2F5%3Ftab%3Droles"
        );
    }

    #[test]
    fn canonical_uri_resolves_path_and_keeps_query() {
        let uri: Uri = "/x/../users/%35?tab=roles".parse().unwrap();
        assert_eq!(canonical_uri(&uri).unwrap(), "/users/5?tab=roles");

        let uri: Uri = "/roles?page=2".parse().unwrap();
        assert_eq!(canonical_uri(&uri).unwrap(), uri);
    }

    #[test]
    fn callback_url_for_plain_path() {
        let uri: Uri = "/dashboard".parse().unwrap();
        assert_eq!(sign_in_redirect("/login", &uri), "/login?callbackUrl=%2Fdashboard");
    }
}
