//! Sign-in, sign-out and the session read surface

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum_extra::extract::CookieJar;
use session_auth::{LOGOUT_PATH, LoginRequest, SessionView};
use session_client::ApiRequest;
use tracing::{debug, info, warn};

use crate::AppState;
use crate::error::{Error, request_id};
use crate::sessions::{expired_cookie, session_cookie, session_id};

/// `POST /auth/login`: exchange credentials and open a session.
pub async fn login_handler(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(login): Json<LoginRequest>,
) -> Response {
    let request_id = request_id();

    if login.email.trim().is_empty() || login.password.is_blank() {
        return Error::InvalidRequest("email and password are required".into())
            .into_response_with_id(&request_id);
    }

    let credential =
        match session_auth::exchange_login(&state.http, state.pipeline.base_url(), &login).await {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "login failed");
                return Error::from(e).into_response_with_id(&request_id);
            }
        };

    // A browser signing in again replaces its previous session
    if let Some(previous) = session_id(&jar, &state.cookie_name) {
        if let Some(store) = state.sessions.remove(&previous).await {
            store.clear();
        }
    }

    let subject = credential.subject.clone();
    let (id, _store) = state.sessions.create(credential).await;
    info!(subject_id = %subject.id, "signed in");

    let jar = jar.add(session_cookie(&state.cookie_name, id));
    (jar, Json(serde_json::json!({ "user": subject }))).into_response()
}

/// `POST /auth/logout`: notify the backend, then drop the session.
///
/// The backend notification is best effort; the local session ends either way.
pub async fn logout_handler(State(state): State<AppState>, jar: CookieJar) -> Response {
    if let Some(id) = session_id(&jar, &state.cookie_name) {
        if let Some(store) = state.sessions.remove(&id).await {
            if store.is_authenticated() {
                match state.pipeline.call(&store, ApiRequest::new(reqwest::Method::POST, LOGOUT_PATH)).await {
                    Ok(response) if response.is_success() => debug!("backend acknowledged logout"),
                    Ok(response) => warn!(status = %response.status, "backend rejected logout"),
                    Err(e) => warn!(error = %e, "backend logout failed"),
                }
            }
            store.clear();
            info!("signed out");
        }
    }

    let jar = jar.remove(expired_cookie(&state.cookie_name));
    (jar, StatusCode::NO_CONTENT).into_response()
}

/// `GET /auth/session`: `{ subject, access_token, is_authenticated }`.
pub async fn session_handler(State(state): State<AppState>, jar: CookieJar) -> Json<SessionView> {
    let store = match session_id(&jar, &state.cookie_name) {
        Some(id) => state.sessions.get(&id).await,
        None => None,
    };
    Json(store.map(|s| s.view()).unwrap_or_else(SessionView::anonymous))
}
