//! The authenticated request pipeline
//!
//! `Pipeline` is shared by every session. It never holds a credential
//! itself: each call receives the session's `CredentialStore`, reads the
//! credential from it, and writes the refreshed or cleared state back.
//!
//! The retried request is only sent after the refresh has completed and the
//! store has been updated. With single-flight enabled, concurrent 401s on
//! the same store queue on the store's refresh guard; whoever gets the guard
//! after the tokens were already rotated reuses the new pair instead of
//! spending another issuer round-trip.

use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::Serialize;
use serde::de::DeserializeOwned;
use session_auth::{Credential, CredentialStore, endpoint_url};
use tracing::{debug, info, instrument, warn};

use crate::error::{Error, Result};
use crate::refresh::{TokenRefresher, record_refresh};
use crate::request::{ApiRequest, ApiResponse, RequestAttempt};

pub struct Pipeline {
    http: reqwest::Client,
    base_url: String,
    refresher: Arc<dyn TokenRefresher>,
    single_flight: bool,
    timeout: Option<Duration>,
}

impl Pipeline {
    /// Pipeline against `base_url` with single-flight refresh enabled.
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        refresher: Arc<dyn TokenRefresher>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            refresher,
            single_flight: true,
            timeout: None,
        }
    }

    /// When disabled, every call that sees a 401 refreshes on its own.
    pub fn with_single_flight(mut self, enabled: bool) -> Self {
        self.single_flight = enabled;
        self
    }

    /// Per-send timeout. A timeout surfaces as `Error::Network`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send `request` on behalf of the session owning `store`.
    ///
    /// Returns every response except a 401 untouched. A 401 triggers one
    /// refresh followed by one re-send; if that cannot happen, or the re-send
    /// is rejected as well, the store is cleared and `SessionExpired` returned.
    #[instrument(skip_all, fields(method = %request.method, endpoint = %request.endpoint))]
    pub async fn call(&self, store: &CredentialStore, request: ApiRequest) -> Result<ApiResponse> {
        let Some(mut credential) = store.get() else {
            debug!("no credential, request not sent");
            return Err(Error::Unauthenticated);
        };

        let mut attempt = RequestAttempt::first(&request);
        loop {
            let response = self.send(&attempt, &credential).await?;
            if response.status != StatusCode::UNAUTHORIZED {
                return Ok(response);
            }

            let Some(next) = attempt.retry() else {
                warn!(
                    subject_id = %credential.subject.id,
                    "request rejected again after refresh, ending session"
                );
                store.clear();
                return Err(Error::SessionExpired);
            };

            debug!(subject_id = %credential.subject.id, "backend returned 401, refreshing");
            credential = self.renew(store, &credential).await?;
            attempt = next;
        }
    }

    /// `call()` plus status check and JSON decoding.
    pub async fn call_json<T: DeserializeOwned>(
        &self,
        store: &CredentialStore,
        request: ApiRequest,
    ) -> Result<Option<T>> {
        self.call(store, request).await?.error_for_status()?.json()
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        store: &CredentialStore,
        endpoint: &str,
    ) -> Result<Option<T>> {
        self.call_json(store, ApiRequest::get(endpoint)).await
    }

    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        store: &CredentialStore,
        endpoint: &str,
        body: &B,
    ) -> Result<Option<T>> {
        let request = ApiRequest::new(reqwest::Method::POST, endpoint).json(body)?;
        self.call_json(store, request).await
    }

    pub async fn patch<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        store: &CredentialStore,
        endpoint: &str,
        body: &B,
    ) -> Result<Option<T>> {
        let request = ApiRequest::new(reqwest::Method::PATCH, endpoint).json(body)?;
        self.call_json(store, request).await
    }

    pub async fn delete<T: DeserializeOwned>(
        &self,
        store: &CredentialStore,
        endpoint: &str,
    ) -> Result<Option<T>> {
        self.call_json(store, ApiRequest::delete(endpoint)).await
    }

    async fn send(&self, attempt: &RequestAttempt<'_>, credential: &Credential) -> Result<ApiResponse> {
        let request = attempt.request;
        let mut builder = self
            .http
            .request(request.method.clone(), self.resolve(&request.endpoint))
            .headers(request.headers.clone())
            .header(AUTHORIZATION, credential.bearer());

        if let Some(body) = &request.body {
            if !request.headers.contains_key(CONTENT_TYPE) {
                builder = builder.header(CONTENT_TYPE, "application/json");
            }
            builder = builder.body(body.clone());
        }
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await.map_err(|e| {
            warn!(attempt = attempt.number(), error = %e, "backend request failed");
            Error::Network(e.to_string())
        })?;
        debug!(attempt = attempt.number(), status = %response.status(), "backend responded");
        ApiResponse::read(response).await
    }

    /// Obtain a credential newer than `stale`, or end the session.
    async fn renew(&self, store: &CredentialStore, stale: &Credential) -> Result<Credential> {
        if stale.refresh_token().is_none() {
            warn!(subject_id = %stale.subject.id, "401 without refresh token, ending session");
            store.clear();
            return Err(Error::SessionExpired);
        }

        if !self.single_flight {
            return self.refresh_once(store, stale).await;
        }

        let _guard = store.refresh_guard().lock().await;
        match store.get() {
            None => {
                // Another call's refresh was rejected, or the user logged out
                debug!("session ended while waiting for refresh");
                Err(Error::SessionExpired)
            }
            Some(current) if !current.same_tokens(stale) => {
                debug!(subject_id = %current.subject.id, "reusing tokens rotated by a concurrent call");
                record_refresh("coalesced");
                Ok(current)
            }
            Some(_) => self.refresh_once(store, stale).await,
        }
    }

    async fn refresh_once(&self, store: &CredentialStore, stale: &Credential) -> Result<Credential> {
        let Some(refresh) = stale.refresh_token() else {
            store.clear();
            return Err(Error::SessionExpired);
        };

        match self.refresher.refresh(refresh, &stale.subject.id).await {
            Ok(pair) => {
                let fresh = stale.rotate(pair);
                store.set(fresh.clone());
                record_refresh("success");
                info!(subject_id = %fresh.subject.id, "access token refreshed");
                Ok(fresh)
            }
            Err(session_auth::Error::Http(msg)) => {
                record_refresh("network");
                warn!(subject_id = %stale.subject.id, error = %msg, "refresh request failed in transport");
                Err(Error::Network(msg))
            }
            Err(e) => {
                record_refresh("rejected");
                warn!(subject_id = %stale.subject.id, error = %e, "refresh rejected, ending session");
                store.clear();
                Err(Error::SessionExpired)
            }
        }
    }

    fn resolve(&self, endpoint: &str) -> String {
        if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            endpoint.to_string()
        } else {
            endpoint_url(&self.base_url, endpoint)
        }
    }
}


#[cfg(test)]
mod tests_support {
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use session_auth::TokenPair;

    use crate::refresh::TokenRefresher;

    /// Refresher that always hands out the same pair without touching the network.
    pub struct FixedRefresher {
        access: String,
        refresh: String,
        calls: AtomicUsize,
    }

    impl FixedRefresher {
        pub fn new(access: &str, refresh: &str) -> Self {
            Self {
                access: access.into(),
                refresh: refresh.into(),
                calls: AtomicUsize::new(0),
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl TokenRefresher for FixedRefresher {
        fn refresh<'a>(
            &'a self,
            _refresh_token: &'a str,
            _subject_id: &'a str,
        ) -> Pin<Box<dyn Future<Output = session_auth::Result<TokenPair>> + Send + 'a>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let pair = TokenPair {
                access_token: self.access.clone(),
                refresh_token: self.refresh.clone(),
            };
            Box::pin(async move { Ok(pair) })
        }
    }
}
