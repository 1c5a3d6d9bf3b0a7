//! Token refresh procedure
//!
//! The pipeline depends on the `TokenRefresher` trait rather than on HTTP
//! directly, so tests and alternative issuers can be injected. One
//! `refresh()` call is one issuer round-trip; nothing here retries.

use std::future::Future;
use std::pin::Pin;

use session_auth::TokenPair;

/// Exchanges a refresh token for a new token pair.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility
/// (`Arc<dyn TokenRefresher>`). Implementations report a non-2xx issuer
/// answer as `session_auth::Error::RefreshRejected` and a transport failure
/// as `session_auth::Error::Http`.
pub trait TokenRefresher: Send + Sync {
    fn refresh<'a>(
        &'a self,
        refresh_token: &'a str,
        subject_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = session_auth::Result<TokenPair>> + Send + 'a>>;
}

/// Refresher backed by the backend's `/auth/refresh` endpoint.
pub struct HttpRefresher {
    client: reqwest::Client,
    api_url: String,
}

impl HttpRefresher {
    pub fn new(client: reqwest::Client, api_url: impl Into<String>) -> Self {
        Self {
            client,
            api_url: api_url.into(),
        }
    }
}

impl TokenRefresher for HttpRefresher {
    fn refresh<'a>(
        &'a self,
        refresh_token: &'a str,
        subject_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = session_auth::Result<TokenPair>> + Send + 'a>> {
        Box::pin(session_auth::refresh_token(
            &self.client,
            &self.api_url,
            refresh_token,
            subject_id,
        ))
    }
}

/// Count a refresh outcome: `success`, `rejected`, `network` or `coalesced`.
pub fn record_refresh(outcome: &'static str) {
    metrics::counter!("session_refresh_total", "outcome" => outcome).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_exporter_prometheus::PrometheusBuilder;

    #[test]
    fn record_refresh_does_not_panic_without_recorder() {
        record_refresh("success");
    }

    #[test]
    fn record_refresh_labels_outcome() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        let _guard = metrics::set_default_local_recorder(&recorder);

        record_refresh("rejected");
        record_refresh("coalesced");

        let output = handle.render();
        assert!(output.contains("session_refresh_total"));
        assert!(output.contains("outcome=\"rejected\""));
        assert!(output.contains("outcome=\"coalesced\""));
    }

    #[tokio::test]
    async fn http_refresher_reports_transport_failure() {
        let refresher = HttpRefresher::new(reqwest::Client::new(), "http://127.0.0.1:1");
        let err = refresher.refresh("R1", "7").await.unwrap_err();
        assert!(matches!(err, session_auth::Error::Http(_)), "got: {err:?}");
    }
}
