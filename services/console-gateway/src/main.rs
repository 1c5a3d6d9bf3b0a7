//! Console Session Gateway
//!
//! Single-binary service in front of the admin console that:
//! 1. Signs users in against the backend and keeps their tokens server-side
//! 2. Gates page navigations on the route table, redirecting to sign-in
//! 3. Relays `/api/*` calls to the backend, refreshing expired tokens once

mod auth;
mod config;
mod error;
mod metrics;
mod navigation;
mod proxy;
mod service;
mod sessions;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::{any, get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use route_gate::RouteTable;
use session_client::{HttpRefresher, Pipeline};
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::service::{DRAIN_TIMEOUT, ServiceMetrics};
use crate::sessions::SessionRegistry;

/// Shared application state accessible from all handlers
#[derive(Clone)]
struct AppState {
    http: reqwest::Client,
    pipeline: Arc<Pipeline>,
    routes: Arc<RouteTable>,
    sessions: Arc<SessionRegistry>,
    frontend_url: String,
    cookie_name: String,
    metrics: ServiceMetrics,
    prometheus: PrometheusHandle,
}

/// Build the axum router with all routes and shared state.
///
/// Anything not matched by an explicit route is treated as a page
/// navigation and goes through the route gate.
fn build_router(state: AppState, max_connections: usize) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/auth/login", post(auth::login_handler))
        .route("/auth/logout", post(auth::logout_handler))
        .route("/auth/session", get(auth::session_handler))
        .route("/api/{*path}", any(proxy::api_handler))
        .fallback(navigation::navigation_handler)
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            metrics::track_requests,
        ))
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_connections))
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("starting console-gateway");

    // Install Prometheus metrics recorder before any metrics are emitted
    let prometheus_handle =
        metrics::install_recorder().context("failed to install Prometheus recorder")?;

    // CLI: simple --config flag parsing
    let args: Vec<String> = std::env::args().collect();
    let cli_config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());

    let config_path = Config::resolve_path(cli_config_path);
    info!(path = %config_path.display(), "loading configuration");

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;
    let routes = config.route_table().context("invalid route table")?;

    info!(
        listen_addr = %config.gateway.listen_addr,
        frontend_url = %config.gateway.frontend_url,
        api_url = %config.backend.api_url,
        rules = routes.rules().len(),
        single_flight_refresh = config.sessions.single_flight_refresh,
        "configuration loaded"
    );

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.gateway.timeout_secs))
        .build()
        .context("failed to build HTTP client")?;

    let refresher = Arc::new(HttpRefresher::new(http.clone(), config.backend.api_url.clone()));
    let pipeline = Pipeline::new(http.clone(), config.backend.api_url.clone(), refresher)
        .with_single_flight(config.sessions.single_flight_refresh);

    let sessions = SessionRegistry::load(config.sessions.state_file.clone())
        .await
        .context("failed to load sessions")?;
    info!(sessions = sessions.len().await, "session registry ready");

    let metrics = ServiceMetrics::new();
    let app_state = AppState {
        http,
        pipeline: Arc::new(pipeline),
        routes: Arc::new(routes),
        sessions: sessions.clone(),
        frontend_url: config.gateway.frontend_url.clone(),
        cookie_name: config.sessions.cookie_name.clone(),
        metrics: metrics.clone(),
        prometheus: prometheus_handle,
    };

    let app = build_router(app_state, config.gateway.max_connections);

    let listen_addr = config.gateway.listen_addr;
    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind to {listen_addr}"))?;
    info!(addr = %listen_addr, "accepting requests");

    let in_flight = metrics.in_flight.clone();

    // The drain timeout starts when the shutdown signal fires, not when the
    // server starts: notify the server to drain, then race it against the timer.
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    shutdown_signal().await;
    let _ = shutdown_tx.send(());

    match tokio::time::timeout(DRAIN_TIMEOUT, server_handle).await {
        Ok(Ok(Ok(()))) => {
            info!("all in-flight requests drained");
        }
        Ok(Ok(Err(e))) => {
            error!(error = %e, "server error during shutdown");
        }
        Ok(Err(e)) => {
            error!(error = %e, "server task panicked");
        }
        Err(_) => {
            let remaining = in_flight.load(Ordering::Relaxed);
            warn!(
                remaining,
                drain_timeout_secs = DRAIN_TIMEOUT.as_secs(),
                "drain timeout exceeded, forcing shutdown"
            );
        }
    }

    if let Err(e) = sessions.save().await {
        error!(error = %e, "failed to persist sessions on shutdown");
    }

    info!("shutdown complete");
    Ok(())
}

/// Health summary: uptime, request counters and session counts.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let body = serde_json::json!({
        "status": "healthy",
        "uptime_seconds": state.metrics.started_at.elapsed().as_secs(),
        "requests_served": state.metrics.requests_total.load(Ordering::Relaxed),
        "errors_total": state.metrics.errors_total.load(Ordering::Relaxed),
        "sessions": state.sessions.len().await,
        "authenticated_sessions": state.sessions.authenticated_count().await,
    });

    (
        axum::http::StatusCode::OK,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
}

/// Prometheus metrics endpoint in text exposition format.
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        axum::http::StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.prometheus.render(),
    )
}

/// Wait for SIGTERM or SIGINT for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
