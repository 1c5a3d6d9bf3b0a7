//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! The backend API URL may be overridden with `CONSOLE_API_URL` so the same
//! file can be used across environments.

use route_gate::{DEFAULT_PROTECTED_PREFIXES, RouteRule, RouteTable};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub routes: RoutesConfig,
    #[serde(default)]
    pub sessions: SessionsConfig,
}

/// Inbound listener and frontend forwarding
#[derive(Debug, Deserialize)]
pub struct GatewayConfig {
    pub listen_addr: SocketAddr,
    /// Where permitted navigations are forwarded (the console frontend)
    pub frontend_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

/// Backend REST API (also the token issuer)
#[derive(Debug, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,
}

/// Route classification for the navigation gate
#[derive(Debug, Deserialize)]
pub struct RoutesConfig {
    #[serde(default = "default_sign_in_path")]
    pub sign_in_path: String,
    #[serde(default = "default_landing_path")]
    pub landing_path: String,
    #[serde(default = "default_rules")]
    pub rules: Vec<RouteRule>,
}

/// Session cookie and persistence
#[derive(Debug, Deserialize)]
pub struct SessionsConfig {
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,
    /// Optional JSON file that keeps sessions across restarts
    #[serde(default)]
    pub state_file: Option<PathBuf>,
    #[serde(default = "default_single_flight")]
    pub single_flight_refresh: bool,
}

fn default_timeout() -> u64 {
    30
}

fn default_max_connections() -> usize {
    1000
}

fn default_api_url() -> String {
    session_auth::DEFAULT_API_URL.to_string()
}

fn default_sign_in_path() -> String {
    "/login".to_string()
}

fn default_landing_path() -> String {
    "/dashboard".to_string()
}

fn default_rules() -> Vec<RouteRule> {
    DEFAULT_PROTECTED_PREFIXES
        .iter()
        .map(|p| RouteRule::protected(*p))
        .collect()
}

fn default_cookie_name() -> String {
    "console_session".to_string()
}

fn default_single_flight() -> bool {
    true
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
        }
    }
}

impl Default for RoutesConfig {
    fn default() -> Self {
        Self {
            sign_in_path: default_sign_in_path(),
            landing_path: default_landing_path(),
            rules: default_rules(),
        }
    }
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            cookie_name: default_cookie_name(),
            state_file: None,
            single_flight_refresh: default_single_flight(),
        }
    }
}

fn require_http_url(field: &str, value: &str) -> common::Result<()> {
    if value.starts_with("http://") || value.starts_with("https://") {
        return Ok(());
    }
    Err(common::Error::Config(format!(
        "{field} must start with http:// or https://, got: {value}"
    )))
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        if let Ok(url) = std::env::var("CONSOLE_API_URL") {
            let url = url.trim().to_owned();
            if !url.is_empty() {
                config.backend.api_url = url;
            }
        }

        require_http_url("frontend_url", &config.gateway.frontend_url)?;
        require_http_url("api_url", &config.backend.api_url)?;

        if config.gateway.timeout_secs == 0 {
            return Err(common::Error::Config(
                "timeout_secs must be greater than 0".into(),
            ));
        }

        if config.gateway.max_connections == 0 {
            return Err(common::Error::Config(
                "max_connections must be greater than 0".into(),
            ));
        }

        if config.sessions.cookie_name.trim().is_empty() {
            return Err(common::Error::Config(
                "cookie_name must not be empty".into(),
            ));
        }

        // Surfaces prefix/path errors at load time rather than at first navigation
        config.route_table()?;

        Ok(config)
    }

    /// Build the immutable route table from the `[routes]` section.
    pub fn route_table(&self) -> common::Result<RouteTable> {
        RouteTable::new(
            self.routes.rules.clone(),
            self.routes.sign_in_path.clone(),
            self.routes.landing_path.clone(),
        )
        .map_err(|e| common::Error::Config(e.to_string()))
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("console-gateway.toml")
    }
}
