//! Route classification and the per-navigation authorize decision
//!
//! Evaluation order:
//! 1. Sign-in path with a credential present -> forward to the landing page
//! 2. Most specific matching rule (longest prefix, first declared on a tie)
//! 3. Protected without a credential -> redirect to sign-in, else permit
//!
//! Prefixes match on path-segment boundaries: `/users` covers `/users` and
//! `/users/5/assign-role`, not `/usersettings`. Paths are matched in their
//! canonical form (see [`normalize_path`]).

use serde::Deserialize;
use tracing::debug;

use crate::error::{Error, Result};
use crate::path::normalize_path;

/// Prefixes protected when the configuration names none.
pub const DEFAULT_PROTECTED_PREFIXES: &[&str] = &[
    "/dashboard",
    "/users",
    "/roles",
    "/permissions",
    "/audit-logs",
];

const DEFAULT_SIGN_IN_PATH: &str = "/login";
const DEFAULT_LANDING_PATH: &str = "/dashboard";

/// One classification entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RouteRule {
    pub prefix: String,
    pub protected: bool,
}

impl RouteRule {
    pub fn protected(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            protected: true,
        }
    }

    pub fn open(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            protected: false,
        }
    }

    /// Length of the matched prefix, or `None` when `path` is outside it.
    fn match_len(&self, path: &str) -> Option<usize> {
        let prefix = self.prefix.trim_end_matches('/');
        if prefix.is_empty() {
            // "/" covers every path
            return Some(0);
        }
        let rest = path.strip_prefix(prefix)?;
        if rest.is_empty() || rest.starts_with('/') {
            Some(prefix.len())
        } else {
            None
        }
    }
}

/// Outcome of one navigation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Permit,
    /// Protected route without a credential; `location` is the sign-in path
    DenyWithRedirect { location: String },
    /// Signed-in user on the sign-in page; `location` is the landing page
    Forward { location: String },
}

impl Decision {
    pub fn is_permitted(&self) -> bool {
        matches!(self, Decision::Permit)
    }

    /// Label for metrics and logs.
    pub fn label(&self) -> &'static str {
        match self {
            Decision::Permit => "permit",
            Decision::DenyWithRedirect { .. } => "deny",
            Decision::Forward { .. } => "forward",
        }
    }
}

/// Immutable route classification, built once at startup.
#[derive(Debug, Clone)]
pub struct RouteTable {
    rules: Vec<RouteRule>,
    sign_in_path: String,
    landing_path: String,
}

impl RouteTable {
    /// Build a table, validating that every prefix and path is absolute.
    pub fn new(
        rules: Vec<RouteRule>,
        sign_in_path: impl Into<String>,
        landing_path: impl Into<String>,
    ) -> Result<Self> {
        let sign_in_path = sign_in_path.into();
        let landing_path = landing_path.into();

        if let Some(rule) = rules.iter().find(|r| !r.prefix.starts_with('/')) {
            return Err(Error::InvalidPrefix(rule.prefix.clone()));
        }
        if !sign_in_path.starts_with('/') {
            return Err(Error::InvalidPath {
                field: "sign_in_path",
                value: sign_in_path,
            });
        }
        if !landing_path.starts_with('/') {
            return Err(Error::InvalidPath {
                field: "landing_path",
                value: landing_path,
            });
        }

        Ok(Self {
            rules,
            sign_in_path,
            landing_path,
        })
    }

    /// Default console table: five protected sections, sign-in at `/login`.
    pub fn console_default() -> Self {
        Self {
            rules: DEFAULT_PROTECTED_PREFIXES
                .iter()
                .map(|p| RouteRule::protected(*p))
                .collect(),
            sign_in_path: DEFAULT_SIGN_IN_PATH.to_string(),
            landing_path: DEFAULT_LANDING_PATH.to_string(),
        }
    }

    pub fn sign_in_path(&self) -> &str {
        &self.sign_in_path
    }

    pub fn landing_path(&self) -> &str {
        &self.landing_path
    }

    pub fn rules(&self) -> &[RouteRule] {
        &self.rules
    }

    /// Whether `path` falls under a protected rule.
    pub fn is_protected(&self, path: &str) -> bool {
        self.classify(path).is_some_and(|rule| rule.protected)
    }

    /// Most specific rule covering `path`. Paths covered by no rule are open.
    pub fn classify(&self, path: &str) -> Option<&RouteRule> {
        let path = normalize_path(path);
        let mut best: Option<(usize, &RouteRule)> = None;
        for rule in &self.rules {
            if let Some(len) = rule.match_len(&path) {
                // Strictly longer only: an equal-length later rule never displaces an earlier one
                if best.is_none_or(|(best_len, _)| len > best_len) {
                    best = Some((len, rule));
                }
            }
        }
        best.map(|(_, rule)| rule)
    }

    /// Decide one navigation.
    pub fn authorize(&self, path: &str, credential_present: bool) -> Decision {
        let path = normalize_path(path);
        let path = path.as_str();
        if credential_present && self.is_sign_in(path) {
            debug!(path, location = %self.landing_path, "signed-in user on sign-in page");
            return Decision::Forward {
                location: self.landing_path.clone(),
            };
        }

        if !credential_present && self.is_protected(path) {
            debug!(path, location = %self.sign_in_path, "protected route without credential");
            return Decision::DenyWithRedirect {
                location: self.sign_in_path.clone(),
            };
        }

        Decision::Permit
    }

    fn is_sign_in(&self, path: &str) -> bool {
        trim_trailing_slash(path) == trim_trailing_slash(&self.sign_in_path)
    }
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::console_default()
    }
}

fn trim_trailing_slash(path: &str) -> &str {
    match path.trim_end_matches('/') {
        "" => "/",
        trimmed => trimmed,
    }
}
