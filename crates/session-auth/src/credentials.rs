//! In-memory credential store for one console session
//!
//! The store is a `tokio::sync::watch` channel holding `Option<Credential>`.
//! Reads borrow the current value synchronously, writes replace it
//! wholesale, and every subscriber sees each replacement. Nothing here
//! performs I/O, so both the request pipeline and the route gate can read
//! it without suspending.
//!
//! Concurrent `set()` calls are last-writer-wins. `clear()` has replaced the
//! value by the time it returns, so no reader observes a cleared credential
//! afterwards.

use std::time::{SystemTime, UNIX_EPOCH};

use common::Secret;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, watch};
use tracing::debug;

use crate::token::TokenPair;

/// Current time as a unix timestamp in milliseconds.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Identity of the signed-in user as reported by the issuer at login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    pub id: String,
    pub name: String,
    pub email: String,
}

/// Access/refresh token pair plus the subject it was issued to.
///
/// The token fields are private: the pair can only be replaced as a unit
/// through `rotate()`, never one token at a time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credential {
    access: Secret<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    refresh: Option<Secret<String>>,
    pub subject: Subject,
    /// Unix timestamp in milliseconds of the login or last refresh
    pub issued_at: u64,
}

impl Credential {
    /// Build a credential issued now. An empty refresh token is treated as absent.
    pub fn issue(access: String, refresh: Option<String>, subject: Subject) -> Self {
        Self::with_issued_at(access, refresh, subject, now_millis())
    }

    pub fn with_issued_at(
        access: String,
        refresh: Option<String>,
        subject: Subject,
        issued_at: u64,
    ) -> Self {
        Self {
            access: Secret::new(access),
            refresh: refresh
                .filter(|r| !r.trim().is_empty())
                .map(Secret::new),
            subject,
            issued_at,
        }
    }

    pub fn access_token(&self) -> &str {
        self.access.expose()
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh.as_ref().map(|r| r.expose().as_str())
    }

    /// Value for the `Authorization` header.
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.access.expose())
    }

    /// Replace both tokens with a freshly issued pair, keeping the subject.
    pub fn rotate(&self, pair: TokenPair) -> Self {
        Self::issue(pair.access_token, Some(pair.refresh_token), self.subject.clone())
    }

    /// Whether `other` carries the same token pair as `self`.
    pub fn same_tokens(&self, other: &Credential) -> bool {
        self.access == other.access && self.refresh == other.refresh
    }
}

/// Read-only projection handed to the rest of the application.
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub subject: Option<Subject>,
    pub access_token: Option<Secret<String>>,
    pub is_authenticated: bool,
}

impl SessionView {
    pub fn anonymous() -> Self {
        Self {
            subject: None,
            access_token: None,
            is_authenticated: false,
        }
    }
}

/// Holds the credential of a single session.
///
/// `refresh_guard` is only taken by the request pipeline when single-flight
/// refresh is enabled; plain reads and writes never touch it.
pub struct CredentialStore {
    state: watch::Sender<Option<Credential>>,
    refresh_guard: Mutex<()>,
}

impl CredentialStore {
    pub fn new() -> Self {
        let (state, _) = watch::channel(None);
        Self {
            state,
            refresh_guard: Mutex::new(()),
        }
    }

    pub fn with_credential(credential: Credential) -> Self {
        let store = Self::new();
        store.set(credential);
        store
    }

    /// Clone of the current credential, if any.
    pub fn get(&self) -> Option<Credential> {
        self.state.borrow().clone()
    }

    /// Replace the stored credential. The previous one is dropped.
    pub fn set(&self, credential: Credential) {
        debug!(subject_id = %credential.subject.id, "credential stored");
        self.state.send_replace(Some(credential));
    }

    /// Drop the stored credential, returning it if one was present.
    pub fn clear(&self) -> Option<Credential> {
        let previous = self.state.send_replace(None);
        if let Some(ref credential) = previous {
            debug!(subject_id = %credential.subject.id, "credential cleared");
        }
        previous
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.borrow().is_some()
    }

    pub fn view(&self) -> SessionView {
        match &*self.state.borrow() {
            Some(credential) => SessionView {
                subject: Some(credential.subject.clone()),
                access_token: Some(credential.access.clone()),
                is_authenticated: true,
            },
            None => SessionView::anonymous(),
        }
    }

    /// Receiver that observes every `set()`/`clear()` from now on.
    pub fn subscribe(&self) -> watch::Receiver<Option<Credential>> {
        self.state.subscribe()
    }

    pub fn refresh_guard(&self) -> &Mutex<()> {
        &self.refresh_guard
    }
}

impl Default for CredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn subject() -> Subject {
        Subject {
            id: "7".into(),
            name: "admin".into(),
            email: "admin@example.com".into(),
        }
    }

    fn credential(suffix: &str) -> Credential {
        Credential::with_issued_at(
            format!("A{suffix}"),
            Some(format!("R{suffix}")),
            subject(),
            1_735_500_000_000,
        )
    }

    #[test]
    fn empty_store_is_unauthenticated() {
        let store = CredentialStore::new();
        assert!(store.get().is_none());
        assert!(!store.is_authenticated());

        let view = store.view();
        assert!(!view.is_authenticated);
        assert!(view.subject.is_none());
        assert!(view.access_token.is_none());
    }

    #[test]
    fn set_then_get_returns_credential() {
        let store = CredentialStore::new();
        store.set(credential("1"));

        let cred = store.get().unwrap();
        assert_eq!(cred.access_token(), "A1");
        assert_eq!(cred.refresh_token(), Some("R1"));
        assert_eq!(cred.bearer(), "Bearer A1");
        assert!(store.is_authenticated());
    }

    #[test]
    fn clear_removes_both_tokens() {
        let store = CredentialStore::with_credential(credential("1"));
        let removed = store.clear();

        assert_eq!(removed.unwrap().access_token(), "A1");
        assert!(store.get().is_none());
        assert!(!store.is_authenticated());
        assert!(store.clear().is_none(), "second clear has nothing to remove");
    }

    #[test]
    fn last_set_wins() {
        let store = CredentialStore::new();
        store.set(credential("1"));
        store.set(credential("2"));
        assert_eq!(store.get().unwrap().access_token(), "A2");
    }

    #[test]
    fn rotate_replaces_pair_and_keeps_subject() {
        let original = credential("1");
        let rotated = original.rotate(TokenPair {
            access_token: "A2".into(),
            refresh_token: "R2".into(),
        });

        assert_eq!(rotated.access_token(), "A2");
        assert_eq!(rotated.refresh_token(), Some("R2"));
        assert_eq!(rotated.subject, original.subject);
        assert!(!rotated.same_tokens(&original));
        assert!(original.same_tokens(&original.clone()));
    }

    #[test]
    fn blank_refresh_token_is_absent() {
        let cred = Credential::issue("A1".into(), Some("".into()), subject());
        assert_eq!(cred.refresh_token(), None);
    }

    #[test]
    fn debug_output_redacts_tokens() {
        let debug = format!("{:?}", credential("1"));
        assert!(!debug.contains("A1"), "got: {debug}");
        assert!(!debug.contains("R1"), "got: {debug}");
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn view_projects_subject_and_token() {
        let store = CredentialStore::with_credential(credential("1"));
        let view = store.view();
        assert!(view.is_authenticated);
        assert_eq!(view.subject.unwrap().email, "admin@example.com");
        assert_eq!(view.access_token.unwrap().expose(), "A1");
    }

    #[test]
    fn view_serializes_read_surface() {
        let store = CredentialStore::with_credential(credential("1"));
        let json = serde_json::to_value(store.view()).unwrap();
        assert_eq!(json["is_authenticated"], true);
        assert_eq!(json["access_token"], "A1");
        assert_eq!(json["subject"]["id"], "7");
    }

    #[test]
    fn credential_roundtrips_through_json() {
        let json = serde_json::to_string(&credential("1")).unwrap();
        let back: Credential = serde_json::from_str(&json).unwrap();
        assert!(back.same_tokens(&credential("1")));
        assert_eq!(back.issued_at, 1_735_500_000_000);
    }

    #[tokio::test]
    async fn subscribers_observe_clear() {
        let store = CredentialStore::with_credential(credential("1"));
        let mut rx = store.subscribe();

        store.clear();
        rx.changed().await.unwrap();
        assert!(rx.borrow().is_none());
    }

    #[tokio::test]
    async fn concurrent_sets_leave_one_complete_credential() {
        let store = Arc::new(CredentialStore::new());

        let mut handles = vec![];
        for i in 0..10 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.set(credential(&i.to_string()));
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let cred = store.get().unwrap();
        // Whichever write won, its access and refresh tokens belong together
        let suffix = cred.access_token().trim_start_matches('A').to_string();
        assert_eq!(cred.refresh_token(), Some(format!("R{suffix}").as_str()));
    }
}
