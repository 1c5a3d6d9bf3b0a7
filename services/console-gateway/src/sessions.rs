//! Per-browser session registry
//!
//! Each browser holds an opaque session id in a cookie; the registry maps it
//! to that session's `CredentialStore`. A watcher task per session follows
//! the store through `subscribe()`: every rotation is persisted, and a
//! cleared store (logout, rejected refresh) is dropped from the registry.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Weak};

use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::{Cookie, SameSite};
use session_auth::{Credential, CredentialStore};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<CredentialStore>>>,
    state_file: Option<PathBuf>,
    /// Serializes snapshot + write so the file always ends on the latest state
    write_lock: Mutex<()>,
}

impl SessionRegistry {
    /// Registry that lives only as long as the process.
    pub fn in_memory() -> Arc<Self> {
        Arc::new(Self {
            sessions: RwLock::new(HashMap::new()),
            state_file: None,
            write_lock: Mutex::new(()),
        })
    }

    /// Registry backed by `state_file`, reloading whatever it holds.
    pub async fn load(state_file: Option<PathBuf>) -> session_auth::Result<Arc<Self>> {
        let Some(path) = state_file else {
            return Ok(Self::in_memory());
        };

        let stored = session_auth::persist::load_sessions(&path).await?;
        let registry = Arc::new(Self {
            sessions: RwLock::new(HashMap::new()),
            state_file: Some(path),
            write_lock: Mutex::new(()),
        });

        {
            let mut sessions = registry.sessions.write().await;
            for (id, credential) in stored {
                let store = Arc::new(CredentialStore::with_credential(credential));
                registry.watch(id.clone(), &store);
                sessions.insert(id, store);
            }
        }
        Ok(registry)
    }

    /// Start a new session holding `credential`. Returns the session id.
    pub async fn create(self: &Arc<Self>, credential: Credential) -> (String, Arc<CredentialStore>) {
        let id = uuid::Uuid::new_v4().as_simple().to_string();
        let subject_id = credential.subject.id.clone();
        let store = Arc::new(CredentialStore::with_credential(credential));
        self.watch(id.clone(), &store);
        self.sessions.write().await.insert(id.clone(), store.clone());
        info!(subject_id = %subject_id, "session created");
        self.persist().await;
        (id, store)
    }

    pub async fn get(&self, id: &str) -> Option<Arc<CredentialStore>> {
        self.sessions.read().await.get(id).cloned()
    }

    /// Drop a session. Its watcher ends once the last store handle is gone.
    pub async fn remove(&self, id: &str) -> Option<Arc<CredentialStore>> {
        let removed = self.sessions.write().await.remove(id);
        if removed.is_some() {
            debug!("session removed");
            self.persist().await;
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn authenticated_count(&self) -> usize {
        self.sessions
            .read()
            .await
            .values()
            .filter(|store| store.is_authenticated())
            .count()
    }

    /// Write every signed-in session to the state file, if one is configured.
    pub async fn save(&self) -> session_auth::Result<()> {
        let Some(path) = &self.state_file else {
            return Ok(());
        };

        let _guard = self.write_lock.lock().await;
        let snapshot: HashMap<String, Credential> = self
            .sessions
            .read()
            .await
            .iter()
            .filter_map(|(id, store)| store.get().map(|credential| (id.clone(), credential)))
            .collect();
        session_auth::persist::write_atomic(path, &snapshot).await
    }

    async fn persist(&self) {
        if let Err(e) = self.save().await {
            warn!(error = %e, "failed to persist sessions");
        }
    }

    /// Follow `store` until it is dropped, persisting rotations and dropping
    /// the session once its credential is cleared.
    fn watch(self: &Arc<Self>, id: String, store: &CredentialStore) {
        let mut changes = store.subscribe();
        let registry: Weak<Self> = Arc::downgrade(self);

        tokio::spawn(async move {
            while changes.changed().await.is_ok() {
                let cleared = changes.borrow_and_update().is_none();
                let Some(registry) = registry.upgrade() else {
                    break;
                };
                if cleared {
                    registry.remove(&id).await;
                    break;
                }
                registry.persist().await;
            }
        });
    }
}

/// Session id carried by the request's cookie, if any.
pub fn session_id(jar: &CookieJar, cookie_name: &str) -> Option<String> {
    jar.get(cookie_name)
        .map(|cookie| cookie.value().to_string())
        .filter(|value| !value.is_empty())
}

pub fn session_cookie(cookie_name: &str, id: String) -> Cookie<'static> {
    Cookie::build((cookie_name.to_string(), id))
        .http_only(true)
        .same_site(SameSite::Lax)
        .path("/")
        .build()
}

/// Removal cookie matching the attributes `session_cookie()` set.
pub fn expired_cookie(cookie_name: &str) -> Cookie<'static> {
    Cookie::build((cookie_name.to_string(), "")).path("/").build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use session_auth::Subject;
    use session_auth::TokenPair;
    use std::time::Duration;

    fn credential(access: &str, refresh: &str) -> Credential {
        Credential::issue(
            access.into(),
            Some(refresh.into()),
            Subject {
                id: "7".into(),
                name: "admin".into(),
                email: "admin@example.com".into(),
            },
        )
    }

    const POLL: Duration = Duration::from_millis(10);

    #[tokio::test]
    async fn create_and_get() {
        let registry = SessionRegistry::in_memory();
        let (id, store) = registry.create(credential("A1", "R1")).await;

        assert_eq!(id.len(), 32, "simple uuid form");
        let found = registry.get(&id).await.unwrap();
        assert!(Arc::ptr_eq(&found, &store));
        assert_eq!(registry.len().await, 1);
        assert_eq!(registry.authenticated_count().await, 1);
        assert!(registry.get("unknown").await.is_none());
    }

    #[tokio::test]
    async fn session_ids_are_unique() {
        let registry = SessionRegistry::in_memory();
        let (a, _) = registry.create(credential("A1", "R1")).await;
        let (b, _) = registry.create(credential("A1", "R1")).await;
        assert_ne!(a, b);
        assert_eq!(registry.len().await, 2);
    }

    #[tokio::test]
    async fn cleared_store_is_dropped_from_registry() {
        let registry = SessionRegistry::in_memory();
        let (id, store) = registry.create(credential("A1", "R1")).await;

        store.clear();
        drop(store);
        for _ in 0..200 {
            if registry.get(&id).await.is_none() {
                break;
            }
            tokio::time::sleep(POLL).await;
        }
        assert!(registry.get(&id).await.is_none());

        assert_eq!(registry.len().await, 0);
    }

    #[tokio::test]
    async fn remove_returns_store() {
        let registry = SessionRegistry::in_memory();
        let (id, _) = registry.create(credential("A1", "R1")).await;
        assert!(registry.remove(&id).await.is_some());
        assert!(registry.remove(&id).await.is_none());
    }

    #[tokio::test]
    async fn rotation_is_persisted_and_reloaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions.json");

        let registry = SessionRegistry::load(Some(path.clone())).await.unwrap();
        let (id, store) = registry.create(credential("A1", "R1")).await;

        let rotated = store.get().unwrap().rotate(TokenPair {
            access_token: "A2".into(),
            refresh_token: "R2".into(),
        });
        store.set(rotated);
        // The watcher persists asynchronously
        for _ in 0..200 {
            let contents = tokio::fs::read_to_string(&path).await.unwrap_or_default();
            if contents.contains("A2") {
                break;
            }
            tokio::time::sleep(POLL).await;
        }

        let reloaded = SessionRegistry::load(Some(path)).await.unwrap();
        let restored = reloaded.get(&id).await.unwrap().get().unwrap();
        assert_eq!(restored.access_token(), "A2");
        assert_eq!(restored.refresh_token(), Some("R2"));
        assert_eq!(restored.subject.id, "7");
    }

    #[tokio::test]
    async fn removed_session_is_not_reloaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions.json");

        let registry = SessionRegistry::load(Some(path.clone())).await.unwrap();
        let (gone, _) = registry.create(credential("A1", "R1")).await;
        let (kept, _) = registry.create(credential("B1", "S1")).await;
        registry.remove(&gone).await;

        let reloaded = SessionRegistry::load(Some(path)).await.unwrap();
        assert!(reloaded.get(&gone).await.is_none());
        assert!(reloaded.get(&kept).await.is_some());
    }

    #[tokio::test]
    async fn in_memory_save_is_noop() {
        let registry = SessionRegistry::in_memory();
        registry.create(credential("A1", "R1")).await;
        assert!(registry.save().await.is_ok());
    }

    #[test]
    fn session_id_ignores_empty_cookie() {
        let jar = CookieJar::new().add(Cookie::new("console_session", ""));
        assert!(session_id(&jar, "console_session").is_none());

        let jar = CookieJar::new().add(Cookie::new("console_session", "abc"));
        assert_eq!(session_id(&jar, "console_session").as_deref(), Some("abc"));
        assert!(session_id(&jar, "other").is_none());
    }

    #[test]
    fn session_cookie_attributes() {
        let cookie = session_cookie("console_session", "abc".into());
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(cookie.value(), "abc");
    }
}
