//! Session file persistence
//!
//! Signed-in sessions survive a gateway restart by being written to a JSON
//! file mapping session id to credential. All writes use temp-file + rename
//! so a crash mid-write never leaves a truncated file, and the file is
//! created with mode 0600 because it holds bearer tokens.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, info};

use crate::credentials::Credential;
use crate::error::{Error, Result};

/// Distinguishes temp files of concurrent writers within one process.
static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// Load the session map from `path`.
///
/// A missing file is a cold start: an empty `{}` file is created so later
/// loads take the normal path.
pub async fn load_sessions(path: &Path) -> Result<HashMap<String, Credential>> {
    if !path.exists() {
        info!(path = %path.display(), "session file not found, starting with no sessions");
        let sessions = HashMap::new();
        write_atomic(path, &sessions).await?;
        return Ok(sessions);
    }

    let contents = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| Error::Io(format!("reading session file: {e}")))?;
    let sessions: HashMap<String, Credential> = serde_json::from_str(&contents)
        .map_err(|e| Error::CredentialParse(format!("parsing session file: {e}")))?;
    info!(path = %path.display(), sessions = sessions.len(), "loaded sessions");
    Ok(sessions)
}

/// Write the session map to `path` atomically.
pub async fn write_atomic(path: &Path, sessions: &HashMap<String, Credential>) -> Result<()> {
    let json = serde_json::to_string_pretty(sessions)
        .map_err(|e| Error::CredentialParse(format!("serializing sessions: {e}")))?;

    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let seq = TMP_SEQ.fetch_add(1, Ordering::Relaxed);
    let tmp_path = dir.join(format!(".sessions.tmp.{}.{seq}", std::process::id()));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Io(format!("writing temp session file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Io(format!("setting session file permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Io(format!("renaming temp session file: {e}")))?;

    debug!(path = %path.display(), sessions = sessions.len(), "persisted sessions");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::Subject;

    fn credential(suffix: &str) -> Credential {
        Credential::with_issued_at(
            format!("A{suffix}"),
            Some(format!("R{suffix}")),
            Subject {
                id: suffix.into(),
                name: format!("user-{suffix}"),
                email: format!("user-{suffix}@example.com"),
            },
            1_735_500_000_000,
        )
    }

    #[tokio::test]
    async fn cold_start_creates_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions.json");

        assert!(!path.exists());
        let sessions = load_sessions(&path).await.unwrap();
        assert!(sessions.is_empty());
        assert!(path.exists());

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(contents.trim(), "{}");
    }

    #[tokio::test]
    async fn roundtrip_write_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions.json");

        let mut sessions = HashMap::new();
        sessions.insert("s-1".to_string(), credential("1"));
        sessions.insert("s-2".to_string(), credential("2"));
        write_atomic(&path, &sessions).await.unwrap();

        let loaded = load_sessions(&path).await.unwrap();
        assert_eq!(loaded.len(), 2);
        let cred = &loaded["s-1"];
        assert_eq!(cred.access_token(), "A1");
        assert_eq!(cred.refresh_token(), Some("R1"));
        assert_eq!(cred.subject.name, "user-1");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_writers_to_one_path_all_succeed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions.json");

        let mut handles = Vec::new();
        for i in 0..16 {
            let path = path.clone();
            handles.push(tokio::spawn(async move {
                let mut sessions = HashMap::new();
                sessions.insert(format!("s-{i}"), credential(&i.to_string()));
                write_atomic(&path, &sessions).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let loaded = load_sessions(&path).await.unwrap();
        assert_eq!(loaded.len(), 1);

        // No temp files left behind
        let mut entries = tokio::fs::read_dir(dir.path()).await.unwrap();
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        assert_eq!(names, vec!["sessions.json".to_string()]);
    }

    #[tokio::test]
    async fn corrupt_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions.json");
        tokio::fs::write(&path, "{not json").await.unwrap();

        let err = load_sessions(&path).await.unwrap_err();
        assert!(matches!(err, Error::CredentialParse(_)), "got: {err:?}");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn file_permissions_are_0600() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions.json");

        let mut sessions = HashMap::new();
        sessions.insert("s-1".to_string(), credential("1"));
        write_atomic(&path, &sessions).await.unwrap();

        let metadata = tokio::fs::metadata(&path).await.unwrap();
        let mode = metadata.permissions().mode() & 0o777;
        assert_eq!(mode, 0o600, "session file must be 0600, got {mode:o}");
    }
}
