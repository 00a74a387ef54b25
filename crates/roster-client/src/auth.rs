//! Persisted login session.
//!
//! The session lives in a small TOML file so the CLI and the notifier
//! daemon share one login.

use crate::error::{ApiError, ApiResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthSession {
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub logged_in_at: DateTime<Utc>,
}

impl AuthSession {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            user_id: None,
            display_name: None,
            logged_in_at: Utc::now(),
        }
    }

    /// Fill identity fields from a user/personnel JSON object.
    pub fn with_user(mut self, user: &serde_json::Value) -> Self {
        let text = |key: &str| match user.get(key) {
            Some(serde_json::Value::String(s)) if !s.is_empty() => Some(s.clone()),
            Some(serde_json::Value::Number(n)) => Some(n.to_string()),
            _ => None,
        };
        self.user_id = text("id").or_else(|| text("personnel_id"));
        self.display_name = text("username")
            .or_else(|| text("name"))
            .or_else(|| match (text("givenname"), text("surname")) {
                (Some(first), Some(last)) => Some(format!("{first} {last}")),
                (first, last) => first.or(last),
            });
        self
    }
}

/// Current session, optionally mirrored to a file.
pub struct AuthStore {
    path: Option<PathBuf>,
    session: RwLock<Option<AuthSession>>,
}

impl AuthStore {
    /// Open the store at `path`, loading any saved session. An unreadable
    /// file is logged and treated as logged out.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let session = read_session(&path);
        Self {
            path: Some(path),
            session: RwLock::new(session),
        }
    }

    /// A store that never touches disk.
    pub fn in_memory(session: Option<AuthSession>) -> Self {
        Self {
            path: None,
            session: RwLock::new(session),
        }
    }

    pub fn current(&self) -> Option<AuthSession> {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn token(&self) -> Option<String> {
        self.current().map(|s| s.token)
    }

    pub fn is_logged_in(&self) -> bool {
        self.token().is_some()
    }

    pub fn save(&self, session: AuthSession) -> ApiResult<()> {
        if let Some(path) = &self.path {
            write_session(path, &session)?;
        }
        *self.session.write().unwrap_or_else(PoisonError::into_inner) = Some(session);
        Ok(())
    }

    /// Forget the session. Removing an already missing file is not an error.
    pub fn clear(&self) {
        self.session
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(path) = &self.path {
            remove_session_file(path);
        }
    }

    /// Drop a session the server rejected. The file is removed only while it
    /// still holds the rejected token; a login written by another process
    /// in the meantime is kept.
    pub fn revoke(&self) {
        let rejected = self
            .session
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .map(|s| s.token);
        let Some(path) = &self.path else {
            return;
        };
        match read_session(path) {
            Some(on_disk) if Some(&on_disk.token) != rejected.as_ref() => {
                tracing::info!(path = %path.display(), "session file holds a newer login, keeping it");
            }
            Some(_) => remove_session_file(path),
            None => {}
        }
    }

    /// Re-read the file. Returns true when the token changed.
    pub fn reload(&self) -> bool {
        let Some(path) = &self.path else {
            return false;
        };
        let fresh = read_session(path);
        let mut slot = self.session.write().unwrap_or_else(PoisonError::into_inner);
        let changed = slot.as_ref().map(|s| &s.token) != fresh.as_ref().map(|s| &s.token);
        *slot = fresh;
        changed
    }
}

fn read_session(path: &Path) -> Option<AuthSession> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to read session file");
            return None;
        }
    };
    match toml::from_str(&text) {
        Ok(session) => Some(session),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring malformed session file");
            None
        }
    }
}

fn remove_session_file(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => tracing::info!(path = %path.display(), "session cleared"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "failed to remove session file"),
    }
}

/// Write the session readable by the owner only.
fn write_session(path: &Path, session: &AuthSession) -> ApiResult<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)
            .map_err(|e| ApiError::Session(format!("create {}: {e}", dir.display())))?;
    }
    let text = toml::to_string(session).map_err(|e| ApiError::Session(e.to_string()))?;
    let write_err = |e: std::io::Error| ApiError::Session(format!("write {}: {e}", path.display()));

    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
        options.mode(0o600);
        // mode() only applies on creation; tighten a file left by an older write
        if let Ok(meta) = std::fs::metadata(path) {
            if meta.permissions().mode() & 0o077 != 0 {
                std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
                    .map_err(write_err)?;
            }
        }
    }
    let mut file = options.open(path).map_err(write_err)?;
    file.write_all(text.as_bytes()).map_err(write_err)?;
    tracing::debug!(path = %path.display(), "session saved");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("roster-auth-{}-{name}", std::process::id()))
            .join("session.toml")
    }

    #[test]
    fn test_save_reload_clear() {
        let path = temp_path("cycle");
        let store = AuthStore::open(&path);
        assert!(!store.is_logged_in());

        let user = serde_json::json!({ "id": 4, "username": "admin" });
        store.save(AuthSession::new("abc").with_user(&user)).unwrap();
        assert_eq!(store.token().as_deref(), Some("abc"));

        let other = AuthStore::open(&path);
        let session = other.current().unwrap();
        assert_eq!(session.user_id.as_deref(), Some("4"));
        assert_eq!(session.display_name.as_deref(), Some("admin"));

        other.clear();
        assert!(!other.is_logged_in());
        assert!(store.reload());
        assert!(!store.is_logged_in());
        assert!(!store.reload());
    }

    #[cfg(unix)]
    #[test]
    fn test_session_file_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let path = temp_path("mode");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();

        AuthStore::open(&path).save(AuthSession::new("secret")).unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o077, 0, "mode {mode:o}");

        let fresh = temp_path("mode-new");
        AuthStore::open(&fresh).save(AuthSession::new("secret")).unwrap();
        let mode = std::fs::metadata(&fresh).unwrap().permissions().mode();
        assert_eq!(mode & 0o077, 0, "mode {mode:o}");
    }

    #[test]
    fn test_revoke_keeps_newer_login() {
        let path = temp_path("revoke");
        let daemon = AuthStore::open(&path);
        daemon.save(AuthSession::new("old")).unwrap();

        let cli = AuthStore::open(&path);
        cli.save(AuthSession::new("new")).unwrap();

        daemon.revoke();
        assert!(!daemon.is_logged_in());
        assert!(daemon.reload());
        assert_eq!(daemon.token().as_deref(), Some("new"));

        daemon.revoke();
        assert!(!path.exists());
    }

    #[test]
    fn test_malformed_file_reads_as_logged_out() {
        let path = temp_path("garbage");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "token = ").unwrap();
        assert!(!AuthStore::open(&path).is_logged_in());
    }

    #[test]
    fn test_display_name_from_personnel_record() {
        let session = AuthSession::new("t").with_user(&serde_json::json!({
            "personnel_id": "P-9", "givenname": "Ana", "surname": "Reyes"
        }));
        assert_eq!(session.user_id.as_deref(), Some("P-9"));
        assert_eq!(session.display_name.as_deref(), Some("Ana Reyes"));
    }

    #[test]
    fn test_in_memory_store_never_writes() {
        let store = AuthStore::in_memory(Some(AuthSession::new("mem")));
        assert!(!store.reload());
        store.clear();
        assert!(store.token().is_none());
    }
}
