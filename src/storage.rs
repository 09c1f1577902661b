//! Client-local persistent storage: at most a cached copy of the conversation settings
//! and the signed-in session. Each lives in its own JSON file under the data directory.

use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, warn};

use crate::domain::ConversationSettings;
use crate::error::StorageError;
use crate::protocol::AuthUser;

const SETTINGS_FILE: &str = "conversation_settings.json";
const SESSION_FILE: &str = "session.json";

/// Persisted identity-service session.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredSession {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub user: AuthUser,
}

#[derive(Clone, Debug)]
pub struct LocalStore {
    dir: PathBuf,
}

impl LocalStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn load_settings(&self) -> Result<Option<ConversationSettings>, StorageError> {
        self.read_json(SETTINGS_FILE)
    }

    pub fn save_settings(&self, settings: &ConversationSettings) -> Result<(), StorageError> {
        self.write_json(SETTINGS_FILE, settings)
    }

    pub fn load_session(&self) -> Result<Option<StoredSession>, StorageError> {
        self.read_json(SESSION_FILE)
    }

    pub fn save_session(&self, session: &StoredSession) -> Result<(), StorageError> {
        self.write_json(SESSION_FILE, session)
    }

    pub fn clear_session(&self) -> Result<(), StorageError> {
        let path = self.dir.join(SESSION_FILE);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StorageError::Io { path: path.display().to_string(), source }),
        }
    }

    fn read_json<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>, StorageError> {
        let path = self.dir.join(name);
        let raw = match std::fs::read_to_string(&path) {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(StorageError::Io { path: path.display().to_string(), source }),
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|source| StorageError::Json { path: path.display().to_string(), source })
    }

    /// Write through a temp file and rename, so a crash never leaves half a file behind.
    fn write_json<T: Serialize>(&self, name: &str, value: &T) -> Result<(), StorageError> {
        let io_err = |path: &Path, source: std::io::Error| StorageError::Io { path: path.display().to_string(), source };
        std::fs::create_dir_all(&self.dir).map_err(|e| io_err(self.dir.as_path(), e))?;

        let path = self.dir.join(name);
        let tmp = self.dir.join(format!("{}.tmp", name));
        let body = serde_json::to_vec_pretty(value)
            .map_err(|source| StorageError::Json { path: path.display().to_string(), source })?;
        std::fs::write(&tmp, body).map_err(|e| io_err(tmp.as_path(), e))?;
        std::fs::rename(&tmp, &path).map_err(|e| io_err(path.as_path(), e))?;
        debug!(target: "lingodeck", path = %path.display(), "Stored");
        Ok(())
    }
}

/// Settings to start a practice from: the cached copy if one exists, else defaults.
/// A corrupt cache is logged and ignored.
pub fn cached_or_default_settings(store: &LocalStore) -> ConversationSettings {
    match store.load_settings() {
        Ok(Some(s)) => s,
        Ok(None) => ConversationSettings::default(),
        Err(e) => {
            warn!(target: "lingodeck", error = %e, "Ignoring unreadable cached settings");
            ConversationSettings::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::FocusMode;
    use crate::testutil::temp_dir;

    #[test]
    fn settings_round_trip_and_default_when_missing() {
        let store = LocalStore::new(temp_dir().join("nested"));
        assert!(store.load_settings().unwrap().is_none());
        assert_eq!(cached_or_default_settings(&store), ConversationSettings::default());

        let s = ConversationSettings {
            immersion_level: 80,
            focus_mode: FocusMode::Natural,
            topic: "travel".into(),
            save_for_future: true,
            ..Default::default()
        };
        store.save_settings(&s).unwrap();
        assert_eq!(store.load_settings().unwrap(), Some(s.clone()));
        assert_eq!(cached_or_default_settings(&store), s);
    }

    #[test]
    fn corrupt_settings_fall_back_to_defaults() {
        let dir = temp_dir();
        std::fs::write(dir.join(SETTINGS_FILE), "{not json").unwrap();
        let store = LocalStore::new(&dir);
        assert!(matches!(store.load_settings(), Err(StorageError::Json { .. })));
        assert_eq!(cached_or_default_settings(&store), ConversationSettings::default());
    }

    #[test]
    fn session_clear_is_idempotent() {
        let store = LocalStore::new(temp_dir());
        let session = StoredSession {
            access_token: "tok".into(),
            refresh_token: None,
            user: AuthUser { id: "u1".into(), email: Some("a@b.c".into()) },
        };
        store.save_session(&session).unwrap();
        assert_eq!(store.load_session().unwrap(), Some(session));
        store.clear_session().unwrap();
        store.clear_session().unwrap();
        assert!(store.load_session().unwrap().is_none());
    }
}
