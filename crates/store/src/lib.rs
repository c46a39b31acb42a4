//! File-backed session persistence.
//!
//! Each session is one pretty-printed JSON file named
//! `session_<yyyymmdd_hhmmss>_<id>.json`, the timestamp taken from the
//! session's creation time so files sort chronologically on disk.
//! Lookup accepts any substring of the filename stem, so a short id
//! prefix is enough.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use clawsmith_core::error::StoreError;
use clawsmith_core::session::Session;

pub struct FileSessionStore {
    storage_dir: PathBuf,
}

impl FileSessionStore {
    /// Open (creating if needed) a store rooted at `storage_dir`.
    pub fn new(storage_dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let storage_dir = storage_dir.into();
        fs::create_dir_all(&storage_dir)
            .map_err(|e| StoreError::Storage(format!("cannot create storage dir: {e}")))?;
        Ok(Self { storage_dir })
    }

    /// The conventional per-project location: `<dir>/.clawsmith`.
    pub fn in_dir(dir: &Path) -> Result<Self, StoreError> {
        Self::new(dir.join(".clawsmith"))
    }

    fn file_name(session: &Session) -> String {
        format!(
            "session_{}_{}.json",
            session.created_at.format("%Y%m%d_%H%M%S"),
            session.id
        )
    }

    fn json_files(&self) -> Result<Vec<PathBuf>, StoreError> {
        let entries = fs::read_dir(&self.storage_dir)
            .map_err(|e| StoreError::Storage(e.to_string()))?;
        let mut files = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| StoreError::Storage(e.to_string()))?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                files.push(path);
            }
        }
        Ok(files)
    }

    /// Write the session, replacing any previous file for the same id.
    pub fn save(&self, session: &Session) -> Result<(), StoreError> {
        let path = self.storage_dir.join(Self::file_name(session));
        let json = serde_json::to_string_pretty(session)
            .map_err(|e| StoreError::Storage(format!("cannot serialize session: {e}")))?;
        fs::write(&path, json).map_err(|e| StoreError::Storage(e.to_string()))?;
        debug!(session = %session.id, path = %path.display(), "session saved");
        Ok(())
    }

    /// Load a session by id or any substring of its filename stem.
    pub fn get(&self, session_id: &str) -> Result<Session, StoreError> {
        for path in self.json_files()? {
            let stem = path
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default();
            if !stem.contains(session_id) {
                continue;
            }
            let data =
                fs::read_to_string(&path).map_err(|e| StoreError::Storage(e.to_string()))?;
            return serde_json::from_str(&data)
                .map_err(|e| StoreError::Storage(format!("corrupt session file: {e}")));
        }
        Err(StoreError::NotFound(session_id.to_string()))
    }

    /// All sessions, most recently updated first. Unreadable files are
    /// skipped with a warning rather than failing the listing.
    pub fn list(&self) -> Result<Vec<Session>, StoreError> {
        let mut sessions = Vec::new();
        for path in self.json_files()? {
            let data = match fs::read_to_string(&path) {
                Ok(data) => data,
                Err(e) => {
                    warn!(path = %path.display(), %e, "skipping unreadable session file");
                    continue;
                }
            };
            match serde_json::from_str::<Session>(&data) {
                Ok(session) => sessions.push(session),
                Err(e) => {
                    warn!(path = %path.display(), %e, "skipping unparseable session file");
                }
            }
        }
        sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(sessions)
    }

    /// Delete by id or filename-stem substring.
    pub fn delete(&self, session_id: &str) -> Result<(), StoreError> {
        for path in self.json_files()? {
            let stem = path
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default();
            if stem.contains(session_id) {
                fs::remove_file(&path).map_err(|e| StoreError::Storage(e.to_string()))?;
                debug!(session = session_id, "session deleted");
                return Ok(());
            }
        }
        Err(StoreError::NotFound(session_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, FileSessionStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path().join("sessions")).unwrap();
        (dir, store)
    }

    #[test]
    fn save_and_get_roundtrip() {
        let (_dir, store) = store();
        let mut session = Session::new("build", "openai/gpt-4o");
        session.push_user("hello");
        store.save(&session).unwrap();

        let loaded = store.get(&session.id).unwrap();
        assert_eq!(loaded.id, session.id);
        assert_eq!(loaded.messages.len(), 1);
    }

    #[test]
    fn get_matches_partial_id() {
        let (_dir, store) = store();
        let session = Session::new("build", "m");
        store.save(&session).unwrap();

        let prefix = &session.id[..3];
        let loaded = store.get(prefix).unwrap();
        assert_eq!(loaded.id, session.id);
    }

    #[test]
    fn file_name_embeds_creation_time_and_id() {
        let session = Session::new("build", "m");
        let name = FileSessionStore::file_name(&session);
        assert!(name.starts_with("session_"));
        assert!(name.ends_with(&format!("{}.json", session.id)));
    }

    #[test]
    fn resave_updates_the_same_file() {
        let (_dir, store) = store();
        let mut session = Session::new("build", "m");
        store.save(&session).unwrap();
        session.push_user("more");
        store.save(&session).unwrap();

        assert_eq!(store.list().unwrap().len(), 1);
        assert_eq!(store.get(&session.id).unwrap().messages.len(), 1);
    }

    #[test]
    fn list_orders_by_update_time_and_skips_garbage() {
        let (_dir, store) = store();
        let older = Session::new("build", "m");
        store.save(&older).unwrap();
        let mut newer = Session::new("build", "m");
        newer.push_user("bump");
        store.save(&newer).unwrap();
        fs::write(store.storage_dir.join("junk.json"), "not json").unwrap();

        let sessions = store.list().unwrap();
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].id, newer.id);
        assert_eq!(sessions[1].id, older.id);
    }

    #[test]
    fn delete_removes_the_file() {
        let (_dir, store) = store();
        let session = Session::new("build", "m");
        store.save(&session).unwrap();
        store.delete(&session.id).unwrap();
        assert!(matches!(
            store.get(&session.id),
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            store.delete(&session.id),
            Err(StoreError::NotFound(_))
        ));
    }
}
