//! JSON file backend
//!
//! Writes `{"access_token": .., "refresh_token": ..}` to a temp file next to
//! the target and renames it into place, so the file on disk always holds a
//! whole pair.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use super::credentials::CredentialPair;
use super::store::{StorageBackend, StoreError};

/// File-backed credential persistence
#[derive(Debug, Clone)]
pub struct FileBackend {
    path: PathBuf,
}

impl FileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "session".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl StorageBackend for FileBackend {
    fn load(&self) -> Result<Option<CredentialPair>, StoreError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_str::<CredentialPair>(&content) {
            Ok(pair) => Ok(Some(pair)),
            Err(e) => {
                tracing::warn!(path = ?self.path, "Discarding unreadable session file: {}", e);
                self.clear()?;
                Ok(None)
            }
        }
    }

    fn save(&self, pair: &CredentialPair) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_vec(pair)
            .map_err(|e| StoreError::InvalidFormat(format!("Failed to encode credentials: {}", e)))?;

        let temp = self.temp_path();
        let mut file = fs::File::create(&temp)?;
        file.write_all(&content)?;
        file.sync_all()?;
        fs::rename(&temp, &self.path)?;
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        for path in [self.path.clone(), self.temp_path()] {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::CredentialStore;

    #[test]
    fn test_missing_file_loads_none() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::new(dir.path().join("session.json"));
        assert_eq!(backend.load().unwrap(), None);
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::new(dir.path().join("nested").join("session.json"));

        backend.save(&CredentialPair::new("a1", "r1")).unwrap();
        assert_eq!(backend.load().unwrap(), Some(CredentialPair::new("a1", "r1")));

        let raw = fs::read_to_string(backend.path()).unwrap();
        assert!(raw.contains("\"access_token\":\"a1\""));
        assert!(raw.contains("\"refresh_token\":\"r1\""));
        assert!(!backend.temp_path().exists());
    }

    #[test]
    fn test_half_pair_is_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        fs::write(&path, r#"{"access_token":"only-half"}"#).unwrap();

        let backend = FileBackend::new(&path);
        assert_eq!(backend.load().unwrap(), None);
        assert!(!path.exists());
    }

    #[test]
    fn test_clear_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::new(dir.path().join("session.json"));
        backend.save(&CredentialPair::new("a1", "r1")).unwrap();

        backend.clear().unwrap();
        backend.clear().unwrap();
        assert!(!backend.path().exists());
    }

    #[test]
    fn test_session_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");

        {
            let store = CredentialStore::open(FileBackend::new(&path)).unwrap();
            store.set(CredentialPair::new("a-before", "r-before")).unwrap();
        }

        let reopened = CredentialStore::open(FileBackend::new(&path)).unwrap();
        assert_eq!(reopened.get(), Some(CredentialPair::new("a-before", "r-before")));
    }
}
