//! Session document persistence.
//!
//! The pipeline reads and writes sessions through the `SessionRepository`
//! trait only. The JSON implementation keeps one document per session under
//! a root directory, which is all the storage this tool needs.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use super::MovieSession;

pub trait SessionRepository: Send + Sync {
    fn get(&self, id: Uuid) -> Result<Option<MovieSession>>;
    fn save(&self, session: &MovieSession) -> Result<()>;
    fn delete(&self, id: Uuid) -> Result<()>;
}

/// Stores each session as `<root>/<uuid>.json`.
pub struct JsonSessionRepository {
    root: PathBuf,
}

impl JsonSessionRepository {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn document_path(&self, id: Uuid) -> PathBuf {
        self.root.join(format!("{id}.json"))
    }

    /// Look up the session owning a media folder. Not part of the trait;
    /// only the CLI needs folder-based lookup.
    pub fn find_by_folder(&self, folder: &Path) -> Result<Option<MovieSession>> {
        if !self.root.exists() {
            return Ok(None);
        }
        for entry in std::fs::read_dir(&self.root).context("Failed to read session root")? {
            let entry = entry?;
            if entry.path().extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let content = std::fs::read_to_string(entry.path())
                .with_context(|| format!("Failed to read {:?}", entry.path()))?;
            match serde_json::from_str::<MovieSession>(&content) {
                Ok(session) if session.folder_path == folder => return Ok(Some(session)),
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!("Skipping unreadable session document {:?}: {}", entry.path(), e);
                }
            }
        }
        Ok(None)
    }
}

impl SessionRepository for JsonSessionRepository {
    fn get(&self, id: Uuid) -> Result<Option<MovieSession>> {
        let path = self.document_path(id);
        if !path.exists() {
            return Ok(None);
        }
        let content =
            std::fs::read_to_string(&path).with_context(|| format!("Failed to read {path:?}"))?;
        let session =
            serde_json::from_str(&content).context("Failed to parse session document")?;
        Ok(Some(session))
    }

    fn save(&self, session: &MovieSession) -> Result<()> {
        std::fs::create_dir_all(&self.root).context("Failed to create session root")?;
        let content =
            serde_json::to_string_pretty(session).context("Failed to serialize session")?;
        std::fs::write(self.document_path(session.id), content)
            .context("Failed to write session document")?;
        Ok(())
    }

    fn delete(&self, id: Uuid) -> Result<()> {
        let path = self.document_path(id);
        if path.exists() {
            std::fs::remove_file(&path).with_context(|| format!("Failed to delete {path:?}"))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn sample_session(folder: &Path) -> MovieSession {
        MovieSession::new(
            "Jaws".to_string(),
            NaiveDate::from_ymd_opt(2025, 7, 13).unwrap(),
            folder.to_path_buf(),
        )
    }

    #[test]
    fn test_save_get_delete_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let repo = JsonSessionRepository::new(dir.path());
        let session = sample_session(Path::new("/tmp/jaws"));

        repo.save(&session).unwrap();
        let loaded = repo.get(session.id).unwrap().unwrap();
        assert_eq!(loaded.title, "Jaws");

        repo.delete(session.id).unwrap();
        assert!(repo.get(session.id).unwrap().is_none());
    }

    #[test]
    fn test_get_missing_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let repo = JsonSessionRepository::new(dir.path());
        assert!(repo.get(Uuid::new_v4()).unwrap().is_none());
    }

    #[test]
    fn test_find_by_folder() {
        let dir = tempfile::tempdir().unwrap();
        let repo = JsonSessionRepository::new(dir.path());

        let a = sample_session(Path::new("/media/night-1"));
        let b = sample_session(Path::new("/media/night-2"));
        repo.save(&a).unwrap();
        repo.save(&b).unwrap();

        let found = repo
            .find_by_folder(Path::new("/media/night-2"))
            .unwrap()
            .unwrap();
        assert_eq!(found.id, b.id);
        assert!(repo
            .find_by_folder(Path::new("/media/night-3"))
            .unwrap()
            .is_none());
    }
}
