use super::RefactorHandle;
use crate::errors::{RefactorError, Result};
use crate::state::{RefactorState, StateStore};
use crate::util::atomic_write_json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Descriptive metadata written when a refactor is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefactorMetadata {
    pub id: String,
    pub title: String,
    pub goal: String,
    #[serde(default = "default_status")]
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_status() -> String {
    "planning".to_string()
}

/// All refactors under one `.forge/refactors` directory.
#[derive(Debug, Clone)]
pub struct RefactorRegistry {
    refactors_dir: PathBuf,
}

impl RefactorRegistry {
    pub fn new(refactors_dir: impl Into<PathBuf>) -> Self {
        Self {
            refactors_dir: refactors_dir.into(),
        }
    }

    pub fn refactors_dir(&self) -> &Path {
        &self.refactors_dir
    }

    /// Create the directory skeleton, metadata and an initial state document.
    pub fn create(&self, title: &str, goal: &str) -> Result<RefactorHandle> {
        let id = slugify(title);
        if id.is_empty() {
            return Err(anyhow::anyhow!("Refactor title '{}' yields an empty id", title).into());
        }
        let handle = RefactorHandle::new(&self.refactors_dir, &id);
        if handle.exists() {
            return Err(RefactorError::RefactorExists { id });
        }

        for dir in [handle.signals_dir(), handle.sessions_dir()] {
            fs::create_dir_all(&dir).map_err(|e| RefactorError::io(&dir, e))?;
        }

        let now = Utc::now();
        let metadata = RefactorMetadata {
            id: handle.id().to_string(),
            title: title.to_string(),
            goal: goal.to_string(),
            status: default_status(),
            created_at: now,
            updated_at: now,
        };
        atomic_write_json(&handle.metadata_path(), &metadata)?;
        StateStore::new(&handle).save(&RefactorState::new(handle.id()))?;

        info!(refactor = %handle.id(), "Refactor created");
        Ok(handle)
    }

    /// Metadata for every refactor with a readable `metadata.json`, by id.
    pub fn list(&self) -> Result<Vec<RefactorMetadata>> {
        if !self.refactors_dir.exists() {
            return Ok(Vec::new());
        }

        let entries =
            fs::read_dir(&self.refactors_dir).map_err(|e| RefactorError::io(&self.refactors_dir, e))?;
        let mut refactors: Vec<RefactorMetadata> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_dir())
            .filter_map(|p| match read_metadata(&p.join("metadata.json")) {
                Ok(meta) => meta,
                Err(e) => {
                    warn!(path = %p.display(), error = %e, "Skipping unreadable refactor metadata");
                    None
                }
            })
            .collect();
        refactors.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(refactors)
    }

    pub fn get(&self, refactor_id: &str) -> Result<Option<RefactorMetadata>> {
        let handle = RefactorHandle::new(&self.refactors_dir, refactor_id);
        read_metadata(&handle.metadata_path())
    }

    /// Handle for an existing refactor; fails when its directory is missing.
    pub fn handle(&self, refactor_id: &str) -> Result<RefactorHandle> {
        let handle = RefactorHandle::new(&self.refactors_dir, refactor_id);
        if handle.id().is_empty() || !handle.exists() {
            return Err(RefactorError::RefactorNotFound {
                id: refactor_id.to_string(),
            });
        }
        Ok(handle)
    }
}

fn read_metadata(path: &Path) -> Result<Option<RefactorMetadata>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path).map_err(|e| RefactorError::io(path, e))?;
    serde_json::from_str(&content)
        .map(Some)
        .map_err(|e| RefactorError::json(path, e))
}

/// Generate a URL-safe id from a title: lowercase, dash separated, max 50 chars.
pub fn slugify(title: &str) -> String {
    let lowered: String = title
        .to_lowercase()
        .chars()
        .map(|c| if c == ' ' { '-' } else { c })
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
        .collect();
    let joined = lowered
        .split('-')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-");
    joined.chars().take(50).collect::<String>().trim_end_matches('-').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Major Refactor Mode"), "major-refactor-mode");
        assert_eq!(slugify("  Spaces -- and  dashes! "), "spaces-and-dashes");
        assert_eq!(slugify(&"a".repeat(80)).len(), 50);
        assert_eq!(slugify("../etc"), "etc");
    }

    #[test]
    fn test_create_builds_layout() {
        let dir = tempdir().unwrap();
        let registry = RefactorRegistry::new(dir.path());
        let handle = registry.create("Demo", "Make it better").unwrap();

        assert_eq!(handle.id(), "demo");
        assert!(handle.signals_dir().is_dir());
        assert!(handle.sessions_dir().is_dir());
        assert!(handle.has_state());

        let meta = registry.get("demo").unwrap().unwrap();
        assert_eq!(meta.title, "Demo");
        assert_eq!(meta.goal, "Make it better");
        assert_eq!(meta.status, "planning");
    }

    #[test]
    fn test_create_twice_fails() {
        let dir = tempdir().unwrap();
        let registry = RefactorRegistry::new(dir.path());
        registry.create("Demo", "goal").unwrap();
        let err = registry.create("demo", "goal").unwrap_err();
        assert!(matches!(err, RefactorError::RefactorExists { .. }));
    }

    #[test]
    fn test_list_skips_corrupt_metadata() {
        let dir = tempdir().unwrap();
        let registry = RefactorRegistry::new(dir.path());
        registry.create("Beta", "b").unwrap();
        registry.create("Alpha", "a").unwrap();
        let broken = dir.path().join("broken");
        fs::create_dir_all(&broken).unwrap();
        fs::write(broken.join("metadata.json"), "{not json").unwrap();

        let ids: Vec<String> = registry.list().unwrap().into_iter().map(|m| m.id).collect();
        assert_eq!(ids, vec!["alpha", "beta"]);
    }

    #[test]
    fn test_handle_missing_refactor() {
        let dir = tempdir().unwrap();
        let registry = RefactorRegistry::new(dir.path());
        let err = registry.handle("ghost").unwrap_err();
        assert!(matches!(err, RefactorError::RefactorNotFound { .. }));
        assert!(registry.handle("../..").is_err());
    }
}
