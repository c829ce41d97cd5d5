use super::{RefactorState, SessionState};
use crate::errors::{RefactorError, Result};
use crate::refactor::RefactorHandle;
use crate::util::atomic_write_json;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

impl RefactorState {
    /// Persist to `path` via temp-file-then-rename.
    pub fn save(&self, path: &Path) -> Result<()> {
        atomic_write_json(path, self)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| RefactorError::io(path, e))?;
        serde_json::from_str(&content).map_err(|e| RefactorError::json(path, e))
    }
}

/// Durable access to one refactor's `state.json`.
///
/// Every mutating call is a full read-modify-write: load the latest
/// snapshot, apply one transition, persist atomically. Concurrent writers
/// are not coordinated beyond last-write-wins.
#[derive(Debug, Clone)]
pub struct StateStore {
    refactor_id: String,
    state_file: PathBuf,
}

impl StateStore {
    pub fn new(handle: &RefactorHandle) -> Self {
        Self {
            refactor_id: handle.id().to_string(),
            state_file: handle.state_path(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.state_file
    }

    pub fn exists(&self) -> bool {
        self.state_file.is_file()
    }

    /// Load the snapshot; a missing file means the refactor was never started.
    pub fn load(&self) -> Result<RefactorState> {
        if !self.exists() {
            return Err(RefactorError::RefactorNotFound {
                id: self.refactor_id.clone(),
            });
        }
        RefactorState::load(&self.state_file)
    }

    pub fn load_optional(&self) -> Result<Option<RefactorState>> {
        if !self.exists() {
            return Ok(None);
        }
        RefactorState::load(&self.state_file).map(Some)
    }

    /// Load the snapshot, or a fresh planning-state one when none exists yet.
    pub fn load_or_init(&self) -> Result<RefactorState> {
        Ok(self
            .load_optional()?
            .unwrap_or_else(|| RefactorState::new(&self.refactor_id)))
    }

    pub fn save(&self, state: &RefactorState) -> Result<()> {
        state.save(&self.state_file)?;
        debug!(refactor = %self.refactor_id, path = %self.state_file.display(), "State saved");
        Ok(())
    }

    /// Apply `f` to the current snapshot and persist only if it succeeds.
    pub fn update<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut RefactorState) -> Result<T>,
    {
        let mut state = self.load()?;
        let value = f(&mut state)?;
        self.save(&state)?;
        Ok(value)
    }

    /// Like [`update`](Self::update) but creates the state document if absent.
    pub fn update_or_init<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut RefactorState) -> Result<T>,
    {
        let mut state = self.load_or_init()?;
        let value = f(&mut state)?;
        self.save(&state)?;
        Ok(value)
    }

    pub fn add_session(&self, session_id: &str) -> Result<SessionState> {
        self.update_or_init(|s| s.add_session(session_id).cloned())
    }

    pub fn start_session(&self, session_id: &str) -> Result<SessionState> {
        self.update_or_init(|s| s.start_session(session_id).cloned())
    }

    pub fn complete_session(
        &self,
        session_id: &str,
        commit_hash: Option<&str>,
        notes: Option<&str>,
    ) -> Result<SessionState> {
        // Without a state document no session can have been started.
        if !self.exists() {
            return Err(RefactorError::SessionNotFound {
                id: session_id.to_string(),
            });
        }
        self.update(|s| s.complete_session(session_id, commit_hash, notes).cloned())
    }

    pub fn mark_needs_revision(&self, session_id: &str, notes: Option<&str>) -> Result<SessionState> {
        self.update(|s| s.mark_needs_revision(session_id, notes).cloned())
    }

    /// Returns 0 without writing when the session (or the whole state) is absent.
    pub fn increment_iteration(&self, session_id: &str) -> Result<u32> {
        let Some(mut state) = self.load_optional()? else {
            return Ok(0);
        };
        let count = state.increment_iteration(session_id);
        if count > 0 {
            self.save(&state)?;
        }
        Ok(count)
    }

    pub fn is_complete(&self) -> Result<bool> {
        Ok(self
            .load_optional()?
            .map(|s| s.is_complete())
            .unwrap_or(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{AuditResult, RefactorStatus, SessionStatus};
    use tempfile::{TempDir, tempdir};

    fn make_store() -> (StateStore, TempDir) {
        let dir = tempdir().unwrap();
        let handle = RefactorHandle::new(dir.path(), "demo");
        (StateStore::new(&handle), dir)
    }

    #[test]
    fn test_load_missing_is_refactor_not_found() {
        let (store, _dir) = make_store();
        let err = store.load().unwrap_err();
        assert!(matches!(err, RefactorError::RefactorNotFound { ref id } if id == "demo"));
        assert!(store.load_optional().unwrap().is_none());
        assert!(!store.is_complete().unwrap());
    }

    #[test]
    fn test_start_complete_persists() {
        let (store, _dir) = make_store();
        let started = store.start_session("1.1").unwrap();
        assert_eq!(started.status, SessionStatus::InProgress);
        assert!(store.exists());

        let completed = store.complete_session("1.1", Some("abc123"), None).unwrap();
        assert_eq!(completed.status, SessionStatus::Completed);

        let state = store.load().unwrap();
        assert_eq!(state.sessions["1.1"].commit_hash.as_deref(), Some("abc123"));
        assert_eq!(state.status, RefactorStatus::Completed);
        assert!(store.is_complete().unwrap());
    }

    #[test]
    fn test_complete_without_state_is_session_not_found() {
        let (store, _dir) = make_store();
        let err = store.complete_session("1.1", None, None).unwrap_err();
        assert!(matches!(err, RefactorError::SessionNotFound { ref id } if id == "1.1"));
        assert!(!store.exists());
    }

    #[test]
    fn test_complete_never_started_session_fails() {
        let (store, _dir) = make_store();
        store.start_session("1.1").unwrap();
        let err = store.complete_session("2.1", None, None).unwrap_err();
        assert!(matches!(err, RefactorError::SessionNotFound { .. }));
    }

    #[test]
    fn test_failed_update_does_not_persist() {
        let (store, _dir) = make_store();
        store.add_session("1.1").unwrap();
        let before = store.load().unwrap();
        assert!(store.add_session("1.1").is_err());
        assert_eq!(store.load().unwrap(), before);
    }

    #[test]
    fn test_revision_and_iterations() {
        let (store, _dir) = make_store();
        store.start_session("1.1").unwrap();
        let session = store.mark_needs_revision("1.1", Some("missing tests")).unwrap();
        assert_eq!(session.audit_result, AuditResult::Failed);
        assert_eq!(store.increment_iteration("1.1").unwrap(), 1);
        assert_eq!(store.increment_iteration("1.1").unwrap(), 2);
        assert_eq!(store.increment_iteration("nope").unwrap(), 0);
        assert_eq!(store.load().unwrap().sessions["1.1"].iteration_count, 2);
    }

    fn populated_state(sessions: usize) -> RefactorState {
        let mut state = RefactorState::new("demo");
        for i in 0..sessions {
            let id = format!("{}.{}", i / 5 + 1, i % 5 + 1);
            state.start_session(&id).unwrap();
            match i % 3 {
                0 => {
                    state.complete_session(&id, Some("deadbee"), Some("ok")).unwrap();
                }
                1 => {
                    state.mark_needs_revision(&id, Some("fix it")).unwrap();
                    state.increment_iteration(&id);
                }
                _ => {}
            }
        }
        state
    }

    #[test]
    fn test_save_load_roundtrip_various_sizes() {
        let dir = tempdir().unwrap();
        for n in [0, 1, 50] {
            let state = populated_state(n);
            let path = dir.path().join(format!("state-{}.json", n));
            state.save(&path).unwrap();
            let loaded = RefactorState::load(&path).unwrap();
            assert_eq!(loaded, state, "roundtrip mismatch for {} sessions", n);
            assert_eq!(loaded.sessions.len(), n);
            assert_eq!(loaded.history.len(), state.history.len());
        }
    }

    #[test]
    fn test_recovery_after_restart() {
        let dir = tempdir().unwrap();
        let handle = RefactorHandle::new(dir.path(), "demo");
        {
            let store = StateStore::new(&handle);
            store.start_session("1.1").unwrap();
        }
        {
            let store = StateStore::new(&handle);
            let state = store.load().unwrap();
            assert_eq!(state.current_session.as_deref(), Some("1.1"));
        }
    }

    #[test]
    fn test_load_tolerates_missing_optional_fields() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(
            &path,
            r#"{
                "refactor_id": "demo",
                "updated_at": "2026-01-03T14:30:00Z",
                "sessions": {"1.1": {"session_id": "1.1", "status": "in_progress"}}
            }"#,
        )
        .unwrap();
        let state = RefactorState::load(&path).unwrap();
        assert_eq!(state.status, RefactorStatus::Planning);
        assert_eq!(state.sessions["1.1"].status, SessionStatus::InProgress);
        assert_eq!(state.sessions["1.1"].iteration_count, 0);
        assert!(state.history.is_empty());
    }
}
