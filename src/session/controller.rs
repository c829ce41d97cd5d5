use super::instructions::{SessionOutput, execution_instructions, write_instructions, write_session_output};
use super::spec::{SessionSpec, SpecResolver};
use crate::errors::{RefactorError, Result};
use crate::launch::ProcessLauncher;
use crate::refactor::{RefactorHandle, sanitize_id};
use crate::signals::SignalLog;
use crate::state::{SessionState, StateStore};
use crate::tracker::{GitTracker, Worktree, WorktreeManager};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const DEFAULT_DOCS_DIR: &str = "docs/MAJOR_REFACTOR_MODE";
pub const DEFAULT_AGENT_COMMAND: &str = "claude --dangerously-skip-permissions";

/// What happened when a session was launched.
#[derive(Debug, Clone)]
pub struct LaunchReport {
    pub session_id: String,
    pub title: String,
    pub work_dir: PathBuf,
    pub worktree: Option<Worktree>,
    /// False when the terminal could not be opened; the session is still
    /// recorded as started and can be run by hand.
    pub launched: bool,
    pub command: String,
}

impl LaunchReport {
    pub fn message(&self) -> String {
        if self.launched {
            format!(
                "Session {} launched!\n\nWorking directory: {}\nThe agent will read CLAUDE.md and begin working.",
                self.session_id,
                self.work_dir.display()
            )
        } else {
            format!(
                "Could not open terminal. Start manually:\n\n  cd {}\n  {}\n",
                self.work_dir.display(),
                self.command
            )
        }
    }
}

/// What happened when a session was marked done.
#[derive(Debug, Clone)]
pub struct CompletionReport {
    pub session: SessionState,
    pub commit_hash: Option<String>,
    pub worktree: Option<PathBuf>,
    pub output_path: Option<PathBuf>,
}

impl CompletionReport {
    pub fn message(&self) -> String {
        let worktree = self
            .worktree
            .as_ref()
            .and_then(|p| p.file_name())
            .map(|n| format!(" (worktree: {})", n.to_string_lossy()))
            .unwrap_or_default();
        format!(
            "Session {} marked complete (commit: {}){}",
            self.session.session_id,
            self.commit_hash.as_deref().unwrap_or("unknown"),
            worktree
        )
    }
}

/// Drives one session from launch to its `session_done` signal.
pub struct ExecutionSession {
    handle: RefactorHandle,
    session_id: String,
    project_dir: PathBuf,
    docs_dir: String,
    agent_command: String,
    base_branch: Option<String>,
}

impl ExecutionSession {
    pub fn new(handle: &RefactorHandle, session_id: &str, project_dir: &Path) -> Self {
        Self {
            handle: handle.clone(),
            session_id: sanitize_id(session_id),
            project_dir: project_dir.to_path_buf(),
            docs_dir: DEFAULT_DOCS_DIR.to_string(),
            agent_command: DEFAULT_AGENT_COMMAND.to_string(),
            base_branch: None,
        }
    }

    pub fn with_base_branch(mut self, base_branch: Option<String>) -> Self {
        self.base_branch = base_branch;
        self
    }

    pub fn with_docs_dir(mut self, docs_dir: impl Into<String>) -> Self {
        self.docs_dir = docs_dir.into();
        self
    }

    pub fn with_agent_command(mut self, command: impl Into<String>) -> Self {
        self.agent_command = command.into();
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn load_spec(&self) -> Option<SessionSpec> {
        SpecResolver::new(&self.handle, &self.project_dir, &self.docs_dir).resolve(&self.session_id)
    }

    pub fn worktree_path(&self) -> Option<PathBuf> {
        WorktreeManager::new(&self.project_dir).locate(self.handle.id(), &self.session_id)
    }

    /// Start the session: resolve its spec, acquire a worktree when the spec
    /// asks for one, record the start, announce it, write the agent's
    /// instructions and ask the launcher to open a terminal there.
    ///
    /// Everything up to the signal is durable; a failed terminal launch is
    /// reported in the returned [`LaunchReport`] rather than undone.
    pub async fn launch(&self, launcher: &dyn ProcessLauncher) -> Result<LaunchReport> {
        let spec = self.load_spec().ok_or_else(|| RefactorError::SpecNotFound {
            session_id: self.session_id.clone(),
        })?;

        let worktree = if spec.worktree {
            Some(
                WorktreeManager::new(&self.project_dir)
                    .with_base_branch(self.base_branch.clone())
                    .acquire(self.handle.id(), &self.session_id)?,
            )
        } else {
            None
        };

        StateStore::new(&self.handle).start_session(&self.session_id)?;
        SignalLog::new(&self.handle)
            .session_started(&self.session_id, worktree.as_ref().map(|w| w.path.as_path()))?;

        let instructions = execution_instructions(self.handle.id(), &spec, &self.docs_dir);
        let work_dir = write_instructions(
            &self.handle,
            &self.session_id,
            &instructions,
            worktree.as_ref().map(|w| w.path.as_path()),
        )?;

        let launched = match launcher.open(&work_dir, &self.agent_command).await {
            Ok(opened) => opened,
            Err(e) => {
                warn!(session = %self.session_id, error = %e, "Launcher failed");
                false
            }
        };
        info!(
            refactor = %self.handle.id(),
            session = %self.session_id,
            work_dir = %work_dir.display(),
            launched,
            "Session launched"
        );

        Ok(LaunchReport {
            session_id: self.session_id.clone(),
            title: spec.title,
            work_dir,
            worktree,
            launched,
            command: self.agent_command.clone(),
        })
    }

    /// Mark the session done.
    ///
    /// Without an explicit commit the current HEAD of the session's worktree
    /// (or of the project) is recorded, abbreviated. No repository means no
    /// commit, not an error.
    pub fn complete(
        &self,
        commit_hash: Option<&str>,
        notes: Option<&str>,
        write_output: bool,
    ) -> Result<CompletionReport> {
        let worktree = self.worktree_path();
        let commit_hash = match commit_hash {
            Some(hash) => Some(hash.to_string()),
            None => {
                let git_dir = worktree.as_deref().unwrap_or(&self.project_dir);
                GitTracker::new(git_dir).ok().and_then(|t| t.short_head_sha())
            }
        };

        let session = StateStore::new(&self.handle).complete_session(
            &self.session_id,
            commit_hash.as_deref(),
            notes,
        )?;

        let summary = notes
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("Session {} completed", self.session_id));

        let output_path = if write_output {
            Some(write_session_output(
                &self.handle,
                &self.session_id,
                &SessionOutput {
                    summary: summary.clone(),
                    handoff_notes: notes.unwrap_or_default().to_string(),
                    ..Default::default()
                },
            )?)
        } else {
            None
        };

        SignalLog::new(&self.handle).session_done(
            &self.session_id,
            commit_hash.as_deref(),
            &summary,
        )?;
        info!(
            refactor = %self.handle.id(),
            session = %self.session_id,
            commit = commit_hash.as_deref().unwrap_or("unknown"),
            "Session completed"
        );

        Ok(CompletionReport {
            session,
            commit_hash,
            worktree,
            output_path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::launch::fakes::RecordingLauncher;
    use crate::refactor::RefactorRegistry;
    use crate::signals::SignalType;
    use crate::state::SessionStatus;
    use git2::Repository;
    use std::fs;
    use tempfile::{TempDir, tempdir};

    const PLAN: &str = "### Session 1.1: First slice\n\n| **Worktree** | NO |\n\n**PROMPT**\n```\nDo the first slice.\n```\n\n**EXIT CRITERIA**\n- [ ] Done\n";

    fn setup() -> (TempDir, RefactorHandle) {
        let dir = tempdir().unwrap();
        let registry = RefactorRegistry::new(dir.path().join(".forge/refactors"));
        let handle = registry.create("demo", "Make it better").unwrap();
        fs::write(handle.dir().join("EXECUTION_PLAN.md"), PLAN).unwrap();
        (dir, handle)
    }

    #[tokio::test]
    async fn test_launch_records_start_and_signal() {
        let (dir, handle) = setup();
        StateStore::new(&handle).add_session("1.1").unwrap();
        let launcher = RecordingLauncher::new(true);

        let session = ExecutionSession::new(&handle, "1.1", dir.path());
        let report = session.launch(&launcher).await.unwrap();

        assert!(report.launched);
        assert_eq!(report.title, "First slice");
        assert_eq!(report.work_dir, handle.session_dir("1.1"));
        assert!(report.worktree.is_none());

        let state = StateStore::new(&handle).load().unwrap();
        assert_eq!(state.sessions["1.1"].status, SessionStatus::InProgress);

        let signals = SignalLog::new(&handle).read_all().unwrap();
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].signal_type(), SignalType::SessionStarted);
        assert_eq!(signals[0].session_id, "1.1");

        let doc = fs::read_to_string(handle.session_dir("1.1").join("CLAUDE.md")).unwrap();
        assert!(doc.contains("Do the first slice."));

        let calls = launcher.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, handle.session_dir("1.1"));
        assert_eq!(calls[0].1, DEFAULT_AGENT_COMMAND);
    }

    #[tokio::test]
    async fn test_launch_without_spec_fails_before_side_effects() {
        let (dir, handle) = setup();
        let launcher = RecordingLauncher::new(true);
        let err = ExecutionSession::new(&handle, "9.9", dir.path())
            .launch(&launcher)
            .await
            .unwrap_err();
        assert!(matches!(err, RefactorError::SpecNotFound { .. }));
        assert!(SignalLog::new(&handle).read_all().unwrap().is_empty());
        assert!(launcher.calls().is_empty());
    }

    #[tokio::test]
    async fn test_failed_terminal_gives_manual_instructions() {
        let (dir, handle) = setup();
        let launcher = RecordingLauncher::new(false);
        let report = ExecutionSession::new(&handle, "1.1", dir.path())
            .launch(&launcher)
            .await
            .unwrap();
        assert!(!report.launched);
        assert!(report.message().contains("Start manually"));
        // Still recorded as started.
        let state = StateStore::new(&handle).load().unwrap();
        assert_eq!(state.sessions["1.1"].status, SessionStatus::InProgress);
    }

    #[tokio::test]
    async fn test_launch_with_worktree() {
        let (dir, handle) = setup();
        let repo = Repository::init(dir.path()).unwrap();
        fs::write(dir.path().join("CLAUDE.md"), "Project rules\n").unwrap();
        let mut index = repo.index().unwrap();
        index.add_path(Path::new("CLAUDE.md")).unwrap();
        index.write().unwrap();
        let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();
        let sig = git2::Signature::now("test", "test@test.com").unwrap();
        repo.commit(Some("HEAD"), &sig, &sig, "init", &tree, &[])
            .unwrap();

        fs::write(
            handle.dir().join("EXECUTION_PLAN.md"),
            PLAN.replace("| **Worktree** | NO |", "| **Worktree** | YES |"),
        )
        .unwrap();

        let launcher = RecordingLauncher::new(true);
        let session = ExecutionSession::new(&handle, "1.1", dir.path());
        let report = session.launch(&launcher).await.unwrap();

        let worktree = report.worktree.clone().unwrap();
        assert_eq!(report.work_dir, worktree.path);
        let doc = fs::read_to_string(worktree.path.join("CLAUDE.md")).unwrap();
        assert!(doc.starts_with("# Execution Session: First slice"));
        assert!(doc.contains("Project rules"));

        let started = SignalLog::new(&handle).read_latest(None).unwrap().unwrap();
        match started.payload {
            crate::signals::SignalPayload::SessionStarted { worktree_path } => {
                assert!(worktree_path.unwrap().contains("refactor-demo-1.1"));
            }
            other => panic!("unexpected payload {:?}", other),
        }
        assert!(session.worktree_path().is_some());
    }

    #[tokio::test]
    async fn test_complete_records_commit_and_signal() {
        let (dir, handle) = setup();
        let session = ExecutionSession::new(&handle, "1.1", dir.path());
        session.launch(&RecordingLauncher::new(true)).await.unwrap();

        let report = session.complete(Some("abc123"), Some("all green"), true).unwrap();
        assert_eq!(report.session.status, SessionStatus::Completed);
        assert_eq!(report.session.commit_hash.as_deref(), Some("abc123"));
        assert!(report.message().contains("abc123"));

        let output = fs::read_to_string(report.output_path.unwrap()).unwrap();
        assert!(output.contains("all green"));

        let signals = SignalLog::new(&handle).read_all().unwrap();
        assert_eq!(signals.len(), 2);
        assert_eq!(signals[1].signal_type(), SignalType::SessionDone);
    }

    #[test]
    fn test_complete_without_repository_tolerates_missing_commit() {
        let (dir, handle) = setup();
        StateStore::new(&handle).start_session("1.1").unwrap();
        let report = ExecutionSession::new(&handle, "1.1", dir.path())
            .complete(None, None, false)
            .unwrap();
        assert!(report.commit_hash.is_none());
        assert!(report.output_path.is_none());
        assert!(report.message().contains("unknown"));
    }

    #[test]
    fn test_complete_without_state_fails() {
        let dir = tempdir().unwrap();
        let handle = RefactorHandle::new(dir.path(), "ghost");
        let err = ExecutionSession::new(&handle, "1.1", dir.path())
            .complete(Some("abc"), None, true)
            .unwrap_err();
        assert!(matches!(err, RefactorError::SessionNotFound { ref id } if id == "1.1"));
        assert!(SignalLog::new(&handle).read_all().unwrap().is_empty());
    }
}
