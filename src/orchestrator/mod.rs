//! The orchestrator: an interactive supervisor for one refactor.
//!
//! It does not execute work. It reads the state document and the signal
//! log to answer "what's the status" and "what happens next", advances
//! phases, pauses and resumes the refactor, relays questions, and keeps
//! `ORCHESTRATOR_HANDOFF.md` current so a successor can pick up where it
//! left off.

mod handoff;
mod summary;

pub use handoff::{HandoffNotes, parse_generation, render_handoff};
pub use summary::{
    PendingQuestion, PhaseProgress, PhaseState, SignalSummary, StatusSummary, TIMELINE_LEN,
    TimelineEvent, phase_progress, recommend, status_marker,
};

use crate::errors::{RefactorError, Result};
use crate::launch::ProcessLauncher;
use crate::refactor::RefactorHandle;
use crate::session::DEFAULT_AGENT_COMMAND;
use crate::signals::SignalLog;
use crate::state::{RefactorState, StateStore};
use crate::util::atomic_write;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Session id used on signals the orchestrator writes when no session is current.
pub const ORCHESTRATOR_SESSION: &str = "orchestrator";

#[derive(Debug, Clone)]
pub struct OrchestratorLaunch {
    pub dir: PathBuf,
    pub launched: bool,
    pub command: String,
}

impl OrchestratorLaunch {
    pub fn message(&self, refactor_id: &str) -> String {
        if self.launched {
            format!(
                "Orchestrator launched for {}!\n\nThe orchestrator will read its CLAUDE.md and introduce itself.\nAsk it to 'check status' to see what's happening.\n",
                refactor_id
            )
        } else {
            format!(
                "Could not open terminal. Start manually:\n\n  cd {}\n  {}\n",
                self.dir.display(),
                self.command
            )
        }
    }
}

pub struct Orchestrator {
    handle: RefactorHandle,
    store: StateStore,
    signals: SignalLog,
    agent_command: String,
}

impl Orchestrator {
    pub fn new(handle: &RefactorHandle) -> Self {
        Self {
            handle: handle.clone(),
            store: StateStore::new(handle),
            signals: SignalLog::new(handle),
            agent_command: DEFAULT_AGENT_COMMAND.to_string(),
        }
    }

    pub fn with_agent_command(mut self, command: impl Into<String>) -> Self {
        self.agent_command = command.into();
        self
    }

    pub fn handle(&self) -> &RefactorHandle {
        &self.handle
    }

    pub fn read_state(&self) -> Result<Option<RefactorState>> {
        self.store.load_optional()
    }

    pub fn check_signals(&self) -> Result<SignalSummary> {
        Ok(SignalSummary::from_signals(self.signals.read_all()?))
    }

    pub fn status_summary(&self) -> Result<StatusSummary> {
        let state = self.read_state()?;
        let signals = self.check_signals()?;
        Ok(StatusSummary::build(self.handle.id(), state.as_ref(), &signals))
    }

    /// Advice for the most recent signal, if any.
    pub fn next_step(&self) -> Result<Option<String>> {
        Ok(self.signals.read_latest(None)?.map(|s| recommend(&s)))
    }

    /// Complete `from` if it is not already and point the refactor at `to`.
    /// Returns false when nothing had to change.
    pub fn advance_phase(&self, from: &str, to: &str) -> Result<bool> {
        let changed = self.store.update(|state| state.advance_phase(from, to))?;
        info!(refactor = %self.handle.id(), from, to, changed, "Phase advanced");
        Ok(changed)
    }

    fn signal_session(&self) -> Result<String> {
        Ok(self
            .read_state()?
            .and_then(|s| s.current_session)
            .unwrap_or_else(|| ORCHESTRATOR_SESSION.to_string()))
    }

    pub fn pause(&self, reason: Option<&str>) -> Result<()> {
        self.store.update(|state| {
            state.pause(reason);
            Ok(())
        })?;
        self.signals.paused(&self.signal_session()?, reason)?;
        info!(refactor = %self.handle.id(), reason = reason.unwrap_or(""), "Refactor paused");
        Ok(())
    }

    pub fn resume(&self) -> Result<()> {
        self.store.update(|state| {
            state.resume();
            Ok(())
        })?;
        self.signals.resumed(&self.signal_session()?)?;
        info!(refactor = %self.handle.id(), "Refactor resumed");
        Ok(())
    }

    /// Record a question on behalf of a session.
    pub fn ask(&self, session_id: &str, question: &str, options: &[String]) -> Result<PathBuf> {
        if !self.handle.exists() {
            return Err(RefactorError::RefactorNotFound {
                id: self.handle.id().to_string(),
            });
        }
        self.signals.question(session_id, question, options)
    }

    pub fn current_generation(&self) -> u32 {
        fs::read_to_string(self.handle.handoff_path())
            .map(|content| parse_generation(&content))
            .unwrap_or(1)
    }

    pub fn update_handoff(&self, notes: &HandoffNotes) -> Result<PathBuf> {
        if notes.why_handoff.trim().is_empty() {
            warn!(refactor = %self.handle.id(), "Handoff written without a reason");
        }
        let generation = self.current_generation();
        let state = self.read_state()?;
        let signals = self.check_signals()?;
        let content = render_handoff(self.handle.id(), generation, state.as_ref(), &signals, notes);

        let path = self.handle.handoff_path();
        atomic_write(&path, content.as_bytes())?;
        info!(refactor = %self.handle.id(), generation, "Handoff updated");
        Ok(path)
    }

    /// The orchestrator's instruction document.
    pub fn instructions(&self) -> Result<String> {
        let status = self.status_summary()?.to_markdown();
        let generation = self.current_generation();
        Ok(orchestrator_instructions(
            self.handle.id(),
            &self.handle.dir(),
            &status,
            generation,
        ))
    }

    /// Write `orchestrator/CLAUDE.md`, create the handoff document if none
    /// exists yet, and open a terminal in the orchestrator directory.
    pub async fn launch(&self, launcher: &dyn ProcessLauncher) -> Result<OrchestratorLaunch> {
        if !self.handle.exists() {
            return Err(RefactorError::RefactorNotFound {
                id: self.handle.id().to_string(),
            });
        }
        let dir = self.handle.orchestrator_dir();
        atomic_write(&dir.join("CLAUDE.md"), self.instructions()?.as_bytes())?;
        if !self.handle.handoff_path().exists() {
            self.update_handoff(&HandoffNotes::default())?;
        }

        let launched = match launcher.open(&dir, &self.agent_command).await {
            Ok(opened) => opened,
            Err(e) => {
                warn!(error = %e, "Launcher failed");
                false
            }
        };
        info!(refactor = %self.handle.id(), launched, "Orchestrator launched");
        Ok(OrchestratorLaunch {
            dir,
            launched,
            command: self.agent_command.clone(),
        })
    }
}

fn orchestrator_instructions(
    refactor_id: &str,
    refactor_dir: &Path,
    status: &str,
    generation: u32,
) -> String {
    let previous = if generation > 1 {
        format!(
            "You are Orchestrator #{generation}. Orchestrator #{} handed off to you: read `ORCHESTRATOR_HANDOFF.md` before anything else.",
            generation - 1
        )
    } else {
        format!("You are Orchestrator #{generation}, the first for this refactor.")
    };

    format!(
        r#"# Orchestrator: {refactor_id}

You are the team lead for this refactor. You do not write code yourself:
you read signals and state, help the user decide what happens next,
launch sessions and audits, and keep the plan documents current.

{previous}

**Refactor directory**: `{dir}`

## Current Status

{status}

## Working Rules

- `PHILOSOPHY.md` and `DECISIONS.md` are stable anchors. Do not edit them.
- You own `EXECUTION_PLAN.md` and `ORCHESTRATOR_HANDOFF.md`.
- Advance a phase only after its audit passed.
- Write things down: context compaction loses fidelity.

## Commands

```bash
forge-refactor status {refactor_id}
forge-refactor signals {refactor_id}
forge-refactor start {refactor_id} <session-id>
forge-refactor audit {refactor_id} <session-id>...
forge-refactor advance {refactor_id} <from> <to>
forge-refactor pause {refactor_id} --reason "..."
forge-refactor resume {refactor_id}
forge-refactor handoff {refactor_id} --why "..."
```

## Handoff Protocol

When the context window gets tight, run `forge-refactor handoff` with the
reason, the key discussion points and any open questions. The next
orchestrator reads `ORCHESTRATOR_HANDOFF.md` and continues from there.
"#,
        refactor_id = refactor_id,
        previous = previous,
        dir = refactor_dir.display(),
        status = status,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::launch::fakes::RecordingLauncher;
    use crate::refactor::RefactorRegistry;
    use crate::signals::{SignalPayload, SignalType};
    use crate::state::{RefactorStatus, SessionStatus};
    use tempfile::{TempDir, tempdir};

    fn setup() -> (TempDir, RefactorHandle) {
        let dir = tempdir().unwrap();
        let handle = RefactorRegistry::new(dir.path().join(".forge/refactors"))
            .create("demo", "goal")
            .unwrap();
        (dir, handle)
    }

    #[test]
    fn test_advance_phase_is_idempotent() {
        let (_dir, handle) = setup();
        let store = StateStore::new(&handle);
        store.start_session("1.1").unwrap();
        let orchestrator = Orchestrator::new(&handle);

        assert!(orchestrator.advance_phase("1.1", "1.2").unwrap());
        let first = store.load().unwrap();
        let completed_at = first.sessions["1.1"].completed_at;
        assert_eq!(first.current_session.as_deref(), Some("1.2"));
        assert_eq!(first.sessions["1.1"].status, SessionStatus::Completed);

        assert!(!orchestrator.advance_phase("1.1", "1.2").unwrap());
        let second = store.load().unwrap();
        assert_eq!(second.current_session.as_deref(), Some("1.2"));
        assert_eq!(second.sessions["1.1"].completed_at, completed_at);
        assert_eq!(second.history.len(), first.history.len());
    }

    #[test]
    fn test_advance_phase_rejects_unstarted_session() {
        let (_dir, handle) = setup();
        StateStore::new(&handle).add_session("1.1").unwrap();
        let err = Orchestrator::new(&handle)
            .advance_phase("1.1", "1.2")
            .unwrap_err();
        assert!(matches!(err, RefactorError::InvalidTransition { .. }));
    }

    #[test]
    fn test_pause_and_resume_signal() {
        let (_dir, handle) = setup();
        StateStore::new(&handle).start_session("1.1").unwrap();
        let orchestrator = Orchestrator::new(&handle);

        orchestrator.pause(Some("lunch")).unwrap();
        assert_eq!(
            StateStore::new(&handle).load().unwrap().status,
            RefactorStatus::Paused
        );
        orchestrator.resume().unwrap();
        assert_eq!(
            StateStore::new(&handle).load().unwrap().status,
            RefactorStatus::Executing
        );

        let signals = SignalLog::new(&handle).read_all().unwrap();
        let types: Vec<SignalType> = signals.iter().map(|s| s.signal_type()).collect();
        assert_eq!(types, vec![SignalType::Paused, SignalType::Resumed]);
        assert_eq!(signals[0].session_id, "1.1");
        assert_eq!(
            signals[0].payload,
            SignalPayload::Paused {
                reason: Some("lunch".into())
            }
        );
    }

    #[test]
    fn test_status_and_questions() {
        let (_dir, handle) = setup();
        StateStore::new(&handle).start_session("1.1").unwrap();
        let orchestrator = Orchestrator::new(&handle);
        orchestrator
            .ask("1.1", "Drop the legacy API?", &["yes".into(), "no".into()])
            .unwrap();

        let status = orchestrator.status_summary().unwrap();
        assert_eq!(status.in_progress, 1);
        assert_eq!(status.pending_questions, 1);
        assert_eq!(
            status.latest_signal,
            Some((SignalType::Question, "1.1".to_string()))
        );
        let advice = orchestrator.next_step().unwrap().unwrap();
        assert!(advice.contains("> Drop the legacy API?"));
        assert!(advice.contains("2. no"));
    }

    #[test]
    fn test_handoff_generations_advance() {
        let (_dir, handle) = setup();
        let orchestrator = Orchestrator::new(&handle);
        assert_eq!(orchestrator.current_generation(), 1);

        orchestrator.update_handoff(&HandoffNotes::default()).unwrap();
        assert_eq!(orchestrator.current_generation(), 2);
        orchestrator
            .update_handoff(&HandoffNotes {
                why_handoff: "context tight".into(),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(orchestrator.current_generation(), 3);
        let content = fs::read_to_string(handle.handoff_path()).unwrap();
        assert!(content.contains("Orchestrator #2 → #3"));
    }

    #[tokio::test]
    async fn test_launch_keeps_existing_handoff() {
        let (_dir, handle) = setup();
        fs::write(handle.handoff_path(), "hand written notes").unwrap();
        let orchestrator = Orchestrator::new(&handle);
        let launcher = RecordingLauncher::new(false);

        let launch = orchestrator.launch(&launcher).await.unwrap();
        assert!(!launch.launched);
        assert!(launch.message("demo").contains("Could not open terminal"));
        assert!(launch.dir.join("CLAUDE.md").is_file());
        assert_eq!(
            fs::read_to_string(handle.handoff_path()).unwrap(),
            "hand written notes"
        );
    }

    #[tokio::test]
    async fn test_launch_creates_handoff_when_missing() {
        let (_dir, handle) = setup();
        let orchestrator = Orchestrator::new(&handle);
        orchestrator
            .launch(&RecordingLauncher::new(true))
            .await
            .unwrap();
        assert!(handle.handoff_path().is_file());
        let doc = fs::read_to_string(handle.orchestrator_dir().join("CLAUDE.md")).unwrap();
        assert!(doc.contains("You are Orchestrator #1"));
        assert!(doc.contains("forge-refactor status demo"));
    }

    #[tokio::test]
    async fn test_launch_unknown_refactor() {
        let dir = tempdir().unwrap();
        let handle = RefactorHandle::new(dir.path(), "ghost");
        let err = Orchestrator::new(&handle)
            .launch(&RecordingLauncher::new(true))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
