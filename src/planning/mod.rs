//! Planning: the interactive session that writes a refactor's plan documents,
//! plus the codebase analysis that seeds `PRE_REFACTOR.md`.
//!
//! A planning session runs in the refactor directory itself. Its `CLAUDE.md`
//! tells the agent how to explore, which documents to produce and how to
//! hand off to a fresh planner through `PLANNING_HANDOFF.md`.

mod analyzer;
mod handoff;

pub use analyzer::{AnalysisResult, CodebaseAnalyzer, KeyFile};
pub use handoff::{
    DocStatus, PLANNING_DOCS, PlanningHandoffNotes, doc_name, parse_doc_status,
    parse_planning_generation, render_planning_handoff,
};

use crate::errors::{RefactorError, Result};
use crate::launch::ProcessLauncher;
use crate::refactor::{RefactorHandle, RefactorMetadata, RefactorRegistry};
use crate::session::DEFAULT_AGENT_COMMAND;
use crate::util::atomic_write;
use chrono::Local;
use std::fs;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Project guide that replaces the built-in planning process when present.
pub const PLANNING_GUIDE_FILE: &str = "PLANNING_PROCESS_CLAUDE.md";

#[derive(Debug, Clone)]
pub struct PlanningLaunch {
    pub dir: PathBuf,
    pub launched: bool,
    pub command: String,
    pub generation: u32,
    pub resumed: bool,
}

impl PlanningLaunch {
    pub fn message(&self, refactor_id: &str) -> String {
        match (self.launched, self.resumed) {
            (true, false) => "Planning session launched!\n\nThe agent will read its CLAUDE.md and start exploring the codebase.\nWait for it to begin, then collaborate on the plan.\n".to_string(),
            (true, true) => format!(
                "Planning session resumed for {}!\n\nPlanner #{} will read PLANNING_HANDOFF.md and summarize where you left off.\n",
                refactor_id, self.generation
            ),
            (false, resumed) => format!(
                "Could not open terminal. Start manually:\n\n  cd {}\n  {}\n\n{}\n",
                self.dir.display(),
                self.command,
                if resumed {
                    "Then say: 'Where were we?'"
                } else {
                    "The agent will read CLAUDE.md and start on its own."
                }
            ),
        }
    }
}

pub struct PlanningSession {
    handle: RefactorHandle,
    metadata: RefactorMetadata,
    guide_dir: Option<PathBuf>,
    agent_command: String,
}

impl PlanningSession {
    pub fn new(handle: &RefactorHandle, metadata: RefactorMetadata) -> Self {
        Self {
            handle: handle.clone(),
            metadata,
            guide_dir: None,
            agent_command: DEFAULT_AGENT_COMMAND.to_string(),
        }
    }

    /// Session for an existing refactor, read from its metadata.
    pub fn open(registry: &RefactorRegistry, refactor_id: &str) -> Result<Self> {
        let handle = registry.handle(refactor_id)?;
        let metadata = registry
            .get(handle.id())?
            .ok_or_else(|| RefactorError::RefactorNotFound {
                id: refactor_id.to_string(),
            })?;
        Ok(Self::new(&handle, metadata))
    }

    /// Directory searched for `PLANNING_PROCESS_CLAUDE.md`.
    pub fn with_guide_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.guide_dir = Some(dir.into());
        self
    }

    pub fn with_agent_command(mut self, command: impl Into<String>) -> Self {
        self.agent_command = command.into();
        self
    }

    pub fn handle(&self) -> &RefactorHandle {
        &self.handle
    }

    pub fn current_generation(&self) -> u32 {
        fs::read_to_string(self.handle.planning_handoff_path())
            .map(|content| parse_planning_generation(&content))
            .unwrap_or(1)
    }

    fn planning_guide(&self) -> String {
        let project_guide = self
            .guide_dir
            .as_ref()
            .map(|dir| dir.join(PLANNING_GUIDE_FILE))
            .and_then(|path| fs::read_to_string(&path).ok());
        match project_guide {
            Some(guide) => guide,
            None => {
                debug!("No project planning guide, using the built-in one");
                EMBEDDED_GUIDE.to_string()
            }
        }
    }

    /// The planning session's `CLAUDE.md`.
    pub fn instructions(&self) -> String {
        let generation = self.current_generation();
        let continuity = if generation > 1 {
            format!(
                "You are Planner #{generation}. Planner #{} handed off to you: read `PLANNING_HANDOFF.md` before anything else.",
                generation - 1
            )
        } else {
            format!("You are Planner #{generation}, the first for this refactor.")
        };

        format!(
            r#"# Planning Session: {title}

> **Refactor ID**: {id}
> **Goal**: {goal}
> **Output Directory**: {dir}
> **Created**: {created}

{continuity}

---

## How to Start

Begin without waiting for input:

1. Say: "I'll help you plan the {title} refactor. Let me first explore the codebase to understand what we're working with..."
2. Explore: search for relevant files, read key code, map the current architecture.
3. Summarize what you found and ask 2-3 clarifying questions.

If the refactor turns out to be architecturally significant, say so before deep planning and suggest relaunching with extended thinking.

---

## Your Mission

Through conversation with the user, write these documents to `{dir}/`:

1. **PHILOSOPHY.md**: guiding principles and anti-patterns (immutable once written)
2. **VISION.md**: target state and success criteria
3. **DECISIONS.md**: what was decided and the alternatives rejected
4. **PRE_REFACTOR.md**: codebase analysis for the goal (`forge-refactor analyze {id}` drafts one)
5. **EXECUTION_PLAN.md**: phased sessions in the standard format

## The Goal

**{goal}**

---

## Planning Flow

1. Explore first. Read the code before proposing anything.
2. Ask 2-3 questions at a time, each with options and tradeoffs.
3. Debate alternatives and record what you rejected.
4. Show drafts, get approval, then write.
5. Finish with "Planning complete! Ready for Phase 1."

The user decides intent, experience and priorities. Make technical calls yourself and explain them briefly.

---

{guide}

---

## Handoff Protocol

When context gets tight or the conversation starts to repeat itself, record progress:

```bash
forge-refactor plan-handoff {id} --why "..." --context "..." \
  --question "..." --decision "..." --preference "..." --doc VISION=draft
```

Then tell the user to open a **new terminal tab** and run:

```bash
forge-refactor plan --resume {id}
```

If the user asks "where were we?", read `PLANNING_HANDOFF.md`, announce your generation, summarize the open threads and ask whether to continue.

## When Planning Is Done

Tell the user to launch the orchestrator from their original terminal:

```bash
forge-refactor orchestrate {id}
```

or start the first session directly with `forge-refactor start {id} 1.1`.
"#,
            title = self.metadata.title,
            id = self.handle.id(),
            goal = self.metadata.goal,
            dir = self.handle.dir().display(),
            created = Local::now().format("%Y-%m-%d %H:%M"),
            continuity = continuity,
            guide = self.planning_guide().trim_end(),
        )
    }

    pub fn update_handoff(&self, notes: &PlanningHandoffNotes) -> Result<PathBuf> {
        if notes.why_handoff.trim().is_empty() {
            warn!(refactor = %self.handle.id(), "Planning handoff written without a reason");
        }
        let generation = self.current_generation();
        let content = render_planning_handoff(&self.metadata, generation, notes);
        let path = self.handle.planning_handoff_path();
        atomic_write(&path, content.as_bytes())?;
        info!(refactor = %self.handle.id(), generation, "Planning handoff updated");
        Ok(path)
    }

    /// Write the planning `CLAUDE.md` and open a terminal in the refactor directory.
    pub async fn launch(&self, launcher: &dyn ProcessLauncher) -> Result<PlanningLaunch> {
        self.open_terminal(launcher, false).await
    }

    /// Start the next planner from `PLANNING_HANDOFF.md`.
    pub async fn resume(&self, launcher: &dyn ProcessLauncher) -> Result<PlanningLaunch> {
        if !self.handle.planning_handoff_path().exists() {
            return Err(RefactorError::HandoffNotFound {
                id: self.handle.id().to_string(),
            });
        }
        self.open_terminal(launcher, true).await
    }

    async fn open_terminal(
        &self,
        launcher: &dyn ProcessLauncher,
        resumed: bool,
    ) -> Result<PlanningLaunch> {
        let dir = self.handle.dir();
        atomic_write(
            &self.handle.planning_instructions_path(),
            self.instructions().as_bytes(),
        )?;

        let launched = match launcher.open(&dir, &self.agent_command).await {
            Ok(opened) => opened,
            Err(e) => {
                warn!(error = %e, "Launcher failed");
                false
            }
        };
        let generation = self.current_generation();
        info!(refactor = %self.handle.id(), generation, resumed, launched, "Planning session launched");
        Ok(PlanningLaunch {
            dir,
            launched,
            command: self.agent_command.clone(),
            generation,
            resumed,
        })
    }
}

const EMBEDDED_GUIDE: &str = r#"## The Planning Process

### 1. Understand the Current State

Read the codebase, find the existing patterns and pin down exactly what changes. Don't assume.

### 2. Brainstorm Together

- Round 1: high-level vision
- Round 2: architecture, with 2-3 options and their tradeoffs
- Round 3: details

When the user says "I don't know", offer your recommendation.

### 3. Design

For larger work, think separately about how components interact, what state persists and what the user sees.

### 4. Document

1. PHILOSOPHY.md: principles and anti-patterns
2. VISION.md: target state
3. DECISIONS.md: what we decided and why
4. EXECUTION_PLAN.md: how to build it

### 5. Standard Session Format

Every session in EXECUTION_PLAN.md has:
- Worktree: YES/NO with reasoning
- Scope: what is in and out
- Start When / Stop When
- PROMPT: copy-paste ready
- EXIT CRITERIA: checkboxes
- GIT INSTRUCTIONS: exact commands
- HANDOFF: what to write for the next session

## Anti-Patterns

| Anti-Pattern | Do This Instead |
|--------------|-----------------|
| Asking 10 questions at once | 2-3 questions, iterate |
| Open-ended questions only | Offer options with tradeoffs |
| Jumping to implementation | Document philosophy first |
| Not recording rejected ideas | Explicit rejected alternatives |
| Vague session descriptions | Standard session format |"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::launch::fakes::RecordingLauncher;
    use tempfile::{TempDir, tempdir};

    fn setup() -> (TempDir, RefactorRegistry, PlanningSession) {
        let dir = tempdir().unwrap();
        let registry = RefactorRegistry::new(dir.path().join(".forge/refactors"));
        registry.create("Auth Split", "Separate auth from storage").unwrap();
        let session = PlanningSession::open(&registry, "auth-split").unwrap();
        (dir, registry, session)
    }

    #[tokio::test]
    async fn test_launch_writes_instructions_in_refactor_dir() {
        let (_dir, _registry, session) = setup();
        let launcher = RecordingLauncher::new(true);

        let launch = session.launch(&launcher).await.unwrap();
        assert!(launch.launched);
        assert_eq!(launch.generation, 1);

        let calls = launcher.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, session.handle().dir());
        assert_eq!(calls[0].1, DEFAULT_AGENT_COMMAND);

        let claude_md = fs::read_to_string(session.handle().planning_instructions_path()).unwrap();
        assert!(claude_md.starts_with("# Planning Session: Auth Split"));
        assert!(claude_md.contains("**Separate auth from storage**"));
        assert!(claude_md.contains("You are Planner #1, the first"));
        assert!(claude_md.contains("## The Planning Process"));
        assert!(claude_md.contains("forge-refactor plan --resume auth-split"));
    }

    #[tokio::test]
    async fn test_launch_without_terminal_gives_manual_command() {
        let (_dir, _registry, session) = setup();
        let session = session.with_agent_command("claude");
        let launch = session.launch(&RecordingLauncher::new(false)).await.unwrap();
        assert!(!launch.launched);
        let message = launch.message("auth-split");
        assert!(message.contains("Could not open terminal"));
        assert!(message.contains("  claude\n"));
        assert!(session.handle().planning_instructions_path().exists());
    }

    #[test]
    fn test_project_guide_replaces_builtin() {
        let (dir, _registry, session) = setup();
        let docs = dir.path().join("docs/MAJOR_REFACTOR_MODE");
        fs::create_dir_all(&docs).unwrap();
        fs::write(docs.join(PLANNING_GUIDE_FILE), "## House Rules\n\nSmall steps.\n").unwrap();

        let instructions = session.with_guide_dir(&docs).instructions();
        assert!(instructions.contains("## House Rules"));
        assert!(!instructions.contains("## The Planning Process"));
    }

    #[tokio::test]
    async fn test_resume_requires_handoff() {
        let (_dir, _registry, session) = setup();
        let launcher = RecordingLauncher::new(true);
        let err = session.resume(&launcher).await.unwrap_err();
        assert!(matches!(err, RefactorError::HandoffNotFound { ref id } if id == "auth-split"));
        assert!(err.is_not_found());
        assert!(launcher.calls().is_empty());
    }

    #[tokio::test]
    async fn test_handoff_advances_generation_for_resumed_planner() {
        let (_dir, _registry, session) = setup();
        assert_eq!(session.current_generation(), 1);

        let notes = PlanningHandoffNotes {
            why_handoff: "Context tight".to_string(),
            ..Default::default()
        };
        let path = session.update_handoff(&notes).unwrap();
        assert!(fs::read_to_string(&path).unwrap().contains("Planner #1 → #2"));
        assert_eq!(session.current_generation(), 2);

        let launch = session.resume(&RecordingLauncher::new(true)).await.unwrap();
        assert!(launch.resumed);
        assert_eq!(launch.generation, 2);
        assert!(launch.message("auth-split").contains("Planner #2"));
        let claude_md = fs::read_to_string(session.handle().planning_instructions_path()).unwrap();
        assert!(claude_md.contains("Planner #1 handed off to you"));

        session.update_handoff(&notes).unwrap();
        assert_eq!(session.current_generation(), 3);
    }

    #[test]
    fn test_open_unknown_refactor_fails() {
        let (_dir, registry, _session) = setup();
        let err = PlanningSession::open(&registry, "missing").err().unwrap();
        assert!(matches!(err, RefactorError::RefactorNotFound { .. }));
    }
}
