//! Audit gate between completed sessions and the next phase.
//!
//! An audit reviews a group of sessions against the refactor's principles
//! and decisions and ends in one of three outcomes:
//!
//! - pass: sessions are marked `passed`, one `audit_passed` signal each
//! - fail: sessions go to `needs_revision`, their iteration counters grow
//!   and a `revision_needed` signal carries the issues
//! - escalate: repeated failure or an explicit call; an `escalated` signal
//!   is written and the refactor is paused for a human
//!
//! A failure that pushes a session's iteration count to the configured
//! maximum is escalated instead of sent back for another revision.

mod context;
mod report;

pub use context::{
    AuditContext, DEFAULT_MAX_DIFF_CHARS_PER_COMMIT, DEFAULT_MAX_DIFF_CHARS_TOTAL, DiffLimits,
    GuideDocument, SessionEvidence,
};
pub use report::{AuditIssue, AuditVerdict, Severity, VerdictIssue, VerdictKind, render_issues};

use crate::errors::{RefactorError, Result};
use crate::launch::{AgentInvoker, ProcessLauncher};
use crate::refactor::{RefactorHandle, sanitize_id};
use crate::session::{DEFAULT_AGENT_COMMAND, DEFAULT_DOCS_DIR};
use crate::signals::SignalLog;
use crate::state::{SessionStatus, StateStore};
use crate::util::atomic_write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const DEFAULT_MAX_AUDIT_ITERATIONS: u32 = 3;

/// Result of recording an audit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditOutcome {
    Passed {
        sessions: Vec<String>,
    },
    RevisionNeeded {
        /// (session, iteration count after this failure)
        sessions: Vec<(String, u32)>,
    },
    Escalated {
        sessions: Vec<(String, u32)>,
        reason: String,
    },
}

impl AuditOutcome {
    pub fn message(&self) -> String {
        match self {
            AuditOutcome::Passed { sessions } => {
                format!("Audit PASSED for sessions: {}", sessions.join(", "))
            }
            AuditOutcome::RevisionNeeded { sessions } => format!(
                "Audit FAILED for sessions: {}. Revision needed.",
                describe_iterations(sessions)
            ),
            AuditOutcome::Escalated { sessions, reason } => format!(
                "Audit ESCALATED for sessions: {}. {} Refactor paused for human review.",
                describe_iterations(sessions),
                reason
            ),
        }
    }
}

fn describe_iterations(sessions: &[(String, u32)]) -> String {
    sessions
        .iter()
        .map(|(id, n)| format!("{} (iteration {})", id, n))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Where an audit session was opened.
#[derive(Debug, Clone)]
pub struct AuditLaunch {
    pub dir: PathBuf,
    pub launched: bool,
    pub command: String,
}

impl AuditLaunch {
    pub fn message(&self, sessions: &[String]) -> String {
        if self.launched {
            format!(
                "Audit session launched for {}!\n\nThe auditor will read PHILOSOPHY.md and validate the work.",
                sessions.join(", ")
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

pub struct AuditController {
    handle: RefactorHandle,
    session_ids: Vec<String>,
    project_dir: PathBuf,
    docs_dir: String,
    max_iterations: u32,
    limits: DiffLimits,
    agent_command: String,
}

impl AuditController {
    /// Fails with `RefactorNotFound` unless the refactor has a state document.
    /// Session ids are sanitized; ids that sanitize to nothing are dropped.
    pub fn new(handle: &RefactorHandle, session_ids: &[String], project_dir: &Path) -> Result<Self> {
        if !handle.has_state() {
            return Err(RefactorError::RefactorNotFound {
                id: handle.id().to_string(),
            });
        }
        let mut ids: Vec<String> = Vec::new();
        for id in session_ids.iter().map(|s| sanitize_id(s)) {
            if !id.is_empty() && !ids.contains(&id) {
                ids.push(id);
            }
        }
        if ids.is_empty() {
            return Err(anyhow::anyhow!("No valid session ids given for audit").into());
        }
        Ok(Self {
            handle: handle.clone(),
            session_ids: ids,
            project_dir: project_dir.to_path_buf(),
            docs_dir: DEFAULT_DOCS_DIR.to_string(),
            max_iterations: DEFAULT_MAX_AUDIT_ITERATIONS,
            limits: DiffLimits::default(),
            agent_command: DEFAULT_AGENT_COMMAND.to_string(),
        })
    }

    pub fn with_docs_dir(mut self, docs_dir: impl Into<String>) -> Self {
        self.docs_dir = docs_dir.into();
        self
    }

    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max.max(1);
        self
    }

    pub fn with_diff_limits(mut self, limits: DiffLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_agent_command(mut self, command: impl Into<String>) -> Self {
        self.agent_command = command.into();
        self
    }

    pub fn session_ids(&self) -> &[String] {
        &self.session_ids
    }

    pub fn audit_dir(&self) -> PathBuf {
        self.handle.audit_sessions_dir().join(self.session_ids.join("-"))
    }

    pub fn gather_context(&self) -> AuditContext {
        AuditContext::gather(
            &self.handle,
            &self.project_dir,
            &self.docs_dir,
            &self.session_ids,
            self.limits,
        )
    }

    /// The auditor's instruction document.
    pub fn instructions(&self) -> String {
        let ctx = self.gather_context();
        let sessions = self.session_ids.join(", ");
        let evidence = ctx
            .sessions
            .iter()
            .map(|s| s.render())
            .collect::<Vec<_>>()
            .join("\n\n---\n\n");
        let refactor = self.handle.id();
        let first = &self.session_ids[0];

        format!(
            r#"# Audit Session: {sessions}

> **Refactor**: {refactor}
> **Sessions under review**: {sessions}

Validate the work of these sessions against the principles and decisions
below. Review the actual code changes, not only the reported output.

---

## Guiding Principles (PHILOSOPHY.md)

{principles}

---

## Architecture Decisions (DECISIONS.md)

{decisions}

---

## Session Records

{evidence}

---

## Code Changes

{changes}

---

## Recording the Verdict

If the work is aligned:

```bash
forge-refactor audit-pass {refactor} {sessions_args} --notes "..."
```

If revision is needed, one `--issue` per finding:

```bash
forge-refactor audit-fail {refactor} {sessions_args} --issue "..." --suggestion "..."
```

If the plan itself looks wrong rather than the implementation:

```bash
forge-refactor audit-escalate {refactor} {sessions_args} --reason "..."
```

When asked for a machine-readable verdict, answer with one JSON object:

```json
{{"verdict": "pass" | "fail" | "escalate",
 "issues": [{{"session_id": "{first}", "principle": "...", "description": "...", "severity": "critical" | "warning" | "note", "suggestion": "..."}}],
 "suggestions": ["..."], "notes": "...", "reason": "..."}}
```
"#,
            sessions = sessions,
            refactor = refactor,
            principles = ctx.principles.content.trim(),
            decisions = ctx.decisions.content.trim(),
            evidence = evidence,
            changes = ctx.code_changes,
            sessions_args = self.session_ids.join(" "),
            first = first,
        )
    }

    /// Write the instruction document to `audit-sessions/{ids}/CLAUDE.md`
    /// and ask the launcher to open a terminal there.
    pub async fn launch(&self, launcher: &dyn ProcessLauncher) -> Result<AuditLaunch> {
        let dir = self.audit_dir();
        atomic_write(&dir.join("CLAUDE.md"), self.instructions().as_bytes())?;

        let launched = match launcher.open(&dir, &self.agent_command).await {
            Ok(opened) => opened,
            Err(e) => {
                warn!(error = %e, "Launcher failed");
                false
            }
        };
        info!(refactor = %self.handle.id(), sessions = ?self.session_ids, launched, "Audit launched");
        Ok(AuditLaunch {
            dir,
            launched,
            command: self.agent_command.clone(),
        })
    }

    pub fn record_pass(&self, notes: Option<&str>) -> Result<AuditOutcome> {
        let store = StateStore::new(&self.handle);
        store.update(|state| {
            for id in &self.session_ids {
                state.record_audit_result(id, true)?;
            }
            Ok(())
        })?;

        let notes = notes
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("Audit passed for sessions: {}", self.session_ids.join(", ")));
        let signals = SignalLog::new(&self.handle);
        for id in &self.session_ids {
            signals.audit_passed(id, &notes)?;
        }

        info!(refactor = %self.handle.id(), sessions = ?self.session_ids, "Audit passed");
        Ok(AuditOutcome::Passed {
            sessions: self.session_ids.clone(),
        })
    }

    /// Send the sessions back for revision, or escalate any session whose
    /// failure count has reached the iteration limit.
    pub fn record_fail(&self, issues: &[String], suggestions: &[String]) -> Result<AuditOutcome> {
        let store = StateStore::new(&self.handle);
        let notes = issues.join("; ");

        let counts = store.update(|state| {
            let mut counts = Vec::new();
            for id in &self.session_ids {
                let status = state
                    .session(id)
                    .map(|s| s.status)
                    .ok_or_else(|| RefactorError::SessionNotFound { id: id.clone() })?;
                if status == SessionStatus::NeedsRevision {
                    state.record_audit_result(id, false)?;
                } else {
                    state.mark_needs_revision(id, Some(&notes))?;
                }
                counts.push((id.clone(), state.increment_iteration(id)));
            }
            Ok(counts)
        })?;

        let (escalated, revise): (Vec<_>, Vec<_>) = counts
            .into_iter()
            .partition(|(_, count)| *count >= self.max_iterations);

        let signals = SignalLog::new(&self.handle);
        for (id, _) in &revise {
            signals.revision_needed(id, issues, suggestions)?;
        }

        if escalated.is_empty() {
            info!(refactor = %self.handle.id(), sessions = ?self.session_ids, "Audit failed, revision needed");
            return Ok(AuditOutcome::RevisionNeeded { sessions: revise });
        }

        let reason = format!(
            "Audit failed {} times; the plan may need rethinking. Last issues: {}",
            self.max_iterations,
            if notes.is_empty() { "none given" } else { notes.as_str() }
        );
        self.escalate(&escalated, &reason)?;
        let mut sessions = escalated;
        sessions.extend(revise);
        Ok(AuditOutcome::Escalated { sessions, reason })
    }

    /// Escalate to a human without counting another failure.
    pub fn record_escalation(&self, reason: &str) -> Result<AuditOutcome> {
        let state = StateStore::new(&self.handle).load()?;
        let sessions: Vec<(String, u32)> = self
            .session_ids
            .iter()
            .map(|id| {
                let count = state.session(id).map(|s| s.iteration_count).unwrap_or(0);
                (id.clone(), count)
            })
            .collect();
        self.escalate(&sessions, reason)?;
        Ok(AuditOutcome::Escalated {
            sessions,
            reason: reason.to_string(),
        })
    }

    fn escalate(&self, sessions: &[(String, u32)], reason: &str) -> Result<()> {
        let signals = SignalLog::new(&self.handle);
        for (id, count) in sessions {
            signals.escalated(id, *count, reason)?;
        }
        StateStore::new(&self.handle).update(|state| {
            state.pause(Some(reason));
            Ok(())
        })?;
        warn!(refactor = %self.handle.id(), sessions = ?self.session_ids, reason, "Audit escalated");
        Ok(())
    }

    /// Write `audit-results/issues-iteration-N.md` and refresh `issues.md`.
    pub fn write_issues(&self, issues: &[AuditIssue], iteration: u32) -> Result<PathBuf> {
        let content = render_issues(&self.session_ids, issues, iteration);
        let dir = self.handle.audit_results_dir();
        let path = dir.join(format!("issues-iteration-{}.md", iteration));
        atomic_write(&path, content.as_bytes())?;
        atomic_write(&dir.join("issues.md"), content.as_bytes())?;
        Ok(path)
    }

    /// Ask an agent for a verdict and record it.
    pub async fn run_with_agent(&self, invoker: &dyn AgentInvoker) -> Result<AuditOutcome> {
        let prompt = format!(
            "{}\n\nRespond with the JSON verdict object only.",
            self.instructions()
        );
        let response = invoker.generate(&prompt).await?;
        let verdict = AuditVerdict::parse(&response)?;
        info!(refactor = %self.handle.id(), verdict = ?verdict.verdict, "Agent verdict received");

        match verdict.verdict {
            VerdictKind::Pass => self.record_pass(Some(&verdict.notes)),
            VerdictKind::Escalate => {
                let reason = if verdict.reason.is_empty() {
                    "Escalated by automated audit"
                } else {
                    verdict.reason.as_str()
                };
                self.record_escalation(reason)
            }
            VerdictKind::Fail => {
                let issues: Vec<AuditIssue> = verdict
                    .issues
                    .into_iter()
                    .map(|i| i.into_issue(&self.session_ids[0]))
                    .collect();
                let next_iteration = self.current_max_iteration()? + 1;
                self.write_issues(&issues, next_iteration)?;
                let headlines: Vec<String> = issues.iter().map(|i| i.description.clone()).collect();
                self.record_fail(&headlines, &verdict.suggestions)
            }
        }
    }

    fn current_max_iteration(&self) -> Result<u32> {
        let state = StateStore::new(&self.handle).load()?;
        Ok(self
            .session_ids
            .iter()
            .filter_map(|id| state.session(id))
            .map(|s| s.iteration_count)
            .max()
            .unwrap_or(0))
    }
}
