//! Read-only digests of a refactor's state and signal log.

use crate::signals::{Signal, SignalPayload, SignalType};
use crate::state::{AuditResult, RefactorState, RefactorStatus, SessionStatus};
use std::collections::BTreeMap;

/// Number of most recent signals shown in the timeline.
pub const TIMELINE_LEN: usize = 10;

/// A question some session is waiting on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingQuestion {
    pub session_id: String,
    pub question: String,
    pub options: Vec<String>,
}

/// One line of the chronological timeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimelineEvent {
    pub timestamp: String,
    pub signal_type: SignalType,
    pub session_id: String,
    pub summary: String,
}

/// Signals grouped by what they announce.
#[derive(Debug, Clone, Default)]
pub struct SignalSummary {
    pub total: usize,
    pub sessions_started: Vec<String>,
    pub sessions_done: Vec<String>,
    pub audits_passed: Vec<String>,
    pub revisions_needed: Vec<String>,
    pub escalations: Vec<String>,
    pub pending_questions: Vec<PendingQuestion>,
    pub latest: Option<Signal>,
    pub timeline: Vec<TimelineEvent>,
}

impl SignalSummary {
    /// Build from signals in chronological order.
    pub fn from_signals(signals: Vec<Signal>) -> Self {
        let mut summary = SignalSummary {
            total: signals.len(),
            ..Default::default()
        };

        for signal in &signals {
            let id = signal.session_id.clone();
            match &signal.payload {
                SignalPayload::SessionStarted { .. } => summary.sessions_started.push(id),
                SignalPayload::SessionDone { .. } => summary.sessions_done.push(id),
                SignalPayload::AuditPassed { .. } => summary.audits_passed.push(id),
                SignalPayload::RevisionNeeded { .. } => summary.revisions_needed.push(id),
                SignalPayload::Escalated { .. } => summary.escalations.push(id),
                SignalPayload::Question { question, options } => {
                    summary.pending_questions.push(PendingQuestion {
                        session_id: id,
                        question: question.clone(),
                        options: options.clone(),
                    })
                }
                SignalPayload::Paused { .. } | SignalPayload::Resumed {} => {}
            }
            summary.timeline.push(TimelineEvent {
                timestamp: signal.timestamp.format("%Y-%m-%dT%H:%M:%S").to_string(),
                signal_type: signal.signal_type(),
                session_id: signal.session_id.clone(),
                summary: signal.summary(),
            });
        }

        summary.latest = signals.into_iter().last();
        summary
    }

    pub fn to_markdown(&self) -> String {
        let mut lines = vec!["## Signal Summary\n".to_string()];
        if self.total == 0 {
            lines.push("No signals found yet.\n".to_string());
            return lines.join("\n");
        }

        lines.push(format!("**Total signals**: {}\n", self.total));
        for (label, ids) in [
            ("Sessions started", &self.sessions_started),
            ("Sessions done", &self.sessions_done),
            ("Audits passed", &self.audits_passed),
            ("Revisions needed", &self.revisions_needed),
            ("Escalations", &self.escalations),
        ] {
            if !ids.is_empty() {
                lines.push(format!("**{}**: {}", label, ids.join(", ")));
            }
        }

        if !self.pending_questions.is_empty() {
            lines.push("\n### Pending Questions".to_string());
            for q in &self.pending_questions {
                lines.push(format!("- **{}**: {}", q.session_id, q.question));
            }
        }

        let skip = self.timeline.len().saturating_sub(TIMELINE_LEN);
        lines.push("\n### Timeline (most recent)".to_string());
        for event in &self.timeline[skip..] {
            lines.push(format!(
                "- `{}` {}: {}",
                event.timestamp, event.session_id, event.summary
            ));
        }

        if let Some(latest) = &self.latest {
            lines.push(format!(
                "\n**Latest**: {} from {} at {}",
                latest.signal_type(),
                latest.session_id,
                latest.timestamp.format("%Y-%m-%dT%H:%M:%S")
            ));
        }
        lines.join("\n")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseState {
    CompleteAudited,
    AwaitingAudit,
    InProgress,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseProgress {
    pub phase: String,
    pub state: PhaseState,
}

impl PhaseProgress {
    pub fn line(&self) -> String {
        match self.state {
            PhaseState::CompleteAudited => format!("- ✅ Phase {}: Complete + Audited", self.phase),
            PhaseState::AwaitingAudit => {
                format!("- 🔄 Phase {}: Complete, awaiting audit", self.phase)
            }
            PhaseState::InProgress => format!("- 🔄 Phase {}: In progress", self.phase),
        }
    }
}

/// Roll sessions up by leading phase number, numerically ordered.
pub fn phase_progress(state: &RefactorState) -> Vec<PhaseProgress> {
    let mut phases: BTreeMap<(u32, String), Vec<(SessionStatus, AuditResult)>> = BTreeMap::new();
    for session in state.sessions.values() {
        let phase = session.phase().to_string();
        let order = phase.parse::<u32>().unwrap_or(u32::MAX);
        phases
            .entry((order, phase))
            .or_default()
            .push((session.status, session.audit_result));
    }

    phases
        .into_iter()
        .map(|((_, phase), sessions)| {
            let done = sessions.iter().all(|(s, _)| *s == SessionStatus::Completed);
            let passed = sessions.iter().all(|(_, a)| *a == AuditResult::Passed);
            let state = match (done, passed) {
                (true, true) => PhaseState::CompleteAudited,
                (true, false) => PhaseState::AwaitingAudit,
                _ => PhaseState::InProgress,
            };
            PhaseProgress { phase, state }
        })
        .collect()
}

pub fn status_marker(status: SessionStatus) -> &'static str {
    match status {
        SessionStatus::Pending => "⬜",
        SessionStatus::InProgress => "🔄",
        SessionStatus::Completed => "✅",
        SessionStatus::NeedsRevision => "⚠️",
    }
}

/// "What's the status" answer.
#[derive(Debug, Clone)]
pub struct StatusSummary {
    pub refactor_id: String,
    /// None when the refactor has no state document yet.
    pub status: Option<RefactorStatus>,
    pub current_session: Option<String>,
    pub pending: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub needs_revision: usize,
    pub pending_questions: usize,
    pub latest_signal: Option<(SignalType, String)>,
    pub phases: Vec<PhaseProgress>,
}

impl StatusSummary {
    pub fn build(refactor_id: &str, state: Option<&RefactorState>, signals: &SignalSummary) -> Self {
        let count = |status| state.map_or(0, |s| s.sessions_with(status).len());
        Self {
            refactor_id: refactor_id.to_string(),
            status: state.map(|s| s.status),
            current_session: state.and_then(|s| s.current_session.clone()),
            pending: count(SessionStatus::Pending),
            in_progress: count(SessionStatus::InProgress),
            completed: count(SessionStatus::Completed),
            needs_revision: count(SessionStatus::NeedsRevision),
            pending_questions: signals.pending_questions.len(),
            latest_signal: signals
                .latest
                .as_ref()
                .map(|s| (s.signal_type(), s.session_id.clone())),
            phases: state.map(phase_progress).unwrap_or_default(),
        }
    }

    pub fn to_markdown(&self) -> String {
        let Some(status) = self.status else {
            return format!(
                "**Refactor**: {}\n**Status**: No state found - refactor may not be started yet\n",
                self.refactor_id
            );
        };

        let mut out = format!(
            "**Refactor**: {}\n**Status**: {}\n**Current Session**: {}\n\n**Sessions**: {} completed, {} in progress, {} pending\n",
            self.refactor_id,
            status,
            self.current_session.as_deref().unwrap_or("None"),
            self.completed,
            self.in_progress,
            self.pending
        );
        if self.needs_revision > 0 {
            out.push_str(&format!(
                "**⚠️ Needs Revision**: {} session(s)\n",
                self.needs_revision
            ));
        }
        if !self.phases.is_empty() {
            out.push_str("\n**Phases**:\n");
            for phase in &self.phases {
                out.push_str(&phase.line());
                out.push('\n');
            }
        }
        if self.pending_questions > 0 {
            out.push_str(&format!(
                "\n**❓ Pending Questions**: {}\n",
                self.pending_questions
            ));
        }
        if let Some((ty, session)) = &self.latest_signal {
            out.push_str(&format!("\n**Latest Signal**: {} from {}\n", ty, session));
        }
        out
    }
}

/// Advice to present for a signal.
pub fn recommend(signal: &Signal) -> String {
    let session = &signal.session_id;
    match &signal.payload {
        SignalPayload::SessionDone {
            commit_hash,
            summary,
        } => format!(
            "Session **{}** completed! (commit: {})\n{}\n\n**Options:**\n1. Start the next session\n2. Run an audit on this phase\n3. Check the work before proceeding\n4. Modify the plan\n",
            session,
            commit_hash.as_deref().unwrap_or("unknown"),
            summary
        ),
        SignalPayload::AuditPassed { notes } => format!(
            "Audit **PASSED** for {}! ✅\n{}\n\nReady to advance to the next phase.\n",
            session, notes
        ),
        SignalPayload::RevisionNeeded {
            issues,
            suggestions,
        } => {
            let issues = if issues.is_empty() {
                "- No specific issues listed".to_string()
            } else {
                bullets(issues)
            };
            format!(
                "Audit found issues with {}:\n\n**Issues:**\n{}\n\n**Suggestions:**\n{}\n\nThe session needs revision.\n",
                session,
                issues,
                bullets(suggestions)
            )
        }
        SignalPayload::Question { question, options } => {
            let options = options
                .iter()
                .enumerate()
                .map(|(i, opt)| format!("{}. {}", i + 1, opt))
                .collect::<Vec<_>>()
                .join("\n");
            format!(
                "Session **{}** has a question:\n\n> {}\n\n{}\n\nPlease answer so the session can continue.\n",
                session, question, options
            )
        }
        SignalPayload::Escalated {
            iteration_count,
            reason,
        } => format!(
            "Session **{}** was escalated after {} audit iteration(s):\n\n> {}\n\nThe refactor is paused. Review the plan before relaunching.\n",
            session, iteration_count, reason
        ),
        _ => format!("Received signal: {} from {}", signal.signal_type(), session),
    }
}

fn bullets(items: &[String]) -> String {
    items
        .iter()
        .map(|i| format!("- {}", i))
        .collect::<Vec<_>>()
        .join("\n")
}
