//! Refactor execution state.
//!
//! [`RefactorState`] is the canonical answer to "what has happened so far":
//! overall status, per-session progress and an append-only history of every
//! mutation. The state is only changed through the transition methods
//! below, each of which appends a [`StateChange`]. [`StateStore`] wraps
//! those transitions in load-mutate-persist cycles against `state.json`.

mod store;

pub use store::StateStore;

use crate::errors::{RefactorError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::fmt;

/// Status of an overall refactor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefactorStatus {
    #[default]
    Planning,
    Executing,
    Paused,
    Completed,
}

impl RefactorStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefactorStatus::Planning => "planning",
            RefactorStatus::Executing => "executing",
            RefactorStatus::Paused => "paused",
            RefactorStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for RefactorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a single execution session.
///
/// ```text
/// pending -> in_progress -> completed -> needs_revision
///                 ^   \----> needs_revision   |
///                 \------------------------------/
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    NeedsRevision,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Pending => "pending",
            SessionStatus::InProgress => "in_progress",
            SessionStatus::Completed => "completed",
            SessionStatus::NeedsRevision => "needs_revision",
        }
    }

    /// Whether the lifecycle allows moving from `self` to `next`.
    ///
    /// Re-launching an in-progress session and re-recording a completed one
    /// are allowed; nothing may skip `in_progress`.
    pub fn can_transition_to(self, next: SessionStatus) -> bool {
        use SessionStatus::*;
        matches!(
            (self, next),
            (Pending, InProgress)
                | (InProgress, InProgress)
                | (InProgress, Completed)
                | (InProgress, NeedsRevision)
                | (Completed, Completed)
                | (Completed, NeedsRevision)
                | (NeedsRevision, InProgress)
        )
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of an audit review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditResult {
    #[default]
    Pending,
    Passed,
    Failed,
}

impl AuditResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditResult::Pending => "pending",
            AuditResult::Passed => "passed",
            AuditResult::Failed => "failed",
        }
    }
}

/// State for a single execution session (e.g. "1.1").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub session_id: String,
    #[serde(default)]
    pub status: SessionStatus,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    /// Set exactly when `status` is `completed`.
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub commit_hash: Option<String>,
    #[serde(default)]
    pub audit_result: AuditResult,
    /// Handoff notes for the next session.
    #[serde(default)]
    pub notes: String,
    /// Number of failed audits; never decreases.
    #[serde(default)]
    pub iteration_count: u32,
}

impl SessionState {
    pub fn new(session_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            status: SessionStatus::Pending,
            started_at: None,
            completed_at: None,
            commit_hash: None,
            audit_result: AuditResult::Pending,
            notes: String::new(),
            iteration_count: 0,
        }
    }

    /// Leading phase number of a hierarchical id ("2" for "2.1").
    pub fn phase(&self) -> &str {
        self.session_id
            .split('.')
            .next()
            .unwrap_or(&self.session_id)
    }

    fn transition(&mut self, next: SessionStatus) -> Result<SessionStatus> {
        let old = self.status;
        if !old.can_transition_to(next) {
            return Err(RefactorError::InvalidTransition {
                session_id: self.session_id.clone(),
                from: old.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        if next != SessionStatus::Completed {
            self.completed_at = None;
        }
        Ok(old)
    }
}

/// Immutable audit-log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateChange {
    pub timestamp: DateTime<Utc>,
    pub action: String,
    #[serde(default)]
    pub details: Map<String, Value>,
}

/// Runtime state for one refactor. Stored at `{refactor}/state.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefactorState {
    pub refactor_id: String,
    #[serde(default)]
    pub status: RefactorStatus,
    /// When set, always a key of `sessions`.
    #[serde(default)]
    pub current_session: Option<String>,
    #[serde(default)]
    pub sessions: BTreeMap<String, SessionState>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub history: Vec<StateChange>,
}

impl RefactorState {
    pub fn new(refactor_id: &str) -> Self {
        Self {
            refactor_id: refactor_id.to_string(),
            status: RefactorStatus::Planning,
            current_session: None,
            sessions: BTreeMap::new(),
            started_at: None,
            updated_at: Utc::now(),
            completed_at: None,
            history: Vec::new(),
        }
    }

    fn log_change(&mut self, action: &str, details: Value) {
        let details = match details {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        let now = Utc::now();
        self.updated_at = now;
        self.history.push(StateChange {
            timestamp: now,
            action: action.to_string(),
            details,
        });
    }

    fn session_mut(&mut self, session_id: &str) -> Result<&mut SessionState> {
        self.sessions
            .get_mut(session_id)
            .ok_or_else(|| RefactorError::SessionNotFound {
                id: session_id.to_string(),
            })
    }

    pub fn session(&self, session_id: &str) -> Option<&SessionState> {
        self.sessions.get(session_id)
    }

    /// Add a new pending session. Fails if the id is already tracked.
    pub fn add_session(&mut self, session_id: &str) -> Result<&SessionState> {
        if self.sessions.contains_key(session_id) {
            return Err(RefactorError::DuplicateSession {
                id: session_id.to_string(),
            });
        }
        self.sessions
            .insert(session_id.to_string(), SessionState::new(session_id));
        self.log_change("session_added", json!({ "session_id": session_id }));
        Ok(&self.sessions[session_id])
    }

    /// Mark a session as started, creating it when absent.
    pub fn start_session(&mut self, session_id: &str) -> Result<&SessionState> {
        if !self.sessions.contains_key(session_id) {
            self.add_session(session_id)?;
        }

        let now = Utc::now();
        let session = self.session_mut(session_id)?;
        let old = session.transition(SessionStatus::InProgress)?;
        session.started_at = Some(now);

        self.current_session = Some(session_id.to_string());
        self.status = RefactorStatus::Executing;
        self.completed_at = None;
        if self.started_at.is_none() {
            self.started_at = Some(now);
        }
        self.log_change(
            "session_started",
            json!({
                "session_id": session_id,
                "old_status": old.as_str(),
                "new_status": SessionStatus::InProgress.as_str(),
            }),
        );
        Ok(&self.sessions[session_id])
    }

    /// Mark a session as completed, recording commit and notes when given.
    pub fn complete_session(
        &mut self,
        session_id: &str,
        commit_hash: Option<&str>,
        notes: Option<&str>,
    ) -> Result<&SessionState> {
        let session = self.session_mut(session_id)?;
        // Planned but never started counts as unknown to completion.
        if session.status == SessionStatus::Pending {
            return Err(RefactorError::SessionNotFound {
                id: session_id.to_string(),
            });
        }
        let old = session.transition(SessionStatus::Completed)?;
        session.completed_at = Some(Utc::now());
        if let Some(hash) = commit_hash.filter(|h| !h.is_empty()) {
            session.commit_hash = Some(hash.to_string());
        }
        if let Some(notes) = notes.filter(|n| !n.is_empty()) {
            session.notes = notes.to_string();
        }

        self.log_change(
            "session_completed",
            json!({
                "session_id": session_id,
                "old_status": old.as_str(),
                "commit_hash": commit_hash,
            }),
        );
        self.mark_completed_if_done();
        Ok(&self.sessions[session_id])
    }

    /// Mark a session as needing revision after a failed audit.
    pub fn mark_needs_revision(
        &mut self,
        session_id: &str,
        notes: Option<&str>,
    ) -> Result<&SessionState> {
        let session = self.session_mut(session_id)?;
        let old = session.transition(SessionStatus::NeedsRevision)?;
        session.audit_result = AuditResult::Failed;
        if let Some(notes) = notes.filter(|n| !n.is_empty()) {
            session.notes = notes.to_string();
        }

        if self.status == RefactorStatus::Completed {
            self.status = RefactorStatus::Executing;
            self.completed_at = None;
        }
        self.log_change(
            "session_needs_revision",
            json!({
                "session_id": session_id,
                "old_status": old.as_str(),
                "notes": notes.unwrap_or_default(),
            }),
        );
        Ok(&self.sessions[session_id])
    }

    /// Increment and return the audit iteration count; 0 for unknown sessions.
    pub fn increment_iteration(&mut self, session_id: &str) -> u32 {
        let Some(session) = self.sessions.get_mut(session_id) else {
            return 0;
        };
        session.iteration_count += 1;
        let count = session.iteration_count;
        self.log_change(
            "iteration_incremented",
            json!({ "session_id": session_id, "count": count }),
        );
        count
    }

    /// Record an audit verdict without touching the lifecycle status.
    pub fn record_audit_result(&mut self, session_id: &str, passed: bool) -> Result<()> {
        let session = self.session_mut(session_id)?;
        session.audit_result = if passed {
            AuditResult::Passed
        } else {
            AuditResult::Failed
        };
        let result = session.audit_result;
        self.log_change(
            "audit_recorded",
            json!({ "session_id": session_id, "result": result.as_str() }),
        );
        Ok(())
    }

    /// Move the pointer from one session to the next.
    ///
    /// `from` is completed when it is still in progress or awaiting
    /// revision (an operator override); `to` is tracked as pending when new.
    /// Returns false when the state already reflected the advance.
    pub fn advance_phase(&mut self, from: &str, to: &str) -> Result<bool> {
        let mut changed = false;

        if let Some(session) = self.sessions.get_mut(from) {
            match session.status {
                SessionStatus::Completed => {}
                SessionStatus::Pending => {
                    return Err(RefactorError::InvalidTransition {
                        session_id: from.to_string(),
                        from: SessionStatus::Pending.to_string(),
                        to: SessionStatus::Completed.to_string(),
                    });
                }
                SessionStatus::InProgress | SessionStatus::NeedsRevision => {
                    session.status = SessionStatus::Completed;
                    session.completed_at = Some(Utc::now());
                    changed = true;
                }
            }
        }

        if !self.sessions.contains_key(to) {
            self.sessions.insert(to.to_string(), SessionState::new(to));
            changed = true;
        }
        if self.current_session.as_deref() != Some(to) {
            self.current_session = Some(to.to_string());
            changed = true;
        }

        if changed {
            self.log_change("phase_advanced", json!({ "from": from, "to": to }));
            self.mark_completed_if_done();
        }
        Ok(changed)
    }

    pub fn pause(&mut self, reason: Option<&str>) {
        let old = self.status;
        self.status = RefactorStatus::Paused;
        self.log_change(
            "refactor_paused",
            json!({ "old_status": old.as_str(), "reason": reason }),
        );
    }

    pub fn resume(&mut self) {
        let old = self.status;
        self.status = RefactorStatus::Executing;
        self.log_change("refactor_resumed", json!({ "old_status": old.as_str() }));
    }

    fn mark_completed_if_done(&mut self) {
        if self.is_complete() && self.status != RefactorStatus::Completed {
            self.status = RefactorStatus::Completed;
            self.completed_at = Some(Utc::now());
            self.log_change("refactor_completed", json!({}));
        }
    }

    pub fn pending_sessions(&self) -> Vec<&SessionState> {
        self.sessions_with(SessionStatus::Pending)
    }

    pub fn completed_sessions(&self) -> Vec<&SessionState> {
        self.sessions_with(SessionStatus::Completed)
    }

    pub fn sessions_with(&self, status: SessionStatus) -> Vec<&SessionState> {
        self.sessions.values().filter(|s| s.status == status).collect()
    }

    /// True iff at least one session exists and all are completed.
    pub fn is_complete(&self) -> bool {
        !self.sessions.is_empty()
            && self
                .sessions
                .values()
                .all(|s| s.status == SessionStatus::Completed)
    }
}
