//! Signal types exchanged between agent processes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed set of signal kinds. The snake_case name is also the filename tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalType {
    SessionStarted,
    SessionDone,
    AuditPassed,
    RevisionNeeded,
    Question,
    Paused,
    Resumed,
    Escalated,
}

impl SignalType {
    pub const ALL: [SignalType; 8] = [
        SignalType::SessionStarted,
        SignalType::SessionDone,
        SignalType::AuditPassed,
        SignalType::RevisionNeeded,
        SignalType::Question,
        SignalType::Paused,
        SignalType::Resumed,
        SignalType::Escalated,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SignalType::SessionStarted => "session_started",
            SignalType::SessionDone => "session_done",
            SignalType::AuditPassed => "audit_passed",
            SignalType::RevisionNeeded => "revision_needed",
            SignalType::Question => "question",
            SignalType::Paused => "paused",
            SignalType::Resumed => "resumed",
            SignalType::Escalated => "escalated",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == s)
    }
}

impl fmt::Display for SignalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed payload, one variant per [`SignalType`].
///
/// Serialized adjacently tagged, so a signal file reads
/// `{"type": "session_done", "payload": {...}, ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum SignalPayload {
    SessionStarted {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        worktree_path: Option<String>,
    },
    SessionDone {
        #[serde(default)]
        commit_hash: Option<String>,
        #[serde(default)]
        summary: String,
    },
    AuditPassed {
        #[serde(default)]
        notes: String,
    },
    RevisionNeeded {
        #[serde(default)]
        issues: Vec<String>,
        #[serde(default)]
        suggestions: Vec<String>,
    },
    Question {
        question: String,
        #[serde(default)]
        options: Vec<String>,
    },
    Paused {
        #[serde(default)]
        reason: Option<String>,
    },
    Resumed {},
    Escalated {
        iteration_count: u32,
        #[serde(default)]
        reason: String,
    },
}

impl SignalPayload {
    pub fn signal_type(&self) -> SignalType {
        match self {
            SignalPayload::SessionStarted { .. } => SignalType::SessionStarted,
            SignalPayload::SessionDone { .. } => SignalType::SessionDone,
            SignalPayload::AuditPassed { .. } => SignalType::AuditPassed,
            SignalPayload::RevisionNeeded { .. } => SignalType::RevisionNeeded,
            SignalPayload::Question { .. } => SignalType::Question,
            SignalPayload::Paused { .. } => SignalType::Paused,
            SignalPayload::Resumed {} => SignalType::Resumed,
            SignalPayload::Escalated { .. } => SignalType::Escalated,
        }
    }
}

/// One immutable cross-agent event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    #[serde(flatten)]
    pub payload: SignalPayload,
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
}

impl Signal {
    pub fn new(session_id: impl Into<String>, payload: SignalPayload) -> Self {
        Self {
            payload,
            session_id: session_id.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn signal_type(&self) -> SignalType {
        self.payload.signal_type()
    }

    /// One-line description used in timelines and status output.
    pub fn summary(&self) -> String {
        match &self.payload {
            SignalPayload::SessionStarted { worktree_path } => match worktree_path {
                Some(path) => format!("Session started (worktree: {})", path),
                None => "Session started".to_string(),
            },
            SignalPayload::SessionDone { commit_hash, .. } => match commit_hash {
                Some(commit) if !commit.is_empty() => format!("Session done (commit: {})", commit),
                _ => "Session done".to_string(),
            },
            SignalPayload::AuditPassed { .. } => "Audit passed".to_string(),
            SignalPayload::RevisionNeeded { issues, .. } => format!(
                "Revision needed ({} issue{})",
                issues.len(),
                if issues.len() == 1 { "" } else { "s" }
            ),
            SignalPayload::Question { question, .. } => {
                let short: String = question.chars().take(50).collect();
                format!("Question: {}", short)
            }
            SignalPayload::Paused { reason } => match reason {
                Some(reason) => format!("Paused: {}", reason),
                None => "Paused".to_string(),
            },
            SignalPayload::Resumed {} => "Resumed".to_string(),
            SignalPayload::Escalated {
                iteration_count,
                reason,
            } => format!("Escalated after {} iterations: {}", iteration_count, reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_type_names_match_serde() {
        for ty in SignalType::ALL {
            let json = serde_json::to_string(&ty).unwrap();
            assert_eq!(json, format!("\"{}\"", ty.as_str()));
            assert_eq!(SignalType::parse(ty.as_str()), Some(ty));
        }
        assert_eq!(SignalType::parse("bogus"), None);
    }

    #[test]
    fn test_signal_wire_format() {
        let signal = Signal::new(
            "1.1",
            SignalPayload::SessionDone {
                commit_hash: Some("abc123".into()),
                summary: "did it".into(),
            },
        );
        let value: serde_json::Value = serde_json::to_value(&signal).unwrap();
        assert_eq!(value["type"], "session_done");
        assert_eq!(value["session_id"], "1.1");
        assert_eq!(value["payload"]["commit_hash"], "abc123");
        assert!(value["timestamp"].is_string());
    }

    #[test]
    fn test_signal_parses_hand_written_file() {
        let raw = r#"{
            "type": "revision_needed",
            "session_id": "2.1",
            "timestamp": "2026-01-03T14:30:00Z",
            "payload": {"issues": ["missing tests"]}
        }"#;
        let signal: Signal = serde_json::from_str(raw).unwrap();
        assert_eq!(signal.signal_type(), SignalType::RevisionNeeded);
        match signal.payload {
            SignalPayload::RevisionNeeded {
                issues,
                suggestions,
            } => {
                assert_eq!(issues, vec!["missing tests"]);
                assert!(suggestions.is_empty());
            }
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[test]
    fn test_unknown_type_rejected() {
        let raw = r#"{"type": "exploded", "session_id": "1", "timestamp": "2026-01-03T14:30:00Z", "payload": {}}"#;
        assert!(serde_json::from_str::<Signal>(raw).is_err());
    }

    #[test]
    fn test_summary_text() {
        let signal = Signal::new(
            "1.1",
            SignalPayload::RevisionNeeded {
                issues: vec!["a".into()],
                suggestions: vec![],
            },
        );
        assert_eq!(signal.summary(), "Revision needed (1 issue)");
        let signal = Signal::new(
            "1.1",
            SignalPayload::Escalated {
                iteration_count: 3,
                reason: "plan is wrong".into(),
            },
        );
        assert!(signal.summary().contains("3 iterations"));
    }
}
