//! Audit findings and the verdict format auditors answer with.

use crate::errors::{RefactorError, Result};
use crate::util::extract_json_object;
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    #[default]
    Warning,
    Note,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Critical => write!(f, "critical"),
            Severity::Warning => write!(f, "warning"),
            Severity::Note => write!(f, "note"),
        }
    }
}

/// One finding against one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditIssue {
    #[serde(default)]
    pub session_id: String,
    #[serde(default, alias = "principle_violated")]
    pub principle: String,
    pub description: String,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default)]
    pub suggestion: String,
}

impl AuditIssue {
    /// One-line form used in signals and state notes.
    pub fn headline(&self) -> String {
        if self.session_id.is_empty() {
            self.description.clone()
        } else {
            format!("[{}] {}", self.session_id, self.description)
        }
    }
}

/// Render the issues document, grouped critical, then warnings, then notes.
pub fn render_issues(session_ids: &[String], issues: &[AuditIssue], iteration: u32) -> String {
    let sessions = session_ids.join(", ");
    let mut content = format!(
        "# Audit Issues - Sessions {sessions}\n\n> **Iteration**: {iteration}\n> **Generated**: {}\n> **Sessions**: {sessions}\n\n---\n\n",
        Local::now().format("%Y-%m-%d %H:%M"),
    );

    let of = |severity: Severity| issues.iter().filter(move |i| i.severity == severity);

    if of(Severity::Critical).next().is_some() {
        content.push_str("## Critical Issues\n\nThese MUST be fixed before proceeding:\n\n");
        for issue in of(Severity::Critical) {
            content.push_str(&format!(
                "### [{}] {}\n\n{}\n\n**Suggestion:** {}\n\n",
                issue.session_id, issue.principle, issue.description, issue.suggestion
            ));
        }
    }

    if of(Severity::Warning).next().is_some() {
        content.push_str("## Warnings\n\nThese should be addressed:\n\n");
        for issue in of(Severity::Warning) {
            content.push_str(&format!(
                "- **[{}]** {}\n  - Principle: {}\n  - Suggestion: {}\n\n",
                issue.session_id, issue.description, issue.principle, issue.suggestion
            ));
        }
    }

    if of(Severity::Note).next().is_some() {
        content.push_str("## Notes\n\nMinor observations:\n\n");
        for issue in of(Severity::Note) {
            content.push_str(&format!("- [{}] {}\n", issue.session_id, issue.description));
        }
    }

    if issues.is_empty() {
        content.push_str("No issues found! Audit passed.\n");
    }
    content
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerdictKind {
    #[serde(alias = "passed")]
    Pass,
    #[serde(alias = "failed", alias = "revision_needed")]
    Fail,
    #[serde(alias = "escalated")]
    Escalate,
}

/// Issues may come back as plain strings or as structured findings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum VerdictIssue {
    Text(String),
    Detailed(AuditIssue),
}

impl VerdictIssue {
    pub fn into_issue(self, default_session: &str) -> AuditIssue {
        match self {
            VerdictIssue::Text(description) => AuditIssue {
                session_id: default_session.to_string(),
                principle: String::new(),
                description,
                severity: Severity::Warning,
                suggestion: String::new(),
            },
            VerdictIssue::Detailed(mut issue) => {
                if issue.session_id.is_empty() {
                    issue.session_id = default_session.to_string();
                }
                issue
            }
        }
    }
}

/// Verdict JSON an automated auditor returns.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AuditVerdict {
    pub verdict: VerdictKind,
    #[serde(default)]
    pub issues: Vec<VerdictIssue>,
    #[serde(default)]
    pub suggestions: Vec<String>,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub reason: String,
}

impl AuditVerdict {
    /// Pull the first JSON object out of free-form agent output.
    pub fn parse(response: &str) -> Result<Self> {
        let json = extract_json_object(response).ok_or_else(|| {
            RefactorError::InvalidAgentResponse("no JSON object in agent response".into())
        })?;
        serde_json::from_str(&json)
            .map_err(|e| RefactorError::InvalidAgentResponse(format!("bad verdict: {}", e)))
    }
}
