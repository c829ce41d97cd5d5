//! Typed error hierarchy for refactor coordination.
//!
//! `RefactorError` covers the whole core: missing refactors/sessions/specs,
//! invalid lifecycle transitions, storage failures and failures of the
//! external agent collaborator. Parse degradation and corrupt signal files
//! are deliberately absent: those are absorbed, never surfaced.

use std::path::PathBuf;
use thiserror::Error;

/// Result alias used throughout the library.
pub type Result<T, E = RefactorError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum RefactorError {
    #[error("Refactor not found: {id}")]
    RefactorNotFound { id: String },

    #[error("Refactor already exists: {id}")]
    RefactorExists { id: String },

    #[error("Session not found: {id}")]
    SessionNotFound { id: String },

    #[error("Session already exists: {id}")]
    DuplicateSession { id: String },

    #[error("No PLANNING_HANDOFF.md found for {id}; start a fresh planning session instead")]
    HandoffNotFound { id: String },

    #[error("Could not find session spec for {session_id}")]
    SpecNotFound { session_id: String },

    #[error("Session {session_id} cannot move from {from} to {to}")]
    InvalidTransition {
        session_id: String,
        from: String,
        to: String,
    },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Git error: {0}")]
    Git(String),

    #[error("Agent invocation failed: {0}")]
    AgentFailed(String),

    #[error("Agent timed out after {secs}s")]
    AgentTimeout { secs: u64 },

    #[error("Could not interpret agent response: {0}")]
    InvalidAgentResponse(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl RefactorError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        RefactorError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn json(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        RefactorError::Json {
            path: path.into(),
            source,
        }
    }

    /// True for the "something named by the caller does not exist" family.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            RefactorError::RefactorNotFound { .. }
                | RefactorError::SessionNotFound { .. }
                | RefactorError::SpecNotFound { .. }
                | RefactorError::HandoffNotFound { .. }
        )
    }
}

impl From<git2::Error> for RefactorError {
    fn from(err: git2::Error) -> Self {
        RefactorError::Git(err.message().to_string())
    }
}

/// The (success, message) pair surfaced to interactive callers.
///
/// Controllers return `Result`s; the CLI and orchestrator flows fold them
/// into an outcome so a failure is reported without tearing down the
/// session that asked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutcome {
    pub success: bool,
    pub message: String,
}

impl CommandOutcome {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }

    /// Fold a result into an outcome, rendering the success value with `f`.
    pub fn from_result<T>(result: Result<T>, f: impl FnOnce(T) -> String) -> Self {
        match result {
            Ok(value) => Self::ok(f(value)),
            Err(err) => Self::failed(err.to_string()),
        }
    }
}
