//! Refactor identity and on-disk layout.
//!
//! Every component receives a [`RefactorHandle`] (refactors root + id)
//! instead of deriving paths from the working directory. Layout:
//!
//! ```text
//! .forge/refactors/{id}/
//! ├── metadata.json
//! ├── state.json
//! ├── signals/            # one JSON file per signal, archive/ below
//! ├── sessions/{session}/ # spec.md, output.md, CLAUDE.md
//! ├── audit-results/
//! ├── audit-sessions/
//! ├── orchestrator/
//! └── ORCHESTRATOR_HANDOFF.md
//! ```

mod registry;

pub use registry::{RefactorMetadata, RefactorRegistry, slugify};

use std::path::{Path, PathBuf};

/// Value-typed pointer to one refactor's directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefactorHandle {
    root: PathBuf,
    id: String,
}

impl RefactorHandle {
    /// `root` is the directory holding all refactors (`.forge/refactors`).
    /// The id is sanitized before it ever becomes a path component.
    pub fn new(root: impl Into<PathBuf>, id: &str) -> Self {
        Self {
            root: root.into(),
            id: sanitize_id(id),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn dir(&self) -> PathBuf {
        self.root.join(&self.id)
    }

    pub fn exists(&self) -> bool {
        self.dir().is_dir()
    }

    pub fn has_state(&self) -> bool {
        self.state_path().is_file()
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.dir().join("metadata.json")
    }

    pub fn state_path(&self) -> PathBuf {
        self.dir().join("state.json")
    }

    pub fn signals_dir(&self) -> PathBuf {
        self.dir().join("signals")
    }

    pub fn sessions_dir(&self) -> PathBuf {
        self.dir().join("sessions")
    }

    /// Per-session directory; the session id is sanitized here.
    pub fn session_dir(&self, session_id: &str) -> PathBuf {
        self.sessions_dir().join(sanitize_id(session_id))
    }

    pub fn audit_results_dir(&self) -> PathBuf {
        self.dir().join("audit-results")
    }

    pub fn audit_sessions_dir(&self) -> PathBuf {
        self.dir().join("audit-sessions")
    }

    pub fn orchestrator_dir(&self) -> PathBuf {
        self.dir().join("orchestrator")
    }

    pub fn handoff_path(&self) -> PathBuf {
        self.dir().join("ORCHESTRATOR_HANDOFF.md")
    }

    pub fn planning_handoff_path(&self) -> PathBuf {
        self.dir().join("PLANNING_HANDOFF.md")
    }

    /// Instructions the planning session reads on start.
    pub fn planning_instructions_path(&self) -> PathBuf {
        self.dir().join("CLAUDE.md")
    }

    pub fn pre_refactor_path(&self) -> PathBuf {
        self.dir().join("PRE_REFACTOR.md")
    }
}

/// Reduce an identifier to `[A-Za-z0-9._-]`, with no `..` and no leading dot.
///
/// Anything outside the allow-list is dropped, runs of dots collapse to one,
/// so `"../../etc"` becomes `"etc"` and `"1.1"` passes through unchanged.
pub fn sanitize_id(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        if !(ch.is_ascii_alphanumeric() || matches!(ch, '.' | '-' | '_')) {
            continue;
        }
        if ch == '.' && (out.is_empty() || out.ends_with('.')) {
            continue;
        }
        out.push(ch);
    }
    out
}
