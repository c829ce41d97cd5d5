use crate::refactor::RefactorHandle;
use crate::state::StateStore;
use crate::tracker::GitTracker;
use crate::util::truncate_with_marker;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const DEFAULT_MAX_DIFF_CHARS_PER_COMMIT: usize = 3000;
pub const DEFAULT_MAX_DIFF_CHARS_TOTAL: usize = 12000;

/// Bounds on how much diff text an audit reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiffLimits {
    pub per_commit: usize,
    pub total: usize,
}

impl Default for DiffLimits {
    fn default() -> Self {
        Self {
            per_commit: DEFAULT_MAX_DIFF_CHARS_PER_COMMIT,
            total: DEFAULT_MAX_DIFF_CHARS_TOTAL,
        }
    }
}

/// A guiding document and where it came from (None: placeholder used).
#[derive(Debug, Clone)]
pub struct GuideDocument {
    pub content: String,
    pub source: Option<PathBuf>,
}

impl GuideDocument {
    /// First existing candidate wins; a placeholder stands in when none exist.
    pub fn load(name: &str, candidates: &[PathBuf]) -> Self {
        for path in candidates {
            if let Ok(content) = fs::read_to_string(path) {
                return Self {
                    content,
                    source: Some(path.clone()),
                };
            }
        }
        Self {
            content: format!("{} not found - audit against general best practices", name),
            source: None,
        }
    }

    pub fn found(&self) -> bool {
        self.source.is_some()
    }
}

/// What a session left behind for review.
#[derive(Debug, Clone, Default)]
pub struct SessionEvidence {
    pub session_id: String,
    pub output: Option<String>,
    pub instructions: Option<String>,
    pub notes: String,
    pub commit_hash: Option<String>,
}

impl SessionEvidence {
    pub fn render(&self) -> String {
        let mut parts = Vec::new();
        if let Some(output) = &self.output {
            parts.push(format!("## Output from Session {}\n\n{}", self.session_id, output));
        }
        if let Some(instructions) = &self.instructions {
            parts.push(format!(
                "## Session {} Instructions\n\n{}",
                self.session_id, instructions
            ));
        }
        if !self.notes.is_empty() {
            parts.push(format!("## Session {} Notes\n\n{}", self.session_id, self.notes));
        }
        if parts.is_empty() {
            format!("No output found for session {}", self.session_id)
        } else {
            parts.join("\n\n")
        }
    }
}

/// Everything an auditor reads: principles, decisions, session records, diffs.
#[derive(Debug, Clone)]
pub struct AuditContext {
    pub principles: GuideDocument,
    pub decisions: GuideDocument,
    pub sessions: Vec<SessionEvidence>,
    pub code_changes: String,
}

impl AuditContext {
    pub fn gather(
        handle: &RefactorHandle,
        project_dir: &Path,
        docs_dir: &str,
        session_ids: &[String],
        limits: DiffLimits,
    ) -> Self {
        let docs = project_dir.join(docs_dir);
        let principles = GuideDocument::load(
            "PHILOSOPHY.md",
            &[handle.dir().join("PHILOSOPHY.md"), docs.join("PHILOSOPHY.md")],
        );
        let decisions = GuideDocument::load(
            "DECISIONS.md",
            &[handle.dir().join("DECISIONS.md"), docs.join("DECISIONS.md")],
        );

        let state = StateStore::new(handle).load_optional().ok().flatten();
        let sessions: Vec<SessionEvidence> = session_ids
            .iter()
            .map(|id| {
                let dir = handle.session_dir(id);
                let recorded = state.as_ref().and_then(|s| s.session(id));
                SessionEvidence {
                    session_id: id.clone(),
                    output: fs::read_to_string(dir.join("output.md")).ok(),
                    instructions: fs::read_to_string(dir.join("CLAUDE.md")).ok(),
                    notes: recorded.map(|s| s.notes.clone()).unwrap_or_default(),
                    commit_hash: recorded.and_then(|s| s.commit_hash.clone()),
                }
            })
            .collect();

        let code_changes = collect_code_changes(project_dir, &sessions, limits);
        Self {
            principles,
            decisions,
            sessions,
            code_changes,
        }
    }
}

/// Diffs of every recorded session commit, each capped, then capped overall.
fn collect_code_changes(project_dir: &Path, sessions: &[SessionEvidence], limits: DiffLimits) -> String {
    let Ok(tracker) = GitTracker::new(project_dir) else {
        return "No commit information available.".to_string();
    };

    let mut changes = Vec::new();
    for session in sessions {
        let Some(commit) = session.commit_hash.as_deref() else {
            continue;
        };
        match tracker.commit_diff(commit, limits.per_commit) {
            Ok(diff) => changes.push(format!(
                "### Commit {} (Session {})\n\n```diff\n{}\n```",
                commit, session.session_id, diff
            )),
            Err(e) => debug!(commit, error = %e, "Could not read commit diff"),
        }
    }

    if changes.is_empty() {
        "No commit information available.".to_string()
    } else {
        truncate_with_marker(&changes.join("\n\n"), limits.total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::refactor::RefactorRegistry;
    use git2::Repository;
    use tempfile::tempdir;

    fn commit_file(dir: &Path, name: &str, content: &str) -> String {
        let repo = Repository::open(dir).unwrap();
        fs::write(dir.join(name), content).unwrap();
        let mut index = repo.index().unwrap();
        index.add_path(Path::new(name)).unwrap();
        index.write().unwrap();
        let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();
        let sig = git2::Signature::now("test", "test@test.com").unwrap();
        let parents: Vec<git2::Commit> = repo
            .head()
            .ok()
            .and_then(|h| h.peel_to_commit().ok())
            .into_iter()
            .collect();
        let parent_refs: Vec<&git2::Commit> = parents.iter().collect();
        let oid = repo
            .commit(Some("HEAD"), &sig, &sig, "change", &tree, &parent_refs)
            .unwrap();
        oid.to_string()[..7].to_string()
    }

    #[test]
    fn test_guide_document_priority_and_placeholder() {
        let dir = tempdir().unwrap();
        let first = dir.path().join("a.md");
        let second = dir.path().join("b.md");
        fs::write(&second, "project wide").unwrap();

        let doc = GuideDocument::load("PHILOSOPHY.md", &[first.clone(), second.clone()]);
        assert_eq!(doc.content, "project wide");
        fs::write(&first, "refactor specific").unwrap();
        let doc = GuideDocument::load("PHILOSOPHY.md", &[first, second]);
        assert_eq!(doc.content, "refactor specific");

        let missing = GuideDocument::load("DECISIONS.md", &[dir.path().join("nope.md")]);
        assert!(!missing.found());
        assert!(missing.content.contains("DECISIONS.md not found"));
    }

    #[test]
    fn test_gather_reads_session_records() {
        let dir = tempdir().unwrap();
        let handle = RefactorRegistry::new(dir.path().join(".forge/refactors"))
            .create("demo", "goal")
            .unwrap();
        let store = StateStore::new(&handle);
        store.start_session("1.1").unwrap();
        store.complete_session("1.1", None, Some("left a note")).unwrap();
        fs::create_dir_all(handle.session_dir("1.1")).unwrap();
        fs::write(handle.session_dir("1.1").join("output.md"), "did things").unwrap();

        let ctx = AuditContext::gather(
            &handle,
            dir.path(),
            "docs",
            &["1.1".into(), "1.2".into()],
            DiffLimits::default(),
        );
        assert!(!ctx.principles.found());
        let rendered = ctx.sessions[0].render();
        assert!(rendered.contains("did things"));
        assert!(rendered.contains("left a note"));
        assert_eq!(ctx.sessions[1].render(), "No output found for session 1.2");
        assert_eq!(ctx.code_changes, "No commit information available.");
    }

    #[test]
    fn test_diffs_are_capped_with_marker() {
        let dir = tempdir().unwrap();
        Repository::init(dir.path()).unwrap();
        commit_file(dir.path(), "seed.txt", "seed\n");
        let big = "x".repeat(5000);
        let first = commit_file(dir.path(), "one.txt", &big);
        let second = commit_file(dir.path(), "two.txt", &big);

        let sessions = vec![
            SessionEvidence {
                session_id: "1.1".into(),
                commit_hash: Some(first),
                ..Default::default()
            },
            SessionEvidence {
                session_id: "1.2".into(),
                commit_hash: Some(second),
                ..Default::default()
            },
        ];

        let changes = collect_code_changes(
            dir.path(),
            &sessions,
            DiffLimits {
                per_commit: 1000,
                total: 1500,
            },
        );
        assert!(changes.contains("### Commit"));
        assert!(changes.contains("[... truncated"));
        // Aggregate cap plus the marker line.
        assert!(changes.chars().count() < 1500 + 64);
    }
}
