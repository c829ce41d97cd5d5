use crate::errors::{RefactorError, Result};
use crate::util::truncate_with_marker;
use git2::{DiffFormat, DiffOptions, Repository};
use std::path::Path;

/// Length of the abbreviated commit references recorded in session state.
pub const SHORT_SHA_LEN: usize = 7;

pub struct GitTracker {
    repo: Repository,
}

impl GitTracker {
    pub fn new(project_dir: &Path) -> Result<Self> {
        let repo = Repository::open(project_dir)
            .map_err(|e| RefactorError::Git(format!("Failed to open git repository: {}", e.message())))?;
        Ok(Self { repo })
    }

    /// Get the HEAD commit if it exists (returns None for unborn branches)
    fn get_head_commit(&self) -> Option<git2::Commit<'_>> {
        self.repo
            .head()
            .ok()
            .and_then(|head| head.peel_to_commit().ok())
    }

    /// Get current HEAD SHA (returns None for unborn branches)
    pub fn head_sha(&self) -> Option<String> {
        self.get_head_commit().map(|c| c.id().to_string())
    }

    pub fn short_head_sha(&self) -> Option<String> {
        self.head_sha()
            .map(|sha| sha.chars().take(SHORT_SHA_LEN).collect())
    }

    /// Resolve any revision (full or abbreviated sha, branch, `HEAD~1`) to a full sha.
    pub fn resolve_commit(&self, rev: &str) -> Result<String> {
        let commit = self.repo.revparse_single(rev)?.peel_to_commit()?;
        Ok(commit.id().to_string())
    }

    /// First line of a commit message.
    pub fn commit_summary(&self, rev: &str) -> Result<String> {
        let commit = self.repo.revparse_single(rev)?.peel_to_commit()?;
        Ok(commit.summary().unwrap_or_default().to_string())
    }

    /// Unified diff a commit introduced relative to its first parent, capped
    /// at `max_chars`. Root commits are diffed against the empty tree.
    ///
    /// Generation stops once the cap is passed, so a huge commit never has
    /// to be rendered in full. Cut output ends with a truncation marker.
    pub fn commit_diff(&self, rev: &str, max_chars: usize) -> Result<String> {
        let commit = self.repo.revparse_single(rev)?.peel_to_commit()?;
        let tree = commit.tree()?;
        let parent_tree = match commit.parent(0) {
            Ok(parent) => Some(parent.tree()?),
            Err(_) => None,
        };

        let mut opts = DiffOptions::new();
        let diff = self
            .repo
            .diff_tree_to_tree(parent_tree.as_ref(), Some(&tree), Some(&mut opts))?;

        let mut buf = Vec::new();
        let mut chars = 0usize;
        let mut complete = true;
        let printed = diff.print(DiffFormat::Patch, |_delta, _hunk, line| {
            if chars > max_chars {
                complete = false;
                return false;
            }
            if let origin @ ('+' | '-' | ' ') = line.origin() {
                buf.push(origin as u8);
                chars += 1;
            }
            buf.extend_from_slice(line.content());
            chars += String::from_utf8_lossy(line.content()).chars().count();
            true
        });
        match printed {
            Ok(()) => {}
            // Aborting the callback surfaces as a user error from libgit2.
            Err(_) if !complete => {}
            Err(e) => return Err(e.into()),
        }

        let text = String::from_utf8_lossy(&buf);
        if complete {
            return Ok(truncate_with_marker(&text, max_chars));
        }
        let kept: String = text.chars().take(max_chars).collect();
        Ok(format!(
            "{}\n[... truncated, diff exceeds {} chars]",
            kept, max_chars
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use git2::Repository;
    use std::fs;
    use tempfile::tempdir;

    fn setup_repo() -> (GitTracker, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        let mut config = repo.config().unwrap();
        config.set_str("user.name", "test").unwrap();
        config.set_str("user.email", "test@test.com").unwrap();
        drop(config);
        let tracker = GitTracker::new(dir.path()).unwrap();
        (tracker, dir)
    }

    fn commit_file(dir: &std::path::Path, name: &str, content: &str, msg: &str) {
        let repo = Repository::open(dir).unwrap();
        let file_path = dir.join(name);
        fs::write(&file_path, content).unwrap();
        let mut index = repo.index().unwrap();
        index
            .add_all(["*"].iter(), git2::IndexAddOption::DEFAULT, None)
            .unwrap();
        index.write().unwrap();
        let tree_id = index.write_tree().unwrap();
        let tree = repo.find_tree(tree_id).unwrap();
        let sig = git2::Signature::now("test", "test@test.com").unwrap();
        if let Ok(head) = repo.head() {
            let parent = head.peel_to_commit().unwrap();
            repo.commit(Some("HEAD"), &sig, &sig, msg, &tree, &[&parent])
                .unwrap();
        } else {
            repo.commit(Some("HEAD"), &sig, &sig, msg, &tree, &[])
                .unwrap();
        }
    }

    #[test]
    fn test_head_sha_unborn_then_populated() {
        let (tracker, dir) = setup_repo();
        assert!(tracker.head_sha().is_none());
        assert!(tracker.short_head_sha().is_none());
        commit_file(dir.path(), "a.txt", "hello", "init");
        let sha = tracker.head_sha().unwrap();
        assert_eq!(sha.len(), 40);
        let short = tracker.short_head_sha().unwrap();
        assert_eq!(short.len(), SHORT_SHA_LEN);
        assert!(sha.starts_with(&short));
    }

    #[test]
    fn test_open_non_repo_fails() {
        let dir = tempdir().unwrap();
        let err = GitTracker::new(dir.path()).err().unwrap();
        assert!(matches!(err, RefactorError::Git(_)));
    }

    #[test]
    fn test_resolve_abbreviated_commit() {
        let (tracker, dir) = setup_repo();
        commit_file(dir.path(), "a.txt", "hello", "init");
        let short = tracker.short_head_sha().unwrap();
        assert_eq!(tracker.resolve_commit(&short).unwrap(), tracker.head_sha().unwrap());
        assert!(tracker.resolve_commit("0000000").is_err());
    }

    #[test]
    fn test_commit_diff_against_parent() {
        let (tracker, dir) = setup_repo();
        commit_file(dir.path(), "src.rs", "fn old() {}\n", "init");
        commit_file(dir.path(), "src.rs", "fn new() {}\n", "rename fn");

        let diff = tracker.commit_diff("HEAD", 10_000).unwrap();
        assert!(diff.contains("-fn old() {}"));
        assert!(diff.contains("+fn new() {}"));
        assert_eq!(tracker.commit_summary("HEAD").unwrap(), "rename fn");
    }

    #[test]
    fn test_commit_diff_root_commit() {
        let (tracker, dir) = setup_repo();
        commit_file(dir.path(), "readme.md", "hello\n", "init");
        let diff = tracker.commit_diff("HEAD", 10_000).unwrap();
        assert!(diff.contains("+hello"));
        assert!(!diff.contains("truncated"));
    }

    #[test]
    fn test_commit_diff_stops_at_cap() {
        let (tracker, dir) = setup_repo();
        let big: String = (0..5_000).map(|i| format!("line number {}\n", i)).collect();
        commit_file(dir.path(), "big.txt", &big, "big file");

        let diff = tracker.commit_diff("HEAD", 500).unwrap();
        assert!(diff.contains("+line number 0"));
        assert!(!diff.contains("line number 4999"));
        assert!(diff.ends_with("[... truncated, diff exceeds 500 chars]"));
        assert!(diff.chars().count() < 600);
    }

    #[test]
    fn test_commit_diff_cap_spans_files() {
        let (tracker, dir) = setup_repo();
        for name in ["a.txt", "b.txt", "c.txt"] {
            fs::write(dir.path().join(name), "x\n".repeat(200)).unwrap();
        }
        commit_file(dir.path(), "d.txt", "tail\n", "many files");

        let diff = tracker.commit_diff("HEAD", 100).unwrap();
        assert!(diff.contains("truncated"));
        assert!(!diff.contains("+tail"));
    }
}
