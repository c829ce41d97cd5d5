use crate::errors::{RefactorError, Result};
use crate::refactor::sanitize_id;
use git2::{BranchType, Repository, WorktreeAddOptions, WorktreePruneOptions};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// An isolated working directory for one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Worktree {
    pub name: String,
    pub path: PathBuf,
    pub branch: String,
}

/// Creates and locates `.worktrees/refactor-{refactor}-{session}` checkouts.
pub struct WorktreeManager {
    project_dir: PathBuf,
    base_branch: Option<String>,
}

impl WorktreeManager {
    pub fn new(project_dir: impl Into<PathBuf>) -> Self {
        Self {
            project_dir: project_dir.into(),
            base_branch: None,
        }
    }

    /// Cut new session branches from this local branch instead of HEAD.
    pub fn with_base_branch(mut self, base_branch: Option<String>) -> Self {
        self.base_branch = base_branch.filter(|b| !b.is_empty());
        self
    }

    pub fn worktree_name(refactor_id: &str, session_id: &str) -> String {
        format!(
            "refactor-{}-{}",
            sanitize_id(refactor_id),
            sanitize_id(session_id)
        )
    }

    pub fn path_for(&self, refactor_id: &str, session_id: &str) -> PathBuf {
        self.project_dir
            .join(".worktrees")
            .join(Self::worktree_name(refactor_id, session_id))
    }

    /// Return the session's worktree, creating it off the base branch (or
    /// HEAD) when absent.
    ///
    /// Calling this again for the same session reuses the existing checkout.
    /// A registration whose directory has disappeared is pruned and recreated.
    pub fn acquire(&self, refactor_id: &str, session_id: &str) -> Result<Worktree> {
        let repo = Repository::open(&self.project_dir)?;
        let name = Self::worktree_name(refactor_id, session_id);
        let path = self.path_for(refactor_id, session_id);
        let branch_name = format!("refactor/{}", name);

        if let Ok(existing) = repo.find_worktree(&name) {
            if existing.validate().is_ok() {
                debug!(worktree = %name, "Reusing existing worktree");
                return Ok(Worktree {
                    name,
                    path: existing.path().to_path_buf(),
                    branch: branch_name,
                });
            }
            let mut prune = WorktreePruneOptions::new();
            prune.valid(true);
            existing.prune(Some(&mut prune))?;
        }

        let start = match &self.base_branch {
            Some(base) => repo
                .find_branch(base, BranchType::Local)
                .and_then(|b| b.get().peel_to_commit())
                .map_err(|_| RefactorError::Git(format!("Base branch not found: {}", base)))?,
            None => repo
                .head()
                .and_then(|h| h.peel_to_commit())
                .map_err(|_| RefactorError::Git("Repository has no commits to branch from".into()))?,
        };
        let branch = match repo.find_branch(&branch_name, BranchType::Local) {
            Ok(branch) => branch,
            Err(_) => repo.branch(&branch_name, &start, false)?,
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| RefactorError::io(parent, e))?;
        }
        let mut opts = WorktreeAddOptions::new();
        opts.reference(Some(branch.get()));
        repo.worktree(&name, &path, Some(&opts))?;

        info!(worktree = %name, path = %path.display(), branch = %branch_name, "Worktree created");
        Ok(Worktree {
            name,
            path,
            branch: branch_name,
        })
    }

    /// Existing worktree path for a session, if one is registered and intact.
    pub fn locate(&self, refactor_id: &str, session_id: &str) -> Option<PathBuf> {
        let repo = Repository::open(&self.project_dir).ok()?;
        let worktree = repo
            .find_worktree(&Self::worktree_name(refactor_id, session_id))
            .ok()?;
        worktree.validate().ok()?;
        Some(worktree.path().to_path_buf())
    }

    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn init_repo(dir: &Path) {
        let repo = Repository::init(dir).unwrap();
        fs::write(dir.join("lib.rs"), "pub fn a() {}\n").unwrap();
        let mut index = repo.index().unwrap();
        index
            .add_all(["*"].iter(), git2::IndexAddOption::DEFAULT, None)
            .unwrap();
        index.write().unwrap();
        let tree_id = index.write_tree().unwrap();
        let tree = repo.find_tree(tree_id).unwrap();
        let sig = git2::Signature::now("test", "test@test.com").unwrap();
        repo.commit(Some("HEAD"), &sig, &sig, "init", &tree, &[])
            .unwrap();
    }

    #[test]
    fn test_worktree_name() {
        assert_eq!(
            WorktreeManager::worktree_name("demo", "1.1"),
            "refactor-demo-1.1"
        );
        assert_eq!(
            WorktreeManager::worktree_name("demo", "../1.1"),
            "refactor-demo-1.1"
        );
    }

    #[test]
    fn test_acquire_creates_checkout() {
        let dir = tempdir().unwrap();
        init_repo(dir.path());
        let manager = WorktreeManager::new(dir.path());

        let worktree = manager.acquire("demo", "1.1").unwrap();
        assert_eq!(worktree.branch, "refactor/refactor-demo-1.1");
        assert!(worktree.path.join("lib.rs").is_file());
        assert!(manager.locate("demo", "1.1").is_some());
    }

    #[test]
    fn test_acquire_is_idempotent() {
        let dir = tempdir().unwrap();
        init_repo(dir.path());
        let manager = WorktreeManager::new(dir.path());

        let first = manager.acquire("demo", "1.1").unwrap();
        let second = manager.acquire("demo", "1.1").unwrap();
        assert_eq!(
            first.path.canonicalize().unwrap(),
            second.path.canonicalize().unwrap()
        );
    }

    #[test]
    fn test_acquire_from_missing_base_branch_fails() {
        let dir = tempdir().unwrap();
        init_repo(dir.path());
        let manager = WorktreeManager::new(dir.path()).with_base_branch(Some("nope".into()));
        match manager.acquire("demo", "1.1") {
            Err(RefactorError::Git(msg)) => assert!(msg.contains("nope")),
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn test_acquire_on_unborn_repo_fails() {
        let dir = tempdir().unwrap();
        Repository::init(dir.path()).unwrap();
        let manager = WorktreeManager::new(dir.path());
        assert!(matches!(
            manager.acquire("demo", "1.1"),
            Err(RefactorError::Git(_))
        ));
        assert!(manager.locate("demo", "1.1").is_none());
    }
}
