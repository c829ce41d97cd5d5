//! Version control access: commit lookups and per-session worktrees.

pub mod git;
pub mod worktree;

pub use git::GitTracker;
pub use worktree::{Worktree, WorktreeManager};
