// ABOUTME: Git integration for session metadata detection and working-tree diff statistics

pub mod repository;

use std::path::PathBuf;

use thiserror::Error;

pub use repository::{detect_git_info, diff_stat};

/// Repository facts resolved from a session's working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitInfo {
    /// Root of the main repository. For a linked worktree this is the
    /// checkout that owns the shared `.git` directory.
    pub repo_root: PathBuf,
    pub branch: String,
    pub is_worktree: bool,
    /// Working directory of the checkout the session is sitting in.
    pub worktree_path: PathBuf,
}

#[derive(Error, Debug)]
pub enum GitError {
    #[error("Git repository error: {0}")]
    Git(#[from] git2::Error),
    #[error("Repository not found at path: {0}")]
    NotFound(String),
    #[error("Repository has no working directory: {0}")]
    Bare(String),
}
