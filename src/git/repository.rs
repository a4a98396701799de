// ABOUTME: Git repository discovery, branch and worktree detection, and change counting

use git2::{ErrorCode, Repository, Status, StatusOptions};
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{GitError, GitInfo};
use crate::models::DiffStat;

/// Resolve the repository containing `path`.
///
/// Returns `Ok(None)` when `path` is not inside a git repository; that is
/// an ordinary outcome for a session started in a scratch directory.
pub fn detect_git_info(path: &Path) -> Result<Option<GitInfo>, GitError> {
    let repo = match Repository::discover(path) {
        Ok(repo) => repo,
        Err(e) if e.code() == ErrorCode::NotFound => return Ok(None),
        Err(e) => return Err(GitError::Git(e)),
    };

    let workdir = repo
        .workdir()
        .map(normalize)
        .ok_or_else(|| GitError::Bare(path.display().to_string()))?;

    let is_worktree = repo.is_worktree();
    let repo_root = if is_worktree {
        // A worktree's gitdir is <main>/.git/worktrees/<name>/
        repo.path()
            .parent()
            .and_then(Path::parent)
            .and_then(Path::parent)
            .map(normalize)
            .unwrap_or_else(|| workdir.clone())
    } else {
        workdir.clone()
    };

    let branch = current_branch(&repo)?;

    debug!(
        path = %path.display(),
        branch = %branch,
        is_worktree,
        "Detected git repository"
    );

    Ok(Some(GitInfo {
        repo_root,
        branch,
        is_worktree,
        worktree_path: workdir,
    }))
}

/// Count added, modified and deleted paths in the working tree of the
/// repository containing `path`.
pub fn diff_stat(path: &Path) -> Result<DiffStat, GitError> {
    let repo = Repository::discover(path).map_err(|e| {
        if e.code() == ErrorCode::NotFound {
            GitError::NotFound(path.display().to_string())
        } else {
            GitError::Git(e)
        }
    })?;

    let mut opts = StatusOptions::new();
    opts.include_untracked(true);
    opts.include_ignored(false);
    opts.recurse_untracked_dirs(true);

    let statuses = repo.statuses(Some(&mut opts))?;
    let mut stat = DiffStat::default();

    for entry in statuses.iter() {
        let status = entry.status();

        if status.intersects(Status::WT_NEW | Status::INDEX_NEW) {
            stat.added += 1;
        } else if status.intersects(Status::WT_DELETED | Status::INDEX_DELETED) {
            stat.deleted += 1;
        } else if status.intersects(
            Status::WT_MODIFIED
                | Status::INDEX_MODIFIED
                | Status::WT_RENAMED
                | Status::INDEX_RENAMED
                | Status::WT_TYPECHANGE
                | Status::INDEX_TYPECHANGE,
        ) {
            // Renames count as modifications
            stat.modified += 1;
        }
    }

    debug!(
        path = %path.display(),
        "Working tree status: {}",
        stat.format()
    );
    Ok(stat)
}

fn current_branch(repo: &Repository) -> Result<String, GitError> {
    match repo.head() {
        Ok(head) => Ok(head.shorthand().unwrap_or("HEAD").to_string()),
        // Fresh repository with no commits: HEAD still names its branch
        Err(e) if e.code() == ErrorCode::UnbornBranch => {
            let head = repo.find_reference("HEAD")?;
            Ok(head
                .symbolic_target()
                .map(|target| target.trim_start_matches("refs/heads/").to_string())
                .unwrap_or_else(|| "HEAD".to_string()))
        }
        Err(e) => Err(GitError::Git(e)),
    }
}

// Drop the trailing separator libgit2 puts on directory paths
fn normalize(path: &Path) -> PathBuf {
    path.components().collect()
}
