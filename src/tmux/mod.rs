// ABOUTME: Session source seam over tmux: listing, probing, capture, and remote control
//
// The monitor never shells out directly. Everything it needs from the
// terminal multiplexer goes through the `SessionSource` trait so tests can
// script a fleet of sessions without a tmux server.

pub mod capture;
pub mod process_detection;
pub mod session;
pub mod source;

use async_trait::async_trait;
use thiserror::Error;

use crate::git::{GitError, GitInfo};

pub use process_detection::PaneTypeDetector;
pub use session::NewSession;
pub use source::TmuxSource;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("tmux {command} failed: {stderr}")]
    Command { command: String, stderr: String },
    #[error("Failed to run tmux: {0}")]
    Io(#[from] std::io::Error),
    #[error("Git detection failed: {0}")]
    Git(#[from] GitError),
    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
    #[error("Session already exists: {0}")]
    AlreadyExists(String),
    #[error("Pane {pane} not found in session {session}")]
    PaneNotFound { session: String, pane: usize },
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Everything the monitor consumes from the terminal multiplexer.
///
/// Pane indices are positions within the session's active window,
/// starting at zero regardless of tmux's `pane-base-index`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionSource: Send + Sync {
    /// Live session names. No server or no sessions is an empty list.
    async fn list_session_names(&self) -> Result<Vec<String>, SourceError>;

    async fn pane_count(&self, session: &str) -> Result<usize, SourceError>;

    async fn pane_process_name(&self, session: &str, pane: usize) -> Result<String, SourceError>;

    /// Visible text of a pane with terminal escapes removed.
    async fn capture_pane_text(&self, session: &str, pane: usize) -> Result<String, SourceError>;

    /// Resolve the session's working directory to a repository, if any.
    async fn detect_git_info(&self, session: &str) -> Result<Option<GitInfo>, SourceError>;

    /// Type `text` into a pane literally. Newlines are sent as Enter.
    async fn send_text(&self, session: &str, pane: usize, text: &str) -> Result<(), SourceError>;

    async fn create_session(&self, spec: &NewSession) -> Result<(), SourceError>;

    async fn kill_session(&self, name: &str) -> Result<(), SourceError>;
}

/// Whether a `tmux` binary is reachable on `PATH`.
pub fn tmux_available() -> bool {
    which::which("tmux").is_ok()
}
