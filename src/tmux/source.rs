// ABOUTME: SessionSource implementation that drives a real tmux server via its CLI

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use super::capture::{capture_args, clean_capture};
use super::session::{exact_target, kill_session_args, new_session_args, send_keys_invocations, NewSession};
use super::{SessionSource, SourceError};
use crate::git::{self, GitInfo};

/// Talks to tmux through short-lived `tmux` subprocesses.
#[derive(Debug, Clone, Default)]
pub struct TmuxSource {
    /// Server socket name (`tmux -L`). `None` uses the default server.
    socket: Option<String>,
}

impl TmuxSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Target an isolated tmux server, e.g. for tests.
    pub fn with_socket(socket: impl Into<String>) -> Self {
        Self {
            socket: Some(socket.into()),
        }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new("tmux");
        if let Some(socket) = &self.socket {
            cmd.args(["-L", socket]);
        }
        cmd.kill_on_drop(true);
        cmd
    }

    async fn run<S: AsRef<str>>(&self, args: &[S]) -> Result<String, SourceError> {
        let args: Vec<&str> = args.iter().map(AsRef::as_ref).collect();
        let output = self.command().args(&args).output().await?;

        if !output.status.success() {
            return Err(SourceError::Command {
                command: args.first().copied().unwrap_or_default().to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn list_panes(&self, session: &str, format: &str) -> Result<Vec<String>, SourceError> {
        let target = format!("{}:", exact_target(session));
        let stdout = self.run(&["list-panes", "-t", target.as_str(), "-F", format]).await?;
        Ok(stdout.lines().map(ToString::to_string).collect())
    }

    /// Stable `%id` target for the pane at `pane` position.
    async fn pane_target(&self, session: &str, pane: usize) -> Result<String, SourceError> {
        self.list_panes(session, "#{pane_id}")
            .await?
            .into_iter()
            .nth(pane)
            .ok_or_else(|| SourceError::PaneNotFound {
                session: session.to_string(),
                pane,
            })
    }

    async fn has_session(&self, name: &str) -> bool {
        self.run(&["has-session", "-t", exact_target(name).as_str()])
            .await
            .is_ok()
    }
}

fn is_no_server(stderr: &str) -> bool {
    stderr.contains("no server running")
        || stderr.contains("no sessions")
        || stderr.contains("error connecting to")
}

#[async_trait]
impl SessionSource for TmuxSource {
    async fn list_session_names(&self) -> Result<Vec<String>, SourceError> {
        match self.run(&["list-sessions", "-F", "#{session_name}"]).await {
            Ok(stdout) => Ok(stdout
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(ToString::to_string)
                .collect()),
            Err(SourceError::Command { stderr, .. }) if is_no_server(&stderr) => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    async fn pane_count(&self, session: &str) -> Result<usize, SourceError> {
        Ok(self.list_panes(session, "#{pane_id}").await?.len())
    }

    async fn pane_process_name(&self, session: &str, pane: usize) -> Result<String, SourceError> {
        self.list_panes(session, "#{pane_current_command}")
            .await?
            .into_iter()
            .nth(pane)
            .map(|name| name.trim().to_string())
            .ok_or_else(|| SourceError::PaneNotFound {
                session: session.to_string(),
                pane,
            })
    }

    async fn capture_pane_text(&self, session: &str, pane: usize) -> Result<String, SourceError> {
        let target = self.pane_target(session, pane).await?;
        let raw = self.run(&capture_args(&target)).await?;
        Ok(clean_capture(&raw))
    }

    async fn detect_git_info(&self, session: &str) -> Result<Option<GitInfo>, SourceError> {
        let target = format!("{}:", exact_target(session));
        let stdout = self
            .run(&["display-message", "-p", "-t", target.as_str(), "#{pane_current_path}"])
            .await?;
        let dir = stdout.trim();
        if dir.is_empty() {
            return Ok(None);
        }

        let dir = PathBuf::from(dir);
        let info = tokio::task::spawn_blocking(move || git::detect_git_info(&dir)).await??;
        Ok(info)
    }

    async fn send_text(&self, session: &str, pane: usize, text: &str) -> Result<(), SourceError> {
        let target = self.pane_target(session, pane).await?;
        for args in send_keys_invocations(&target, text) {
            self.run(&args).await?;
        }
        debug!(session, pane, len = text.len(), "Sent text to pane");
        Ok(())
    }

    async fn create_session(&self, spec: &NewSession) -> Result<(), SourceError> {
        let spec = spec.validated()?;

        if !tokio::fs::metadata(&spec.dir).await.is_ok_and(|m| m.is_dir()) {
            return Err(SourceError::InvalidInput(format!(
                "working directory does not exist: {}",
                spec.dir.display()
            )));
        }
        if self.has_session(&spec.name).await {
            return Err(SourceError::AlreadyExists(spec.name));
        }

        self.run(&new_session_args(&spec)).await?;
        info!(session = %spec.name, dir = %spec.dir.display(), "Created tmux session");
        Ok(())
    }

    async fn kill_session(&self, name: &str) -> Result<(), SourceError> {
        self.run(&kill_session_args(name)).await?;
        info!(session = name, "Killed tmux session");
        Ok(())
    }
}
