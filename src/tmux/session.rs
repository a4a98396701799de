// ABOUTME: Tmux session naming plus argument builders for create, kill and send-keys
//
// Builders are pure so the exact tmux invocations can be tested without a
// server. `TmuxSource` runs them.

use std::path::PathBuf;

use serde::Deserialize;

use super::SourceError;

/// Request to start a new detached session.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewSession {
    pub name: String,
    pub dir: PathBuf,
    /// Program to run instead of the default shell.
    #[serde(default)]
    pub command: Option<String>,
}

impl NewSession {
    pub fn new(name: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            dir: dir.into(),
            command: None,
        }
    }

    #[must_use]
    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    /// Check the request and return it with a tmux-safe name.
    pub fn validated(&self) -> Result<Self, SourceError> {
        let name = sanitize_name(&self.name);
        if name.is_empty() {
            return Err(SourceError::InvalidInput("session name is empty".to_string()));
        }
        if !self.dir.is_absolute() {
            return Err(SourceError::InvalidInput(format!(
                "working directory must be absolute: {}",
                self.dir.display()
            )));
        }
        let command = self
            .command
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(ToString::to_string);

        Ok(Self {
            name,
            dir: self.dir.clone(),
            command,
        })
    }
}

/// Make a name acceptable to tmux, which treats `.` and `:` as target
/// separators.
pub fn sanitize_name(name: &str) -> String {
    name.trim()
        .chars()
        .map(|c| match c {
            '.' | ':' | ' ' | '/' | '\t' => '_',
            c => c,
        })
        .collect()
}

/// Exact-match target so `api` never resolves to `api-v2`.
pub fn exact_target(name: &str) -> String {
    format!("={name}")
}

pub fn new_session_args(spec: &NewSession) -> Vec<String> {
    let mut args = vec![
        "new-session".to_string(),
        "-d".to_string(),
        "-s".to_string(),
        spec.name.clone(),
        "-c".to_string(),
        spec.dir.display().to_string(),
    ];
    if let Some(command) = &spec.command {
        args.push(command.clone());
    }
    args
}

pub fn kill_session_args(name: &str) -> Vec<String> {
    vec![
        "kill-session".to_string(),
        "-t".to_string(),
        exact_target(name),
    ]
}

/// One `send-keys` invocation per literal segment, with a separate
/// `Enter` key press for every newline in `text`.
pub fn send_keys_invocations(target: &str, text: &str) -> Vec<Vec<String>> {
    let segments: Vec<&str> = text.split('\n').collect();
    let last = segments.len() - 1;
    let mut invocations = Vec::new();

    for (i, segment) in segments.iter().enumerate() {
        let segment = segment.strip_suffix('\r').unwrap_or(segment);
        if !segment.is_empty() {
            invocations.push(vec![
                "send-keys".to_string(),
                "-l".to_string(),
                "-t".to_string(),
                target.to_string(),
                segment.to_string(),
            ]);
        }
        if i < last {
            invocations.push(vec![
                "send-keys".to_string(),
                "-t".to_string(),
                target.to_string(),
                "Enter".to_string(),
            ]);
        }
    }

    invocations
}
