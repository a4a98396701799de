// ABOUTME: Pane type detection from the process name tmux reports for a pane

use std::collections::HashSet;

use crate::models::PaneType;

pub const DEFAULT_EDITORS: &[&str] = &[
    "nvim", "vim", "vi", "nano", "emacs", "hx", "helix", "kak", "micro",
];

pub const DEFAULT_AGENTS: &[&str] = &[
    "claude",
    "codex",
    "aider",
    "gemini",
    "opencode",
    "amp",
    "goose",
    "cursor-agent",
];

pub const DEFAULT_SHELLS: &[&str] = &["bash", "zsh", "fish", "sh", "dash", "nu", "ksh", "tcsh"];

/// Maps a pane's running process name onto a [`PaneType`].
///
/// Anything not recognized as an editor, agent or shell is a plain process
/// (a build, a test runner, a dev server).
#[derive(Debug, Clone)]
pub struct PaneTypeDetector {
    editors: HashSet<String>,
    agents: HashSet<String>,
    shells: HashSet<String>,
}

impl PaneTypeDetector {
    pub fn new<S: AsRef<str>>(editors: &[S], agents: &[S], shells: &[S]) -> Self {
        let set = |names: &[S]| names.iter().map(|n| normalize(n.as_ref())).collect();
        Self {
            editors: set(editors),
            agents: set(agents),
            shells: set(shells),
        }
    }

    pub fn detect(&self, process: &str) -> PaneType {
        let name = normalize(process);
        if self.editors.contains(&name) {
            PaneType::Editor
        } else if self.agents.contains(&name) {
            PaneType::Agent
        } else if self.shells.contains(&name) {
            PaneType::Shell
        } else {
            PaneType::Process
        }
    }
}

impl Default for PaneTypeDetector {
    fn default() -> Self {
        Self::new(DEFAULT_EDITORS, DEFAULT_AGENTS, DEFAULT_SHELLS)
    }
}

// "/usr/bin/nvim" -> "nvim", "-zsh" (login shell) -> "zsh"
fn normalize(process: &str) -> String {
    let trimmed = process.trim();
    let base = trimmed.rsplit('/').next().unwrap_or(trimmed);
    base.trim_start_matches('-').to_lowercase()
}
