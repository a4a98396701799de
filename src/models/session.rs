// ABOUTME: Session data model for monitored tmux sessions, their panes, and git metadata

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::git::GitInfo;

/// Derived activity classification of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Idle,
    Done,
    Error,
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            SessionStatus::Active => "active",
            SessionStatus::Idle => "idle",
            SessionStatus::Done => "done",
            SessionStatus::Error => "error",
        };
        f.write_str(label)
    }
}

/// What kind of program a pane is running, derived from its process name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaneType {
    Editor,
    Agent,
    Shell,
    Process,
}

impl PaneType {
    /// Editors are never captured or classified.
    pub fn is_editor(&self) -> bool {
        matches!(self, PaneType::Editor)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pane {
    pub index: usize,
    #[serde(rename = "type")]
    pub pane_type: PaneType,
    pub process: String,
    /// Mirrors the parent session status. Always `None` for editor panes.
    pub status: Option<SessionStatus>,
    /// Captured visible text. Always empty for editor panes.
    pub content: String,
}

impl Pane {
    pub fn new(index: usize, pane_type: PaneType, process: String, content: String) -> Self {
        Self {
            index,
            pane_type,
            process,
            status: None,
            content,
        }
    }
}

/// Working-tree change counts, populated on demand.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffStat {
    pub added: u32,
    pub modified: u32,
    pub deleted: u32,
}

impl DiffStat {
    pub fn total(&self) -> u32 {
        self.added + self.modified + self.deleted
    }

    pub fn format(&self) -> String {
        if self.total() == 0 {
            "No changes".to_string()
        } else {
            format!("+{} ~{} -{}", self.added, self.modified, self.deleted)
        }
    }
}

/// Pull request details attached by an external VCS-host integration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrInfo {
    pub number: u64,
    pub title: String,
    pub url: String,
    pub state: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub name: String,
    pub status: SessionStatus,
    pub last_changed: DateTime<Utc>,
    pub panes: Vec<Pane>,

    // Git metadata, detected once when the session first appears
    pub branch: String,
    pub git_path: String,
    pub is_git_repo: bool,
    pub is_worktree: bool,

    // Lazily populated, carried forward across polls
    pub diff: Option<DiffStat>,
    pub pr: Option<PrInfo>,

    /// Last captured text of the primary (first non-editor) pane.
    #[serde(skip)]
    pub(crate) prev_content: String,
}

impl Session {
    /// A freshly discovered session with no history.
    pub fn new(name: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            status: SessionStatus::Active,
            last_changed: now,
            panes: Vec::new(),
            branch: String::new(),
            git_path: String::new(),
            is_git_repo: false,
            is_worktree: false,
            diff: None,
            pr: None,
            prev_content: String::new(),
        }
    }

    pub fn apply_git_info(&mut self, info: &GitInfo) {
        self.branch = info.branch.clone();
        self.git_path = info.worktree_path.display().to_string();
        self.is_git_repo = true;
        self.is_worktree = info.is_worktree;
    }

    /// Copy git metadata, diff and PR info from an earlier observation.
    pub(crate) fn carry_git_from(&mut self, prev: &Session) {
        self.branch = prev.branch.clone();
        self.git_path = prev.git_path.clone();
        self.is_git_repo = prev.is_git_repo;
        self.is_worktree = prev.is_worktree;
        self.diff = prev.diff;
        self.pr = prev.pr.clone();
    }

    /// Text of the primary pane as of the last poll.
    pub fn primary_content(&self) -> &str {
        &self.prev_content
    }

    /// Push the session status onto every non-editor pane.
    pub fn propagate_status(&mut self) {
        for pane in &mut self.panes {
            pane.status = if pane.pane_type.is_editor() {
                None
            } else {
                Some(self.status)
            };
        }
    }

    pub fn pane(&self, index: usize) -> Option<&Pane> {
        self.panes.iter().find(|p| p.index == index)
    }

    /// First agent pane, falling back to the first non-editor pane.
    pub fn control_pane(&self) -> Option<&Pane> {
        self.panes
            .iter()
            .find(|p| p.pane_type == PaneType::Agent)
            .or_else(|| self.panes.iter().find(|p| !p.pane_type.is_editor()))
    }
}
