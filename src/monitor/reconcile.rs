// ABOUTME: Reconciliation of a fresh session observation against the previous table entry
//
// Field-by-field carry-forward, keyed by session name:
//
// | field                      | existing session                  | new session          |
// |----------------------------|-----------------------------------|----------------------|
// | branch, git_path           | carried                           | from git detection   |
// | is_git_repo, is_worktree   | carried                           | from git detection   |
// | diff, pr                   | carried                           | none                 |
// | last_changed               | advanced only if primary differs  | now                  |
// | status                     | classified (prev vs new primary)  | active               |
// | panes, primary content     | recomputed                        | recomputed           |

use chrono::{DateTime, Utc};

use crate::classifier::StatusPolicy;
use crate::git::GitInfo;
use crate::models::{Pane, Session, SessionStatus};

/// What one poll cycle saw for a single session.
#[derive(Debug, Clone, Default)]
pub struct Observation {
    pub name: String,
    pub panes: Vec<Pane>,
    /// Capture of the first non-editor pane, empty if there is none.
    pub primary: String,
    /// Only probed for sessions missing from the previous table.
    pub git: Option<GitInfo>,
}

pub fn reconcile(
    prev: Option<&Session>,
    observation: Observation,
    policy: &StatusPolicy,
    now: DateTime<Utc>,
) -> Session {
    let Observation {
        name,
        panes,
        primary,
        git,
    } = observation;

    let mut session = Session::new(name, now);
    session.panes = panes;

    match prev {
        Some(prev) => {
            session.carry_git_from(prev);

            session.last_changed = if primary == prev.prev_content {
                prev.last_changed
            } else {
                prev.last_changed.max(now)
            };

            session.status =
                policy.classify(&prev.prev_content, &primary, session.last_changed, now);
        }
        None => {
            if let Some(info) = &git {
                session.apply_git_info(info);
            }
            session.status = SessionStatus::Active;
        }
    }

    session.prev_content = primary;
    session.propagate_status();
    session
}
