// ABOUTME: Pure status classification of a session from its primary pane text and quiet time
//
// Evaluation order, first match wins:
//   1. current text contains an error pattern        -> error
//   2. current text differs from the previous text   -> active
//   3. quiet longer than done_after and prompt shown -> done
//   4. quiet longer than idle_after                  -> idle
//   5. otherwise                                      -> active

use std::time::Duration;

use chrono::{DateTime, Utc};
use regex::Regex;

use crate::models::SessionStatus;

pub const DEFAULT_IDLE_AFTER: Duration = Duration::from_secs(30);
pub const DEFAULT_DONE_AFTER: Duration = Duration::from_secs(60);
pub const DEFAULT_PROMPT_PATTERN: &str = r"[$#%>❯]\s*$";

/// Patterns and thresholds the classifier evaluates against.
#[derive(Debug, Clone)]
pub struct StatusPolicy {
    error_patterns: Vec<String>,
    prompt: Regex,
    idle_after: Duration,
    done_after: Duration,
}

impl StatusPolicy {
    /// Build a policy. Empty error patterns are ignored so that a stray
    /// `""` in configuration cannot flag every pane as erroring.
    pub fn new(
        error_patterns: Vec<String>,
        prompt_pattern: &str,
        idle_after: Duration,
        done_after: Duration,
    ) -> Result<Self, regex::Error> {
        let prompt = Regex::new(prompt_pattern)?;
        let error_patterns = error_patterns
            .into_iter()
            .filter(|p| !p.is_empty())
            .collect();

        Ok(Self {
            error_patterns,
            prompt,
            idle_after,
            done_after,
        })
    }

    pub fn idle_after(&self) -> Duration {
        self.idle_after
    }

    pub fn done_after(&self) -> Duration {
        self.done_after
    }

    pub fn classify(
        &self,
        prev: &str,
        current: &str,
        last_changed: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> SessionStatus {
        if self.matches_error(current) {
            return SessionStatus::Error;
        }

        if current != prev {
            return SessionStatus::Active;
        }

        // A clock that went backwards counts as no quiet time at all
        let quiet = (now - last_changed).to_std().unwrap_or(Duration::ZERO);

        if quiet > self.done_after && self.shows_prompt(current) {
            return SessionStatus::Done;
        }

        if quiet > self.idle_after {
            return SessionStatus::Idle;
        }

        SessionStatus::Active
    }

    fn matches_error(&self, text: &str) -> bool {
        self.error_patterns.iter().any(|p| text.contains(p.as_str()))
    }

    fn shows_prompt(&self, text: &str) -> bool {
        last_non_empty_line(text).is_some_and(|line| self.prompt.is_match(line))
    }
}

impl Default for StatusPolicy {
    fn default() -> Self {
        Self {
            error_patterns: default_error_patterns(),
            prompt: Regex::new(DEFAULT_PROMPT_PATTERN).expect("default prompt pattern is valid"),
            idle_after: DEFAULT_IDLE_AFTER,
            done_after: DEFAULT_DONE_AFTER,
        }
    }
}

pub fn default_error_patterns() -> Vec<String> {
    [
        "panic:",
        "Traceback (most recent call last)",
        "error[E",
        "FATAL",
        "Segmentation fault",
    ]
    .iter()
    .map(ToString::to_string)
    .collect()
}

/// Last line with visible characters, trimmed on both ends.
pub fn last_non_empty_line(text: &str) -> Option<&str> {
    text.lines().map(str::trim).rev().find(|line| !line.is_empty())
}
