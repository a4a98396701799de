// ABOUTME: Audit trail for security- and control-relevant actions
//
// Records pairing, device revocation and remote session control so an
// operator can reconstruct who did what from which device.
//
// Audit log is written to: <data_dir>/logs/audit.jsonl
// Format: JSON Lines (one JSON object per line) for easy grep/parsing.
// Secrets and typed text never appear in entries; text sends record length only.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::{error, info};

/// Types of auditable actions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    // Device trust
    PairingInitiated,
    PairingCompleted,
    PairingFailed,
    DeviceRevoked,

    // Remote control
    SessionCreated,
    SessionKilled,
    TextSent,
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuditAction::PairingInitiated => write!(f, "PAIRING_INITIATED"),
            AuditAction::PairingCompleted => write!(f, "PAIRING_COMPLETED"),
            AuditAction::PairingFailed => write!(f, "PAIRING_FAILED"),
            AuditAction::DeviceRevoked => write!(f, "DEVICE_REVOKED"),
            AuditAction::SessionCreated => write!(f, "SESSION_CREATED"),
            AuditAction::SessionKilled => write!(f, "SESSION_KILLED"),
            AuditAction::TextSent => write!(f, "TEXT_SENT"),
        }
    }
}

/// Result of an audited action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditResult {
    Success,
    Failed(String),
}

impl<E: std::fmt::Display> From<&Result<(), E>> for AuditResult {
    fn from(result: &Result<(), E>) -> Self {
        match result {
            Ok(()) => AuditResult::Success,
            Err(e) => AuditResult::Failed(e.to_string()),
        }
    }
}

/// What triggered the audit action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditTrigger {
    /// HTTP request from an authenticated principal (or anonymous pairing)
    Api(String),
    /// Local CLI command
    Command(String),
}

impl std::fmt::Display for AuditTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuditTrigger::Api(actor) => write!(f, "api:{actor}"),
            AuditTrigger::Command(cmd) => write!(f, "command:{cmd}"),
        }
    }
}

/// A single audit log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub action: AuditAction,
    pub result: AuditResult,
    pub trigger: AuditTrigger,

    /// Tmux session name if applicable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,

    /// Device id if applicable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl AuditEntry {
    pub fn new(action: AuditAction, result: AuditResult, trigger: AuditTrigger) -> Self {
        Self {
            timestamp: Utc::now(),
            action,
            result,
            trigger,
            session: None,
            device_id: None,
            details: None,
        }
    }

    #[must_use]
    pub fn session(mut self, name: impl Into<String>) -> Self {
        self.session = Some(name.into());
        self
    }

    #[must_use]
    pub fn device(mut self, id: impl Into<String>) -> Self {
        self.device_id = Some(id.into());
        self
    }

    #[must_use]
    pub fn details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// Audit logger that appends to a JSONL file
pub struct AuditLog {
    writer: Mutex<Option<BufWriter<File>>>,
    path: Option<PathBuf>,
}

impl AuditLog {
    /// Open (or create) the audit file in append mode.
    pub fn open(path: &Path) -> std::io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;

        info!("Audit logging initialized: {:?}", path);
        Ok(Self {
            writer: Mutex::new(Some(BufWriter::new(file))),
            path: Some(path.to_path_buf()),
        })
    }

    /// Logger that only emits tracing events.
    pub fn disabled() -> Self {
        Self {
            writer: Mutex::new(None),
            path: None,
        }
    }

    /// Default location under a data directory.
    pub fn default_path(data_dir: &Path) -> PathBuf {
        data_dir.join("logs").join("audit.jsonl")
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Log an audit entry (main API)
    pub fn record(&self, entry: &AuditEntry) {
        // Also log to tracing for immediate visibility
        info!(
            target: "audit",
            action = %entry.action,
            result = ?entry.result,
            trigger = %entry.trigger,
            session = ?entry.session,
            device_id = ?entry.device_id,
            "AUDIT: {}",
            entry.action
        );

        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(writer) = writer.as_mut() {
            if let Err(e) = write_entry(writer, entry) {
                error!("Failed to write audit entry: {}", e);
            }
        }
    }

    // ========================================================================
    // Convenience functions for common audit scenarios
    // ========================================================================

    pub fn pairing_initiated(&self, trigger: AuditTrigger, device_name: &str) {
        self.record(
            &AuditEntry::new(AuditAction::PairingInitiated, AuditResult::Success, trigger)
                .details(format!("device name: {device_name}")),
        );
    }

    pub fn pairing_completed(&self, device_id: &str, device_name: &str) {
        self.record(
            &AuditEntry::new(
                AuditAction::PairingCompleted,
                AuditResult::Success,
                AuditTrigger::Api("anonymous".to_string()),
            )
            .device(device_id)
            .details(format!("device name: {device_name}")),
        );
    }

    pub fn pairing_failed(&self, reason: &str) {
        self.record(&AuditEntry::new(
            AuditAction::PairingFailed,
            AuditResult::Failed(reason.to_string()),
            AuditTrigger::Api("anonymous".to_string()),
        ));
    }

    pub fn device_revoked(&self, trigger: AuditTrigger, device_id: &str, result: AuditResult) {
        self.record(&AuditEntry::new(AuditAction::DeviceRevoked, result, trigger).device(device_id));
    }

    pub fn session_created(&self, trigger: AuditTrigger, session: &str, dir: &Path, result: AuditResult) {
        self.record(
            &AuditEntry::new(AuditAction::SessionCreated, result, trigger)
                .session(session)
                .details(format!("dir: {}", dir.display())),
        );
    }

    pub fn session_killed(&self, trigger: AuditTrigger, session: &str, result: AuditResult) {
        self.record(&AuditEntry::new(AuditAction::SessionKilled, result, trigger).session(session));
    }

    pub fn text_sent(&self, trigger: AuditTrigger, session: &str, pane: Option<usize>, len: usize, result: AuditResult) {
        let pane = pane.map_or_else(|| "default".to_string(), |p| p.to_string());
        self.record(
            &AuditEntry::new(AuditAction::TextSent, result, trigger)
                .session(session)
                .details(format!("pane: {pane}, bytes: {len}")),
        );
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::disabled()
    }
}

fn write_entry(writer: &mut BufWriter<File>, entry: &AuditEntry) -> std::io::Result<()> {
    let json = serde_json::to_string(entry)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

    writeln!(writer, "{}", json)?;
    writer.flush()?;
    Ok(())
}
