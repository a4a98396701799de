// ABOUTME: Single-slot pairing state machine turning a short-lived code into a device identity
//
// Invariants:
// - At most one pending pair exists. `initiate` always replaces it, which
//   silently invalidates an earlier unclaimed code.
// - A pending pair is claimed at most once. Every later `complete` with the
//   same code fails with `CodeUsed`, before or after expiry.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use super::token::{constant_time_eq, generate_pairing_code};

pub const DEFAULT_PAIRING_TTL: Duration = Duration::from_secs(300);

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairingError {
    #[error("invalid pairing code")]
    InvalidCode,
    #[error("pairing code expired")]
    CodeExpired,
    #[error("pairing code already used")]
    CodeUsed,
}

impl PairingError {
    /// Stable machine-readable kind for API clients.
    pub fn kind(&self) -> &'static str {
        match self {
            PairingError::InvalidCode => "invalid_code",
            PairingError::CodeExpired => "code_expired",
            PairingError::CodeUsed => "code_used",
        }
    }
}

#[derive(Debug, Clone)]
struct PendingPair {
    code: String,
    device_name: String,
    expires_at: DateTime<Utc>,
    claimed: bool,
}

/// Code handed to the operator, usually rendered as a QR code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PairingTicket {
    pub code: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PairingStatus {
    pub claimed: bool,
    pub device_name: String,
}

#[derive(Debug)]
pub struct PairingManager {
    slot: Mutex<Option<PendingPair>>,
    ttl: TimeDelta,
}

impl PairingManager {
    pub fn new(ttl: Duration) -> Self {
        Self {
            slot: Mutex::new(None),
            ttl: TimeDelta::from_std(ttl).unwrap_or(TimeDelta::MAX),
        }
    }

    pub fn initiate(&self, device_name: &str) -> PairingTicket {
        self.initiate_at(device_name, Utc::now())
    }

    pub fn initiate_at(&self, device_name: &str, now: DateTime<Utc>) -> PairingTicket {
        let code = generate_pairing_code();
        let expires_at = now.checked_add_signed(self.ttl).unwrap_or(DateTime::<Utc>::MAX_UTC);

        let replaced = self.slot().replace(PendingPair {
            code: code.clone(),
            device_name: device_name.to_string(),
            expires_at,
            claimed: false,
        });

        if replaced.is_some_and(|p| !p.claimed) {
            debug!("Superseded an unclaimed pairing code");
        }
        info!(device_name, %expires_at, "Pairing initiated");

        PairingTicket { code, expires_at }
    }

    /// Claim the pending pair and return its device name.
    pub fn complete(&self, code: &str) -> Result<String, PairingError> {
        self.complete_at(code, Utc::now())
    }

    pub fn complete_at(&self, code: &str, now: DateTime<Utc>) -> Result<String, PairingError> {
        self.complete_with_at(code, now, |name| Ok::<_, PairingError>(name.to_string()))
    }

    /// Claim the pending pair only once `persist` has durably recorded the
    /// device. A failed `persist` leaves the code unclaimed and retryable.
    ///
    /// The slot stays locked while `persist` runs, so two racing completes
    /// can never both reach it.
    pub fn complete_with<T, E>(&self, code: &str, persist: impl FnOnce(&str) -> Result<T, E>) -> Result<T, E>
    where
        E: From<PairingError>,
    {
        self.complete_with_at(code, Utc::now(), persist)
    }

    pub fn complete_with_at<T, E>(
        &self,
        code: &str,
        now: DateTime<Utc>,
        persist: impl FnOnce(&str) -> Result<T, E>,
    ) -> Result<T, E>
    where
        E: From<PairingError>,
    {
        let code = normalize_code(code);
        let mut slot = self.slot();

        let pending = slot
            .as_mut()
            .filter(|p| constant_time_eq(&p.code, &code))
            .ok_or(PairingError::InvalidCode)?;

        if pending.claimed {
            return Err(PairingError::CodeUsed.into());
        }
        if now >= pending.expires_at {
            return Err(PairingError::CodeExpired.into());
        }

        let persisted = persist(&pending.device_name)?;
        pending.claimed = true;
        info!(device_name = %pending.device_name, "Pairing completed");
        Ok(persisted)
    }

    /// Non-consuming check for a client polling until the code is claimed.
    /// Unknown codes read as "not yet".
    pub fn status(&self, code: &str) -> PairingStatus {
        let code = normalize_code(code);
        match self.slot().as_ref() {
            Some(p) if constant_time_eq(&p.code, &code) => PairingStatus {
                claimed: p.claimed,
                device_name: p.device_name.clone(),
            },
            _ => PairingStatus {
                claimed: false,
                device_name: String::new(),
            },
        }
    }

    fn slot(&self) -> MutexGuard<'_, Option<PendingPair>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for PairingManager {
    fn default() -> Self {
        Self::new(DEFAULT_PAIRING_TTL)
    }
}

// Codes are typed by hand, so be forgiving about case and whitespace
fn normalize_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}
