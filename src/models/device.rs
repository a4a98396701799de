// ABOUTME: Paired device model persisted by the device store

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A device that completed pairing and holds a bearer token.
///
/// The token is the identity; `id` exists so a human can name the device
/// in a revoke command without handling the secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub id: String,
    pub name: String,
    pub token: String,
    pub paired_at: DateTime<Utc>,
    #[serde(default)]
    pub last_seen: Option<DateTime<Utc>>,
}

impl Device {
    pub fn new(id: String, name: String, token: String, paired_at: DateTime<Utc>) -> Self {
        Self {
            id,
            name,
            token,
            paired_at,
            last_seen: None,
        }
    }

    pub fn summary(&self) -> DeviceSummary {
        DeviceSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            paired_at: self.paired_at,
            last_seen: self.last_seen,
        }
    }
}

/// Device view safe to hand out over the API (no token).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSummary {
    pub id: String,
    pub name: String,
    pub paired_at: DateTime<Utc>,
    pub last_seen: Option<DateTime<Utc>>,
}
