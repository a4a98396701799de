// ABOUTME: File-backed store of paired devices, re-read from disk on every lookup
//
// The file is the single source of truth. A `devices revoke` run from
// another process must take effect on the very next request this server
// handles, so nothing here caches device validity.
//
// Rate envelope: each authenticated request costs one read and parse of a
// small JSON file (human-scale device counts). Writes rewrite the whole
// file through a temp file and rename, under one lock per store.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::token::constant_time_eq;
use crate::models::Device;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Device not found: {0}")]
    NotFound(String),
    #[error("Device already exists: {0}")]
    Duplicate(String),
    #[error("Device store is corrupt, refusing to overwrite {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Device store I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Failed to encode device store: {0}")]
    Encode(#[from] serde_json::Error),
}

impl From<tempfile::PersistError> for StoreError {
    fn from(e: tempfile::PersistError) -> Self {
        StoreError::Io(e.error)
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct DeviceFile {
    #[serde(default)]
    devices: Vec<Device>,
}

#[derive(Debug)]
pub struct DeviceStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl DeviceStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn add(&self, device: Device) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut file = self.load_for_update()?;

        if file
            .devices
            .iter()
            .any(|d| d.id == device.id || constant_time_eq(&d.token, &device.token))
        {
            return Err(StoreError::Duplicate(device.id));
        }

        info!(device_id = %device.id, name = %device.name, "Adding paired device");
        file.devices.push(device);
        self.save(&file)
    }

    pub fn remove(&self, id: &str) -> Result<Device, StoreError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut file = self.load_for_update()?;

        let position = file
            .devices
            .iter()
            .position(|d| d.id == id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        let removed = file.devices.remove(position);

        self.save(&file)?;
        info!(device_id = %removed.id, name = %removed.name, "Revoked device");
        Ok(removed)
    }

    pub fn list(&self) -> Vec<Device> {
        self.load().devices
    }

    pub fn find_by_token(&self, token: &str) -> Option<Device> {
        self.load()
            .devices
            .into_iter()
            .find(|d| constant_time_eq(&d.token, token))
    }

    /// Record activity for the device holding `token`. Returns `false` when
    /// no device holds it (e.g. revoked between lookup and touch).
    pub fn update_last_seen(&self, token: &str, at: DateTime<Utc>) -> Result<bool, StoreError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut file = self.load_for_update()?;

        let Some(device) = file
            .devices
            .iter_mut()
            .find(|d| constant_time_eq(&d.token, token))
        else {
            return Ok(false);
        };
        device.last_seen = Some(at);
        debug!(device_id = %device.id, "Updated last seen");

        self.save(&file)?;
        Ok(true)
    }

    /// Lenient read for lookups: missing or unreadable means no devices.
    fn load(&self) -> DeviceFile {
        match fs::read_to_string(&self.path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|e| {
                warn!(path = %self.path.display(), error = %e, "Device store is corrupt, treating as empty");
                DeviceFile::default()
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => DeviceFile::default(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to read device store, treating as empty");
                DeviceFile::default()
            }
        }
    }

    /// Strict read for mutations: a corrupt file is never silently replaced.
    fn load_for_update(&self) -> Result<DeviceFile, StoreError> {
        match fs::read_to_string(&self.path) {
            Ok(contents) if contents.trim().is_empty() => Ok(DeviceFile::default()),
            Ok(contents) => serde_json::from_str(&contents).map_err(|source| StoreError::Corrupt {
                path: self.path.clone(),
                source,
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(DeviceFile::default()),
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    fn save(&self, file: &DeviceFile) -> Result<(), StoreError> {
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;

        // NamedTempFile is created owner-only, and the rename keeps that mode
        let mut tmp = NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&mut tmp, file)?;
        tmp.write_all(b"\n")?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path)?;
        Ok(())
    }
}
