// ABOUTME: CLI devices commands - list and revoke paired devices
//
// Operates on the device file directly, so a revoke takes effect on a
// running server at its next request without any IPC.

use anyhow::{Context, Result};
use fleetmux::audit::{AuditLog, AuditResult, AuditTrigger};
use fleetmux::auth::{DeviceStore, StoreError};
use fleetmux::config::AppConfig;
use fleetmux::models::DeviceSummary;
use tracing::warn;

use super::{DevicesCommand, OutputFormat};

pub fn execute(command: DevicesCommand, config: &AppConfig, format: OutputFormat) -> Result<()> {
    let store = DeviceStore::new(config.devices_path());

    match command {
        DevicesCommand::List => {
            let devices: Vec<DeviceSummary> = store.list().iter().map(|d| d.summary()).collect();
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&devices)?),
                OutputFormat::Text => output_text(&devices),
            }
            Ok(())
        }
        DevicesCommand::Revoke { id } => revoke(&store, config, &id, format),
    }
}

fn revoke(store: &DeviceStore, config: &AppConfig, id: &str, format: OutputFormat) -> Result<()> {
    let audit = AuditLog::open(&AuditLog::default_path(&config.data_dir)).unwrap_or_else(|e| {
        warn!("Audit log unavailable, continuing without it: {e}");
        AuditLog::disabled()
    });

    let result = store.remove(id);
    audit.device_revoked(
        AuditTrigger::Command("devices revoke".to_string()),
        id,
        AuditResult::from(&result.as_ref().map(|_| ())),
    );

    let device = match result {
        Ok(device) => device,
        Err(StoreError::NotFound(_)) => anyhow::bail!("No paired device with id {id}"),
        Err(e) => return Err(e).context("Failed to revoke device"),
    };

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&device.summary())?),
        OutputFormat::Text => println!("Revoked device {} ({})", device.id, device.name),
    }
    Ok(())
}

fn output_text(devices: &[DeviceSummary]) {
    if devices.is_empty() {
        println!("No paired devices.");
        return;
    }

    println!("{:<10} {:<24} {:<20} LAST SEEN", "ID", "NAME", "PAIRED");
    println!("{}", "-".repeat(76));

    for device in devices {
        let last_seen = device
            .last_seen
            .map_or_else(|| "never".to_string(), |t| t.format("%Y-%m-%d %H:%M").to_string());
        println!(
            "{:<10} {:<24} {:<20} {}",
            device.id,
            truncate(&device.name, 24),
            device.paired_at.format("%Y-%m-%d %H:%M").to_string(),
            last_seen
        );
    }
}

/// Truncate a string to fit in the given width (character-aware for UTF-8)
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{truncated}...")
    }
}
