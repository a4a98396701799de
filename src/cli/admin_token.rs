// ABOUTME: CLI admin-token command - print the admin bearer token, creating it on first run

use anyhow::{Context, Result};
use fleetmux::auth::load_or_create_admin_token;
use fleetmux::config::AppConfig;
use serde_json::json;

use super::OutputFormat;

pub fn execute(config: &AppConfig, format: OutputFormat) -> Result<()> {
    let path = config.admin_token_path();
    let token = load_or_create_admin_token(&path)
        .with_context(|| format!("Failed to load admin token from {}", path.display()))?;

    match format {
        OutputFormat::Json => {
            let out = json!({ "token": token, "path": path.display().to_string() });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        OutputFormat::Text => println!("{token}"),
    }

    Ok(())
}
