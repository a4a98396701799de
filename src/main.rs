// ABOUTME: Main entry point for fleetmux
//
// Binary: fleetmux
// Usage: fleetmux <COMMAND>
// - serve: run the monitor and HTTP/WebSocket server
// - devices list | devices revoke <id>: manage paired devices
// - admin-token: print the admin token

#![allow(missing_docs)]

use anyhow::Result;
use clap::Parser;
use std::path::Path;

use fleetmux::config::AppConfig;

mod cli;

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();
    let config = AppConfig::load(&args.overrides())?;

    setup_logging(&config.logs_dir());
    setup_panic_handler();

    match args.command {
        cli::Commands::Serve(_) => cli::serve::execute(config).await,
        cli::Commands::Devices(command) => cli::devices::execute(command, &config, args.format),
        cli::Commands::AdminToken => cli::admin_token::execute(&config, args.format),
    }
}

/// Install a stderr layer plus a JSON Lines file layer. When the log
/// directory is unusable only stderr logging is installed.
fn setup_logging(log_dir: &Path) {
    use std::fs::OpenOptions;
    use tracing_subscriber::prelude::*;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "fleetmux=info".into());

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);

    // Create JSONL log file with timestamp
    let log_file = log_dir.join(format!(
        "fleetmux-{}.jsonl",
        chrono::Local::now().format("%Y%m%d-%H%M%S")
    ));
    let file = std::fs::create_dir_all(log_dir)
        .and_then(|()| OpenOptions::new().create(true).append(true).open(&log_file));

    let file_layer = match file {
        Ok(file) => Some(
            tracing_subscriber::fmt::layer()
                .json()
                .with_target(true)
                .with_writer(file)
                .with_ansi(false),
        ),
        Err(e) => {
            eprintln!("Failed to open log file {}: {e}", log_file.display());
            None
        }
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();
}

fn setup_panic_handler() {
    use tracing::error;

    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        error!("Application panicked: {}", panic_info);
        default_hook(panic_info);
    }));
}
