// ABOUTME: CLI argument parsing and command routing for fleetmux
//
// Provides command-line interface for:
// - Running the monitor and HTTP server (serve)
// - Managing paired devices out of process (devices list, devices revoke)
// - Printing the admin token (admin-token)

pub mod admin_token;
pub mod devices;
pub mod serve;

use clap::{Parser, Subcommand, ValueEnum};
use fleetmux::config::Overrides;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Watch and drive a fleet of tmux-hosted agent sessions from a paired device
#[derive(Parser)]
#[command(name = "fleetmux")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output format
    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Extra config file, applied over the default locations
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory for the device file, admin token and logs
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,
}

impl Cli {
    pub fn overrides(&self) -> Overrides {
        let listen = match &self.command {
            Commands::Serve(args) => args.listen,
            _ => None,
        };
        Overrides {
            config_file: self.config.clone(),
            data_dir: self.data_dir.clone(),
            listen,
        }
    }
}

/// Output format for commands
#[derive(Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Run the session monitor and the HTTP/WebSocket server until Ctrl-C
    Serve(ServeArgs),

    /// Manage paired devices
    #[command(subcommand)]
    Devices(DevicesCommand),

    /// Print the admin token, creating it on first run
    AdminToken,
}

/// Arguments for the serve command
#[derive(clap::Args)]
pub struct ServeArgs {
    /// Address to listen on (e.g. 127.0.0.1:7777)
    #[arg(long)]
    pub listen: Option<SocketAddr>,
}

#[derive(Subcommand)]
pub enum DevicesCommand {
    /// List paired devices
    List,

    /// Revoke a paired device by id
    Revoke {
        /// Device id as shown by `devices list`
        id: String,
    },
}
