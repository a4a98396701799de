// ABOUTME: Configuration management for fleetmux
// Layered TOML files with serde defaults, then environment and CLI overrides

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::auth::{DEFAULT_PAIRING_TTL, DEFAULT_TOUCH_DEBOUNCE};
use crate::classifier::{
    default_error_patterns, StatusPolicy, DEFAULT_DONE_AFTER, DEFAULT_IDLE_AFTER, DEFAULT_PROMPT_PATTERN,
};
use crate::monitor::{MonitorConfig, DEFAULT_POLL_INTERVAL};
use crate::tmux::process_detection::{DEFAULT_AGENTS, DEFAULT_EDITORS, DEFAULT_SHELLS};
use crate::tmux::PaneTypeDetector;

pub const ENV_LISTEN: &str = "FLEETMUX_LISTEN";
pub const ENV_DATA_DIR: &str = "FLEETMUX_DATA_DIR";

const CONFIG_FILE: &str = "config.toml";
const SYSTEM_CONFIG: &str = "/etc/fleetmux/config.toml";
const PROJECT_CONFIG_DIR: &str = ".fleetmux";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub monitor: MonitorSettings,

    #[serde(default)]
    pub auth: AuthSettings,

    /// Where the device file, admin token and logs live
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,

    /// Browser origins allowed by CORS. `"*"` allows any origin.
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            allowed_origins: default_allowed_origins(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorSettings {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Quiet time before a session counts as idle
    #[serde(default = "default_idle_after_secs")]
    pub idle_after_secs: u64,

    /// Quiet time before a session at a prompt counts as done
    #[serde(default = "default_done_after_secs")]
    pub done_after_secs: u64,

    #[serde(default = "default_error_patterns")]
    pub error_patterns: Vec<String>,

    #[serde(default = "default_prompt_pattern")]
    pub prompt_pattern: String,

    #[serde(default = "default_editors")]
    pub editor_processes: Vec<String>,

    #[serde(default = "default_agents")]
    pub agent_processes: Vec<String>,

    #[serde(default = "default_shells")]
    pub shell_processes: Vec<String>,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            idle_after_secs: default_idle_after_secs(),
            done_after_secs: default_done_after_secs(),
            error_patterns: default_error_patterns(),
            prompt_pattern: default_prompt_pattern(),
            editor_processes: default_editors(),
            agent_processes: default_agents(),
            shell_processes: default_shells(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthSettings {
    #[serde(default = "default_pairing_ttl_secs")]
    pub pairing_ttl_secs: u64,

    #[serde(default = "default_last_seen_debounce_secs")]
    pub last_seen_debounce_secs: u64,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            pairing_ttl_secs: default_pairing_ttl_secs(),
            last_seen_debounce_secs: default_last_seen_debounce_secs(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir().map_or_else(|| PathBuf::from(PROJECT_CONFIG_DIR), |home| home.join(".fleetmux"))
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 7777))
}

fn default_allowed_origins() -> Vec<String> {
    vec!["*".to_string()]
}

fn default_poll_interval_ms() -> u64 {
    u64::try_from(DEFAULT_POLL_INTERVAL.as_millis()).unwrap_or(2000)
}

fn default_idle_after_secs() -> u64 {
    DEFAULT_IDLE_AFTER.as_secs()
}

fn default_done_after_secs() -> u64 {
    DEFAULT_DONE_AFTER.as_secs()
}

fn default_prompt_pattern() -> String {
    DEFAULT_PROMPT_PATTERN.to_string()
}

fn owned(names: &[&str]) -> Vec<String> {
    names.iter().map(ToString::to_string).collect()
}

fn default_editors() -> Vec<String> {
    owned(DEFAULT_EDITORS)
}

fn default_agents() -> Vec<String> {
    owned(DEFAULT_AGENTS)
}

fn default_shells() -> Vec<String> {
    owned(DEFAULT_SHELLS)
}

fn default_pairing_ttl_secs() -> u64 {
    DEFAULT_PAIRING_TTL.as_secs()
}

fn default_last_seen_debounce_secs() -> u64 {
    DEFAULT_TOUCH_DEBOUNCE.as_secs()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            monitor: MonitorSettings::default(),
            auth: AuthSettings::default(),
            data_dir: default_data_dir(),
        }
    }
}

/// Values given on the command line. They win over every other layer.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub config_file: Option<PathBuf>,
    pub data_dir: Option<PathBuf>,
    pub listen: Option<SocketAddr>,
}

impl AppConfig {
    /// Load configuration from the default locations, then apply the
    /// environment and `overrides`.
    pub fn load(overrides: &Overrides) -> Result<Self> {
        // The data dir decides where one config layer lives, so resolve it first
        let data_dir = overrides
            .data_dir
            .clone()
            .or_else(|| std::env::var_os(ENV_DATA_DIR).map(PathBuf::from))
            .unwrap_or_else(default_data_dir);

        let mut paths = Self::config_paths(&data_dir);
        if let Some(explicit) = &overrides.config_file {
            if !explicit.exists() {
                bail!("Config file not found: {}", explicit.display());
            }
            paths.push(explicit.clone());
        }

        let mut config = Self::load_from_paths(&paths)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        config.apply_overrides(overrides);
        Ok(config)
    }

    /// Merge every existing file in `paths`, later files overriding earlier
    /// ones key by key.
    pub fn load_from_paths(paths: &[PathBuf]) -> Result<Self> {
        let mut merged = toml::Table::new();

        for path in paths.iter().filter(|p| p.exists()) {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            let layer: toml::Table = toml::from_str(&content)
                .with_context(|| format!("Failed to parse config from {}", path.display()))?;
            merge_tables(&mut merged, layer);
        }

        toml::Value::Table(merged)
            .try_into()
            .context("Invalid configuration")
    }

    /// Configuration file paths in order of increasing precedence
    fn config_paths(data_dir: &Path) -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(SYSTEM_CONFIG), data_dir.join(CONFIG_FILE)];

        if let Ok(cwd) = std::env::current_dir() {
            paths.push(cwd.join(PROJECT_CONFIG_DIR).join(CONFIG_FILE));
        }

        paths
    }

    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(listen) = lookup(ENV_LISTEN).filter(|v| !v.trim().is_empty()) {
            self.server.listen = listen
                .trim()
                .parse()
                .with_context(|| format!("Invalid {ENV_LISTEN} value: {listen}"))?;
        }
        if let Some(dir) = lookup(ENV_DATA_DIR).filter(|v| !v.trim().is_empty()) {
            self.data_dir = PathBuf::from(dir);
        }
        Ok(())
    }

    fn apply_overrides(&mut self, overrides: &Overrides) {
        if let Some(listen) = overrides.listen {
            self.server.listen = listen;
        }
        if let Some(dir) = &overrides.data_dir {
            self.data_dir.clone_from(dir);
        }
    }

    /// Build the monitor configuration, rejecting values the monitor
    /// cannot run with.
    pub fn monitor_config(&self) -> Result<MonitorConfig> {
        let settings = &self.monitor;
        if settings.poll_interval_ms == 0 {
            bail!("monitor.poll_interval_ms must be greater than zero");
        }
        if settings.done_after_secs < settings.idle_after_secs {
            bail!(
                "monitor.done_after_secs ({}) must not be less than monitor.idle_after_secs ({})",
                settings.done_after_secs,
                settings.idle_after_secs
            );
        }

        let policy = StatusPolicy::new(
            settings.error_patterns.clone(),
            &settings.prompt_pattern,
            Duration::from_secs(settings.idle_after_secs),
            Duration::from_secs(settings.done_after_secs),
        )
        .with_context(|| format!("Invalid monitor.prompt_pattern: {}", settings.prompt_pattern))?;

        Ok(MonitorConfig {
            poll_interval: Duration::from_millis(settings.poll_interval_ms),
            policy,
            detector: PaneTypeDetector::new(
                settings.editor_processes.as_slice(),
                settings.agent_processes.as_slice(),
                settings.shell_processes.as_slice(),
            ),
        })
    }

    pub fn pairing_ttl(&self) -> Duration {
        Duration::from_secs(self.auth.pairing_ttl_secs)
    }

    pub fn last_seen_debounce(&self) -> Duration {
        Duration::from_secs(self.auth.last_seen_debounce_secs)
    }

    pub fn devices_path(&self) -> PathBuf {
        self.data_dir.join("devices.json")
    }

    pub fn admin_token_path(&self) -> PathBuf {
        self.data_dir.join("admin_token")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }
}

/// Recursively merge `layer` into `base`. Nested tables merge key by key;
/// any other value (arrays included) replaces what was there.
fn merge_tables(base: &mut toml::Table, layer: toml::Table) {
    for (key, value) in layer {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}
