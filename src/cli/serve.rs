// ABOUTME: CLI serve command - run the session monitor and HTTP/WebSocket server until Ctrl-C

use std::sync::Arc;

use anyhow::{Context, Result};
use fleetmux::audit::AuditLog;
use fleetmux::auth::token::redact;
use fleetmux::auth::{load_or_create_admin_token, AuthMiddleware, DeviceStore, PairingManager};
use fleetmux::config::AppConfig;
use fleetmux::monitor::Monitor;
use fleetmux::server::{build_app, AppState};
use fleetmux::tmux::{tmux_available, TmuxSource};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub async fn execute(config: AppConfig) -> Result<()> {
    if !tmux_available() {
        warn!("tmux not found on PATH; the session list will stay empty until it is installed");
    }

    let monitor_config = config.monitor_config()?;

    std::fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("Failed to create data dir {}", config.data_dir.display()))?;

    let admin_path = config.admin_token_path();
    let admin_token = load_or_create_admin_token(&admin_path)
        .with_context(|| format!("Failed to load admin token from {}", admin_path.display()))?;
    info!(path = %admin_path.display(), token = %redact(&admin_token), "Admin token ready");

    let devices = Arc::new(DeviceStore::new(config.devices_path()));
    let audit = AuditLog::open(&AuditLog::default_path(&config.data_dir)).unwrap_or_else(|e| {
        warn!("Audit log unavailable, continuing without it: {e}");
        AuditLog::disabled()
    });

    let monitor = Arc::new(Monitor::new(Arc::new(TmuxSource::new()), monitor_config));
    monitor.start()?;

    let shutdown = CancellationToken::new();
    let state = AppState {
        monitor: Arc::clone(&monitor),
        pairing: Arc::new(PairingManager::new(config.pairing_ttl())),
        devices: Arc::clone(&devices),
        audit: Arc::new(audit),
        shutdown: shutdown.clone(),
    };
    let auth = Arc::new(AuthMiddleware::new(
        admin_token,
        devices,
        config.last_seen_debounce(),
    ));
    let app = build_app(state, auth, &config.server.allowed_origins)?;

    let listener = TcpListener::bind(config.server.listen)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.listen))?;
    let addr = listener.local_addr()?;
    info!("fleetmux listening on http://{addr}");
    eprintln!("fleetmux listening on http://{addr}");
    eprintln!("Admin token: {}", admin_path.display());

    let token = shutdown.clone();
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for Ctrl-C: {e}");
            }
            info!("Shutdown requested");
            // Open WebSocket streams end here so graceful shutdown can finish
            token.cancel();
        })
        .await;

    shutdown.cancel();
    monitor.stop().await;
    served.context("HTTP server failed")
}
