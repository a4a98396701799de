// ABOUTME: HTTP and WebSocket surface: router assembly, shared state, and CORS
// ABOUTME: Every route except the public ones sits behind the bearer-token middleware

pub mod error;
pub mod routes;
pub mod ws;

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::http::{HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::audit::AuditLog;
use crate::auth::{AuthMiddleware, DeviceStore, PairingManager};
use crate::monitor::Monitor;

pub use error::{ApiError, ApiResult};

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub monitor: Arc<Monitor>,
    pub pairing: Arc<PairingManager>,
    pub devices: Arc<DeviceStore>,
    pub audit: Arc<AuditLog>,
    /// Cancelled on server shutdown so open WebSocket streams end.
    pub shutdown: CancellationToken,
}

/// All routes behind authentication, with request tracing.
pub fn build_router(state: AppState, auth: Arc<AuthMiddleware>) -> Router {
    let routes = Router::new()
        .route("/healthz", get(routes::health_check))
        .route("/api/pair/initiate", post(routes::pair_initiate))
        .route("/api/pair/complete", post(routes::pair_complete))
        .route("/api/pair/status", get(routes::pair_status))
        .route(
            "/api/sessions",
            get(routes::list_sessions).post(routes::create_session),
        )
        .route(
            "/api/sessions/{name}",
            get(routes::get_session).delete(routes::kill_session),
        )
        .route("/api/sessions/{name}/send", post(routes::send_text))
        .route("/api/sessions/{name}/diff", post(routes::refresh_diff))
        .route("/api/devices", get(routes::list_devices))
        .route(
            "/api/devices/{id}",
            axum::routing::delete(routes::revoke_device),
        )
        .route("/ws", get(ws::ws_handler));

    auth.wrap(routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Router with CORS applied outside authentication so preflight requests
/// never need a token.
pub fn build_app(state: AppState, auth: Arc<AuthMiddleware>, allowed_origins: &[String]) -> Result<Router> {
    Ok(build_router(state, auth).layer(build_cors(allowed_origins)?))
}

pub fn build_cors(origins: &[String]) -> Result<CorsLayer> {
    let methods = [Method::GET, Method::POST, Method::DELETE, Method::OPTIONS];

    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        return Ok(CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(methods)
            .allow_headers(Any));
    }

    let mut headers = Vec::with_capacity(origins.len());
    for origin in origins {
        headers.push(
            HeaderValue::from_str(origin)
                .with_context(|| format!("invalid allowed origin: {origin}"))?,
        );
    }

    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(headers))
        .allow_methods(methods)
        .allow_headers(Any))
}
