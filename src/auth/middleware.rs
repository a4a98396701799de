// ABOUTME: Bearer-token authentication wrapped around the whole HTTP router
//
// Validation order: the static admin token first, then the device store.
// A device hit also touches `last_seen`, at most once per token per
// debounce window, so an actively polling client does not cost a disk
// write on every request.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use axum::extract::{Query, Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::Router;
use chrono::Utc;
use serde::Deserialize;
use tracing::{debug, error, warn};

use super::store::DeviceStore;
use super::token::{constant_time_eq, redact};
use super::AuthError;
use crate::server::ApiError;

pub const DEFAULT_TOUCH_DEBOUNCE: Duration = Duration::from_secs(60);

/// Paths reachable without a token: liveness, and the only way an
/// unauthenticated device can become authenticated.
pub const PUBLIC_PATHS: &[&str] = &["/healthz", "/api/pair/complete"];

// Prune the touch map past this many tokens
const TOUCH_MAP_PRUNE_AT: usize = 256;

/// Who made an authenticated request. Inserted into request extensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Principal {
    Admin,
    Device { id: String, name: String },
}

impl Principal {
    pub fn is_admin(&self) -> bool {
        matches!(self, Principal::Admin)
    }

    /// Short label for logs and audit entries.
    pub fn label(&self) -> String {
        match self {
            Principal::Admin => "admin".to_string(),
            Principal::Device { id, .. } => format!("device:{id}"),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

pub struct AuthMiddleware {
    admin_token: String,
    store: Arc<DeviceStore>,
    debounce: Duration,
    last_touch: Mutex<HashMap<String, Instant>>,
}

impl AuthMiddleware {
    pub fn new(admin_token: impl Into<String>, store: Arc<DeviceStore>, debounce: Duration) -> Self {
        Self {
            admin_token: admin_token.into(),
            store,
            debounce,
            last_touch: Mutex::new(HashMap::new()),
        }
    }

    /// Validate a bearer token. Reads the device store from disk, so call
    /// it off the async executor.
    pub fn authenticate(&self, token: Option<&str>) -> Result<Principal, AuthError> {
        let token = token.filter(|t| !t.is_empty()).ok_or(AuthError::MissingToken)?;

        if constant_time_eq(token, &self.admin_token) {
            return Ok(Principal::Admin);
        }

        let Some(device) = self.store.find_by_token(token) else {
            debug!(token = %redact(token), "Rejected unknown token");
            return Err(AuthError::InvalidToken);
        };
        self.touch(token, &device.id);

        Ok(Principal::Device {
            id: device.id,
            name: device.name,
        })
    }

    fn touch(&self, token: &str, device_id: &str) {
        let now = Instant::now();
        {
            let mut last_touch = self.last_touch.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(previous) = last_touch.get(token) {
                if now.duration_since(*previous) < self.debounce {
                    return;
                }
            }
            if last_touch.len() >= TOUCH_MAP_PRUNE_AT {
                let debounce = self.debounce;
                last_touch.retain(|_, at| now.duration_since(*at) < debounce);
            }
            last_touch.insert(token.to_string(), now);
        }

        match self.store.update_last_seen(token, Utc::now()) {
            Ok(true) => debug!(device_id, "Touched device last seen"),
            Ok(false) => debug!(device_id, "Device vanished before last seen touch"),
            Err(e) => warn!(device_id, error = %e, "Failed to record device last seen"),
        }
    }

    /// Put every route of `router` behind authentication, except
    /// [`PUBLIC_PATHS`].
    pub fn wrap<S>(self: Arc<Self>, router: Router<S>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        router.layer(middleware::from_fn_with_state(self, require_auth))
    }
}

/// Token from `Authorization: Bearer`, falling back to a `token` query
/// parameter for clients (browser WebSockets) that cannot set headers.
pub fn extract_token(request: &Request) -> Option<String> {
    let from_header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(ToString::to_string);

    from_header.or_else(|| {
        Query::<TokenQuery>::try_from_uri(request.uri())
            .ok()
            .and_then(|Query(query)| query.token)
            .filter(|token| !token.is_empty())
    })
}

async fn require_auth(
    State(auth): State<Arc<AuthMiddleware>>,
    mut request: Request,
    next: Next,
) -> Response {
    if PUBLIC_PATHS.contains(&request.uri().path()) {
        return next.run(request).await;
    }

    let token = extract_token(&request);
    let result = tokio::task::spawn_blocking(move || auth.authenticate(token.as_deref())).await;

    match result {
        Ok(Ok(principal)) => {
            request.extensions_mut().insert(principal);
            next.run(request).await
        }
        Ok(Err(e)) => {
            debug!(path = %request.uri().path(), error = %e, "Rejected request");
            ApiError::from(e).into_response()
        }
        Err(e) => {
            error!(error = %e, "Authentication task failed");
            ApiError::Internal("authentication failed".to_string()).into_response()
        }
    }
}
