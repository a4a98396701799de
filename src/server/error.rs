// ABOUTME: API error type mapping domain errors onto HTTP statuses and `{error, message}` bodies

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::error;

use crate::auth::{AuthError, PairingError, StoreError};
use crate::monitor::MonitorError;
use crate::tmux::SourceError;

pub type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Debug)]
pub enum ApiError {
    Unauthorized(AuthError),
    Pairing(PairingError),
    Forbidden(&'static str),
    NotFound(String),
    Conflict(String),
    BadRequest(String),
    Internal(String),
}

#[derive(Debug, Serialize)]
struct ApiErrorBody<'a> {
    error: &'a str,
    message: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Pairing(PairingError::InvalidCode) | ApiError::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Pairing(PairingError::CodeExpired) => StatusCode::GONE,
            ApiError::Pairing(PairingError::CodeUsed) | ApiError::Conflict(_) => {
                StatusCode::CONFLICT
            }
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::Unauthorized(_) => "unauthorized",
            ApiError::Pairing(e) => e.kind(),
            ApiError::Forbidden(_) => "forbidden",
            ApiError::NotFound(_) => "not_found",
            ApiError::Conflict(_) => "conflict",
            ApiError::BadRequest(_) => "bad_request",
            ApiError::Internal(_) => "internal",
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::Unauthorized(e) => e.to_string(),
            ApiError::Pairing(e) => e.to_string(),
            ApiError::Forbidden(msg) => (*msg).to_string(),
            ApiError::NotFound(msg)
            | ApiError::Conflict(msg)
            | ApiError::BadRequest(msg)
            | ApiError::Internal(msg) => msg.clone(),
        }
    }

    pub fn internal(e: impl std::fmt::Display) -> Self {
        ApiError::Internal(e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self.message(), "Request failed");
        }

        (
            status,
            Json(ApiErrorBody {
                error: self.kind(),
                message: self.message(),
            }),
        )
            .into_response()
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        ApiError::Unauthorized(e)
    }
}

impl From<PairingError> for ApiError {
    fn from(e: PairingError) -> Self {
        ApiError::Pairing(e)
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => ApiError::NotFound(format!("device not found: {id}")),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<SourceError> for ApiError {
    fn from(e: SourceError) -> Self {
        match e {
            SourceError::AlreadyExists(_) => ApiError::Conflict(e.to_string()),
            SourceError::InvalidInput(_) => ApiError::BadRequest(e.to_string()),
            SourceError::PaneNotFound { .. } => ApiError::NotFound(e.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<MonitorError> for ApiError {
    fn from(e: MonitorError) -> Self {
        match e {
            MonitorError::SessionNotFound(_) | MonitorError::PaneNotFound { .. } => {
                ApiError::NotFound(e.to_string())
            }
            MonitorError::NotAGitRepo(_) => ApiError::BadRequest(e.to_string()),
            MonitorError::Source(source) => source.into(),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(e: tokio::task::JoinError) -> Self {
        ApiError::internal(e)
    }
}
