// ABOUTME: Device trust layer: pairing codes, durable device tokens, and request authentication

pub mod admin;
pub mod middleware;
pub mod pairing;
pub mod store;
pub mod token;

use thiserror::Error;

pub use admin::load_or_create_admin_token;
pub use middleware::{AuthMiddleware, Principal, DEFAULT_TOUCH_DEBOUNCE, PUBLIC_PATHS};
pub use pairing::{PairingError, PairingManager, PairingStatus, PairingTicket, DEFAULT_PAIRING_TTL};
pub use store::{DeviceStore, StoreError};

/// Why a request was not authenticated. The messages are part of the API:
/// clients use them to tell a forgotten token from a revoked one.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    #[error("missing token")]
    MissingToken,
    #[error("invalid token")]
    InvalidToken,
}
