//! Errors surfaced to session consumers.

use thiserror::Error;

use crate::wire::DecodeError;

/// Default message when the server sends `error` without one.
pub const DEFAULT_ERROR_MESSAGE: &str = "unknown error";

/// Session-level failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    /// The server sent an `error` envelope.
    #[error("{message}")]
    Remote { message: String },
    /// The connection could not be opened or broke.
    #[error("connection failed: {0}")]
    Transport(String),
    /// The server rejected our credentials (redirect, 401 or 403).
    #[error("session expired (HTTP {status})")]
    SessionExpired { status: u16 },
    /// A binary payload could not be decoded.
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

impl StreamError {
    /// Build a remote error, supplying the default when the server sent none.
    #[must_use]
    pub fn remote(message: Option<String>) -> Self {
        Self::Remote {
            message: message.unwrap_or_else(|| DEFAULT_ERROR_MESSAGE.to_owned()),
        }
    }

    /// Classify an HTTP status seen during a handshake or API call.
    ///
    /// Returns `Some(SessionExpired)` for redirects, 401 and 403.
    #[must_use]
    pub fn from_http_status(status: u16) -> Option<Self> {
        is_auth_rejection(status).then_some(Self::SessionExpired { status })
    }

    /// Whether no further protocol operation can succeed.
    #[must_use]
    pub const fn is_session_expired(&self) -> bool {
        matches!(self, Self::SessionExpired { .. })
    }
}

/// Redirects and auth failures mean the session token is no longer valid.
#[must_use]
pub const fn is_auth_rejection(status: u16) -> bool {
    matches!(status, 300..=399 | 401 | 403)
}
