//! Error types for the session layer.

use taleweave_protocol::{FieldErrors, ProtocolError};
use taleweave_transport::TransportError;

/// Errors surfaced by login, registration, refresh, and authenticated
/// requests.
///
/// Only [`SessionExpired`](Self::SessionExpired) is terminal: by the time
/// a caller sees it the stored session has already been cleared and the
/// host should send the user to a login view. Everything else is
/// recoverable by retrying or by asking the user to fix their input.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The server rejected the username/password (or the registration) with
    /// a message meant for the user.
    #[error("{0}")]
    InvalidCredentials(String),

    /// Registration failed validation; one or more messages per field.
    #[error("validation failed on {} field(s)", .0.len())]
    Validation(FieldErrors),

    /// The access token expired and the refresh token was missing, expired,
    /// or rejected. The session has been cleared.
    #[error("session expired, please log in again")]
    SessionExpired,

    /// The request never got a response.
    #[error("network error: {0}")]
    Network(#[from] TransportError),

    /// A credential was required but none is stored.
    #[error("not authenticated")]
    Unauthenticated,

    /// Any other HTTP error status, passed through unmodified.
    #[error("api error: HTTP {status}")]
    Api { status: u16, body: Vec<u8> },

    /// A success response whose body did not match the API contract.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The credential store could not persist the session.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl SessionError {
    /// `true` when the caller cannot recover without a fresh login.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionError::SessionExpired)
    }

    /// `true` when the host should show a login view.
    pub fn requires_login(&self) -> bool {
        matches!(
            self,
            SessionError::SessionExpired | SessionError::Unauthenticated
        )
    }

    /// The HTTP status for pass-through API errors.
    pub fn status(&self) -> Option<u16> {
        match self {
            SessionError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Errors from a [`Storage`](crate::Storage) backend.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Reading or writing the backing medium failed.
    #[error("storage i/o failed: {0}")]
    Io(#[from] std::io::Error),

    /// The key cannot be used by this backend (e.g. not a safe file name).
    #[error("invalid storage key: {0:?}")]
    InvalidKey(String),

    /// The session could not be serialized.
    #[error("session encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}
