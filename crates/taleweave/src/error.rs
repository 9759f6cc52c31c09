//! Unified error type for the Taleweave client.

use taleweave_protocol::ProtocolError;
use taleweave_session::{SessionError, StorageError};
use taleweave_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// When using the `taleweave` meta-crate, you deal with this single
/// error type instead of importing errors from each sub-crate.
/// The `#[from]` attribute on each variant auto-generates `From` impls,
/// so the `?` operator converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum TaleweaveError {
    /// A transport-level error (bad base URL, connection, timeout).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, invalid message).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A session-level error (credentials, expiry, HTTP status).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A credential storage error.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl TaleweaveError {
    /// `true` when the host should show its login view.
    pub fn requires_login(&self) -> bool {
        matches!(self, TaleweaveError::Session(e) if e.requires_login())
    }

    /// The HTTP status of a pass-through API error.
    pub fn status(&self) -> Option<u16> {
        match self {
            TaleweaveError::Session(e) => e.status(),
            _ => None,
        }
    }
}
