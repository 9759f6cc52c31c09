//! Error types for the protocol layer.
//!
//! A `ProtocolError` means the bytes were there but did not have the shape
//! the API contract promises. Network trouble lives in `TransportError`,
//! and "the server said no" is an HTTP status handled by the session layer.

/// Errors that can occur while encoding requests or decoding responses.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization of a request body failed.
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// A response body was malformed, truncated, or missing required fields.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The body decoded but violates the contract, e.g. an empty token.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
