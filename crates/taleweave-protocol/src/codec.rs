//! Codec trait and implementations for request and response bodies.
//!
//! The backend speaks JSON today, but nothing above this module depends on
//! that: the session layer asks a [`Codec`] to turn a `Credentials` into
//! bytes and a response body into a `TokenPair`, and never names
//! `serde_json` itself.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// Encodes request bodies and decodes response bodies.
///
/// - `Send + Sync + 'static` → one codec value is shared by every task
///   that talks to the API.
/// - `decode` requires `DeserializeOwned` because response buffers are
///   dropped as soon as the body has been decoded.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into a request body.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes a response body.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed or do not
    /// match the expected type.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that uses JSON (via `serde_json`), matching the REST backend.
///
/// ## Example
///
/// ```rust
/// use taleweave_protocol::{Codec, Credentials, JsonCodec, TokenPair};
///
/// let codec = JsonCodec;
///
/// let body = codec.encode(&Credentials::new("alice", "secret")).unwrap();
/// assert_eq!(body, br#"{"username":"alice","password":"secret"}"#);
///
/// let tokens: TokenPair = codec
///     .decode(br#"{"access":"A1","refresh":"R1"}"#)
///     .unwrap();
/// assert_eq!(tokens.access, "A1");
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}
