//! Wire protocol for the Taleweave REST API.
//!
//! This crate defines what travels over HTTP between the client and the
//! storytelling backend:
//!
//! - **Types** ([`Credentials`], [`TokenPair`], [`UserSummary`], ...) —
//!   the JSON bodies of the authentication endpoints.
//! - **Endpoints** ([`endpoints`]) — the paths those bodies are sent to.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]) — how bodies are turned
//!   into bytes and back.
//! - **Errors** ([`ProtocolError`]) — what can go wrong while doing so.
//!
//! ```text
//! Transport (bytes) → Protocol (typed bodies) → Session (tokens, user)
//! ```

mod codec;
pub mod endpoints;
mod error;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use types::{
    AccessToken, ApiErrorBody, Credentials, FieldErrors, RefreshRequest,
    RegisterResponse, Registration, TokenPair, UserId, UserSummary,
};
