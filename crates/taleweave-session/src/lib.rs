//! Client session management for Taleweave.
//!
//! This crate keeps track of who is logged in and makes sure every API
//! call carries their credential:
//!
//! 1. **Credential storage** — the session survives restarts
//!    ([`CredentialStore`] over a pluggable [`Storage`] backend)
//! 2. **Lifecycle** — login, registration, refresh, logout
//!    ([`SessionLifecycle`])
//! 3. **Authenticated requests** — bearer credential on every call and a
//!    single transparent retry after an expired access token
//!    ([`RequestPipeline`])
//!
//! # How it fits in the stack
//!
//! ```text
//! Domain API wrappers (above)  ← stories, chapters, votes, profiles
//!     ↕
//! Session Layer (this crate)   ← tokens, current user, refresh-on-401
//!     ↕
//! Protocol + Transport (below) ← typed bodies, HTTP exchanges
//! ```

mod error;
mod lifecycle;
mod pipeline;
mod session;
mod storage;
mod store;

pub use error::{SessionError, StorageError};
pub use lifecycle::SessionLifecycle;
pub use pipeline::RequestPipeline;
pub use session::{
    AuthState, LogoutReason, RegisterOutcome, Session, SessionConfig,
    SessionEvent,
};
pub use storage::{FileStorage, MemoryStorage, Storage};
pub use store::CredentialStore;
