//! # Taleweave
//!
//! Client for the Taleweave collaborative storytelling platform.
//!
//! Taleweave keeps a user logged in across restarts and makes every API
//! call on their behalf: it stores the token pair, attaches the access
//! token to each request, and swaps in a fresh one when the server says
//! it has expired. Callers only ever see the final outcome.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use taleweave::prelude::*;
//!
//! # async fn run() -> Result<(), TaleweaveError> {
//! let client = TaleweaveClient::builder()
//!     .base_url("http://localhost:8000/api")
//!     .build()?;
//!
//! client.login("alice", "secret").await?;
//! let stories = client.stories().list(&[("search", "dragons")]).await?;
//! println!("{} stories", stories.len());
//! client.logout();
//! # Ok(())
//! # }
//! ```

mod api;
mod client;
mod error;

pub use api::{Chapters, DecisionPoints, Profiles, Stories};
pub use client::{
    ClientConfig, DEFAULT_BASE_URL, Pipeline, TaleweaveClient, TaleweaveClientBuilder,
};
pub use error::TaleweaveError;

pub use taleweave_protocol as protocol;
pub use taleweave_session as session;
pub use taleweave_transport as transport;

/// Everything needed for typical use, in one import.
pub mod prelude {
    pub use crate::{ClientConfig, TaleweaveClient, TaleweaveError};
    pub use taleweave_protocol::{UserId, UserSummary};
    pub use taleweave_session::{
        AuthState, FileStorage, LogoutReason, MemoryStorage, RegisterOutcome,
        Session, SessionConfig, SessionError, SessionEvent, Storage,
    };
}
