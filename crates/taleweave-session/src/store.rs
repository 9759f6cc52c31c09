//! The credential store: persists the [`Session`] across restarts.
//!
//! The whole session is written as ONE record under one key:
//!
//! ```json
//! {"access": "...", "refresh": "...", "user": {"id": 1, "username": "alice", ...}}
//! ```
//!
//! Because the record is a single value, a save either lands completely or
//! not at all; there is no window where an access token is stored without
//! its refresh token.

use serde::{Deserialize, Serialize};
use taleweave_protocol::{TokenPair, UserSummary};

use crate::{Session, Storage, StorageError};

/// On-disk shape of a session record.
#[derive(Serialize, Deserialize)]
struct StoredSession {
    access: String,
    refresh: String,
    #[serde(default)]
    user: Option<UserSummary>,
}

/// Durable persistence of the current [`Session`].
pub struct CredentialStore {
    storage: Box<dyn Storage>,
    key: String,
}

impl CredentialStore {
    /// Creates a store that keeps its record under `key` in `storage`.
    pub fn new(storage: impl Storage, key: impl Into<String>) -> Self {
        Self {
            storage: Box::new(storage),
            key: key.into(),
        }
    }

    /// Writes the session, replacing whatever was stored.
    ///
    /// Saving an empty session is the same as [`clear`](Self::clear).
    ///
    /// # Errors
    /// Returns the backend's error; the previous record is then still in
    /// place.
    pub fn save(&self, session: &Session) -> Result<(), StorageError> {
        let Some(tokens) = session.tokens() else {
            return self.storage.remove(&self.key);
        };
        let record = StoredSession {
            access: tokens.access.clone(),
            refresh: tokens.refresh.clone(),
            user: session.user().cloned(),
        };
        let raw = serde_json::to_string(&record)?;
        self.storage.set(&self.key, &raw)
    }

    /// Returns the last saved session, or an empty one.
    ///
    /// Never fails. A record that does not parse, or that is missing a
    /// token, is removed so the next load starts clean.
    pub fn load(&self) -> Session {
        let raw = match self.storage.get(&self.key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Session::empty(),
            Err(e) => {
                tracing::warn!(key = %self.key, error = %e, "credential storage unreadable");
                return Session::empty();
            }
        };

        match serde_json::from_str::<StoredSession>(&raw) {
            Ok(record) if !record.access.is_empty() && !record.refresh.is_empty() => {
                Session::new(TokenPair::new(record.access, record.refresh), record.user)
            }
            Ok(_) => {
                tracing::warn!(key = %self.key, "stored session has an empty token, discarding");
                self.clear();
                Session::empty()
            }
            Err(e) => {
                tracing::warn!(key = %self.key, error = %e, "stored session is corrupt, discarding");
                self.clear();
                Session::empty()
            }
        }
    }

    /// Removes the stored session. Idempotent and never fails; a backend
    /// error is logged.
    pub fn clear(&self) {
        if let Err(e) = self.storage.remove(&self.key) {
            tracing::warn!(key = %self.key, error = %e, "failed to clear stored session");
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}
