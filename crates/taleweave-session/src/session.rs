//! Session types: what the client knows about who is logged in.
//!
//! A [`Session`] is the pair of tokens the backend issued plus a cached copy
//! of the user they belong to. The tokens are the only source of truth for
//! "is someone logged in"; the cached user is a convenience for rendering
//! before the server has confirmed anything.

use std::fmt;

use taleweave_protocol::{TokenPair, UserSummary, endpoints};

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

/// Configuration for session behavior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Key the session record is persisted under.
    ///
    /// Default: `"taleweave.session"`.
    pub storage_key: String,

    /// Endpoint that returns the authoritative current user.
    ///
    /// Default: `/auth/user/`. Some backend variants only expose `/profile/`.
    pub current_user_path: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            storage_key: "taleweave.session".to_string(),
            current_user_path: endpoints::CURRENT_USER.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// AuthState
// ---------------------------------------------------------------------------

/// Where the session lifecycle currently is.
///
/// ```text
///   Unauthenticated ──(login/register)──→ Authenticating ──ok──→ Authenticated
///         ↑                                     │                   │    ↑
///         └───────────────fail──────────────────┘          (refresh)│    │ok
///         ↑                                                         ▼    │
///         └────────────(logout / refresh rejected)────────────── Refreshing
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthState {
    Unauthenticated,
    Authenticating,
    Authenticated,
    Refreshing,
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// The client's view of the current login.
///
/// The tokens live together in one `Option<TokenPair>`, so a session can
/// never hold an access token without its refresh token.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Session {
    tokens: Option<TokenPair>,
    user: Option<UserSummary>,
}

impl Session {
    /// A session with nobody logged in.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new(tokens: TokenPair, user: Option<UserSummary>) -> Self {
        Self {
            tokens: Some(tokens),
            user,
        }
    }

    /// `true` when an access token is present.
    pub fn is_authenticated(&self) -> bool {
        self.tokens.is_some()
    }

    pub fn access_token(&self) -> Option<&str> {
        self.tokens.as_ref().map(|t| t.access.as_str())
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.tokens.as_ref().map(|t| t.refresh.as_str())
    }

    pub fn tokens(&self) -> Option<&TokenPair> {
        self.tokens.as_ref()
    }

    /// The cached user, but only while a token is present.
    pub fn user(&self) -> Option<&UserSummary> {
        if self.is_authenticated() {
            self.user.as_ref()
        } else {
            None
        }
    }

    /// Swaps in a refreshed access token (and a rotated refresh token, if
    /// the backend issued one). No-op on an empty session.
    pub(crate) fn rotate(&mut self, access: String, refresh: Option<String>) {
        if let Some(tokens) = self.tokens.as_mut() {
            tokens.access = access;
            if let Some(refresh) = refresh {
                tokens.refresh = refresh;
            }
        }
    }

    pub(crate) fn set_user(&mut self, user: UserSummary) {
        self.user = Some(user);
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("authenticated", &self.is_authenticated())
            .field("user", &self.user.as_ref().map(|u| &u.username))
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Outcomes and events
// ---------------------------------------------------------------------------

/// Result of a successful registration.
///
/// Some backends log the new account in straight away; others expect a
/// separate login. Callers must handle both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegisterOutcome {
    /// Tokens came back; the session is saved and the state is
    /// `Authenticated`.
    SignedIn(Session),

    /// The account exists but nobody is logged in yet.
    AccountCreated(Option<UserSummary>),
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogoutReason {
    /// The user asked to log out.
    UserRequested,
    /// The refresh token was missing or rejected.
    SessionExpired,
}

/// Notifications for UI that depends on the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    LoggedIn { username: String },
    Registered { username: String, signed_in: bool },
    Refreshed,
    UserUpdated,
    LoggedOut { reason: LogoutReason },
    /// The host should navigate to its login view.
    LoginRequired,
}
