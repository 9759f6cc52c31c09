//! Wire types for the authentication endpoints of the REST backend.
//!
//! Every struct here mirrors a JSON body exactly as the backend sends or
//! expects it. Field names are the wire names; nothing is renamed.
//!
//! Types that carry secrets (passwords, tokens) implement `Debug` by hand
//! so that logging a value never prints the secret.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::IgnoredAny;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// The backend's numeric primary key for a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub u64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "user-{}", self.0)
    }
}

/// A cached projection of the authenticated user.
///
/// Returned by the current-user endpoint and embedded in registration
/// responses. Unknown fields (follower counts, bio, avatar...) are ignored,
/// so both `/auth/user/` and `/profile/` decode into this type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: UserId,
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
}

impl UserSummary {
    pub fn new(
        id: u64,
        username: impl Into<String>,
        email: impl Into<String>,
    ) -> Self {
        Self {
            id: UserId(id),
            username: username.into(),
            email: email.into(),
            display_name: None,
            first_name: None,
            last_name: None,
        }
    }

    /// The name to show in the UI.
    ///
    /// Prefers an explicit display name, then "first last", then the
    /// username. The backend sends empty strings for unset names, so blank
    /// values are skipped.
    pub fn display_name(&self) -> String {
        if let Some(name) = non_blank(self.display_name.as_deref()) {
            return name.to_string();
        }
        let full: Vec<&str> = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .filter_map(non_blank)
            .collect();
        if full.is_empty() {
            self.username.clone()
        } else {
            full.join(" ")
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

// ---------------------------------------------------------------------------
// Request bodies
// ---------------------------------------------------------------------------

/// Body of `POST /auth/token/`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Body of `POST /auth/register/`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    pub username: String,
    pub email: String,
    pub password: String,
}

impl Registration {
    pub fn new(
        username: impl Into<String>,
        email: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            email: email.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("username", &self.username)
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Body of `POST /auth/token/refresh/`. The only body that ever carries the
/// refresh token.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshRequest {
    pub refresh: String,
}

impl fmt::Debug for RefreshRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshRequest")
            .field("refresh", &"<redacted>")
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Response bodies
// ---------------------------------------------------------------------------

/// An access/refresh token pair, as returned by `POST /auth/token/` and
/// nested under `tokens` in the registration response.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

impl TokenPair {
    pub fn new(access: impl Into<String>, refresh: impl Into<String>) -> Self {
        Self {
            access: access.into(),
            refresh: refresh.into(),
        }
    }

    /// `true` when both tokens are non-empty.
    pub fn is_complete(&self) -> bool {
        !self.access.is_empty() && !self.refresh.is_empty()
    }
}

impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenPair")
            .field("access", &"<redacted>")
            .field("refresh", &"<redacted>")
            .finish()
    }
}

/// Response of `POST /auth/token/refresh/`.
///
/// Backends that rotate refresh tokens also return a new `refresh`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken {
    pub access: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh: Option<String>,
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("access", &"<redacted>")
            .field("rotated_refresh", &self.refresh.is_some())
            .finish()
    }
}

/// Response of `POST /auth/register/`.
///
/// Both halves are optional: some backend variants log the new account in
/// (`tokens` present), others only echo the created user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterResponse {
    #[serde(default)]
    pub user: Option<UserSummary>,
    #[serde(default)]
    pub tokens: Option<TokenPair>,
}

// ---------------------------------------------------------------------------
// Error bodies
// ---------------------------------------------------------------------------

/// Per-field validation messages, keyed by field name.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

/// The body of a 4xx response.
///
/// The backend answers either with `{"detail": "..."}` or with a map of
/// field name to messages (`{"username": ["already exists"]}`). Values of
/// any other shape are skipped, and so are `detail`, `message`, `code` and
/// `error`, which describe the error as a whole. `message` stands in for a missing
/// `detail`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "RawErrorBody")]
pub struct ApiErrorBody {
    pub detail: Option<String>,
    pub fields: FieldErrors,
}

impl ApiErrorBody {
    /// Returns `detail`, or the first field message if there is no detail.
    pub fn message(&self) -> Option<&str> {
        self.detail.as_deref().or_else(|| {
            self.fields
                .values()
                .flat_map(|msgs| msgs.iter())
                .map(String::as_str)
                .next()
        })
    }
}

/// Top-level keys that are never form fields.
const NON_FIELD_KEYS: &[&str] = &["detail", "message", "code", "error"];

#[derive(Deserialize)]
struct RawErrorBody {
    #[serde(default)]
    detail: Option<String>,
    #[serde(flatten)]
    rest: BTreeMap<String, RawFieldMessages>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawFieldMessages {
    Many(Vec<String>),
    One(String),
    Other(IgnoredAny),
}

impl From<RawErrorBody> for ApiErrorBody {
    fn from(mut raw: RawErrorBody) -> Self {
        let message = match raw.rest.remove("message") {
            Some(RawFieldMessages::One(msg)) => Some(msg),
            _ => None,
        };
        let fields = raw
            .rest
            .into_iter()
            .filter(|(key, _)| !NON_FIELD_KEYS.contains(&key.as_str()))
            .filter_map(|(field, msgs)| match msgs {
                RawFieldMessages::Many(list) if !list.is_empty() => {
                    Some((field, list))
                }
                RawFieldMessages::One(msg) => Some((field, vec![msg])),
                _ => None,
            })
            .collect();
        Self {
            detail: raw.detail.or(message),
            fields,
        }
    }
}
