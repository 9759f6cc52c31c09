//! Paths of the authentication endpoints, relative to the API base URL.
//!
//! All other endpoints are opaque to the session layer; they only need the
//! bearer credential attached.

/// `POST {username, password}` → `{access, refresh}`.
pub const TOKEN: &str = "/auth/token/";

/// `POST {username, email, password}` → `{user, tokens?}`.
pub const REGISTER: &str = "/auth/register/";

/// `POST {refresh}` → `{access}`. The only endpoint that ever receives the
/// refresh token.
pub const TOKEN_REFRESH: &str = "/auth/token/refresh/";

/// `GET` → the authoritative current user. Requires the bearer credential.
pub const CURRENT_USER: &str = "/auth/user/";

/// Alternative current-user endpoint exposed by some backend variants.
pub const PROFILE: &str = "/profile/";
