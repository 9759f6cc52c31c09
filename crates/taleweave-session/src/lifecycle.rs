//! The session lifecycle: the only code allowed to change who is logged in.
//!
//! It owns the transitions between [`AuthState`]s and keeps the
//! [`CredentialStore`] in step with them:
//!
//! - `login` / `register` — exchange credentials for tokens and save them
//! - `refresh` — trade the refresh token for a new access token
//! - `logout` — forget everything, synchronously, without failing
//! - `restore` — pick up a session saved by an earlier run
//!
//! # Concurrency note
//!
//! The lifecycle is shared behind an `Arc` by every task that makes API
//! calls. Login, registration and refresh are serialized by an async
//! "transition" lock, so two of them never overlap. Every
//! read-modify-write of the store happens under a short synchronous lock
//! that is never held across an `.await`.
//!
//! Requests that got a 401 for the same access token share one refresh.
//! When it succeeds they pick up the new token; when it fails without
//! ending the session they get the same error, and no request asks the
//! server again until a request sent after that failure is rejected.
//! A logout during a pending login or registration wins: the new tokens
//! are discarded.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use taleweave_protocol::{
    AccessToken, ApiErrorBody, Codec, Credentials, ProtocolError,
    RefreshRequest, RegisterResponse, Registration, TokenPair, UserSummary,
    endpoints,
};
use taleweave_transport::{
    ApiRequest, ApiResponse, HttpTransport, TransportError,
};
use tokio::sync::{broadcast, watch};

use crate::{
    AuthState, CredentialStore, LogoutReason, RegisterOutcome, Session,
    SessionConfig, SessionError, SessionEvent, StorageError,
};

/// How many undelivered events a slow subscriber may fall behind by.
const EVENT_CAPACITY: usize = 32;

/// Coordinates login, registration, refresh and logout.
///
/// ## Lifecycle
///
/// ```text
/// restore() ──→ [Authenticated | Unauthenticated]
///
/// login()/register() ──→ [Authenticating] ──ok──→ [Authenticated]
///                               │
///                               └──fail──→ (state implied by the store)
///
/// refresh() ──→ [Refreshing] ──ok──→ [Authenticated]
///                    │
///                    └──rejected──→ [Unauthenticated] + LoginRequired
///
/// logout() ──→ [Unauthenticated]
/// ```
pub struct SessionLifecycle<T, C> {
    transport: Arc<T>,
    codec: C,
    store: CredentialStore,
    config: SessionConfig,
    state: watch::Sender<AuthState>,
    events: broadcast::Sender<SessionEvent>,
    transition: tokio::sync::Mutex<()>,
    store_guard: Mutex<()>,
    /// Bumped on every ended session; guarded by `store_guard`.
    logouts: AtomicU64,
    /// Completed refresh attempts.
    refresh_epoch: AtomicU64,
    /// The access token the last refresh was for, if that refresh failed
    /// and the session survived.
    last_failure: Mutex<Option<(String, FailedRefresh)>>,
}

impl<T: HttpTransport, C: Codec> SessionLifecycle<T, C> {
    /// Creates a lifecycle in the `Unauthenticated` state.
    ///
    /// Call [`restore`](Self::restore) to pick up a stored session.
    pub fn new(
        transport: Arc<T>,
        codec: C,
        store: CredentialStore,
        config: SessionConfig,
    ) -> Self {
        let (state, _) = watch::channel(AuthState::Unauthenticated);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            transport,
            codec,
            store,
            config,
            state,
            events,
            transition: tokio::sync::Mutex::new(()),
            store_guard: Mutex::new(()),
            logouts: AtomicU64::new(0),
            refresh_epoch: AtomicU64::new(0),
            last_failure: Mutex::new(None),
        }
    }

    // =====================================================================
    // Transitions
    // =====================================================================

    /// Loads the stored session and sets the state from it.
    ///
    /// A stored token makes the state `Authenticated` right away, using the
    /// cached user; verifying with the server is a separate step.
    pub fn restore(&self) -> AuthState {
        let session = self.store.load();
        let state = if session.is_authenticated() {
            tracing::info!(
                user = session.user().map(|u| u.username.as_str()),
                "restored stored session"
            );
            AuthState::Authenticated
        } else {
            AuthState::Unauthenticated
        };
        self.state.send_replace(state);
        state
    }

    /// Exchanges a username and password for tokens.
    ///
    /// On success the new session is saved and the state is
    /// `Authenticated`. On failure nothing is saved.
    ///
    /// # Errors
    /// - [`SessionError::InvalidCredentials`] — rejected, with the server's
    ///   message or a generic one
    /// - [`SessionError::Network`] — no response
    /// - [`SessionError::Unauthenticated`] — [`logout`](Self::logout) was
    ///   called while the login was pending
    pub async fn login(
        &self,
        credentials: &Credentials,
    ) -> Result<Session, SessionError> {
        let _transition = self.transition.lock().await;
        let generation = self.logouts.load(Ordering::Acquire);
        self.state.send_replace(AuthState::Authenticating);

        match self.try_login(credentials, generation).await {
            Ok(session) => {
                self.state.send_replace(AuthState::Authenticated);
                let _ = self.events.send(SessionEvent::LoggedIn {
                    username: credentials.username.clone(),
                });
                tracing::info!(username = %credentials.username, "logged in");
                Ok(session)
            }
            Err(e) => {
                self.settle();
                tracing::warn!(username = %credentials.username, error = %e, "login failed");
                Err(e)
            }
        }
    }

    async fn try_login(
        &self,
        credentials: &Credentials,
        generation: u64,
    ) -> Result<Session, SessionError> {
        let body = self.codec.encode(credentials)?;
        let request = ApiRequest::post(endpoints::TOKEN).with_body(body);
        let response = self.transport.send(&request).await?;
        if !response.is_success() {
            return Err(self.rejection(&response, "login failed"));
        }

        let tokens: TokenPair = self.codec.decode(&response.body)?;
        if !tokens.is_complete() {
            return Err(ProtocolError::InvalidMessage(
                "token response is missing a token".into(),
            )
            .into());
        }

        let session = Session::new(tokens, None);
        self.save_unless_logged_out(&session, generation)?;
        Ok(session)
    }

    /// Creates an account.
    ///
    /// Returns [`RegisterOutcome::SignedIn`] when the backend logged the new
    /// account in, [`RegisterOutcome::AccountCreated`] when a separate
    /// login is still needed.
    ///
    /// # Errors
    /// - [`SessionError::Validation`] — per-field problems (username taken...)
    /// - [`SessionError::InvalidCredentials`] — any other rejection
    /// - [`SessionError::Network`] — no response
    pub async fn register(
        &self,
        registration: &Registration,
    ) -> Result<RegisterOutcome, SessionError> {
        let _transition = self.transition.lock().await;
        let generation = self.logouts.load(Ordering::Acquire);
        self.state.send_replace(AuthState::Authenticating);

        let result = self.try_register(registration, generation).await;
        match &result {
            Ok(RegisterOutcome::SignedIn(_)) => {
                self.state.send_replace(AuthState::Authenticated);
            }
            Ok(RegisterOutcome::AccountCreated(_)) | Err(_) => {
                self.settle();
            }
        }

        match &result {
            Ok(outcome) => {
                let signed_in = matches!(outcome, RegisterOutcome::SignedIn(_));
                let _ = self.events.send(SessionEvent::Registered {
                    username: registration.username.clone(),
                    signed_in,
                });
                tracing::info!(username = %registration.username, signed_in, "registered");
            }
            Err(e) => {
                tracing::warn!(username = %registration.username, error = %e, "registration failed");
            }
        }
        result
    }

    async fn try_register(
        &self,
        registration: &Registration,
        generation: u64,
    ) -> Result<RegisterOutcome, SessionError> {
        let body = self.codec.encode(registration)?;
        let request = ApiRequest::post(endpoints::REGISTER).with_body(body);
        let response = self.transport.send(&request).await?;

        if !response.is_success() {
            if response.status == 400 {
                let body: ApiErrorBody =
                    self.codec.decode(&response.body).unwrap_or_default();
                if !body.fields.is_empty() {
                    return Err(SessionError::Validation(body.fields));
                }
            }
            return Err(self.rejection(&response, "registration failed"));
        }

        if response.body.is_empty() {
            return Ok(RegisterOutcome::AccountCreated(None));
        }
        let created: RegisterResponse = self.codec.decode(&response.body)?;
        match created.tokens {
            Some(tokens) if tokens.is_complete() => {
                let session = Session::new(tokens, created.user);
                self.save_unless_logged_out(&session, generation)?;
                Ok(RegisterOutcome::SignedIn(session))
            }
            _ => Ok(RegisterOutcome::AccountCreated(created.user)),
        }
    }

    /// Ends the session: clears the store and notifies subscribers.
    ///
    /// Synchronous and infallible.
    pub fn logout(&self) {
        self.end_session(LogoutReason::UserRequested);
    }

    /// Trades the stored refresh token for a new access token.
    ///
    /// # Errors
    /// - [`SessionError::SessionExpired`] — the server rejected the refresh
    ///   token; the session has been cleared
    /// - [`SessionError::Unauthenticated`] — nothing stored to refresh
    /// - [`SessionError::Network`] — no response; the session is kept
    pub async fn refresh(&self) -> Result<String, SessionError> {
        let _transition = self.transition.lock().await;
        self.attempt_refresh().await
    }

    /// Marks the point a request was sent, for
    /// [`refresh_rejected`](Self::refresh_rejected).
    pub(crate) fn refresh_epoch(&self) -> u64 {
        self.refresh_epoch.load(Ordering::Acquire)
    }

    /// Refresh on behalf of a request whose `rejected` token got a 401.
    /// `sent_at` is the [`refresh_epoch`](Self::refresh_epoch) read before
    /// the request was sent.
    ///
    /// If another request already replaced that token while this one was
    /// waiting for the transition lock, the replacement is returned. If a
    /// refresh of that token failed after this request was sent, its error
    /// is returned. Neither case makes a second refresh call.
    pub(crate) async fn refresh_rejected(
        &self,
        rejected: &str,
        sent_at: u64,
    ) -> Result<String, SessionError> {
        let _transition = self.transition.lock().await;

        match self.access_token() {
            Some(current) if current != rejected => {
                tracing::debug!("access token already refreshed, reusing it");
                Ok(current)
            }
            Some(_) => {
                let shared = (self.refresh_epoch() != sent_at)
                    .then(|| self.failed_refresh_of(rejected))
                    .flatten();
                if let Some(error) = shared {
                    tracing::debug!(error = %error, "refresh for this token already failed");
                    return Err(error);
                }
                self.attempt_refresh().await
            }
            None => Err(SessionError::SessionExpired),
        }
    }

    /// Caller must hold the transition lock.
    async fn attempt_refresh(&self) -> Result<String, SessionError> {
        let attempted = self.access_token();
        let result = self.refresh_locked().await;

        let failure = match (&result, attempted) {
            (Err(e), Some(access)) => {
                FailedRefresh::capture(e).map(|failed| (access, failed))
            }
            _ => None,
        };
        *self
            .last_failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = failure;
        self.refresh_epoch.fetch_add(1, Ordering::AcqRel);
        result
    }

    fn failed_refresh_of(&self, rejected: &str) -> Option<SessionError> {
        let last = self
            .last_failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match &*last {
            Some((access, failed)) if access == rejected => Some(failed.replay()),
            _ => None,
        }
    }

    /// Caller must hold the transition lock.
    async fn refresh_locked(&self) -> Result<String, SessionError> {
        let Some(refresh) = self.store.load().refresh_token().map(str::to_string)
        else {
            return Err(SessionError::Unauthenticated);
        };
        let body = self.codec.encode(&RefreshRequest {
            refresh: refresh.clone(),
        })?;

        self.state.send_replace(AuthState::Refreshing);
        let request = ApiRequest::post(endpoints::TOKEN_REFRESH).with_body(body);
        let response = match self.transport.send(&request).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(error = %e, "token refresh got no response, keeping session");
                self.settle();
                return Err(e.into());
            }
        };

        if matches!(response.status, 400 | 401 | 403) {
            tracing::warn!(status = response.status, "refresh token rejected");
            self.end_session(LogoutReason::SessionExpired);
            return Err(SessionError::SessionExpired);
        }
        if !response.is_success() {
            self.settle();
            return Err(SessionError::Api {
                status: response.status,
                body: response.body,
            });
        }

        let token = match self.codec.decode::<AccessToken>(&response.body) {
            Ok(token) if !token.access.is_empty() => token,
            Ok(_) => {
                self.settle();
                return Err(ProtocolError::InvalidMessage(
                    "refresh response has an empty access token".into(),
                )
                .into());
            }
            Err(e) => {
                self.settle();
                return Err(e.into());
            }
        };

        // Only apply the new token to the session it was issued for; a
        // logout while the call was in flight wins.
        let applied = self.with_store(|store| {
            let mut session = store.load();
            if session.refresh_token() != Some(refresh.as_str()) {
                return Ok(false);
            }
            session.rotate(token.access.clone(), token.refresh.clone());
            store.save(&session).map(|()| true)
        });

        match applied {
            Ok(true) => {
                self.state.send_replace(AuthState::Authenticated);
                let _ = self.events.send(SessionEvent::Refreshed);
                tracing::debug!(rotated = token.refresh.is_some(), "access token refreshed");
                Ok(token.access)
            }
            Ok(false) => {
                self.settle();
                tracing::debug!("session ended during refresh, discarding new token");
                Err(SessionError::Unauthenticated)
            }
            Err(e) => {
                self.settle();
                Err(e.into())
            }
        }
    }

    /// Replaces the cached user, e.g. after a profile edit or after the
    /// server confirmed who is logged in. Tokens are untouched.
    ///
    /// # Errors
    /// Returns [`SessionError::Unauthenticated`] if nobody is logged in.
    pub fn update_user(&self, user: UserSummary) -> Result<(), SessionError> {
        let username = user.username.clone();
        self.with_store(|store| {
            let mut session = store.load();
            if !session.is_authenticated() {
                return Err(SessionError::Unauthenticated);
            }
            session.set_user(user);
            store.save(&session).map_err(SessionError::from)
        })?;
        let _ = self.events.send(SessionEvent::UserUpdated);
        tracing::debug!(%username, "cached user updated");
        Ok(())
    }

    // =====================================================================
    // Queries
    // =====================================================================

    /// The current state.
    pub fn state(&self) -> AuthState {
        *self.state.borrow()
    }

    /// A receiver that observes every state change.
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }

    /// A receiver for [`SessionEvent`]s sent from now on.
    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// The stored session.
    pub fn session(&self) -> Session {
        self.store.load()
    }

    /// `true` when an access token is stored.
    pub fn is_authenticated(&self) -> bool {
        self.store.load().is_authenticated()
    }

    /// The cached user, if someone is logged in.
    pub fn current_user(&self) -> Option<UserSummary> {
        self.store.load().user().cloned()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub(crate) fn access_token(&self) -> Option<String> {
        self.store.load().access_token().map(str::to_string)
    }

    pub(crate) fn transport(&self) -> &T {
        &self.transport
    }

    pub(crate) fn codec(&self) -> &C {
        &self.codec
    }

    // =====================================================================
    // Helpers
    // =====================================================================

    fn with_store<R>(&self, f: impl FnOnce(&CredentialStore) -> R) -> R {
        let _guard = self
            .store_guard
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        f(&self.store)
    }

    /// Saves a freshly issued session unless a logout happened since
    /// `generation` was read.
    fn save_unless_logged_out(
        &self,
        session: &Session,
        generation: u64,
    ) -> Result<(), SessionError> {
        self.with_store(|store| {
            if self.logouts.load(Ordering::Acquire) != generation {
                tracing::debug!("logged out while signing in, discarding tokens");
                return Err(SessionError::Unauthenticated);
            }
            store.save(session).map_err(SessionError::from)
        })
    }

    fn end_session(&self, reason: LogoutReason) {
        self.with_store(|store| {
            self.logouts.fetch_add(1, Ordering::AcqRel);
            store.clear();
        });
        self.state.send_replace(AuthState::Unauthenticated);
        let _ = self.events.send(SessionEvent::LoggedOut { reason });
        if reason == LogoutReason::SessionExpired {
            let _ = self.events.send(SessionEvent::LoginRequired);
        }
        tracing::info!(?reason, "session ended");
    }

    /// Sets the state from what the store holds.
    fn settle(&self) -> AuthState {
        let state = if self.store.load().is_authenticated() {
            AuthState::Authenticated
        } else {
            AuthState::Unauthenticated
        };
        self.state.send_replace(state);
        state
    }

    /// Maps a rejected login/registration to an error. 5xx responses are
    /// server trouble, not bad credentials, and pass through.
    fn rejection(&self, response: &ApiResponse, fallback: &str) -> SessionError {
        if response.status >= 500 {
            return SessionError::Api {
                status: response.status,
                body: response.body.clone(),
            };
        }
        let body: ApiErrorBody = self.codec.decode(&response.body).unwrap_or_default();
        SessionError::InvalidCredentials(
            body.message().unwrap_or(fallback).to_string(),
        )
    }
}

/// A refresh failure that left the session in place, kept so requests
/// queued behind it can be answered with the same error.
#[derive(Debug, Clone)]
enum FailedRefresh {
    Api { status: u16, body: Vec<u8> },
    Timeout,
    Network(String),
    Protocol(String),
    Storage(String),
    Unauthenticated,
}

impl FailedRefresh {
    fn capture(error: &SessionError) -> Option<Self> {
        let failed = match error {
            SessionError::Api { status, body } => FailedRefresh::Api {
                status: *status,
                body: body.clone(),
            },
            SessionError::Network(TransportError::Timeout) => FailedRefresh::Timeout,
            SessionError::Network(TransportError::ConnectionFailed(msg)) => {
                FailedRefresh::Network(msg.clone())
            }
            SessionError::Network(e) => FailedRefresh::Network(e.to_string()),
            SessionError::Protocol(e) => FailedRefresh::Protocol(e.to_string()),
            SessionError::Storage(e) => FailedRefresh::Storage(e.to_string()),
            SessionError::Unauthenticated => FailedRefresh::Unauthenticated,
            SessionError::SessionExpired
            | SessionError::InvalidCredentials(_)
            | SessionError::Validation(_) => return None,
        };
        Some(failed)
    }

    fn replay(&self) -> SessionError {
        match self {
            FailedRefresh::Api { status, body } => SessionError::Api {
                status: *status,
                body: body.clone(),
            },
            FailedRefresh::Timeout => TransportError::Timeout.into(),
            FailedRefresh::Network(msg) => {
                TransportError::ConnectionFailed(msg.clone()).into()
            }
            FailedRefresh::Protocol(msg) => {
                ProtocolError::InvalidMessage(msg.clone()).into()
            }
            FailedRefresh::Storage(msg) => {
                StorageError::Io(std::io::Error::other(msg.clone())).into()
            }
            FailedRefresh::Unauthenticated => SessionError::Unauthenticated,
        }
    }
}
