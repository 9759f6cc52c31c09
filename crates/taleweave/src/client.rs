//! `TaleweaveClient` builder and the session-facing client surface.
//!
//! This is the entry point for talking to a Taleweave backend. It ties
//! together all the layers: transport → protocol → session → domain API.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use taleweave_protocol::{Credentials, JsonCodec, Registration, UserSummary};
use taleweave_session::{
    AuthState, CredentialStore, MemoryStorage, RegisterOutcome,
    RequestPipeline, Session, SessionConfig, SessionEvent, SessionLifecycle,
    Storage,
};
use taleweave_transport::ReqwestTransport;
use tokio::sync::{broadcast, watch};

use crate::TaleweaveError;
use crate::api::{Chapters, Profiles, Stories};

/// Where the backend lives when nothing else is configured.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000/api";

/// Client-wide settings.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL every API path is joined onto.
    pub base_url: String,

    /// Upper bound on a single HTTP exchange.
    pub request_timeout: Duration,

    /// Session settings (storage key, current-user endpoint).
    pub session: SessionConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout: Duration::from_secs(30),
            session: SessionConfig::default(),
        }
    }
}

/// The request pipeline type every client uses.
pub type Pipeline = RequestPipeline<ReqwestTransport, JsonCodec>;

/// Builder for configuring a Taleweave client.
///
/// # Example
///
/// ```rust,no_run
/// use taleweave::prelude::*;
///
/// # async fn run() -> Result<(), TaleweaveError> {
/// let client = TaleweaveClient::builder()
///     .base_url("http://localhost:8000/api")
///     .storage(FileStorage::new("/tmp/taleweave"))
///     .build()?;
/// client.initialize().await;
/// # Ok(())
/// # }
/// ```
pub struct TaleweaveClientBuilder {
    config: ClientConfig,
    storage: Box<dyn Storage>,
}

impl TaleweaveClientBuilder {
    /// Creates a new builder with default settings and in-memory storage.
    pub fn new() -> Self {
        Self {
            config: ClientConfig::default(),
            storage: Box::new(MemoryStorage::new()),
        }
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the backend base URL.
    pub fn base_url(mut self, url: &str) -> Self {
        self.config.base_url = url.to_string();
        self
    }

    /// Sets the per-request timeout.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    /// Sets the session configuration.
    pub fn session_config(mut self, config: SessionConfig) -> Self {
        self.config.session = config;
        self
    }

    /// Sets where the session is persisted between runs.
    pub fn storage(mut self, storage: impl Storage) -> Self {
        self.storage = Box::new(storage);
        self
    }

    /// Builds the client. Nothing is loaded from storage yet; call
    /// [`TaleweaveClient::initialize`] for that.
    ///
    /// # Errors
    /// Returns [`TaleweaveError::Transport`] if the base URL is not an
    /// http(s) URL or the HTTP client cannot be created.
    pub fn build(self) -> Result<TaleweaveClient, TaleweaveError> {
        let transport = ReqwestTransport::new(
            &self.config.base_url,
            Some(self.config.request_timeout),
        )?;
        let store =
            CredentialStore::new(self.storage, self.config.session.storage_key.clone());
        let lifecycle = SessionLifecycle::new(
            Arc::new(transport),
            JsonCodec,
            store,
            self.config.session.clone(),
        );

        tracing::debug!(base_url = %self.config.base_url, "taleweave client built");
        Ok(TaleweaveClient {
            pipeline: RequestPipeline::new(Arc::new(lifecycle)),
            config: Arc::new(self.config),
        })
    }
}

impl Default for TaleweaveClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A client for one user's session against one backend.
///
/// Cheap to clone; clones share the session, so a request made through
/// any clone sees a login or logout made through another.
#[derive(Clone)]
pub struct TaleweaveClient {
    pipeline: Pipeline,
    config: Arc<ClientConfig>,
}

impl TaleweaveClient {
    /// Creates a new builder.
    pub fn builder() -> TaleweaveClientBuilder {
        TaleweaveClientBuilder::new()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    // =====================================================================
    // Session
    // =====================================================================

    /// Restores a stored session and confirms it with the server.
    pub async fn initialize(&self) -> AuthState {
        self.pipeline.initialize().await
    }

    /// Logs in and then fetches the user's profile into the session.
    ///
    /// A failed profile fetch does not undo the login; the session then
    /// simply has no cached user yet.
    pub async fn login(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Session, TaleweaveError> {
        self.lifecycle()
            .login(&Credentials::new(username, password))
            .await?;
        self.pipeline.reconcile_user().await?;
        Ok(self.lifecycle().session())
    }

    /// Creates an account. See [`RegisterOutcome`] for the two shapes a
    /// successful registration can take.
    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<RegisterOutcome, TaleweaveError> {
        let outcome = self
            .lifecycle()
            .register(&Registration::new(username, email, password))
            .await?;
        Ok(outcome)
    }

    /// Forgets the session. Never fails.
    pub fn logout(&self) {
        self.lifecycle().logout();
    }

    /// Trades the refresh token for a new access token now, without
    /// waiting for a 401.
    pub async fn refresh(&self) -> Result<(), TaleweaveError> {
        self.lifecycle().refresh().await?;
        Ok(())
    }

    /// Asks the server who is logged in and updates the cached user.
    pub async fn refresh_user(&self) -> Result<Option<UserSummary>, TaleweaveError> {
        Ok(self.pipeline.reconcile_user().await?)
    }

    /// Edits the logged-in user's profile and refreshes the cached user
    /// from the server's reply.
    pub async fn update_profile(&self, changes: &Value) -> Result<Value, TaleweaveError> {
        let updated: Value = self.pipeline.patch(PROFILE_UPDATE, changes).await?;
        match serde_json::from_value::<UserSummary>(updated.clone()) {
            Ok(user) => self.lifecycle().update_user(user)?,
            Err(e) => {
                tracing::debug!(error = %e, "profile reply is not a user, refetching");
                self.pipeline.reconcile_user().await?;
            }
        }
        Ok(updated)
    }

    pub fn state(&self) -> AuthState {
        self.lifecycle().state()
    }

    /// Observes every [`AuthState`] change.
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.lifecycle().subscribe()
    }

    /// Receives [`SessionEvent`]s, including
    /// [`LoginRequired`](SessionEvent::LoginRequired).
    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.lifecycle().events()
    }

    pub fn session(&self) -> Session {
        self.lifecycle().session()
    }

    pub fn is_authenticated(&self) -> bool {
        self.lifecycle().is_authenticated()
    }

    pub fn current_user(&self) -> Option<UserSummary> {
        self.lifecycle().current_user()
    }

    // =====================================================================
    // Domain API
    // =====================================================================

    pub fn stories(&self) -> Stories<'_> {
        Stories::new(&self.pipeline)
    }

    /// Chapters (and their decision points) of one story.
    pub fn chapters<'a>(&'a self, story: &'a str) -> Chapters<'a> {
        Chapters::new(&self.pipeline, story)
    }

    pub fn profiles(&self) -> Profiles<'_> {
        Profiles::new(&self.pipeline)
    }

    /// The request pipeline, for endpoints without a dedicated wrapper.
    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    fn lifecycle(&self) -> &SessionLifecycle<ReqwestTransport, JsonCodec> {
        self.pipeline.lifecycle()
    }
}

const PROFILE_UPDATE: &str = "/profile/update/";
