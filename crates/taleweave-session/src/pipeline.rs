//! The request pipeline: every authenticated API call goes through here.
//!
//! For each request it:
//!   1. Reads the current access token from the credential store and
//!      attaches it as the bearer credential (or sends none).
//!   2. On a 401, asks the lifecycle for a refreshed token (at most once
//!      per request) and re-issues the request with it.
//!   3. Hands back the final response. The caller never sees the first
//!      401 if the retry succeeded.
//!
//! If the refresh itself is rejected the lifecycle clears the session and
//! the caller gets [`SessionError::SessionExpired`].

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use taleweave_protocol::{Codec, UserSummary};
use taleweave_transport::{ApiRequest, ApiResponse, HttpTransport};

use crate::{AuthState, SessionError, SessionLifecycle};

/// Sends API requests with the session's credential and transparently
/// recovers from an expired access token.
///
/// Cheap to clone; clones share the same lifecycle.
pub struct RequestPipeline<T, C> {
    lifecycle: Arc<SessionLifecycle<T, C>>,
}

impl<T, C> Clone for RequestPipeline<T, C> {
    fn clone(&self) -> Self {
        Self {
            lifecycle: Arc::clone(&self.lifecycle),
        }
    }
}

impl<T: HttpTransport, C: Codec> RequestPipeline<T, C> {
    pub fn new(lifecycle: Arc<SessionLifecycle<T, C>>) -> Self {
        Self { lifecycle }
    }

    pub fn lifecycle(&self) -> &Arc<SessionLifecycle<T, C>> {
        &self.lifecycle
    }

    /// Sends a request and returns its successful response.
    ///
    /// Any bearer already set on `request` is replaced by the stored token.
    ///
    /// # Errors
    /// - [`SessionError::Api`] — a non-2xx status, unmodified. A request
    ///   that is rejected with 401 even after a refresh ends here too.
    /// - [`SessionError::SessionExpired`] — the refresh was rejected
    /// - [`SessionError::Unauthenticated`] — 401 and no token to refresh
    /// - [`SessionError::Network`] — no response
    pub async fn send(
        &self,
        mut request: ApiRequest,
    ) -> Result<ApiResponse, SessionError> {
        let id = request.id();
        request.bearer = self.lifecycle.access_token();
        let sent_at = self.lifecycle.refresh_epoch();

        let response = self.lifecycle.transport().send(&request).await?;
        if !response.is_unauthorized() {
            return into_result(response);
        }

        let Some(rejected) = request.bearer.take() else {
            tracing::debug!(%id, path = %request.path, "unauthenticated request rejected");
            return Err(SessionError::Unauthenticated);
        };

        // From here on the request counts as retried: whatever the second
        // attempt returns is final.
        tracing::debug!(%id, path = %request.path, "access token rejected, refreshing");
        let fresh = self.lifecycle.refresh_rejected(&rejected, sent_at).await?;
        request.bearer = Some(fresh);

        let retry = self.lifecycle.transport().send(&request).await?;
        if retry.is_unauthorized() {
            tracing::warn!(%id, path = %request.path, "request rejected again after refresh");
        }
        into_result(retry)
    }

    /// `GET` a JSON resource.
    pub async fn get<R: DeserializeOwned>(
        &self,
        path: &str,
    ) -> Result<R, SessionError> {
        self.send_json(ApiRequest::get(path)).await
    }

    /// `GET` a JSON resource with query parameters.
    pub async fn get_with_query<R: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(String, String)],
    ) -> Result<R, SessionError> {
        let request = query
            .iter()
            .fold(ApiRequest::get(path), |req, (k, v)| req.with_query(k, v));
        self.send_json(request).await
    }

    /// `POST` a JSON body.
    pub async fn post<B, R>(&self, path: &str, body: &B) -> Result<R, SessionError>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        let bytes = self.lifecycle.codec().encode(body)?;
        self.send_json(ApiRequest::post(path).with_body(bytes)).await
    }

    /// `PATCH` a JSON body.
    pub async fn patch<B, R>(&self, path: &str, body: &B) -> Result<R, SessionError>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        let bytes = self.lifecycle.codec().encode(body)?;
        self.send_json(ApiRequest::patch(path).with_body(bytes)).await
    }

    /// `DELETE` a resource, ignoring the response body.
    pub async fn delete(&self, path: &str) -> Result<(), SessionError> {
        self.send(ApiRequest::delete(path)).await.map(|_| ())
    }

    async fn send_json<R: DeserializeOwned>(
        &self,
        request: ApiRequest,
    ) -> Result<R, SessionError> {
        let response = self.send(request).await?;
        // 204 and friends have no body; decode that as JSON `null`.
        let body: &[u8] = if response.body.is_empty() {
            b"null"
        } else {
            &response.body
        };
        Ok(self.lifecycle.codec().decode(body)?)
    }

    // =====================================================================
    // Startup
    // =====================================================================

    /// Asks the server who is logged in and replaces the cached user.
    ///
    /// A failed check keeps the cached user: only a rejected refresh
    /// (returned as [`SessionError::SessionExpired`]) ends the session.
    pub async fn reconcile_user(&self) -> Result<Option<UserSummary>, SessionError> {
        if !self.lifecycle.is_authenticated() {
            return Ok(None);
        }

        let path = self.lifecycle.config().current_user_path.clone();
        match self.get::<UserSummary>(&path).await {
            Ok(user) => match self.lifecycle.update_user(user.clone()) {
                Ok(()) => Ok(Some(user)),
                // Logged out while the check was in flight.
                Err(SessionError::Unauthenticated) => Ok(None),
                Err(e) => Err(e),
            },
            Err(e) if e.is_terminal() => Err(e),
            Err(e) => {
                tracing::info!(error = %e, "could not verify session, keeping cached user");
                Ok(self.lifecycle.current_user())
            }
        }
    }

    /// Restores the stored session and then verifies it with the server.
    ///
    /// Returns the state after both steps. Never fails: a session the
    /// server rejects simply ends up `Unauthenticated`.
    pub async fn initialize(&self) -> AuthState {
        if self.lifecycle.restore() == AuthState::Authenticated {
            if let Err(e) = self.reconcile_user().await {
                tracing::info!(error = %e, "stored session not accepted");
            }
        }
        self.lifecycle.state()
    }
}

fn into_result(response: ApiResponse) -> Result<ApiResponse, SessionError> {
    if response.is_success() {
        Ok(response)
    } else {
        Err(SessionError::Api {
            status: response.status,
            body: response.body,
        })
    }
}
