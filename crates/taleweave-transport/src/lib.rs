//! HTTP transport abstraction layer for Taleweave.
//!
//! Provides the [`HttpTransport`] trait that abstracts over how an API
//! request actually reaches the backend, plus the request/response values
//! that travel through it. Everything above this crate (session handling,
//! token refresh, the domain API wrappers) only ever talks to the trait,
//! so tests can swap in a fake backend without touching the network.
//!
//! # Feature Flags
//!
//! - `reqwest` (default) — HTTP transport via `reqwest`

mod error;
#[cfg(feature = "reqwest")]
mod http;

pub use error::TransportError;
#[cfg(feature = "reqwest")]
pub use http::ReqwestTransport;

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counter for generating unique request IDs.
static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque identifier for a logical API request.
///
/// A request keeps its ID when it is re-issued after a token refresh, so
/// both attempts show up under the same ID in the logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(u64);

impl RequestId {
    /// Allocates the next process-wide unique `RequestId`.
    pub fn next() -> Self {
        Self(NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Creates a new `RequestId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

/// HTTP method of an [`ApiRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    /// The method name as it appears on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One outgoing API call.
///
/// `path` is relative to the transport's base URL (`/stories/`), the body
/// is already-encoded JSON, and `bearer` is the access token to present,
/// if any. The transport never decides on its own whether to attach a
/// credential: that is the request pipeline's job.
#[derive(Clone)]
pub struct ApiRequest {
    id: RequestId,
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
    pub bearer: Option<String>,
}

impl ApiRequest {
    /// Creates a request with a fresh [`RequestId`], no body and no credential.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            id: RequestId::next(),
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            bearer: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::Post, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::Patch, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::Delete, path)
    }

    /// Sets a JSON body.
    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = Some(body);
        self
    }

    /// Appends a query-string parameter.
    pub fn with_query(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Attaches a bearer credential.
    pub fn with_bearer(mut self, token: impl Into<String>) -> Self {
        self.bearer = Some(token.into());
        self
    }

    /// Returns the ID assigned when this request was created.
    pub fn id(&self) -> RequestId {
        self.id
    }
}

// The bearer token must never end up in logs, so `Debug` is written by hand.
impl fmt::Debug for ApiRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiRequest")
            .field("id", &self.id)
            .field("method", &self.method)
            .field("path", &self.path)
            .field("query", &self.query)
            .field("body_len", &self.body.as_ref().map(Vec::len))
            .field("bearer", &self.bearer.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// The raw outcome of an HTTP exchange: status code plus body bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl ApiResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// `true` for any 2xx status.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// `true` when the server rejected the request's credential (HTTP 401).
    pub fn is_unauthorized(&self) -> bool {
        self.status == 401
    }
}

/// Sends [`ApiRequest`]s to the backend.
///
/// - `Send + Sync + 'static` → one transport is shared (behind an `Arc`)
///   by every task that talks to the API.
/// - The returned future is `Send` so callers can drive it from
///   `tokio::spawn`ed tasks.
///
/// Implementations return `Ok` for every response that arrived, whatever
/// its status, and `Err` only when no response arrived at all.
pub trait HttpTransport: Send + Sync + 'static {
    /// Performs one HTTP exchange.
    fn send(
        &self,
        request: &ApiRequest,
    ) -> impl Future<Output = Result<ApiResponse, TransportError>> + Send;
}
