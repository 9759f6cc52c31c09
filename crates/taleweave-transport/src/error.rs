/// Errors that can occur in the transport layer.
///
/// These describe failures to get an HTTP exchange done at all. A response
/// that arrived with an error status (401, 404, 500...) is NOT a transport
/// error; it comes back as an [`ApiResponse`](crate::ApiResponse) and the
/// layers above decide what it means.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The request could not be built (bad URL, bad header value).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The server could not be reached or the connection dropped.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// The exchange did not complete within the configured timeout.
    #[error("request timed out")]
    Timeout,

    /// Any other failure reported by the HTTP client.
    #[cfg(feature = "reqwest")]
    #[error("http request failed: {0}")]
    Http(#[source] reqwest::Error),
}
