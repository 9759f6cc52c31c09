//! HTTP transport implementation using `reqwest`.

use std::time::Duration;

use reqwest::header::{CONTENT_TYPE, HeaderValue};

use crate::{ApiRequest, ApiResponse, HttpTransport, Method, TransportError};

/// A `reqwest`-based [`HttpTransport`] rooted at a base URL.
///
/// Request paths are joined onto the base URL, so a transport built with
/// `http://localhost:8000/api` sends `GET /stories/` to
/// `http://localhost:8000/api/stories/`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    base_url: String,
}

impl ReqwestTransport {
    /// Builds a transport for the given base URL.
    ///
    /// `timeout` bounds every exchange; `None` leaves it to the OS.
    pub fn new(
        base_url: &str,
        timeout: Option<Duration>,
    ) -> Result<Self, TransportError> {
        if !(base_url.starts_with("http://") || base_url.starts_with("https://"))
        {
            return Err(TransportError::InvalidRequest(format!(
                "base url must be http(s): {base_url}"
            )));
        }

        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(TransportError::Http)?;

        tracing::debug!(base_url, "HTTP transport ready");
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Returns the base URL every request path is joined onto.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url_for(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

fn to_reqwest_method(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Patch => reqwest::Method::PATCH,
        Method::Delete => reqwest::Method::DELETE,
    }
}

fn map_send_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else if err.is_connect() {
        TransportError::ConnectionFailed(err.to_string())
    } else if err.is_builder() {
        TransportError::InvalidRequest(err.to_string())
    } else {
        TransportError::Http(err)
    }
}

impl HttpTransport for ReqwestTransport {
    async fn send(
        &self,
        request: &ApiRequest,
    ) -> Result<ApiResponse, TransportError> {
        let url = self.url_for(&request.path);
        let id = request.id();
        tracing::debug!(%id, method = %request.method, %url, "sending request");

        let mut builder = self
            .client
            .request(to_reqwest_method(request.method), &url);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(token) = &request.bearer {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            builder = builder
                .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
                .body(body.clone());
        }

        let response = builder.send().await.map_err(map_send_error)?;
        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(map_send_error)?;

        tracing::debug!(%id, status, "response received");
        Ok(ApiResponse::new(status, body.to_vec()))
    }
}
