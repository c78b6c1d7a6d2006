//! HTTP client for the protected API surface.
//!
//! Every request goes out with the current bearer credential attached when
//! one exists; a missing credential is not an error here, the server will
//! reject on its own. A 401 response invalidates the session before the
//! error is returned, so observers see the teardown even when the caller
//! swallows the failure.

use std::fmt;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::config::Config;
use crate::session::SessionStore;

/// Categories of API failure, for consistent handling at call sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorKind {
    /// The server rejected the credential (HTTP 401); the session has been
    /// torn down.
    Unauthorized,
    /// No usable response from the server (connect failure, timeout).
    Transport,
    /// Any other non-2xx status.
    Status,
    /// The response body could not be decoded.
    Parse,
}

/// Structured failure from the protected API.
#[derive(Debug, Clone)]
pub struct ApiError {
    /// Error category
    pub kind: ApiErrorKind,
    /// One-line summary suitable for display
    pub message: String,
    /// Optional additional details (e.g., raw error body)
    pub details: Option<String>,
}

impl ApiError {
    fn new(kind: ApiErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: None,
        }
    }

    fn unauthorized() -> Self {
        Self::new(ApiErrorKind::Unauthorized, "session is no longer valid")
    }

    fn transport(err: &reqwest::Error) -> Self {
        Self {
            kind: ApiErrorKind::Transport,
            message: "server is unreachable".to_string(),
            details: Some(err.to_string()),
        }
    }

    /// Creates a status error, lifting the server's `detail` field into the
    /// message when the body carries one.
    fn status(status: reqwest::StatusCode, body: &str) -> Self {
        if let Ok(json) = serde_json::from_str::<Value>(body)
            && let Some(detail) = json.get("detail").and_then(Value::as_str)
        {
            return Self {
                kind: ApiErrorKind::Status,
                message: format!("HTTP {status}: {detail}"),
                details: Some(body.to_string()),
            };
        }
        Self {
            kind: ApiErrorKind::Status,
            message: format!("HTTP {status}"),
            details: (!body.is_empty()).then(|| body.to_string()),
        }
    }

    fn parse(err: &reqwest::Error) -> Self {
        Self {
            kind: ApiErrorKind::Parse,
            message: "could not decode server response".to_string(),
            details: Some(err.to_string()),
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ApiError {}

/// Issues requests against the server with the session's credential
/// attached.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    session: Arc<SessionStore>,
}

impl ApiClient {
    /// Creates a client against the configured server.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &Config, session: Arc<SessionStore>) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.request_timeout() {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().context("build HTTP client")?;

        Ok(Self {
            http,
            base_url: config.server_url.trim_end_matches('/').to_string(),
            session,
        })
    }

    /// GET a JSON endpoint.
    ///
    /// # Errors
    /// Returns an [`ApiError`] describing the failure category.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ApiError> {
        let request = self.http.get(self.url(path)).query(query);
        self.execute(request).await
    }

    /// POST a JSON body and decode a JSON response.
    ///
    /// # Errors
    /// Returns an [`ApiError`] describing the failure category.
    pub async fn post_json<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let request = self.http.post(self.url(path)).json(body);
        self.execute(request).await
    }

    /// POST without a body and decode a JSON response.
    ///
    /// # Errors
    /// Returns an [`ApiError`] describing the failure category.
    pub async fn post_empty<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let request = self.http.post(self.url(path));
        self.execute(request).await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        mut request: reqwest::RequestBuilder,
    ) -> Result<T, ApiError> {
        if let Some(token) = self.session.bearer_token() {
            request = request.bearer_auth(token);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(err) => {
                tracing::warn!("request transport failure: {err}");
                return Err(ApiError::transport(&err));
            }
        };

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            self.session.invalidate();
            return Err(ApiError::unauthorized());
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::status(status, &body));
        }

        response.json().await.map_err(|err| ApiError::parse(&err))
    }
}
