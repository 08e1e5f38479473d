//! HTTP client for the conversion service REST API.
//!
//! Wraps the service's `/v1/convert` endpoint using [`reqwest`] and
//! classifies failures into transient and permanent kinds so the engine's
//! retry policy can act on them.

use async_trait::async_trait;

use restack_core::result::TaskErrorKind;

use crate::service::{ConvertRequest, ConvertResponse, ConvertService};

/// Errors from the conversion service layer, classified for retry.
#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    /// The service asked the caller to back off (HTTP 429).
    #[error("rate limited by conversion service (retry after {retry_after_secs:?}s)")]
    RateLimited { retry_after_secs: Option<u64> },

    /// The service returned a server error or is unreachable (HTTP 5xx).
    #[error("conversion service unavailable ({status}): {body}")]
    Unavailable { status: u16, body: String },

    /// The service answered 2xx but the body is not a usable response,
    /// or it rejected the input as unconvertible (HTTP 4xx).
    #[error("malformed conversion output: {0}")]
    MalformedOutput(String),

    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),
}

impl ConvertError {
    /// Whether the engine may retry this failure with backoff.
    pub fn is_transient(&self) -> bool {
        !matches!(self, ConvertError::MalformedOutput(_))
    }

    /// Map onto the engine's task error classification.
    pub fn task_error_kind(&self) -> TaskErrorKind {
        match self {
            ConvertError::RateLimited { .. } => TaskErrorKind::RateLimited,
            ConvertError::Unavailable { .. } => TaskErrorKind::Unavailable,
            ConvertError::MalformedOutput(_) => TaskErrorKind::MalformedOutput,
            ConvertError::Request(e) if e.is_timeout() => TaskErrorKind::Timeout,
            ConvertError::Request(_) => TaskErrorKind::Network,
        }
    }
}

/// HTTP client for a single conversion service endpoint.
pub struct HttpConvertClient {
    client: reqwest::Client,
    api_url: String,
}

impl HttpConvertClient {
    /// Create a new client.
    ///
    /// * `api_url` - Base HTTP URL, e.g. `http://converter:8080`.
    pub fn new(api_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url,
        }
    }

    /// Create a client reusing an existing [`reqwest::Client`] (useful
    /// for connection pooling when several engines share one process).
    pub fn with_client(client: reqwest::Client, api_url: String) -> Self {
        Self { client, api_url }
    }

    /// Classify a non-2xx response by status code.
    async fn classify_failure(response: reqwest::Response) -> ConvertError {
        let status = response.status();

        if status.as_u16() == 429 {
            let retry_after_secs = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok());
            return ConvertError::RateLimited { retry_after_secs };
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());

        if status.is_server_error() {
            ConvertError::Unavailable {
                status: status.as_u16(),
                body,
            }
        } else {
            // Remaining 4xx: the service rejected this input; retrying
            // the same request cannot succeed.
            ConvertError::MalformedOutput(format!("service rejected request ({status}): {body}"))
        }
    }
}

#[async_trait]
impl ConvertService for HttpConvertClient {
    async fn convert(&self, request: &ConvertRequest) -> Result<ConvertResponse, ConvertError> {
        let response = self
            .client
            .post(format!("{}/v1/convert", self.api_url))
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::classify_failure(response).await);
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());

        serde_json::from_str::<ConvertResponse>(&body)
            .map_err(|e| ConvertError::MalformedOutput(format!("{e}: {body}")))
    }
}
