//! HTTP Backend Implementation
//!
//! Streams completions from the retrieval-augmented service over plain HTTP.
//! The request is a single JSON `POST`; the response body is newline-delimited
//! JSON that the stream controller decodes as it arrives.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::ACCEPT;

use super::traits::{ByteStream, CompletionBackend, CompletionRequest};
use crate::config::ServiceConfig;
use crate::error::StreamError;

/// Media type of the streamed response body
pub const NDJSON_MEDIA_TYPE: &str = "application/x-ndjson";

/// HTTP completion backend
#[derive(Clone, Debug)]
pub struct HttpBackend {
    /// Completion endpoint URL
    endpoint: String,
    /// HTTP client
    http_client: reqwest::Client,
}

impl HttpBackend {
    /// Create a backend for `endpoint`
    ///
    /// `read_timeout` limits the silence between body chunks, not the length
    /// of the answer.
    ///
    /// # Errors
    ///
    /// Returns `StreamError::Client` if the HTTP client cannot be built.
    pub fn new(
        endpoint: impl Into<String>,
        connect_timeout: Duration,
        read_timeout: Duration,
    ) -> Result<Self, StreamError> {
        let http_client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .read_timeout(read_timeout)
            .build()
            .map_err(|e| StreamError::Client(e.to_string()))?;

        Ok(Self {
            endpoint: endpoint.into(),
            http_client,
        })
    }

    /// Create from the `[service]` section of the app config
    ///
    /// # Errors
    ///
    /// Returns `StreamError::Client` if the HTTP client cannot be built.
    pub fn from_config(config: &ServiceConfig) -> Result<Self, StreamError> {
        Self::new(
            config.endpoint.clone(),
            config.connect_timeout,
            config.read_timeout,
        )
    }

    /// The completion endpoint URL
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl CompletionBackend for HttpBackend {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn open(&self, request: CompletionRequest) -> Result<ByteStream, StreamError> {
        tracing::debug!(
            endpoint = %self.endpoint,
            history = request.history.len(),
            "Opening completion stream"
        );

        let response = self
            .http_client
            .post(&self.endpoint)
            .header(ACCEPT, NDJSON_MEDIA_TYPE)
            .json(&request)
            .send()
            .await
            .map_err(|e| StreamError::Connect(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StreamError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(StreamError::from));

        Ok(Box::pin(body))
    }
}
