//! Error Types
//!
//! Errors produced while talking to the completion service. None of these
//! cross the controller/store boundary: the controller turns them into a
//! `Failed` stream event (stream errors) or skips the offending frame
//! (frame errors).

use thiserror::Error;

/// A stream ended without delivering its terminal metadata block
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StreamError {
    /// The HTTP client could not be constructed
    #[error("Failed to build HTTP client: {0}")]
    Client(String),

    /// The request never reached the service
    #[error("Failed to connect to completion service: {0}")]
    Connect(String),

    /// The service answered with a non-success status
    #[error("Completion service returned {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body, for diagnostics
        body: String,
    },

    /// The body was dropped mid-stream
    #[error("Stream interrupted: {0}")]
    Transport(String),

    /// The body ended cleanly but no terminal metadata block arrived
    #[error("Stream ended before the terminal metadata block")]
    Truncated,
}

impl StreamError {
    /// Whether the request failed before any byte of the body was read
    #[must_use]
    pub fn is_connection_failure(&self) -> bool {
        matches!(self, Self::Client(_) | Self::Connect(_) | Self::Status { .. })
    }
}

impl From<reqwest::Error> for StreamError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_request() || err.is_builder() {
            Self::Connect(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

/// A single frame of the response body could not be decoded
#[derive(Debug, Error)]
pub enum FrameError {
    /// Frame bytes are not valid UTF-8
    #[error("Frame is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    /// Frame is not valid JSON
    #[error("Frame is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Frame is JSON but neither a delta nor a metadata block
    #[error("Frame has neither `delta` nor `sources`: {0}")]
    UnknownShape(String),
}
