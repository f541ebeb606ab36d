//! Completion Service Backends
//!
//! Abstracted access to the retrieval-augmented completion service through a
//! common trait, so the stream controller can be driven by HTTP in production
//! and by scripted streams in tests.
//!
//! # Usage
//!
//! ```ignore
//! use knowbot_core::backend::{CompletionBackend, CompletionRequest, HttpBackend};
//!
//! let backend = HttpBackend::from_config(&app_config.service)?;
//! let request = CompletionRequest::build("How do I install it?", &conversation, &config);
//! let body = backend.open(request).await?;
//! ```

mod http;
pub mod test_utils;
mod traits;

pub use http::{HttpBackend, NDJSON_MEDIA_TYPE};
pub use traits::{
    ByteStream, CompletionBackend, CompletionConfig, CompletionRequest, HistoryEntry,
    CONTEXT_PLACEHOLDER, QUERY_PLACEHOLDER,
};
