//! Completion Backend Traits
//!
//! The request shape sent to the retrieval-augmented completion service and
//! the trait every transport implements. The stream controller only sees
//! raw body bytes; decoding them into deltas and metadata is its job, not
//! the backend's.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::error::StreamError;
use crate::messages::Conversation;

/// Placeholder replaced by retrieved context in the prompt template
pub const CONTEXT_PLACEHOLDER: &str = "{CONTEXT}";

/// Placeholder replaced by the user's query in the prompt template
pub const QUERY_PLACEHOLDER: &str = "{QUERY}";

/// Body bytes of a streamed response, in arrival order
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>, StreamError>> + Send>>;

/// Static settings forwarded verbatim to the service with every request
///
/// Opaque to the core: it is built once at startup and never inspected
/// beyond serialization.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionConfig {
    /// Embedding model used to search the index
    pub embedding_model: String,
    /// Model that writes the answer
    pub completion_model: String,
    /// System prompt for the completion model
    pub system_prompt: String,
    /// Prompt template containing `{CONTEXT}` and `{QUERY}`
    pub prompt_template: String,
    /// Vector index namespace to search
    pub namespace: String,
}

/// A prior exchange, as the service sees it
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Earlier question
    pub input: String,
    /// Earlier answer
    pub output: String,
}

/// Request body for one streamed completion
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// The question being asked
    pub query: String,
    /// Every committed interaction, oldest first
    pub history: Vec<HistoryEntry>,
    /// Static model/prompt settings
    pub config: CompletionConfig,
}

impl CompletionRequest {
    /// Build a request from a query, the conversation so far, and static config
    ///
    /// Carries exactly one history entry per committed interaction, in
    /// append order. Citation metadata is not sent back.
    pub fn build(query: &str, context: &Conversation, config: &CompletionConfig) -> Self {
        Self {
            query: query.to_string(),
            history: context
                .history
                .iter()
                .map(|interaction| HistoryEntry {
                    input: interaction.input.clone(),
                    output: interaction.output.clone(),
                })
                .collect(),
            config: config.clone(),
        }
    }
}

/// Transport to a streaming completion service
///
/// Implementations open the request and hand back the raw body; dropping the
/// returned stream must release the underlying connection.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Backend name for logs (e.g. "http")
    fn name(&self) -> &str;

    /// Send the request and return the response body as a byte stream
    ///
    /// Errors returned here mean the stream never started (connection
    /// refused, non-success status). Errors inside the stream mean it was
    /// cut off mid-body.
    async fn open(&self, request: CompletionRequest) -> Result<ByteStream, StreamError>;
}
