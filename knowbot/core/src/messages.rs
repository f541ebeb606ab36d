//! Shared Conversation Types
//!
//! The data model shared by the stream controller, the conversation store and
//! any surface that renders them. Everything here is plain data: no type in
//! this module performs I/O or holds a handle to a running stream.
//!
//! # Shape
//!
//! ```text
//! Conversation
//!  ├── history: [Interaction { input, output, metadata: Metadata { sources } }, ...]
//!  └── input:   pending query ("" when nothing is pending)
//! ```

use serde::{Deserialize, Serialize};

/// A document the completion service cited while answering
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Source {
    /// Display title of the source document
    pub title: String,
    /// Link to the document, when the index stores one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Excerpt that was fed into the prompt context
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
    /// Retrieval similarity score
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

impl Source {
    /// Create a source with only a title
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }
}

/// Citation metadata attached to an answer
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    /// Cited sources, in the order the service ranked them
    #[serde(default)]
    pub sources: Vec<Source>,
}

impl Metadata {
    /// Metadata with the given sources
    #[must_use]
    pub fn with_sources(sources: Vec<Source>) -> Self {
        Self { sources }
    }

    /// Whether no source was cited
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

/// One completed question/answer pair
///
/// Interactions are sealed when committed; the store only ever hands out
/// shared references to them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    /// The user's question
    pub input: String,
    /// The full streamed answer
    pub output: String,
    /// Sources cited by the answer
    pub metadata: Metadata,
}

/// Full session state: interaction history plus the pending query
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    /// Committed interactions, oldest first
    pub history: Vec<Interaction>,
    /// Query accepted but not yet committed (empty when none)
    pub input: String,
}

impl Conversation {
    /// Create an empty conversation
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a query is waiting to be answered
    #[must_use]
    pub fn has_pending_input(&self) -> bool {
        !self.input.is_empty()
    }

    /// The most recent committed interaction
    #[must_use]
    pub fn last_interaction(&self) -> Option<&Interaction> {
        self.history.last()
    }
}

/// Unique identifier for a chat session
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    /// Generate a new unique session ID
    ///
    /// Counter plus timestamp, so two sessions created in the same
    /// millisecond still differ.
    pub fn new() -> Self {
        use std::sync::atomic::{AtomicU64, Ordering};
        use std::time::{SystemTime, UNIX_EPOCH};

        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let count = COUNTER.fetch_add(1, Ordering::SeqCst);
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        Self(format!("session_{timestamp}_{count}"))
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
