//! Chat Session
//!
//! Wires the conversation store to the stream controller. Neither component
//! knows about the other's internals: the session starts a stream when the
//! store accepts a query and forwards the terminal event to `commit`.
//!
//! # Design Philosophy
//!
//! A surface holds one `ChatSession` and drives it from its own event loop:
//! `submit` when the user sends text, `next_events().await` (or `poll()`) to
//! receive deltas for rendering. Failed and cancelled streams are never
//! committed; the query stays pending so `retry` can re-run it.

use std::sync::Arc;

use tokio::sync::{broadcast, watch};

use crate::backend::CompletionBackend;
use crate::config::AppConfig;
use crate::conversation::{ConversationPhase, ConversationStore, Transition};
use crate::messages::{Conversation, Interaction, SessionId};
use crate::stream::{StreamController, StreamEvent, StreamState, StreamStats};

/// One conversation between a user and the completion service
pub struct ChatSession<B: CompletionBackend + 'static> {
    id: SessionId,
    config: Arc<AppConfig>,
    store: ConversationStore,
    controller: StreamController<B>,
}

impl<B: CompletionBackend + 'static> ChatSession<B> {
    /// Create an empty session
    pub fn new(backend: Arc<B>, config: Arc<AppConfig>) -> Self {
        let id = SessionId::new();
        tracing::debug!(session_id = %id, backend = backend.name(), "Created chat session");

        Self {
            id,
            config,
            store: ConversationStore::new(),
            controller: StreamController::new(backend),
        }
    }

    /// Session identifier
    #[must_use]
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Effective configuration
    #[must_use]
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Submit a query and start streaming its answer
    ///
    /// Rejected while a stream is active or when `text` is blank. Must be
    /// called from within a tokio runtime.
    pub fn submit(&mut self, text: &str) -> Transition {
        let transition = self.store.set_input(text, &self.controller);
        if transition.is_accepted() {
            self.start_pending();
        }
        transition
    }

    /// Submit the canned suggestion at `index`
    ///
    /// Returns `None` if there is no such suggestion.
    pub fn submit_suggestion(&mut self, index: usize) -> Option<Transition> {
        let text = self.suggestion(index)?.to_string();
        Some(self.submit(&text))
    }

    /// Re-run the pending query after a failure or cancellation
    ///
    /// Returns `false` if nothing is pending or a stream is already active.
    pub fn retry(&mut self) -> bool {
        if self.phase() != ConversationPhase::PendingQuery {
            tracing::debug!(phase = ?self.phase(), "Nothing to retry");
            return false;
        }
        self.start_pending()
    }

    /// Cancel the active stream, keeping the query pending
    pub fn cancel(&mut self) -> bool {
        self.controller.cancel()
    }

    /// Cancel any stream and forget the conversation
    pub fn reset(&mut self) -> Transition {
        self.store.reset(&mut self.controller)
    }

    /// Apply every stream signal already received (non-blocking)
    pub fn poll(&mut self) -> Vec<StreamEvent> {
        let events = self.controller.poll();
        self.settle(&events);
        events
    }

    /// Wait for the active stream's next events
    ///
    /// Returns immediately with no events when nothing is streaming.
    pub async fn next_events(&mut self) -> Vec<StreamEvent> {
        let events = self.controller.next_events().await;
        self.settle(&events);
        events
    }

    /// Current conversation
    #[must_use]
    pub fn conversation(&self) -> &Conversation {
        self.store.conversation()
    }

    /// Committed interactions, oldest first
    #[must_use]
    pub fn history(&self) -> &[Interaction] {
        self.store.history()
    }

    /// Where the conversation is in its cycle
    #[must_use]
    pub fn phase(&self) -> ConversationPhase {
        self.store.phase(&self.controller)
    }

    /// Whether an answer is streaming
    #[must_use]
    pub fn is_streaming(&self) -> bool {
        self.controller.is_streaming()
    }

    /// State of the current (or last) stream
    #[must_use]
    pub fn stream_state(&self) -> &StreamState {
        self.controller.state()
    }

    /// Stream diagnostics
    #[must_use]
    pub fn stream_stats(&self) -> &StreamStats {
        self.controller.stats()
    }

    /// Watch the conversation
    #[must_use]
    pub fn subscribe_conversation(&self) -> watch::Receiver<Conversation> {
        self.store.subscribe()
    }

    /// Subscribe to stream snapshots
    #[must_use]
    pub fn subscribe_stream(&self) -> broadcast::Receiver<StreamState> {
        self.controller.subscribe()
    }

    /// Title for the surface
    #[must_use]
    pub fn title(&self) -> &str {
        &self.config.ui.title
    }

    /// Canned starter questions
    #[must_use]
    pub fn suggestions(&self) -> &[String] {
        &self.config.ui.suggestions
    }

    /// Suggestion at `index`, if any
    #[must_use]
    pub fn suggestion(&self, index: usize) -> Option<&str> {
        self.config.ui.suggestions.get(index).map(String::as_str)
    }

    fn start_pending(&mut self) -> bool {
        let query = self.store.input().to_string();
        self.controller
            .start(&query, self.store.conversation(), &self.config.completion)
    }

    /// Commit completed answers; failed ones leave the query pending
    fn settle(&mut self, events: &[StreamEvent]) {
        for event in events {
            match event {
                StreamEvent::Completed { output, metadata } => {
                    self.store.commit(output.clone(), metadata.clone());
                }
                StreamEvent::Failed { error, partial } => {
                    tracing::info!(
                        session_id = %self.id,
                        error = %error,
                        discarded = partial.len(),
                        "Answer discarded, query kept for retry"
                    );
                }
                StreamEvent::Delta(_) => {}
            }
        }
    }
}
