//! Conversation Store
//!
//! Single source of truth for the [`Conversation`]: the committed history
//! plus the query waiting to be answered. The store is a reducer: every
//! change goes through [`ConversationStore::dispatch`] (or one of the named
//! shortcuts) and invalid transitions are rejected as no-ops.
//!
//! # Design Philosophy
//!
//! The store never talks to the network. It only needs to ask "is a stream
//! running?" and to say "stop it" on reset, so it sees the stream controller
//! through the narrow [`StreamGate`] trait.
//!
//! # State Machine
//!
//! ```text
//!             set_input(v) [v non-blank, !streaming]
//!   ┌──────┐ ─────────────────────────────────────► ┌──────────────┐
//!   │ Idle │                                        │ PendingQuery │
//!   └──────┘ ◄───────────── commit ──────────┐      └──────┬───────┘
//!      ▲                                     │             │ orchestrator starts stream
//!      │ reset (from any state)        ┌─────┴─────┐       ▼
//!      └───────────────────────────────│ Streaming │ ◄─────┘
//!                                      └───────────┘
//!                        error / cancel: back to PendingQuery, nothing committed
//! ```

use tokio::sync::watch;

use crate::messages::{Conversation, Interaction, Metadata};

/// What the store needs to know about the stream controller
pub trait StreamGate {
    /// Whether a stream is in flight
    fn is_streaming(&self) -> bool;

    /// Abort the in-flight stream, if any
    fn cancel(&mut self);
}

/// Reducer actions
#[derive(Clone, Debug, PartialEq)]
pub enum ConversationAction {
    /// Accept a new query
    SetInput(String),
    /// Seal the answer to the pending query into history
    Commit {
        /// Full answer text
        output: String,
        /// Cited sources
        metadata: Metadata,
    },
    /// Cancel any stream and forget everything
    Reset,
}

/// Why an action was ignored
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RejectReason {
    /// Input was empty after trimming
    BlankInput,
    /// A stream is still running
    StreamActive,
    /// Commit without a pending query
    NothingPending,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankInput => write!(f, "input is blank"),
            Self::StreamActive => write!(f, "a stream is already active"),
            Self::NothingPending => write!(f, "no pending input to commit"),
        }
    }
}

/// Outcome of dispatching an action
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    /// State changed
    Accepted,
    /// Action ignored; state unchanged
    Rejected(RejectReason),
}

impl Transition {
    /// Whether the action changed state
    #[must_use]
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }
}

/// Where the conversation is in its per-interaction cycle
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConversationPhase {
    /// Nothing pending
    Idle,
    /// A query is accepted but no stream is running for it
    PendingQuery,
    /// A stream is running
    Streaming,
}

/// Reducer-style conversation state machine
pub struct ConversationStore {
    conversation: Conversation,
    updates: watch::Sender<Conversation>,
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversationStore {
    /// Create a store holding an empty conversation
    #[must_use]
    pub fn new() -> Self {
        let (updates, _) = watch::channel(Conversation::default());
        Self {
            conversation: Conversation::default(),
            updates,
        }
    }

    /// The current conversation
    #[must_use]
    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// Committed interactions, oldest first
    #[must_use]
    pub fn history(&self) -> &[Interaction] {
        &self.conversation.history
    }

    /// The pending query ("" when none)
    #[must_use]
    pub fn input(&self) -> &str {
        &self.conversation.input
    }

    /// Current phase, given the stream controller's state
    pub fn phase(&self, gate: &dyn StreamGate) -> ConversationPhase {
        if gate.is_streaming() {
            ConversationPhase::Streaming
        } else if self.conversation.has_pending_input() {
            ConversationPhase::PendingQuery
        } else {
            ConversationPhase::Idle
        }
    }

    /// Watch the conversation; updated on every accepted transition
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Conversation> {
        self.updates.subscribe()
    }

    /// Apply an action
    pub fn dispatch(&mut self, action: ConversationAction, gate: &mut dyn StreamGate) -> Transition {
        match action {
            ConversationAction::SetInput(value) => self.set_input(&value, gate),
            ConversationAction::Commit { output, metadata } => self.commit(output, metadata),
            ConversationAction::Reset => self.reset(gate),
        }
    }

    /// Accept `value` as the pending query
    ///
    /// Rejected while a stream is active; this is the back-pressure that
    /// keeps requests from overlapping.
    pub fn set_input(&mut self, value: &str, gate: &dyn StreamGate) -> Transition {
        let value = value.trim();
        if value.is_empty() {
            return self.reject(RejectReason::BlankInput);
        }
        if gate.is_streaming() {
            return self.reject(RejectReason::StreamActive);
        }

        self.conversation.input = value.to_string();
        tracing::debug!(input = %value, "Accepted pending input");
        self.publish();
        Transition::Accepted
    }

    /// Seal the answer to the pending query into history
    ///
    /// A second commit for the same query (a duplicate terminal event) finds
    /// no pending input and is ignored.
    pub fn commit(&mut self, output: String, metadata: Metadata) -> Transition {
        if !self.conversation.has_pending_input() {
            return self.reject(RejectReason::NothingPending);
        }

        let input = std::mem::take(&mut self.conversation.input);
        tracing::debug!(
            interactions = self.conversation.history.len() + 1,
            sources = metadata.sources.len(),
            "Committed interaction"
        );
        self.conversation.history.push(Interaction {
            input,
            output,
            metadata,
        });
        self.publish();
        Transition::Accepted
    }

    /// Cancel any active stream and clear history and pending input
    pub fn reset(&mut self, gate: &mut dyn StreamGate) -> Transition {
        gate.cancel();
        self.conversation = Conversation::default();
        tracing::debug!("Conversation reset");
        self.publish();
        Transition::Accepted
    }

    fn reject(&self, reason: RejectReason) -> Transition {
        tracing::debug!(%reason, "Rejected conversation action");
        Transition::Rejected(reason)
    }

    fn publish(&self) {
        self.updates.send_replace(self.conversation.clone());
    }
}
