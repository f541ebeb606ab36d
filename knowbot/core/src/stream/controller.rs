//! Stream Controller Implementation
//!
//! Owns the single in-flight completion stream and its observable state.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::{FutureExt, StreamExt};
use tokio::sync::{broadcast, mpsc};
use tokio::task::AbortHandle;

use super::codec::{Frame, FrameDecoder};
use crate::backend::{CompletionBackend, CompletionConfig, CompletionRequest};
use crate::conversation::StreamGate;
use crate::error::StreamError;
use crate::messages::{Conversation, Metadata};

// ============================================================================
// Configuration
// ============================================================================

/// Configuration for the stream controller
#[derive(Clone, Debug)]
pub struct StreamControllerConfig {
    /// Snapshots buffered per subscriber before slow subscribers start lagging
    pub snapshot_capacity: usize,
}

impl Default for StreamControllerConfig {
    fn default() -> Self {
        Self {
            snapshot_capacity: 256,
        }
    }
}

// ============================================================================
// State and Events
// ============================================================================

/// Observable state of the current (or most recent) stream
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StreamState {
    /// Whether a stream is in flight
    pub is_streaming: bool,
    /// Deltas received so far, concatenated in arrival order
    pub buffer: String,
    /// Terminal metadata, empty until the terminal block arrives
    pub metadata: Metadata,
    /// Number of the stream this state belongs to
    pub generation: u64,
}

/// What applying inbound data produced
#[derive(Clone, Debug, PartialEq)]
pub enum StreamEvent {
    /// Answer text appended to the buffer
    Delta(String),
    /// Terminal metadata arrived; the answer is final
    Completed {
        /// The full answer
        output: String,
        /// Cited sources
        metadata: Metadata,
    },
    /// The stream ended without a terminal block
    Failed {
        /// Why it ended
        error: StreamError,
        /// Text received before the failure (never committed)
        partial: String,
    },
}

impl StreamEvent {
    /// Whether this event ends the stream
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Delta(_))
    }
}

/// Counters for diagnostics
#[derive(Clone, Debug, Default)]
pub struct StreamStats {
    /// Streams started (lifetime)
    pub streams_started: u64,
    /// Streams cancelled or superseded
    pub streams_cancelled: u64,
    /// Delta frames applied
    pub deltas_applied: u64,
    /// Frames skipped because they could not be decoded
    pub malformed_frames: u64,
    /// Signals dropped because their stream was no longer current
    pub stale_signals: u64,
}

/// Signal forwarded from the pump task
#[derive(Debug)]
enum StreamSignal {
    /// A chunk of body bytes
    Bytes(Vec<u8>),
    /// Body ended cleanly
    End,
    /// Request or body failed
    Error(StreamError),
}

/// A signal tagged with the stream it came from
#[derive(Debug)]
struct Envelope {
    generation: u64,
    signal: StreamSignal,
}

// ============================================================================
// Stream Controller
// ============================================================================

/// Manages exactly one logical request/response stream
///
/// Network I/O runs in a spawned pump task that only forwards raw bytes;
/// every state change happens here, on the owner's task, through `&mut self`.
/// Signals carry the generation of the stream that produced them, so bytes
/// from a cancelled or superseded stream can never reach the current buffer.
pub struct StreamController<B: CompletionBackend> {
    /// Completion transport
    backend: Arc<B>,
    /// Current observable state
    state: StreamState,
    /// Line decoder for the current body
    decoder: FrameDecoder,
    /// Abort handle of the current pump task
    pump: Option<AbortHandle>,
    /// Sender cloned into each pump task
    signal_tx: mpsc::UnboundedSender<Envelope>,
    /// Signals from all pump tasks, in arrival order
    signal_rx: mpsc::UnboundedReceiver<Envelope>,
    /// Snapshot broadcaster
    snapshots: broadcast::Sender<StreamState>,
    /// Diagnostics
    stats: StreamStats,
}

impl<B: CompletionBackend + 'static> StreamController<B> {
    /// Create a controller with default configuration
    pub fn new(backend: Arc<B>) -> Self {
        Self::with_config(backend, StreamControllerConfig::default())
    }

    /// Create a controller with custom configuration
    pub fn with_config(backend: Arc<B>, config: StreamControllerConfig) -> Self {
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let (snapshots, _) = broadcast::channel(config.snapshot_capacity.max(1));

        Self {
            backend,
            state: StreamState::default(),
            decoder: FrameDecoder::new(),
            pump: None,
            signal_tx,
            signal_rx,
            snapshots,
            stats: StreamStats::default(),
        }
    }

    /// Whether a stream is in flight
    #[must_use]
    pub fn is_streaming(&self) -> bool {
        self.state.is_streaming
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> &StreamState {
        &self.state
    }

    /// Text received so far for the current (or last) stream
    #[must_use]
    pub fn buffer(&self) -> &str {
        &self.state.buffer
    }

    /// Generation of the current (or last) stream
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.state.generation
    }

    /// Diagnostics counters
    #[must_use]
    pub fn stats(&self) -> &StreamStats {
        &self.stats
    }

    /// Subscribe to state snapshots
    ///
    /// A snapshot is sent on every buffer, metadata or `is_streaming` change.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<StreamState> {
        self.snapshots.subscribe()
    }

    /// Start streaming an answer for `query`
    ///
    /// Cancels any active stream first, then spawns the request. Returns
    /// `false` (and does nothing) if `query` is blank.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&mut self, query: &str, context: &Conversation, config: &CompletionConfig) -> bool {
        if query.trim().is_empty() {
            tracing::debug!("Rejected stream start with blank query");
            return false;
        }

        if self.state.is_streaming {
            tracing::debug!(
                generation = self.state.generation,
                "Superseding active stream"
            );
            self.cancel();
        }

        let generation = self.state.generation + 1;
        self.state = StreamState {
            is_streaming: true,
            buffer: String::new(),
            metadata: Metadata::default(),
            generation,
        };
        self.decoder.clear();
        self.stats.streams_started += 1;

        let request = CompletionRequest::build(query, context, config);
        tracing::info!(
            generation,
            backend = self.backend.name(),
            history = request.history.len(),
            "Starting completion stream"
        );

        let task = tokio::spawn(supervise(
            Arc::clone(&self.backend),
            request,
            generation,
            self.signal_tx.clone(),
        ));
        self.pump = Some(task.abort_handle());

        self.notify();
        true
    }

    /// Abort the active stream
    ///
    /// Leaves the buffer readable and emits no terminal event. Returns
    /// `false` if nothing was streaming.
    pub fn cancel(&mut self) -> bool {
        if !self.state.is_streaming {
            return false;
        }

        self.stop_pump();
        self.state.is_streaming = false;
        self.stats.streams_cancelled += 1;
        tracing::info!(
            generation = self.state.generation,
            buffered = self.state.buffer.len(),
            "Cancelled completion stream"
        );

        self.notify();
        true
    }

    /// Apply every signal already received (non-blocking)
    pub fn poll(&mut self) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        while let Ok(envelope) = self.signal_rx.try_recv() {
            events.extend(self.apply(envelope));
        }
        events
    }

    /// Wait until the active stream produces at least one event
    ///
    /// Returns immediately with no events when nothing is streaming. Safe to
    /// use as a `tokio::select!` branch: a signal is applied in the same poll
    /// that receives it.
    pub async fn next_events(&mut self) -> Vec<StreamEvent> {
        loop {
            if !self.state.is_streaming {
                return Vec::new();
            }

            let Some(envelope) = self.signal_rx.recv().await else {
                return Vec::new();
            };

            let mut events = self.apply(envelope);
            events.extend(self.poll());
            if !events.is_empty() {
                return events;
            }
        }
    }

    /// Apply one signal, dropping it if it belongs to a stale stream
    fn apply(&mut self, envelope: Envelope) -> Vec<StreamEvent> {
        if envelope.generation != self.state.generation || !self.state.is_streaming {
            self.stats.stale_signals += 1;
            tracing::trace!(
                signal_generation = envelope.generation,
                current_generation = self.state.generation,
                "Dropped stale stream signal"
            );
            return Vec::new();
        }

        match envelope.signal {
            StreamSignal::Bytes(bytes) => {
                self.decoder.push(&bytes);
                let mut events = Vec::new();
                while self.state.is_streaming {
                    match self.decoder.next_frame() {
                        Some(result) => events.extend(self.apply_frame(result)),
                        None => break,
                    }
                }
                events
            }
            StreamSignal::End => {
                let mut events = Vec::new();
                if let Some(result) = self.decoder.finish() {
                    events.extend(self.apply_frame(result));
                }
                if self.state.is_streaming {
                    events.push(self.fail(StreamError::Truncated));
                }
                events
            }
            StreamSignal::Error(error) => vec![self.fail(error)],
        }
    }

    /// Apply one decoded (or undecodable) frame
    fn apply_frame(
        &mut self,
        result: Result<Frame, crate::error::FrameError>,
    ) -> Option<StreamEvent> {
        match result {
            Ok(Frame::Delta(text)) => {
                self.state.buffer.push_str(&text);
                self.stats.deltas_applied += 1;
                self.notify();
                Some(StreamEvent::Delta(text))
            }
            Ok(Frame::Metadata(metadata)) => Some(self.complete(metadata)),
            Err(e) => {
                self.stats.malformed_frames += 1;
                tracing::warn!(
                    generation = self.state.generation,
                    error = %e,
                    "Skipping malformed stream frame"
                );
                None
            }
        }
    }

    /// Finish the stream with its terminal metadata
    fn complete(&mut self, metadata: Metadata) -> StreamEvent {
        self.stop_pump();
        self.decoder.clear();
        self.state.metadata = metadata.clone();
        self.state.is_streaming = false;
        tracing::info!(
            generation = self.state.generation,
            chars = self.state.buffer.len(),
            sources = metadata.sources.len(),
            "Completion stream finished"
        );
        self.notify();

        StreamEvent::Completed {
            output: self.state.buffer.clone(),
            metadata,
        }
    }

    /// End the stream without terminal metadata
    fn fail(&mut self, error: StreamError) -> StreamEvent {
        self.stop_pump();
        self.decoder.clear();
        self.state.is_streaming = false;
        tracing::warn!(
            generation = self.state.generation,
            error = %error,
            partial = self.state.buffer.len(),
            "Completion stream failed"
        );
        self.notify();

        StreamEvent::Failed {
            error,
            partial: self.state.buffer.clone(),
        }
    }

    fn stop_pump(&mut self) {
        if let Some(handle) = self.pump.take() {
            handle.abort();
        }
    }

    fn notify(&self) {
        // No subscribers is fine
        let _ = self.snapshots.send(self.state.clone());
    }
}

impl<B: CompletionBackend + 'static> StreamGate for StreamController<B> {
    fn is_streaming(&self) -> bool {
        self.state.is_streaming
    }

    fn cancel(&mut self) {
        StreamController::cancel(self);
    }
}

impl<B: CompletionBackend> Drop for StreamController<B> {
    fn drop(&mut self) {
        if let Some(handle) = self.pump.take() {
            handle.abort();
        }
    }
}

/// Run the pump, turning a backend panic into a transport failure
///
/// Without this a panicking backend would end the task without a terminal
/// signal and leave `next_events` waiting forever.
async fn supervise<B: CompletionBackend>(
    backend: Arc<B>,
    request: CompletionRequest,
    generation: u64,
    tx: mpsc::UnboundedSender<Envelope>,
) {
    let outcome = AssertUnwindSafe(pump(backend, request, generation, tx.clone()))
        .catch_unwind()
        .await;

    if outcome.is_err() {
        tracing::error!(generation, "Completion backend panicked");
        let _ = tx.send(Envelope {
            generation,
            signal: StreamSignal::Error(StreamError::Transport(
                "completion backend panicked".to_string(),
            )),
        });
    }
}

/// Open the request and forward its body, tagged with `generation`
async fn pump<B: CompletionBackend>(
    backend: Arc<B>,
    request: CompletionRequest,
    generation: u64,
    tx: mpsc::UnboundedSender<Envelope>,
) {
    let send = |signal| tx.send(Envelope { generation, signal }).is_ok();

    let mut body = match backend.open(request).await {
        Ok(body) => body,
        Err(error) => {
            send(StreamSignal::Error(error));
            return;
        }
    };

    while let Some(chunk) = body.next().await {
        let signal = match chunk {
            Ok(bytes) => StreamSignal::Bytes(bytes),
            Err(error) => {
                send(StreamSignal::Error(error));
                return;
            }
        };
        if !send(signal) {
            // Controller dropped
            return;
        }
    }

    send(StreamSignal::End);
}

// ============================================================================
// Tests
// ============================================================================
