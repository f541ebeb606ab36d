//! Scripted Backend for Tests
//!
//! A `CompletionBackend` that replays queued responses instead of talking to
//! a service. Each call to `open` consumes the next script in FIFO order and
//! records the request it was given.
//!
//! # Usage
//!
//! ```ignore
//! use knowbot_core::backend::test_utils::{Script, ScriptedBackend};
//!
//! let backend = ScriptedBackend::new();
//! backend.push(Script::answer(&["Sure", ", run"], Metadata::default()));
//!
//! // A body the test feeds chunk by chunk
//! let live = backend.push_live();
//! live.send(Ok(b"{\"delta\":\"hi\"}\n".to_vec())).unwrap();
//! ```

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use futures::stream;
use tokio::sync::mpsc;

use super::traits::{ByteStream, CompletionBackend, CompletionRequest};
use crate::error::StreamError;
use crate::messages::Metadata;
use crate::stream::{encode_frame, Frame};

/// Sender half of a live scripted body
pub type LiveBody = mpsc::UnboundedSender<Result<Vec<u8>, StreamError>>;

/// One scripted response
pub enum Script {
    /// A complete body, delivered chunk by chunk
    Body(Vec<Result<Vec<u8>, StreamError>>),
    /// `open` fails before any byte arrives
    Fail(StreamError),
    /// A body fed by the test; it ends when the sender is dropped
    Live(mpsc::UnboundedReceiver<Result<Vec<u8>, StreamError>>),
}

impl Script {
    /// One delta frame per chunk, followed by the terminal metadata block
    #[must_use]
    pub fn answer(deltas: &[&str], metadata: Metadata) -> Self {
        let mut chunks: Vec<_> = deltas
            .iter()
            .map(|d| Ok(encode_frame(&Frame::Delta((*d).to_string()))))
            .collect();
        chunks.push(Ok(encode_frame(&Frame::Metadata(metadata))));
        Self::Body(chunks)
    }

    /// Delta frames only; the body ends without a terminal block
    #[must_use]
    pub fn truncated(deltas: &[&str]) -> Self {
        Self::Body(
            deltas
                .iter()
                .map(|d| Ok(encode_frame(&Frame::Delta((*d).to_string()))))
                .collect(),
        )
    }
}

/// Backend that replays scripted responses
#[derive(Default)]
pub struct ScriptedBackend {
    scripts: Mutex<VecDeque<Script>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedBackend {
    /// Create a backend with no scripts queued
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response
    pub fn push(&self, script: Script) {
        lock(&self.scripts).push_back(script);
    }

    /// Queue a live response and return the sender that feeds it
    pub fn push_live(&self) -> LiveBody {
        let (tx, rx) = mpsc::unbounded_channel();
        self.push(Script::Live(rx));
        tx
    }

    /// Requests received so far, in call order
    #[must_use]
    pub fn requests(&self) -> Vec<CompletionRequest> {
        lock(&self.requests).clone()
    }

    /// Number of `open` calls so far
    #[must_use]
    pub fn request_count(&self) -> usize {
        lock(&self.requests).len()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl CompletionBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn open(&self, request: CompletionRequest) -> Result<ByteStream, StreamError> {
        lock(&self.requests).push(request);
        let script = lock(&self.scripts).pop_front();

        match script {
            Some(Script::Body(chunks)) => Ok(Box::pin(stream::iter(chunks))),
            Some(Script::Fail(error)) => Err(error),
            Some(Script::Live(rx)) => Ok(Box::pin(stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|chunk| (chunk, rx))
            }))),
            None => Err(StreamError::Connect("no scripted response queued".to_string())),
        }
    }
}
