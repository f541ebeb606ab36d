//! Response Frame Codec
//!
//! Wire format for the completion service's streamed response body:
//! newline-delimited JSON, one frame per line.
//!
//! # Frame Format
//!
//! ```text
//! {"delta":"Sure"}\n                      text delta, appended verbatim
//! {"delta":", run"}\n
//! {"sources":[{"title":"README"}]}\n      terminal metadata block
//! ```
//!
//! Lines are split on raw bytes before UTF-8 decoding, so a multi-byte
//! character cut in half by the network is reassembled, not mangled.
//! Blank lines are ignored; a final frame without a trailing newline is
//! decoded by [`FrameDecoder::finish`].

use serde::Deserialize;

use crate::error::FrameError;
use crate::messages::{Metadata, Source};

/// Minimum buffer capacity for decoder
const MIN_BUFFER_CAPACITY: usize = 4096;

/// One decoded frame of the response body
#[derive(Clone, Debug, PartialEq)]
pub enum Frame {
    /// Incremental answer text
    Delta(String),
    /// Terminal citation block; nothing after it belongs to the answer
    Metadata(Metadata),
}

impl Frame {
    /// Whether this frame ends the stream
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Metadata(_))
    }
}

/// Raw line shape before classification
#[derive(Deserialize)]
struct RawFrame {
    delta: Option<String>,
    sources: Option<Vec<Source>>,
}

/// Parse a single line into a frame
///
/// # Errors
///
/// Returns a `FrameError` if the line is not UTF-8, not JSON, or carries
/// neither (or both) of `delta` and `sources`.
pub fn parse_frame(line: &[u8]) -> Result<Frame, FrameError> {
    let text = std::str::from_utf8(line)?;
    let raw: RawFrame = serde_json::from_str(text)?;

    match (raw.delta, raw.sources) {
        (Some(delta), None) => Ok(Frame::Delta(delta)),
        (None, Some(sources)) => Ok(Frame::Metadata(Metadata { sources })),
        _ => Err(FrameError::UnknownShape(text.trim().to_string())),
    }
}

/// Encode a frame as one NDJSON line (trailing newline included)
#[must_use]
pub fn encode_frame(frame: &Frame) -> Vec<u8> {
    let value = match frame {
        Frame::Delta(text) => serde_json::json!({ "delta": text }),
        Frame::Metadata(metadata) => serde_json::json!({ "sources": metadata.sources }),
    };
    let mut line = value.to_string().into_bytes();
    line.push(b'\n');
    line
}

/// Incremental decoder for the response body
///
/// Buffers incoming bytes and yields complete frames in arrival order.
#[derive(Debug)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    /// Position where we've consumed up to
    read_pos: usize,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    /// Create a new decoder with default buffer capacity
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(MIN_BUFFER_CAPACITY),
            read_pos: 0,
        }
    }

    /// Append bytes to the buffer
    pub fn push(&mut self, data: &[u8]) {
        // Compact buffer if we've consumed a lot
        if self.read_pos > self.buffer.len() / 2 && self.read_pos > MIN_BUFFER_CAPACITY {
            self.buffer.drain(..self.read_pos);
            self.read_pos = 0;
        }
        self.buffer.extend_from_slice(data);
    }

    /// Number of unconsumed bytes in the buffer
    #[must_use]
    pub fn available(&self) -> usize {
        self.buffer.len() - self.read_pos
    }

    /// Decode the next complete line
    ///
    /// Returns `None` when no complete line is buffered. A malformed line is
    /// consumed and returned as `Some(Err(..))` so the caller can skip it
    /// and keep going.
    pub fn next_frame(&mut self) -> Option<Result<Frame, FrameError>> {
        loop {
            let unread = &self.buffer[self.read_pos..];
            let newline = unread.iter().position(|&b| b == b'\n')?;
            let start = self.read_pos;
            self.read_pos += newline + 1;

            let line = &self.buffer[start..start + newline];
            if is_blank(line) {
                continue;
            }
            return Some(parse_frame(line));
        }
    }

    /// Decode whatever remains once the body has ended
    ///
    /// Handles a last frame sent without a trailing newline. Leaves the
    /// decoder empty.
    pub fn finish(&mut self) -> Option<Result<Frame, FrameError>> {
        let result = {
            let rest = &self.buffer[self.read_pos..];
            if is_blank(rest) {
                None
            } else {
                Some(parse_frame(rest))
            }
        };
        self.clear();
        result
    }

    /// Clear the buffer
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.read_pos = 0;
    }
}

fn is_blank(line: &[u8]) -> bool {
    line.iter().all(u8::is_ascii_whitespace)
}
