//! Streaming Response Engine
//!
//! Turns a query plus conversation context into an ordered sequence of text
//! deltas and one terminal metadata block, while guaranteeing that at most
//! one network stream is live at any time.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        StreamController                          │
//! │                                                                  │
//! │  start(query, ctx) ──► generation += 1 ──► spawn pump(gen)       │
//! │                                               │                  │
//! │                                     backend.open(request)        │
//! │                                               │ body bytes       │
//! │                                               ▼                  │
//! │          mpsc ◄──── Envelope { generation, Bytes | End | Error } │
//! │           │                                                      │
//! │   poll() / next_events()                                         │
//! │           │  generation == current?  no ──► drop (stale)         │
//! │           ▼  yes                                                 │
//! │      FrameDecoder ──► Delta(text) ──► buffer.push_str            │
//! │                  └──► Metadata    ──► Completed, stop streaming  │
//! │                                                                  │
//! │      every change ──► broadcast::Sender<StreamState>             │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use knowbot_core::stream::{StreamController, StreamEvent};
//!
//! let mut controller = StreamController::new(Arc::new(backend));
//! controller.start("How do I install it?", &conversation, &config.completion);
//!
//! while controller.is_streaming() {
//!     for event in controller.next_events().await {
//!         if let StreamEvent::Delta(text) = event {
//!             print!("{text}");
//!         }
//!     }
//! }
//! ```

mod codec;
mod controller;

pub use codec::{encode_frame, parse_frame, Frame, FrameDecoder};
pub use controller::{
    StreamController, StreamControllerConfig, StreamEvent, StreamState, StreamStats,
};
