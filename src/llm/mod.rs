//! Chat backend for the assistant's replies.
//!
//! This module provides:
//! * [`ChatBackend`]: trait implemented by streaming chat backends.
//! * [`ResponsesClient`]: `/v1/responses` client over server-sent events.
//! * [`ConversationHistory`] / [`ChatMessage`]: rolling context window.
//! * [`sse`]: line-level event decoding, usable over any `BufRead`.
//! * [`ChatError`]: error variants for chat operations.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use talk_button::config::AppConfig;
//! use talk_button::llm::{ChatBackend, ConversationHistory, ResponsesClient};
//!
//! let config = AppConfig::default();
//! let client = ResponsesClient::from_config(&config.chat);
//! let mut history = ConversationHistory::new(config.session.history_turns);
//!
//! let mut reply = String::new();
//! for delta in client.stream("what time is it", &history.messages()).unwrap() {
//!     reply.push_str(&delta.unwrap());
//! }
//! history.push_turn("what time is it", reply);
//! ```

pub mod client;
pub mod history;
pub mod sse;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use client::{request_body, ChatBackend, ChatError, ChatStream, ResponsesClient};
pub use history::{ChatMessage, ConversationHistory, Role};
pub use sse::{DeltaStream, StreamEvent};
