//! talk-button: push-to-talk voice assistant control plane.
//!
//! # Architecture
//!
//! ```text
//! ButtonListener (rdev thread)
//!        │ ButtonEvent
//!        ▼
//! Session::handle_button ──▶ PushToTalk (state machine + backlight)
//!        │                        │ PttHooks
//!        │                        ▼
//!        │              capture.start / cancel, speech.cancel
//!        │
//!        └─ release ──▶ episode-<gen> worker thread
//!                         │
//!                         ├─ Capture::stop + silence_score
//!                         ├─ Transcriber::transcribe           [TRANSCRIBING]
//!                         ├─ ChatBackend::stream               [THINKING → STREAMING]
//!                         │     └─ deltas ─▶ Presenter
//!                         │               └─ SentenceBatcher ─▶ SpeechPipeline::submit
//!                         └─ SpeechPipeline::flush, history, response hold
//!
//! SpeechPipeline:  submit ─▶ [fetcher] ─bounded─▶ [player] ─▶ AudioSink
//!                                                    └─ PlaybackMonitor (mouth, caption)
//! ```

pub mod audio;
pub mod button;
pub mod config;
pub mod display;
pub mod http;
pub mod llm;
pub mod pipeline;
pub mod speech;
pub mod stt;
pub mod sync;
