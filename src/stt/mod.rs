//! Speech-to-text.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                Transcriber (trait)                   │
//! │                                                      │
//! │   ┌────────────────┐        ┌───────────────────┐    │
//! │   │ ApiTranscriber │        │ DryRunTranscriber │    │
//! │   │ multipart POST │        │ one stdin line    │    │
//! │   │ + retry        │        │ per utterance     │    │
//! │   └───────┬────────┘        └─────────┬─────────┘    │
//! │           └──────────┬────────────────┘              │
//! │                      ▼                               │
//! │        transcribe(&Recording) → String               │
//! └──────────────────────────────────────────────────────┘
//! ```

pub mod dry_run;
pub mod engine;
pub mod openai;

pub use dry_run::DryRunTranscriber;
pub use engine::{SttError, Transcriber};
pub use openai::ApiTranscriber;

#[cfg(test)]
pub use engine::MockTranscriber;
