//! Spoken replies: synthesis, playback and lip-sync.
//!
//! * [`SpeechPipeline`]: ordered fetch/play workers with flush and cancel.
//! * [`SpeechSynthesizer`] / [`OpenAiSpeech`]: text → WAV clip.
//! * [`AudioSink`] / [`CpalSink`]: interruptible clip playback.
//! * [`MouthTimeline`] / [`MouthShape`]: energy-driven mouth animation.
//! * [`PlaybackMonitor`]: what the presenter polls while a clip plays.

pub mod mouth;
pub mod pipeline;
pub mod sink;
pub mod synth;

pub use mouth::{caption_window, MouthShape, MouthThresholds, MouthTimeline};
pub use pipeline::{FlushOutcome, PlaybackMonitor, SpeechPipeline};
pub use sink::{AudioSink, CpalSink, PlaybackError};
pub use synth::{OpenAiSpeech, SpeechSynthesizer, SynthError};
