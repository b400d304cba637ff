//! Audio plumbing: microphone capture, resampling and 16-bit WAV handling.
//!
//! # Pipeline
//!
//! ```text
//! Microphone → cpal callback → AudioChunk (mpsc) → stereo_to_mono
//!           → resample_linear (16 kHz) → MicRecorder → utterance.wav
//!
//! TTS WAV bytes → wav::decode → resample_clip (device rate) → speaker
//! ```

pub mod capture;
pub mod resample;
pub mod wav;

pub use capture::{
    recording_rms, AudioChunk, Capture, CaptureError, InputStream, MicRecorder, Recording,
    StreamHandle,
};
pub use resample::{mono_to_interleaved, resample_clip, resample_linear, stereo_to_mono, ResampleError};
pub use wav::{Pcm16, WavError};
