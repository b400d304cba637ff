//! Core transcription trait and the test double.
//!
//! [`Transcriber`] is the interface the session drives.  It is object-safe
//! and `Send + Sync` so it can be held behind an `Arc<dyn Transcriber>` and
//! called from the episode worker thread.
//!
//! [`MockTranscriber`] (available under `#[cfg(test)]`) returns a
//! pre-configured response and counts calls, which lets the session tests
//! assert that silent recordings never reach transcription.

use std::path::PathBuf;

use thiserror::Error;

use crate::audio::Recording;

// ---------------------------------------------------------------------------
// SttError
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Error)]
pub enum SttError {
    #[error("WAV file not found: {0}")]
    MissingRecording(PathBuf),

    #[error("WAV file too small ({0} bytes), likely empty recording")]
    RecordingTooSmall(u64),

    #[error("could not read recording: {0}")]
    Io(String),

    #[error("transcription request failed: {0}")]
    Request(String),

    #[error("transcription failed ({status}): {body}")]
    Api { status: u16, body: String },
}

impl From<reqwest::Error> for SttError {
    fn from(e: reqwest::Error) -> Self {
        SttError::Request(e.to_string())
    }
}

// ---------------------------------------------------------------------------
// Transcriber trait
// ---------------------------------------------------------------------------

/// Speech-to-text over a finished recording.
///
/// # Contract
///
/// - Returns the transcript trimmed of surrounding whitespace.
/// - An empty string means "nothing was said" and is not an error.
pub trait Transcriber: Send + Sync {
    fn transcribe(&self, recording: &Recording) -> Result<String, SttError>;
}

const _: fn() = || {
    fn _assert_object_safe(_: Box<dyn Transcriber>) {}
};

// ---------------------------------------------------------------------------
// MockTranscriber  (test-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
pub struct MockTranscriber {
    response: Result<String, SttError>,
    calls: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl MockTranscriber {
    pub fn ok(text: impl Into<String>) -> Self {
        Self {
            response: Ok(text.into()),
            calls: Default::default(),
        }
    }

    pub fn err(error: SttError) -> Self {
        Self {
            response: Err(error),
            calls: Default::default(),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
impl Transcriber for MockTranscriber {
    fn transcribe(&self, _recording: &Recording) -> Result<String, SttError> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        self.response.clone()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_ok_returns_text_and_counts() {
        let stt = MockTranscriber::ok("what time is it");
        let rec = Recording::new("/tmp/whatever.wav");
        assert_eq!(stt.transcribe(&rec).unwrap(), "what time is it");
        assert_eq!(stt.transcribe(&rec).unwrap(), "what time is it");
        assert_eq!(stt.calls(), 2);
    }

    #[test]
    fn mock_err_returns_configured_error() {
        let stt = MockTranscriber::err(SttError::RecordingTooSmall(44));
        let err = stt.transcribe(&Recording::new("x.wav")).unwrap_err();
        assert!(matches!(err, SttError::RecordingTooSmall(44)));
    }

    #[test]
    fn error_display_carries_status_and_body() {
        let e = SttError::Api {
            status: 401,
            body: "invalid key".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("401") && msg.contains("invalid key"));
    }
}
