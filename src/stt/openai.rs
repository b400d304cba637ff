//! Transcription through the OpenAI `/v1/audio/transcriptions` endpoint.

use std::time::Duration;

use reqwest::blocking::multipart::{Form, Part};

use crate::audio::capture::MIN_RECORDING_BYTES;
use crate::audio::Recording;
use crate::config::OpenAiConfig;
use crate::http::{send_with_retry, snippet, RetryPolicy};
use crate::stt::engine::{SttError, Transcriber};

/// Uploads the recording as multipart form data and asks for a plain-text
/// transcript.  Transient failures are retried per [`RetryPolicy`].
pub struct ApiTranscriber {
    client: reqwest::blocking::Client,
    url: String,
    api_key: String,
    model: String,
    retry: RetryPolicy,
}

impl ApiTranscriber {
    pub fn from_config(config: &OpenAiConfig) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::blocking::Client::new());

        Self {
            client,
            url: format!(
                "{}/v1/audio/transcriptions",
                config.base_url.trim_end_matches('/')
            ),
            api_key: config.api_key.clone().unwrap_or_default(),
            model: config.transcribe_model.clone(),
            retry: RetryPolicy::default(),
        }
    }

    fn read_recording(recording: &Recording) -> Result<Vec<u8>, SttError> {
        let meta = std::fs::metadata(&recording.path)
            .map_err(|_| SttError::MissingRecording(recording.path.clone()))?;
        if meta.len() < MIN_RECORDING_BYTES {
            return Err(SttError::RecordingTooSmall(meta.len()));
        }
        std::fs::read(&recording.path).map_err(|e| SttError::Io(e.to_string()))
    }
}

impl Transcriber for ApiTranscriber {
    fn transcribe(&self, recording: &Recording) -> Result<String, SttError> {
        let audio = Self::read_recording(recording)?;

        let resp = send_with_retry(&self.retry, "stt", || {
            let part = Part::bytes(audio.clone())
                .file_name("utterance.wav")
                .mime_str("audio/wav")?;
            let form = Form::new()
                .part("file", part)
                .text("model", self.model.clone())
                .text("response_format", "text");
            Ok(self
                .client
                .post(&self.url)
                .bearer_auth(&self.api_key)
                .multipart(form))
        })?;

        let status = resp.status();
        let body = resp.text()?;
        if !status.is_success() {
            return Err(SttError::Api {
                status: status.as_u16(),
                body: snippet(&body, 300),
            });
        }

        let transcript = body.trim().to_string();
        log::info!("stt: result: {}", snippet(&transcript, 120));
        Ok(transcript)
    }
}
