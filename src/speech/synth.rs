//! Speech synthesis: one sentence in, one WAV clip out.

use std::time::Duration;

use thiserror::Error;

use crate::audio::wav;
use crate::config::OpenAiConfig;
use crate::http::{send_with_retry, snippet, RetryPolicy};

#[derive(Debug, Error)]
pub enum SynthError {
    #[error("speech request failed: {0}")]
    Request(String),

    #[error("speech API error {status}: {body}")]
    Api { status: u16, body: String },
}

impl From<reqwest::Error> for SynthError {
    fn from(e: reqwest::Error) -> Self {
        SynthError::Request(e.to_string())
    }
}

/// Turns text into a playable WAV clip.
pub trait SpeechSynthesizer: Send + Sync {
    fn synthesize(&self, text: &str) -> Result<Vec<u8>, SynthError>;
}

// ---------------------------------------------------------------------------
// OpenAiSpeech
// ---------------------------------------------------------------------------

/// `/v1/audio/speech` with `response_format: wav`.
///
/// When a positive gain is configured the clip is amplified locally; if the
/// clip cannot be decoded for that, the unamplified audio is used.
pub struct OpenAiSpeech {
    client: reqwest::blocking::Client,
    url: String,
    api_key: String,
    model: String,
    voice: String,
    speed: f32,
    instructions: Option<String>,
    gain_db: f32,
    retry: RetryPolicy,
}

impl OpenAiSpeech {
    pub fn from_config(config: &OpenAiConfig) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::blocking::Client::new());

        Self {
            client,
            url: format!("{}/v1/audio/speech", config.base_url.trim_end_matches('/')),
            api_key: config.api_key.clone().unwrap_or_default(),
            model: config.tts_model.clone(),
            voice: config.tts_voice.clone(),
            speed: config.tts_speed.clamp(0.25, 4.0),
            instructions: config.tts_instructions.clone().filter(|s| !s.is_empty()),
            gain_db: config.tts_gain_db,
            retry: RetryPolicy::default(),
        }
    }

    fn payload(&self, text: &str) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model":           self.model,
            "voice":           self.voice,
            "input":           text,
            "response_format": "wav",
            "speed":           self.speed,
        });
        if let Some(instructions) = &self.instructions {
            body["instructions"] = serde_json::Value::from(instructions.as_str());
        }
        body
    }
}

impl SpeechSynthesizer for OpenAiSpeech {
    fn synthesize(&self, text: &str) -> Result<Vec<u8>, SynthError> {
        let body = self.payload(text);
        let resp = send_with_retry(&self.retry, "tts", || {
            Ok(self
                .client
                .post(&self.url)
                .bearer_auth(&self.api_key)
                .json(&body))
        })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            return Err(SynthError::Api {
                status: status.as_u16(),
                body: snippet(&body, 200),
            });
        }

        let audio = resp.bytes()?.to_vec();
        match wav::apply_gain_db(&audio, self.gain_db) {
            Ok(louder) => Ok(louder),
            Err(e) => {
                log::warn!("tts: gain not applied: {e}");
                Ok(audio)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn speech(config: OpenAiConfig) -> OpenAiSpeech {
        OpenAiSpeech::from_config(&config)
    }

    #[test]
    fn speed_is_clamped() {
        let fast = speech(OpenAiConfig {
            tts_speed: 9.0,
            ..OpenAiConfig::default()
        });
        assert_eq!(fast.payload("hi")["speed"], 4.0);

        let slow = speech(OpenAiConfig {
            tts_speed: 0.1,
            ..OpenAiConfig::default()
        });
        assert_eq!(slow.payload("hi")["speed"], 0.25);
    }

    #[test]
    fn payload_asks_for_wav_and_carries_instructions() {
        let s = speech(OpenAiConfig {
            tts_instructions: Some("cheerful".into()),
            ..OpenAiConfig::default()
        });
        let p = s.payload("Hello there.");
        assert_eq!(p["input"], "Hello there.");
        assert_eq!(p["voice"], "alloy");
        assert_eq!(p["response_format"], "wav");
        assert_eq!(p["instructions"], "cheerful");

        let plain = speech(OpenAiConfig::default()).payload("x");
        assert!(plain.get("instructions").is_none());
    }
}
