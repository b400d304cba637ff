//! Application settings structs, defaults and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`
//! so they can be round-tripped through TOML files and shared across threads.
//! Every section is `#[serde(default)]`, so a settings file only needs the
//! keys it wants to override.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::AppPaths;

// ---------------------------------------------------------------------------
// OpenAiConfig
// ---------------------------------------------------------------------------

/// Credentials and models for the transcription and speech endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiConfig {
    /// API key.  `None` (or empty) puts the assistant in dry-run mode.
    pub api_key: Option<String>,
    /// Base URL of the API, without the `/v1/...` suffix.
    pub base_url: String,
    /// Model used for `/v1/audio/transcriptions`.
    pub transcribe_model: String,
    /// Model used for `/v1/audio/speech`.
    pub tts_model: String,
    /// Voice name sent with every synthesis request.
    pub tts_voice: String,
    /// Playback speed, clamped to `0.25 ..= 4.0` on the wire.
    pub tts_speed: f32,
    /// Extra gain applied to synthesized audio, in dB.  `0` disables it.
    pub tts_gain_db: f32,
    /// Optional style instructions forwarded to the speech model.
    pub tts_instructions: Option<String>,
    /// Per-request timeout for transcription and synthesis calls.
    pub timeout_secs: u64,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.openai.com".into(),
            transcribe_model: "gpt-4o-mini-transcribe".into(),
            tts_model: "tts-1".into(),
            tts_voice: "alloy".into(),
            tts_speed: 2.0,
            tts_gain_db: 9.0,
            tts_instructions: None,
            timeout_secs: 30,
        }
    }
}

// ---------------------------------------------------------------------------
// ChatConfig
// ---------------------------------------------------------------------------

/// Settings for the streaming chat endpoint (`/v1/responses`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Base URL of the chat gateway.
    pub base_url: String,
    /// Bearer token; `None` for gateways that need no authentication.
    pub token: Option<String>,
    /// Model identifier sent in the request body.
    pub model: String,
    /// Seconds allowed for establishing the connection.
    pub connect_timeout_secs: u64,
    /// Upper bound in seconds for the whole streamed response.
    pub stream_timeout_secs: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:18789".into(),
            token: None,
            model: "openclaw".into(),
            connect_timeout_secs: 30,
            stream_timeout_secs: 120,
        }
    }
}

// ---------------------------------------------------------------------------
// AudioConfig
// ---------------------------------------------------------------------------

/// Settings for microphone capture, the silence gate and speaker output.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Input device name; `None` means the system default.
    pub input_device: Option<String>,
    /// Output device name; `None` means the system default.
    pub output_device: Option<String>,
    /// Sample rate of the WAV handed to transcription.
    pub sample_rate: u32,
    /// RMS over 16-bit samples below which a recording counts as silence.
    pub silence_rms_threshold: f32,
    /// Where the push-to-talk recording is written.
    pub recording_path: PathBuf,
    /// Recording stops accumulating samples after this many seconds.
    pub max_recording_secs: f32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            input_device: None,
            output_device: None,
            sample_rate: 16_000,
            silence_rms_threshold: 200.0,
            recording_path: AppPaths::new().recording_file,
            max_recording_secs: 120.0,
        }
    }
}

// ---------------------------------------------------------------------------
// SpeechConfig
// ---------------------------------------------------------------------------

/// Spoken-reply settings: queue sizing, barrier timeout and lip-sync tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    /// Speak the assistant response at all.
    pub enabled: bool,
    /// How many synthesized clips may wait ahead of the player.
    pub queue_depth: usize,
    /// Maximum seconds `flush` waits for queued speech to finish.
    pub flush_timeout_secs: u64,
    /// Mouth-shape time quantum in milliseconds.
    pub mouth_window_ms: u64,
    /// RMS at or above which the mouth is drawn "small".
    pub mouth_small_rms: f32,
    /// RMS at or above which the mouth is drawn "open".
    pub mouth_open_rms: f32,
    /// RMS at or above which the mouth is drawn "wide".
    pub mouth_wide_rms: f32,
    /// Caption delay so text does not run ahead of the voice.
    pub caption_lag_ms: u64,
    /// Number of trailing words shown as the live caption.
    pub caption_words: usize,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            queue_depth: 2,
            flush_timeout_secs: 120,
            mouth_window_ms: 80,
            mouth_small_rms: 300.0,
            mouth_open_rms: 1500.0,
            mouth_wide_rms: 4000.0,
            caption_lag_ms: 250,
            caption_words: 4,
        }
    }
}

impl SpeechConfig {
    pub fn flush_timeout(&self) -> Duration {
        Duration::from_secs(self.flush_timeout_secs)
    }
}

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

/// Timing of the interaction loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// A cancel press is ignored until the busy state has lasted this long.
    pub min_cancel_dwell_secs: f32,
    /// How long the finished response stays on screen.
    pub response_hold_secs: f32,
    /// How long the "No speech detected" card stays up.
    pub silence_hold_secs: f32,
    /// How long an error card stays up before returning to idle.
    pub error_hold_secs: f32,
    /// Number of user/assistant exchanges kept as chat context.
    pub history_turns: usize,
    /// Idle seconds before the display goes to sleep.
    pub sleep_timeout_secs: u64,
    /// Idle-screen redraw interval in seconds (keeps the clock current).
    pub idle_refresh_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            min_cancel_dwell_secs: 2.0,
            response_hold_secs: 30.0,
            silence_hold_secs: 1.5,
            error_hold_secs: 3.0,
            history_turns: 5,
            sleep_timeout_secs: 60,
            idle_refresh_secs: 30,
        }
    }
}

impl SessionConfig {
    pub fn min_cancel_dwell(&self) -> Duration {
        Duration::from_secs_f32(self.min_cancel_dwell_secs.max(0.0))
    }

    pub fn response_hold(&self) -> Duration {
        Duration::from_secs_f32(self.response_hold_secs.max(0.0))
    }

    pub fn silence_hold(&self) -> Duration {
        Duration::from_secs_f32(self.silence_hold_secs.max(0.0))
    }

    pub fn error_hold(&self) -> Duration {
        Duration::from_secs_f32(self.error_hold_secs.max(0.0))
    }

    pub fn sleep_timeout(&self) -> Duration {
        Duration::from_secs(self.sleep_timeout_secs)
    }

    pub fn idle_refresh(&self) -> Duration {
        Duration::from_secs(self.idle_refresh_secs)
    }
}

// ---------------------------------------------------------------------------
// ButtonConfig / DisplayConfig
// ---------------------------------------------------------------------------

/// The physical (or emulated) push-to-talk button.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ButtonConfig {
    /// Key that acts as the button (e.g. `"F9"`).
    pub push_to_talk_key: String,
}

impl Default for ButtonConfig {
    fn default() -> Self {
        Self {
            push_to_talk_key: "F9".into(),
        }
    }
}

/// Presentation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Backlight level restored whenever the session returns to idle (0–100).
    pub backlight: u8,
    /// Upper bound on character-animation redraws per second.
    pub max_fps: u32,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            backlight: 70,
            max_fps: 4,
        }
    }
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level application configuration, serialised as `settings.toml`.
///
/// # Persistence
///
/// ```rust,no_run
/// use talk_button::config::AppConfig;
///
/// // Load (returns Default when file is missing), then overlay env vars.
/// let mut config = AppConfig::load().unwrap();
/// config.apply_env();
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub openai: OpenAiConfig,
    pub chat: ChatConfig,
    pub audio: AudioConfig,
    pub speech: SpeechConfig,
    pub session: SessionConfig,
    pub button: ButtonConfig,
    pub display: DisplayConfig,
}

impl AppConfig {
    /// Load configuration from the platform-appropriate `settings.toml`.
    ///
    /// Returns `Ok(AppConfig::default())` when the file does not exist yet.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().settings_file)
    }

    /// Load from an explicit path (useful for tests).
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the platform-appropriate `settings.toml`,
    /// creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&AppPaths::new().settings_file)
    }

    /// Save to an explicit path (useful for tests).
    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Overlay secrets and deployment knobs from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    /// Overlay values from an arbitrary lookup (the environment in
    /// production, a map in tests).  Unparseable numbers are logged and
    /// ignored.
    pub fn apply_env_from(&mut self, get: impl Fn(&str) -> Option<String>) {
        if let Some(key) = get("OPENAI_API_KEY") {
            self.openai.api_key = Some(key);
        }
        if let Some(token) = get("OPENCLAW_TOKEN") {
            self.chat.token = Some(token);
        }
        if let Some(url) = get("OPENCLAW_BASE_URL") {
            self.chat.base_url = url;
        }
        if let Some(flag) = get("ENABLE_TTS") {
            self.speech.enabled = matches!(flag.to_lowercase().as_str(), "true" | "1" | "yes");
        }
        if let Some(raw) = get("SILENCE_RMS_THRESHOLD") {
            match raw.parse() {
                Ok(v) => self.audio.silence_rms_threshold = v,
                Err(e) => log::warn!("config: ignoring SILENCE_RMS_THRESHOLD={raw:?}: {e}"),
            }
        }
        if let Some(raw) = get("CONVERSATION_HISTORY_LENGTH") {
            match raw.parse() {
                Ok(v) => self.session.history_turns = v,
                Err(e) => log::warn!("config: ignoring CONVERSATION_HISTORY_LENGTH={raw:?}: {e}"),
            }
        }
    }

    /// `true` when no OpenAI key is configured: transcription falls back to
    /// typed input and speech synthesis is skipped.
    pub fn dry_run(&self) -> bool {
        self.openai.api_key.as_deref().map_or(true, str::is_empty)
    }

    /// Log the non-secret parts of the configuration.
    pub fn log_summary(&self) {
        log::info!("config: transcribe model = {}", self.openai.transcribe_model);
        log::info!(
            "config: tts = {} / {} @ {}x, gain {} dB, enabled = {}",
            self.openai.tts_model,
            self.openai.tts_voice,
            self.openai.tts_speed,
            self.openai.tts_gain_db,
            self.speech.enabled
        );
        log::info!("config: chat = {} ({})", self.chat.base_url, self.chat.model);
        log::info!(
            "config: audio in = {}, out = {}, {} Hz, silence < {}",
            self.audio.input_device.as_deref().unwrap_or("default"),
            self.audio.output_device.as_deref().unwrap_or("default"),
            self.audio.sample_rate,
            self.audio.silence_rms_threshold
        );
        log::info!(
            "config: history = {} turns, dry run = {}, api key set = {}, chat token set = {}",
            self.session.history_turns,
            self.dry_run(),
            !self.dry_run(),
            self.chat.token.as_deref().is_some_and(|t| !t.is_empty())
        );
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn round_trip_toml() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("settings.toml");

        let original = AppConfig::default();
        original.save_to(&path).expect("save");

        let loaded = AppConfig::load_from(&path).expect("load");

        assert_eq!(original.openai.tts_voice, loaded.openai.tts_voice);
        assert_eq!(original.chat.base_url, loaded.chat.base_url);
        assert_eq!(
            original.audio.silence_rms_threshold,
            loaded.audio.silence_rms_threshold
        );
        assert_eq!(original.speech.queue_depth, loaded.speech.queue_depth);
        assert_eq!(
            original.session.min_cancel_dwell_secs,
            loaded.session.min_cancel_dwell_secs
        );
        assert_eq!(
            original.button.push_to_talk_key,
            loaded.button.push_to_talk_key
        );
    }

    #[test]
    fn load_missing_returns_default() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("nonexistent.toml");

        let config = AppConfig::load_from(&path).expect("should not error");
        assert_eq!(config.session.history_turns, 5);
        assert!(!config.speech.enabled);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("partial.toml");
        std::fs::write(&path, "[session]\nresponse_hold_secs = 5.0\n").unwrap();

        let config = AppConfig::load_from(&path).expect("load");
        assert_eq!(config.session.response_hold_secs, 5.0);
        assert_eq!(config.session.min_cancel_dwell_secs, 2.0);
        assert_eq!(config.chat.model, "openclaw");
    }

    #[test]
    fn default_values() {
        let cfg = AppConfig::default();

        assert_eq!(cfg.openai.transcribe_model, "gpt-4o-mini-transcribe");
        assert_eq!(cfg.openai.tts_speed, 2.0);
        assert_eq!(cfg.chat.base_url, "http://localhost:18789");
        assert_eq!(cfg.audio.silence_rms_threshold, 200.0);
        assert_eq!(cfg.speech.queue_depth, 2);
        assert_eq!(cfg.speech.flush_timeout(), Duration::from_secs(120));
        assert_eq!(cfg.speech.mouth_window_ms, 80);
        assert_eq!(cfg.session.min_cancel_dwell(), Duration::from_secs(2));
        assert_eq!(cfg.session.response_hold(), Duration::from_secs(30));
        assert_eq!(cfg.session.sleep_timeout(), Duration::from_secs(60));
        assert_eq!(cfg.display.backlight, 70);
        assert!(cfg.dry_run());
    }

    #[test]
    fn env_overlay_sets_secrets_and_flags() {
        let env: HashMap<&str, &str> = [
            ("OPENAI_API_KEY", "sk-test"),
            ("OPENCLAW_TOKEN", "tok"),
            ("ENABLE_TTS", "Yes"),
            ("SILENCE_RMS_THRESHOLD", "350"),
            ("CONVERSATION_HISTORY_LENGTH", "not-a-number"),
        ]
        .into_iter()
        .collect();

        let mut cfg = AppConfig::default();
        cfg.apply_env_from(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(cfg.openai.api_key.as_deref(), Some("sk-test"));
        assert_eq!(cfg.chat.token.as_deref(), Some("tok"));
        assert!(cfg.speech.enabled);
        assert_eq!(cfg.audio.silence_rms_threshold, 350.0);
        // Bad value ignored, default kept.
        assert_eq!(cfg.session.history_turns, 5);
        assert!(!cfg.dry_run());
    }

    #[test]
    fn empty_api_key_is_dry_run() {
        let mut cfg = AppConfig::default();
        cfg.openai.api_key = Some(String::new());
        assert!(cfg.dry_run());
    }
}
