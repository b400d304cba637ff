//! Presentation sink: what the user sees while talking to the assistant.
//!
//! The session never draws anything itself.  It drives a [`Presenter`] with
//! high-level intents (a status card, streamed reply text, an animated
//! character whose mouth follows the speech) and the presenter decides how to
//! render them.  [`ConsolePresenter`] renders to the log and stdout.
//!
//! Presenter methods are infallible: a display problem must never take an
//! episode down, so implementations absorb and log their own errors.

pub mod console;

pub use console::ConsolePresenter;

use crate::speech::PlaybackMonitor;

// ---------------------------------------------------------------------------
// Rgb
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl std::fmt::Display for Rgb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.0, self.1, self.2)
    }
}

// ---------------------------------------------------------------------------
// StatusCard
// ---------------------------------------------------------------------------

/// Maximum characters of an error shown on the card.
const ERROR_TITLE_CHARS: usize = 50;

/// A full-screen status message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusCard {
    pub title: String,
    pub color: Rgb,
    pub subtitle: Option<String>,
    pub accent: Option<Rgb>,
}

impl StatusCard {
    pub fn new(title: impl Into<String>, color: Rgb) -> Self {
        Self {
            title: title.into(),
            color,
            subtitle: None,
            accent: None,
        }
    }

    pub fn subtitle(mut self, subtitle: impl Into<String>) -> Self {
        self.subtitle = Some(subtitle.into());
        self
    }

    pub fn accent(mut self, accent: Rgb) -> Self {
        self.accent = Some(accent);
        self
    }

    pub fn listening() -> Self {
        Self::new("Listening...", Rgb(140, 200, 255))
            .subtitle("Speak now")
            .accent(Rgb(60, 140, 255))
    }

    pub fn transcribing() -> Self {
        Self::new("Transcribing...", Rgb(255, 230, 100))
            .subtitle("One moment")
            .accent(Rgb(255, 180, 0))
    }

    pub fn no_speech() -> Self {
        Self::new("No speech detected", Rgb(160, 160, 160))
            .subtitle("Try again")
            .accent(Rgb(80, 80, 80))
    }

    /// Error card; long messages are cut and marked with `...`.
    pub fn error(message: &str) -> Self {
        let mut title: String = message.chars().take(ERROR_TITLE_CHARS).collect();
        if message.chars().count() > ERROR_TITLE_CHARS {
            title.push_str("...");
        }
        Self::new(title, Rgb(255, 120, 120))
            .subtitle("Something went wrong")
            .accent(Rgb(200, 0, 0))
    }
}

// ---------------------------------------------------------------------------
// CharacterState
// ---------------------------------------------------------------------------

/// Pose of the animated character.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharacterState {
    Listening,
    Thinking,
    Talking,
    Done,
}

impl CharacterState {
    pub fn label(self) -> &'static str {
        match self {
            CharacterState::Listening => "listening",
            CharacterState::Thinking => "thinking",
            CharacterState::Talking => "talking",
            CharacterState::Done => "done",
        }
    }
}

// ---------------------------------------------------------------------------
// Presenter
// ---------------------------------------------------------------------------

pub trait Presenter: Send + Sync {
    fn set_status(&self, card: &StatusCard);

    /// Resting screen (clock, "press to talk").  Clears any reply text.
    fn set_idle_screen(&self);

    /// Start the character animation.  With a monitor, the `Talking` pose
    /// follows its mouth shape and shows its caption.
    fn start_character(&self, state: CharacterState, monitor: Option<PlaybackMonitor>);
    fn set_character_state(&self, state: CharacterState);
    fn stop_character(&self);

    fn start_spinner(&self, label: &str);
    fn stop_spinner(&self);

    /// Replace the reply text.
    fn set_response_text(&self, text: &str);
    /// Append a streamed delta to the reply text.
    fn append_response(&self, delta: &str);
    /// Make sure the complete reply is visible.
    fn flush_response(&self);

    /// Backlight level, 0–100.
    fn set_backlight(&self, level: u8);
    fn sleep(&self);
    fn wake(&self);
    fn is_sleeping(&self) -> bool;

    /// Release the display on shutdown.
    fn cleanup(&self);
}

// ---------------------------------------------------------------------------
// Test double
// ---------------------------------------------------------------------------
