//! Lip-sync from the audio envelope.
//!
//! Each clip is cut into fixed windows (80 ms by default); the RMS of every
//! full window is bucketed into one of four mouth openings.  The resulting
//! [`MouthTimeline`] is computed once when a clip starts playing and is then
//! sampled by wall-clock time, so readers never touch the audio itself.
//!
//! The live caption works the same way: progress through the clip is
//! estimated from elapsed time, and the words around that point are shown.

use std::time::Duration;

use crate::audio::wav::{self, Pcm16};
use crate::config::SpeechConfig;

// ---------------------------------------------------------------------------
// MouthShape
// ---------------------------------------------------------------------------

/// Coarse mouth opening, from closed (0) to wide (3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MouthShape {
    Closed,
    Small,
    Open,
    Wide,
}

impl MouthShape {
    /// Numeric code 0–3.
    pub fn code(self) -> u8 {
        match self {
            MouthShape::Closed => 0,
            MouthShape::Small => 1,
            MouthShape::Open => 2,
            MouthShape::Wide => 3,
        }
    }
}

// ---------------------------------------------------------------------------
// MouthThresholds
// ---------------------------------------------------------------------------

/// Lower RMS bounds of the three open shapes.  Each bound is inclusive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MouthThresholds {
    pub small: f32,
    pub open: f32,
    pub wide: f32,
}

impl Default for MouthThresholds {
    fn default() -> Self {
        Self {
            small: 300.0,
            open: 1500.0,
            wide: 4000.0,
        }
    }
}

impl From<&SpeechConfig> for MouthThresholds {
    fn from(config: &SpeechConfig) -> Self {
        Self {
            small: config.mouth_small_rms,
            open: config.mouth_open_rms,
            wide: config.mouth_wide_rms,
        }
    }
}

impl MouthThresholds {
    pub fn shape_for_rms(&self, rms: f32) -> MouthShape {
        if rms < self.small {
            MouthShape::Closed
        } else if rms < self.open {
            MouthShape::Small
        } else if rms < self.wide {
            MouthShape::Open
        } else {
            MouthShape::Wide
        }
    }
}

// ---------------------------------------------------------------------------
// MouthTimeline
// ---------------------------------------------------------------------------

/// One mouth shape per full audio window, in playback order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MouthTimeline {
    shapes: Vec<MouthShape>,
    window: Duration,
}

impl MouthTimeline {
    /// Analyse a WAV clip.  Anything that is not decodable 16-bit PCM gives
    /// an empty timeline.
    pub fn from_wav(bytes: &[u8], window: Duration, thresholds: &MouthThresholds) -> Self {
        match wav::decode(bytes) {
            Ok(pcm) => Self::from_pcm(&pcm, window, thresholds),
            Err(e) => {
                log::debug!("speech: no mouth timeline: {e}");
                Self::empty(window)
            }
        }
    }

    pub fn from_pcm(pcm: &Pcm16, window: Duration, thresholds: &MouthThresholds) -> Self {
        let frames_per_window = pcm.sample_rate as u128 * window.as_millis() / 1000;
        let per_window = frames_per_window as usize * pcm.channels as usize;
        if per_window == 0 {
            return Self::empty(window);
        }

        let shapes = pcm
            .samples
            .chunks_exact(per_window)
            .map(|chunk| thresholds.shape_for_rms(wav::rms(chunk)))
            .collect();
        Self { shapes, window }
    }

    pub fn empty(window: Duration) -> Self {
        Self {
            shapes: Vec::new(),
            window,
        }
    }

    /// Shape at `elapsed` since playback start, `None` past the end.
    pub fn shape_at(&self, elapsed: Duration) -> Option<MouthShape> {
        let window_ms = self.window.as_millis();
        if window_ms == 0 {
            return None;
        }
        let idx = elapsed.as_millis() / window_ms;
        self.shapes.get(usize::try_from(idx).ok()?).copied()
    }

    /// Windows × window length.
    pub fn duration(&self) -> Duration {
        self.window * self.shapes.len() as u32
    }

    pub fn shapes(&self) -> &[MouthShape] {
        &self.shapes
    }

    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }
}

// ---------------------------------------------------------------------------
// caption_window
// ---------------------------------------------------------------------------

/// The trailing `max_words` of `text` up to the word being spoken now.
///
/// `elapsed` is time since playback start; `lag` holds the caption back so
/// it does not run ahead of the voice.  Returns an empty string before the
/// lag has passed or when the clip has no duration.
pub fn caption_window(
    text: &str,
    elapsed: Duration,
    duration: Duration,
    lag: Duration,
    max_words: usize,
) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() || duration.is_zero() || max_words == 0 {
        return String::new();
    }
    let Some(spoken) = elapsed.checked_sub(lag) else {
        return String::new();
    };

    let progress = (spoken.as_secs_f64() / duration.as_secs_f64()).min(1.0);
    let idx = ((progress * words.len() as f64) as usize).min(words.len() - 1);
    let end = idx + 1;
    let start = end.saturating_sub(max_words);
    words[start..end].join(" ")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
