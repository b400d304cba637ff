//! The single push-to-talk button and its status light.
//!
//! # Design
//!
//! On a desktop there is no GPIO button, so a global key stands in for it.
//! `rdev::listen()` is a blocking OS-level call that never returns while the
//! process is alive, so [`ButtonListener::start`] runs it on a **dedicated OS
//! thread** and calls the supplied handler for every press and release of the
//! configured key.  Key auto-repeat is collapsed: only the first press after a
//! release is reported.
//!
//! The status light is abstracted by [`Backlight`].  Color writes are
//! best-effort; the state machine logs failures and carries on.
//!
//! # Usage
//!
//! ```no_run
//! use talk_button::button::{parse_key, ButtonEvent, ButtonListener};
//!
//! let key = parse_key("F9").expect("unknown key");
//! let _listener = ButtonListener::start(key, |ev: ButtonEvent| {
//!     println!("{ev:?}");
//! });
//! ```

pub mod listener;

pub use listener::ButtonListener;

use crate::display::Rgb;

// ---------------------------------------------------------------------------
// ButtonEvent
// ---------------------------------------------------------------------------

/// Edges reported by the button.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonEvent {
    Pressed,
    Released,
}

// ---------------------------------------------------------------------------
// Backlight
// ---------------------------------------------------------------------------

/// Color primitive of the button's status light.
pub trait Backlight: Send + Sync {
    fn set_color(&self, color: Rgb) -> anyhow::Result<()>;
}

/// Backlight for hosts without a status LED: records the color in the log.
#[derive(Debug, Default)]
pub struct LogBacklight;

impl Backlight for LogBacklight {
    fn set_color(&self, color: Rgb) -> anyhow::Result<()> {
        log::debug!("button: light = {color}");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// parse_key
// ---------------------------------------------------------------------------

/// Parse a key name from a config string into an [`rdev::Key`].
///
/// Supports F1–F12, a few named keys, and single ASCII letters (either case).
/// Returns `None` for unrecognised names.
///
/// ```
/// use talk_button::button::parse_key;
///
/// assert_eq!(parse_key("F9"),     Some(rdev::Key::F9));
/// assert_eq!(parse_key("Space"),  Some(rdev::Key::Space));
/// assert_eq!(parse_key("b"),      Some(rdev::Key::KeyB));
/// assert_eq!(parse_key("xyz"),    None);
/// ```
pub fn parse_key(key_str: &str) -> Option<rdev::Key> {
    use rdev::Key::*;

    let key = match key_str {
        "F1" => F1,
        "F2" => F2,
        "F3" => F3,
        "F4" => F4,
        "F5" => F5,
        "F6" => F6,
        "F7" => F7,
        "F8" => F8,
        "F9" => F9,
        "F10" => F10,
        "F11" => F11,
        "F12" => F12,

        "Space" => Space,
        "Return" | "Enter" => Return,
        "Tab" => Tab,
        "CapsLock" => CapsLock,
        "ScrollLock" => ScrollLock,
        "Pause" => Pause,
        "Insert" => Insert,
        "Home" => Home,
        "End" => End,

        letter if letter.len() == 1 => return parse_letter(letter.chars().next()?),
        _ => return None,
    };
    Some(key)
}

fn parse_letter(c: char) -> Option<rdev::Key> {
    use rdev::Key::*;

    const LETTERS: [rdev::Key; 26] = [
        KeyA, KeyB, KeyC, KeyD, KeyE, KeyF, KeyG, KeyH, KeyI, KeyJ, KeyK, KeyL, KeyM, KeyN,
        KeyO, KeyP, KeyQ, KeyR, KeyS, KeyT, KeyU, KeyV, KeyW, KeyX, KeyY, KeyZ,
    ];

    let c = c.to_ascii_uppercase();
    if !c.is_ascii_uppercase() {
        return None;
    }
    LETTERS.get((c as u8 - b'A') as usize).copied()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
