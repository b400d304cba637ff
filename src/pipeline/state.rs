//! Push-to-talk interaction state machine.
//!
//! [`PushToTalk`] turns raw button edges into state transitions and hook
//! calls.  It owns the single state cell every other component reads, and
//! mirrors each state onto the button backlight.
//!
//! ```text
//!            press                     release
//! Idle ─────────────▶ Listening ─────────────────▶ (episode worker)
//! Error ────────────▶     │                          Transcribing
//!                         │ press                    Thinking
//!                         ▼                          Streaming
//!                       Idle  ◀──── press, dwell ≥ min (cancel) ──┘
//!                                   press, dwell < min: ignored
//! ```
//!
//! Hooks are best-effort: each returns `anyhow::Result`, failures are logged
//! and never stop the state assignment.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::button::Backlight;
use crate::display::Rgb;
use crate::sync::lock;

// ---------------------------------------------------------------------------
// InteractionState
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InteractionState {
    #[default]
    Idle,
    Listening,
    Transcribing,
    Thinking,
    Streaming,
    Error,
}

impl InteractionState {
    /// `true` while an episode is being processed after release.
    ///
    /// ```
    /// use talk_button::pipeline::InteractionState;
    ///
    /// assert!(!InteractionState::Idle.is_busy());
    /// assert!(!InteractionState::Listening.is_busy());
    /// assert!(InteractionState::Transcribing.is_busy());
    /// assert!(InteractionState::Thinking.is_busy());
    /// assert!(InteractionState::Streaming.is_busy());
    /// assert!(!InteractionState::Error.is_busy());
    /// ```
    pub fn is_busy(self) -> bool {
        matches!(
            self,
            InteractionState::Transcribing | InteractionState::Thinking | InteractionState::Streaming
        )
    }

    pub fn label(self) -> &'static str {
        match self {
            InteractionState::Idle => "Idle",
            InteractionState::Listening => "Listening",
            InteractionState::Transcribing => "Transcribing",
            InteractionState::Thinking => "Thinking",
            InteractionState::Streaming => "Streaming",
            InteractionState::Error => "Error",
        }
    }

    /// Backlight color for this state.  Idle is never written, so the
    /// button keeps whatever its resting color is.
    pub fn color(self) -> Option<Rgb> {
        match self {
            InteractionState::Idle => None,
            InteractionState::Listening => Some(Rgb(0, 80, 255)),
            InteractionState::Transcribing | InteractionState::Thinking => Some(Rgb(255, 200, 0)),
            InteractionState::Streaming => Some(Rgb(0, 200, 50)),
            InteractionState::Error => Some(Rgb(255, 0, 0)),
        }
    }
}

// ---------------------------------------------------------------------------
// Hooks
// ---------------------------------------------------------------------------

/// Callbacks the state machine fires on transitions.
pub trait PttHooks: Send + Sync {
    /// Any press, before the transition is decided.
    fn on_wake(&self) -> anyhow::Result<()>;
    /// Idle/Error → Listening.
    fn on_press(&self) -> anyhow::Result<()>;
    /// Release while Listening.
    fn on_release(&self) -> anyhow::Result<()>;
    /// Press while busy, once the dwell gate allows it.
    fn on_cancel(&self) -> anyhow::Result<()>;
    /// Press while Listening.
    fn on_abort_listening(&self) -> anyhow::Result<()>;
    /// Whether a press while busy may cancel right now.
    fn cancel_allowed(&self) -> bool;
}

// Compile-time assertion that PttHooks is object-safe.
const _: fn() = || {
    fn _assert_object_safe(_: Box<dyn PttHooks>) {}
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PressOutcome {
    Started,
    AbortedListening,
    Cancelled,
    Ignored,
}

// ---------------------------------------------------------------------------
// PushToTalk
// ---------------------------------------------------------------------------

struct Cell {
    state: InteractionState,
    entered_at: Instant,
}

pub struct PushToTalk {
    cell: Mutex<Cell>,
    /// Serializes state writes with their backlight side effect.
    write: Mutex<()>,
    backlight: Arc<dyn Backlight>,
}

impl PushToTalk {
    pub fn new(backlight: Arc<dyn Backlight>) -> Self {
        Self {
            cell: Mutex::new(Cell {
                state: InteractionState::Idle,
                entered_at: Instant::now(),
            }),
            write: Mutex::new(()),
            backlight,
        }
    }

    pub fn state(&self) -> InteractionState {
        lock(&self.cell).state
    }

    /// Time since the current state was entered.
    pub fn dwell(&self) -> Duration {
        lock(&self.cell).entered_at.elapsed()
    }

    pub fn set_state(&self, state: InteractionState) {
        let _write = lock(&self.write);
        self.write_state(state);
    }

    /// Transition only if `still_valid()` holds, checked under the same write
    /// lock as the transition itself. Returns whether the state was written.
    pub fn set_state_if(
        &self,
        state: InteractionState,
        still_valid: impl FnOnce() -> bool,
    ) -> bool {
        let _write = lock(&self.write);
        if !still_valid() {
            log::debug!("ptt: skipped stale transition to {}", state.label());
            return false;
        }
        self.write_state(state);
        true
    }

    fn write_state(&self, state: InteractionState) {
        {
            let mut cell = lock(&self.cell);
            cell.state = state;
            cell.entered_at = Instant::now();
        }
        log::debug!("ptt: state → {}", state.label());
        if let Some(color) = state.color() {
            if let Err(e) = self.backlight.set_color(color) {
                log::warn!("ptt: backlight write failed: {e:#}");
            }
        }
    }

    pub fn on_press(&self, hooks: &dyn PttHooks) -> PressOutcome {
        run_hook("wake", hooks.on_wake());

        match self.state() {
            InteractionState::Listening => {
                run_hook("abort-listening", hooks.on_abort_listening());
                self.set_state(InteractionState::Idle);
                PressOutcome::AbortedListening
            }
            s if s.is_busy() => {
                if !hooks.cancel_allowed() {
                    log::debug!("ptt: press ignored ({} dwell too short)", s.label());
                    return PressOutcome::Ignored;
                }
                self.set_state(InteractionState::Idle);
                run_hook("cancel", hooks.on_cancel());
                PressOutcome::Cancelled
            }
            _ => {
                self.set_state(InteractionState::Listening);
                run_hook("press", hooks.on_press());
                PressOutcome::Started
            }
        }
    }

    /// Returns whether the release hook fired.
    pub fn on_release(&self, hooks: &dyn PttHooks) -> bool {
        if self.state() != InteractionState::Listening {
            return false;
        }
        run_hook("release", hooks.on_release());
        true
    }
}

fn run_hook(name: &str, result: anyhow::Result<()>) {
    if let Err(e) = result {
        log::error!("ptt: {name} hook failed: {e:#}");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
