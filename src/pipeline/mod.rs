//! Interaction control: the push-to-talk state machine and the session that
//! runs one episode per utterance.
//!
//! # Architecture
//!
//! ```text
//! ButtonEvent (rdev thread)
//!        │
//!        ▼
//! Session::handle_button
//!        │
//!        ▼
//! PushToTalk::on_press / on_release ──▶ PttHooks (implemented by Session)
//!        │                                 ├─ press   → capture.start
//!        │                                 ├─ release → episode-<gen> thread
//!        │                                 ├─ cancel  → generation += 1, speech.cancel
//!        │                                 └─ abort   → capture.cancel
//!        ▼
//! InteractionState cell ──▶ Backlight color
//! ```
//!
//! # Quick start
//!
//! ```rust,no_run
//! use talk_button::button::ButtonEvent;
//! use talk_button::config::AppConfig;
//! use talk_button::pipeline::{Collaborators, Session};
//!
//! # fn parts() -> Collaborators { unimplemented!() }
//! let config = AppConfig::default();
//! let session = Session::new(&config, parts());
//!
//! session.handle_button(ButtonEvent::Pressed);
//! session.handle_button(ButtonEvent::Released);
//! ```

pub mod batch;
pub mod runner;
pub mod state;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use batch::SentenceBatcher;
pub use runner::{Collaborators, Session, SessionContext, SessionError};
pub use state::{InteractionState, PressOutcome, PttHooks, PushToTalk};
