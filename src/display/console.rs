//! Log/stdout presenter.
//!
//! Status cards and character poses go to the log; the streamed reply is
//! written straight to stdout so it reads like a chat transcript.  While the
//! character is up, a background thread polls the [`PlaybackMonitor`] at
//! `max_fps` and reports mouth and caption changes.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::config::DisplayConfig;
use crate::speech::{MouthShape, PlaybackMonitor};
use crate::sync::lock;

use super::{CharacterState, Presenter, StatusCard};

// ---------------------------------------------------------------------------
// Character animation thread
// ---------------------------------------------------------------------------

struct Animation {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl Animation {
    fn spawn(
        pose: Arc<Mutex<CharacterState>>,
        monitor: Option<PlaybackMonitor>,
        frame: Duration,
    ) -> std::io::Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);
        let handle = std::thread::Builder::new()
            .name("character".into())
            .spawn(move || animate(&pose, monitor.as_ref(), &stop_flag, frame))?;
        Ok(Self { stop, handle })
    }

    fn finish(self) {
        self.stop.store(true, Ordering::SeqCst);
        if self.handle.join().is_err() {
            log::warn!("display: character thread panicked");
        }
    }
}

fn animate(
    pose: &Mutex<CharacterState>,
    monitor: Option<&PlaybackMonitor>,
    stop: &AtomicBool,
    frame: Duration,
) {
    let mut last_pose = None;
    let mut last_mouth: Option<MouthShape> = None;
    let mut last_caption = String::new();

    while !stop.load(Ordering::SeqCst) {
        let current = *lock(pose);
        if last_pose != Some(current) {
            match current {
                CharacterState::Listening => log::info!("display: Listening…"),
                CharacterState::Thinking => log::info!("display: Thinking…"),
                CharacterState::Talking => log::debug!("display: character talking"),
                CharacterState::Done => log::info!("display: Done"),
            }
            last_pose = Some(current);
        }

        if let (CharacterState::Talking, Some(monitor)) = (current, monitor) {
            let mouth = monitor.mouth_shape();
            if mouth != last_mouth {
                log::trace!("display: mouth {}", mouth.map_or(0, MouthShape::code));
                last_mouth = mouth;
            }
            let caption = monitor.current_text();
            if !caption.is_empty() && caption != last_caption {
                log::debug!("display: caption \"{caption}\"");
            }
            last_caption = caption;
        }

        std::thread::sleep(frame);
    }
}

// ---------------------------------------------------------------------------
// ConsolePresenter
// ---------------------------------------------------------------------------

struct Screen {
    response: String,
    /// Bytes of `response` already written to stdout.
    printed: usize,
    sleeping: bool,
    backlight: u8,
    spinner: Option<String>,
}

pub struct ConsolePresenter {
    frame: Duration,
    screen: Mutex<Screen>,
    pose: Arc<Mutex<CharacterState>>,
    animation: Mutex<Option<Animation>>,
}

impl ConsolePresenter {
    pub fn new(config: &DisplayConfig) -> Self {
        let fps = config.max_fps.max(1);
        Self {
            frame: Duration::from_millis(1000 / u64::from(fps)),
            screen: Mutex::new(Screen {
                response: String::new(),
                printed: 0,
                sleeping: false,
                backlight: config.backlight.min(100),
                spinner: None,
            }),
            pose: Arc::new(Mutex::new(CharacterState::Listening)),
            animation: Mutex::new(None),
        }
    }

    /// The reply text currently on screen.
    pub fn response_text(&self) -> String {
        lock(&self.screen).response.clone()
    }

    pub fn backlight(&self) -> u8 {
        lock(&self.screen).backlight
    }

    fn print_pending(screen: &mut Screen) {
        let pending = &screen.response[screen.printed..];
        if pending.is_empty() {
            return;
        }
        let mut out = std::io::stdout().lock();
        if out.write_all(pending.as_bytes()).and_then(|_| out.flush()).is_err() {
            log::warn!("display: stdout unavailable");
        }
        screen.printed = screen.response.len();
    }
}

impl Presenter for ConsolePresenter {
    fn set_status(&self, card: &StatusCard) {
        match &card.subtitle {
            Some(sub) => log::info!("display: [{}] {} ({sub})", card.color, card.title),
            None => log::info!("display: [{}] {}", card.color, card.title),
        }
    }

    fn set_idle_screen(&self) {
        let mut screen = lock(&self.screen);
        screen.response.clear();
        screen.printed = 0;
        log::info!("display: Ready. Press button to talk");
    }

    fn start_character(&self, state: CharacterState, monitor: Option<PlaybackMonitor>) {
        self.stop_character();
        *lock(&self.pose) = state;
        match Animation::spawn(Arc::clone(&self.pose), monitor, self.frame) {
            Ok(animation) => *lock(&self.animation) = Some(animation),
            Err(e) => log::warn!("display: cannot start character thread: {e}"),
        }
    }

    fn set_character_state(&self, state: CharacterState) {
        *lock(&self.pose) = state;
    }

    fn stop_character(&self) {
        let running = lock(&self.animation).take();
        if let Some(animation) = running {
            animation.finish();
        }
    }

    fn start_spinner(&self, label: &str) {
        let mut screen = lock(&self.screen);
        screen.spinner = Some(label.to_owned());
        log::info!("display: {label}… Getting answer…");
    }

    fn stop_spinner(&self) {
        lock(&self.screen).spinner = None;
    }

    fn set_response_text(&self, text: &str) {
        let mut screen = lock(&self.screen);
        screen.response = text.to_owned();
        screen.printed = 0;
        if !text.is_empty() {
            Self::print_pending(&mut screen);
            println!();
            screen.printed = screen.response.len();
        }
    }

    fn append_response(&self, delta: &str) {
        let mut screen = lock(&self.screen);
        screen.response.push_str(delta);
        Self::print_pending(&mut screen);
    }

    fn flush_response(&self) {
        let mut screen = lock(&self.screen);
        Self::print_pending(&mut screen);
        if !screen.response.is_empty() {
            println!();
        }
    }

    fn set_backlight(&self, level: u8) {
        let mut screen = lock(&self.screen);
        screen.backlight = level.min(100);
        log::debug!("display: backlight {}", screen.backlight);
    }

    fn sleep(&self) {
        let mut screen = lock(&self.screen);
        if !screen.sleeping {
            screen.sleeping = true;
            log::info!("display: sleeping");
        }
    }

    fn wake(&self) {
        let mut screen = lock(&self.screen);
        if screen.sleeping {
            screen.sleeping = false;
            log::info!("display: awake");
        }
    }

    fn is_sleeping(&self) -> bool {
        lock(&self.screen).sleeping
    }

    fn cleanup(&self) {
        self.stop_character();
        self.stop_spinner();
        log::debug!("display: cleaned up");
    }
}

impl Drop for ConsolePresenter {
    fn drop(&mut self) {
        self.stop_character();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn presenter() -> ConsolePresenter {
        ConsolePresenter::new(&DisplayConfig {
            backlight: 70,
            max_fps: 20,
        })
    }

    #[test]
    fn appended_deltas_accumulate() {
        let p = presenter();
        p.set_response_text("");
        p.append_response("Hello");
        p.append_response(", world");
        p.flush_response();
        assert_eq!(p.response_text(), "Hello, world");

        p.set_idle_screen();
        assert_eq!(p.response_text(), "");
    }

    #[test]
    fn sleep_and_wake_toggle() {
        let p = presenter();
        assert!(!p.is_sleeping());
        p.sleep();
        p.sleep();
        assert!(p.is_sleeping());
        p.wake();
        assert!(!p.is_sleeping());
    }

    #[test]
    fn backlight_is_capped() {
        let p = presenter();
        assert_eq!(p.backlight(), 70);
        p.set_backlight(250);
        assert_eq!(p.backlight(), 100);
    }

    #[test]
    fn character_thread_starts_and_stops() {
        let p = presenter();
        p.start_character(CharacterState::Listening, None);
        p.set_character_state(CharacterState::Talking);
        std::thread::sleep(Duration::from_millis(120));
        p.stop_character();
        assert!(lock(&p.animation).is_none());

        // Stopping twice is harmless.
        p.stop_character();
        p.cleanup();
    }

    #[test]
    fn done_pose_is_kept_until_stopped() {
        let p = presenter();
        p.start_character(CharacterState::Talking, None);
        p.set_character_state(CharacterState::Done);
        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(*lock(&p.pose), CharacterState::Done);
        assert!(lock(&p.animation).is_some());
        p.stop_character();
        assert!(lock(&p.animation).is_none());
    }

    #[test]
    fn spinner_label_is_set_and_cleared() {
        let p = presenter();
        p.start_spinner("Thinking");
        assert_eq!(lock(&p.screen).spinner.as_deref(), Some("Thinking"));
        p.stop_spinner();
        assert_eq!(lock(&p.screen).spinner, None);

        p.start_spinner("Thinking");
        p.cleanup();
        assert_eq!(lock(&p.screen).spinner, None);
    }
}
