//! Session orchestrator: drives one episode per button press.
//!
//! [`Session`] implements [`PttHooks`] for the [`PushToTalk`] machine and
//! runs each released utterance on its own worker thread.
//!
//! # Episode flow
//!
//! ```text
//! release ─▶ episode-<gen> thread
//!   capture.stop() ─▶ silence? ──yes──▶ "No speech detected" ─▶ Idle
//!        │ no
//!        ▼
//!   Transcribing ─▶ transcribe ─▶ empty? ──yes──▶ Idle
//!        │
//!        ▼
//!   Thinking ─▶ chat.stream(text, history)
//!        │ first delta
//!        ▼
//!   Streaming ─▶ per delta: presenter + sentence batches ─▶ speech
//!        │ end of stream
//!        ▼
//!   speech.flush() ─▶ history.push_turn ─▶ hold until dismissed ─▶ Idle
//! ```
//!
//! # Cancellation
//!
//! Every episode captures the generation current when it was released.  A
//! cancel, a new press or shutdown advances the generation; from then on the
//! old episode is *stale* and checks this before every display update,
//! history write and speech submission, unwinding without side effects.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::audio::Capture;
use crate::button::{Backlight, ButtonEvent};
use crate::config::{AppConfig, SessionConfig};
use crate::display::{CharacterState, Presenter, StatusCard};
use crate::llm::{ChatBackend, ChatError, ConversationHistory};
use crate::speech::{FlushOutcome, SpeechPipeline};
use crate::stt::{SttError, Transcriber};
use crate::sync::{lock, Event};

use super::batch::SentenceBatcher;
use super::state::{InteractionState, PttHooks, PushToTalk};

/// Longest error text handed to the presenter.
const ERROR_MESSAGE_CHARS: usize = 80;

/// How long shutdown waits for the episode worker.
const WORKER_JOIN_TIMEOUT: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// SessionError
// ---------------------------------------------------------------------------

/// Errors that end an episode early.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("transcription failed: {0}")]
    Transcription(#[from] SttError),

    #[error(transparent)]
    Chat(#[from] ChatError),
}

// ---------------------------------------------------------------------------
// SessionContext
// ---------------------------------------------------------------------------

/// Cross-thread signals shared by the button thread and episode workers.
#[derive(Debug, Default)]
pub struct SessionContext {
    generation: AtomicU64,
    dismiss: Event,
    shutdown: AtomicBool,
}

impl SessionContext {
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Invalidate every running episode; returns the new generation.
    pub fn advance(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.generation() == generation
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// Collaborators
// ---------------------------------------------------------------------------

/// Everything the session drives.
pub struct Collaborators {
    pub capture: Arc<dyn Capture>,
    pub transcriber: Arc<dyn Transcriber>,
    pub chat: Arc<dyn ChatBackend>,
    pub presenter: Arc<dyn Presenter>,
    pub speech: Arc<SpeechPipeline>,
    pub backlight: Arc<dyn Backlight>,
}

/// How an episode ended when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    NoSpeech,
    EmptyTranscript,
    EmptyReply,
    Answered,
    Stale,
}

struct Clock {
    last_activity: Instant,
    last_refresh: Instant,
}

struct Inner {
    ctx: SessionContext,
    ptt: PushToTalk,
    capture: Arc<dyn Capture>,
    transcriber: Arc<dyn Transcriber>,
    chat: Arc<dyn ChatBackend>,
    presenter: Arc<dyn Presenter>,
    speech: Arc<SpeechPipeline>,
    history: Mutex<ConversationHistory>,
    worker: Mutex<Option<JoinHandle<()>>>,
    clock: Mutex<Clock>,
    timing: SessionConfig,
    silence_threshold: f32,
    backlight_level: u8,
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Cheap to clone; all clones drive the same session.
#[derive(Clone)]
pub struct Session {
    inner: Arc<Inner>,
}

impl Session {
    pub fn new(config: &AppConfig, parts: Collaborators) -> Self {
        let now = Instant::now();
        Self {
            inner: Arc::new(Inner {
                ctx: SessionContext::default(),
                ptt: PushToTalk::new(parts.backlight),
                capture: parts.capture,
                transcriber: parts.transcriber,
                chat: parts.chat,
                presenter: parts.presenter,
                speech: parts.speech,
                history: Mutex::new(ConversationHistory::new(config.session.history_turns)),
                worker: Mutex::new(None),
                clock: Mutex::new(Clock {
                    last_activity: now,
                    last_refresh: now,
                }),
                timing: config.session.clone(),
                silence_threshold: config.audio.silence_rms_threshold,
                backlight_level: config.display.backlight,
            }),
        }
    }

    pub fn state(&self) -> InteractionState {
        self.inner.ptt.state()
    }

    pub fn context(&self) -> &SessionContext {
        &self.inner.ctx
    }

    /// Entry point for the button listener.
    pub fn handle_button(&self, event: ButtonEvent) {
        match event {
            ButtonEvent::Pressed => {
                let outcome = self.inner.ptt.on_press(self);
                log::debug!("session: press → {outcome:?}");
            }
            ButtonEvent::Released => {
                self.inner.ptt.on_release(self);
            }
        }
    }

    /// Draw the ready screen and light the display.
    pub fn go_idle(&self) {
        {
            let mut clock = lock(&self.inner.clock);
            let now = Instant::now();
            clock.last_activity = now;
            clock.last_refresh = now;
        }
        self.inner.ptt.set_state(InteractionState::Idle);
        let presenter = &self.inner.presenter;
        presenter.set_backlight(self.inner.backlight_level);
        presenter.stop_character();
        presenter.set_idle_screen();
    }

    /// Housekeeping, called about once a second.
    ///
    /// While idle and awake, keeps the idle screen fresh and puts the
    /// display to sleep after a stretch of inactivity.
    pub fn tick(&self) {
        let inner = &self.inner;
        if inner.presenter.is_sleeping()
            || inner.ptt.state() != InteractionState::Idle
            || self.worker_running()
        {
            return;
        }

        let mut clock = lock(&inner.clock);
        if clock.last_activity.elapsed() >= inner.timing.sleep_timeout() {
            log::info!("session: idle, display going to sleep");
            inner.presenter.sleep();
        } else if clock.last_refresh.elapsed() >= inner.timing.idle_refresh() {
            inner.presenter.set_idle_screen();
            clock.last_refresh = Instant::now();
        }
    }

    /// Stop everything: no further display, history or audio effects.
    pub fn shutdown(&self) {
        let inner = &self.inner;
        log::info!("session: shutting down");
        inner.ctx.shutdown.store(true, Ordering::SeqCst);
        inner.ctx.advance();
        inner.ctx.dismiss.set();
        inner.capture.cancel();
        inner.speech.cancel();
        inner.presenter.stop_character();

        let worker = lock(&inner.worker).take();
        if let Some(handle) = worker {
            let deadline = Instant::now() + WORKER_JOIN_TIMEOUT;
            while !handle.is_finished() && Instant::now() < deadline {
                std::thread::sleep(Duration::from_millis(20));
            }
            if handle.is_finished() {
                if handle.join().is_err() {
                    log::error!("session: episode worker panicked");
                }
            } else {
                log::warn!("session: episode worker still running, leaving it behind");
            }
        }

        inner.presenter.cleanup();
    }

    fn worker_running(&self) -> bool {
        lock(&self.inner.worker)
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    fn touch(&self) {
        lock(&self.inner.clock).last_activity = Instant::now();
        if self.inner.presenter.is_sleeping() {
            self.inner.presenter.wake();
            self.go_idle();
        }
    }

    fn is_stale(&self, generation: u64) -> bool {
        !self.inner.ctx.is_current(generation)
    }

    /// Busy transition for an episode; refused once `generation` is stale.
    fn enter(&self, generation: u64, state: InteractionState) -> bool {
        self.inner.ptt.set_state_if(state, || !self.is_stale(generation))
    }

    // -- errors -------------------------------------------------------------

    fn enter_error(&self, message: &str) {
        self.inner.ptt.set_state(InteractionState::Error);
        self.inner.presenter.stop_character();
        self.inner.presenter.set_status(&StatusCard::error(message));
    }

    fn recover_from_error(&self, generation: u64) {
        std::thread::sleep(self.inner.timing.error_hold());
        if !self.is_stale(generation) {
            self.go_idle();
        }
    }

    fn spawn_worker(
        &self,
        name: String,
        job: impl FnOnce(Session) + Send + 'static,
    ) -> std::io::Result<()> {
        let session = self.clone();
        let handle = std::thread::Builder::new()
            .name(name)
            .spawn(move || job(session))?;
        *lock(&self.inner.worker) = Some(handle);
        Ok(())
    }

    // -- episode ------------------------------------------------------------

    fn process_utterance(&self, generation: u64) {
        let result = self.episode(generation);
        let stale = self.is_stale(generation);

        match result {
            Ok(outcome) => log::debug!("session: episode {generation} ended: {outcome:?}"),
            Err(e) if stale => log::debug!("session: stale episode {generation} failed: {e}"),
            Err(e) => {
                log::error!("session: episode {generation} failed: {e}");
                self.inner.presenter.stop_spinner();
                let message: String = e.to_string().chars().take(ERROR_MESSAGE_CHARS).collect();
                self.enter_error(&message);
                self.recover_from_error(generation);
            }
        }

        if !self.is_stale(generation) {
            self.inner.presenter.stop_spinner();
            if self.inner.ptt.state().is_busy() {
                self.go_idle();
            }
        }
    }

    fn episode(&self, generation: u64) -> Result<Outcome, SessionError> {
        let inner = &self.inner;
        let presenter = &inner.presenter;
        let speaking = inner.speech.is_enabled();

        let recording = inner.capture.stop();
        let level = inner.capture.silence_score(&recording);
        if level < inner.silence_threshold {
            log::info!(
                "session: no speech (rms {level:.0} < {:.0})",
                inner.silence_threshold
            );
            if self.is_stale(generation) {
                return Ok(Outcome::Stale);
            }
            presenter.stop_character();
            presenter.set_status(&StatusCard::no_speech());
            std::thread::sleep(inner.timing.silence_hold());
            if !self.is_stale(generation) {
                self.go_idle();
            }
            return Ok(Outcome::NoSpeech);
        }
        if !self.enter(generation, InteractionState::Transcribing) {
            return Ok(Outcome::Stale);
        }
        if speaking {
            presenter.set_character_state(CharacterState::Thinking);
        } else {
            presenter.set_status(&StatusCard::transcribing());
        }

        let transcript = inner.transcriber.transcribe(&recording)?;
        if self.is_stale(generation) {
            return Ok(Outcome::Stale);
        }
        if transcript.is_empty() {
            log::info!("session: empty transcript");
            self.go_idle();
            return Ok(Outcome::EmptyTranscript);
        }
        log::info!("session: heard \"{transcript}\"");

        if !self.enter(generation, InteractionState::Thinking) {
            return Ok(Outcome::Stale);
        }
        if !speaking {
            presenter.start_spinner("Thinking");
        }

        let history = lock(&inner.history).messages();
        let stream = inner.chat.stream(&transcript, &history)?;

        let mut reply = String::new();
        let mut batcher = SentenceBatcher::new();
        let mut first = true;

        for delta in stream {
            if self.is_stale(generation) || inner.ctx.is_shutting_down() {
                break;
            }
            let delta = delta?;
            if first {
                first = false;
                if !self.enter(generation, InteractionState::Streaming) {
                    return Ok(Outcome::Stale);
                }
                if speaking {
                    presenter.set_character_state(CharacterState::Talking);
                } else {
                    presenter.stop_spinner();
                    presenter.set_response_text("");
                }
            }

            reply.push_str(&delta);
            if speaking {
                if let Some(chunk) = batcher.push(&delta) {
                    inner.speech.submit(&chunk);
                }
            } else {
                presenter.append_response(&delta);
            }
        }

        if self.is_stale(generation) {
            return Ok(Outcome::Stale);
        }
        let reply = reply.trim().to_owned();
        if reply.is_empty() {
            log::warn!("session: chat returned an empty reply");
            self.go_idle();
            return Ok(Outcome::EmptyReply);
        }

        if speaking {
            if let Some(rest) = batcher.finish() {
                inner.speech.submit(&rest);
            }
            match inner.speech.flush() {
                FlushOutcome::Drained => {}
                FlushOutcome::Cancelled => log::debug!("session: speech cancelled"),
                FlushOutcome::TimedOut => log::warn!("session: speech did not finish in time"),
            }
            if self.is_stale(generation) {
                return Ok(Outcome::Stale);
            }
            presenter.set_character_state(CharacterState::Done);
            presenter.set_response_text(&reply);
        } else {
            presenter.flush_response();
        }

        lock(&inner.history).push_turn(transcript, reply);

        inner.ctx.dismiss.clear();
        let dismissed = inner.ctx.dismiss.wait_timeout(inner.timing.response_hold());
        if self.is_stale(generation) {
            return Ok(Outcome::Stale);
        }
        log::info!(
            "session: response {}",
            if dismissed { "dismissed" } else { "hold timed out" }
        );
        self.go_idle();
        Ok(Outcome::Answered)
    }
}

// ---------------------------------------------------------------------------
// Hooks
// ---------------------------------------------------------------------------

impl PttHooks for Session {
    fn on_wake(&self) -> anyhow::Result<()> {
        self.touch();
        Ok(())
    }

    fn on_press(&self) -> anyhow::Result<()> {
        let inner = &self.inner;
        // A new episode supersedes anything still holding the screen.
        let generation = inner.ctx.advance();
        inner.ctx.dismiss.set();

        if inner.speech.is_enabled() {
            inner
                .presenter
                .start_character(CharacterState::Listening, Some(inner.speech.monitor()));
        } else {
            inner.presenter.set_status(&StatusCard::listening());
        }

        if let Err(e) = inner.capture.start() {
            self.enter_error(&e.to_string());
            self.spawn_worker(format!("episode-{generation}"), move |s| {
                s.recover_from_error(generation)
            })?;
            return Err(e.into());
        }
        Ok(())
    }

    fn on_release(&self) -> anyhow::Result<()> {
        let generation = self.inner.ctx.generation();
        self.spawn_worker(format!("episode-{generation}"), move |s| {
            s.process_utterance(generation)
        })?;
        Ok(())
    }

    fn on_cancel(&self) -> anyhow::Result<()> {
        let inner = &self.inner;
        self.touch();
        inner.ctx.advance();
        inner.ctx.dismiss.set();
        inner.presenter.stop_spinner();
        inner.presenter.stop_character();
        inner.speech.cancel();
        self.go_idle();
        log::info!("session: button cancel, back to Ready");
        Ok(())
    }

    fn on_abort_listening(&self) -> anyhow::Result<()> {
        let inner = &self.inner;
        inner.ctx.advance();
        inner.capture.cancel();
        inner.presenter.stop_character();
        self.go_idle();
        Ok(())
    }

    fn cancel_allowed(&self) -> bool {
        self.inner.ptt.dwell() >= self.inner.timing.min_cancel_dwell()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state())
            .field("generation", &self.inner.ctx.generation())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::audio::{CaptureError, Recording};
    use crate::button::LogBacklight;
    use crate::display::testing::RecordingPresenter;
    use crate::llm::{ChatMessage, ChatStream};
    use crate::pipeline::state::PressOutcome;
    use crate::speech::pipeline::testing::{enabled_config, EchoSynth, RecordingSink};
    use crate::stt::MockTranscriber;

    // -- doubles ------------------------------------------------------------

    struct FakeCapture {
        level: f32,
        starts: AtomicUsize,
        cancels: AtomicUsize,
        fail_start: bool,
    }

    impl FakeCapture {
        fn with_level(level: f32) -> Self {
            Self {
                level,
                starts: AtomicUsize::new(0),
                cancels: AtomicUsize::new(0),
                fail_start: false,
            }
        }
    }

    impl Capture for FakeCapture {
        fn start(&self) -> Result<(), CaptureError> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            if self.fail_start {
                return Err(CaptureError::NoDevice);
            }
            Ok(())
        }
        fn stop(&self) -> Recording {
            Recording::new("/nonexistent/utterance.wav")
        }
        fn cancel(&self) {
            self.cancels.fetch_add(1, Ordering::SeqCst);
        }
        fn silence_score(&self, _recording: &Recording) -> f32 {
            self.level
        }
    }

    /// Streams fixed deltas, pausing before each, and records every request.
    /// With `fail_with` set, the stream ends in a server-side error.
    struct ScriptedChat {
        deltas: Vec<&'static str>,
        pause: Duration,
        fail_with: Option<&'static str>,
        requests: Mutex<Vec<(String, Vec<ChatMessage>)>>,
    }

    impl ScriptedChat {
        fn new(deltas: Vec<&'static str>, pause: Duration) -> Self {
            Self {
                deltas,
                pause,
                fail_with: None,
                requests: Mutex::new(Vec::new()),
            }
        }

        fn failing_after(deltas: Vec<&'static str>, message: &'static str) -> Self {
            Self {
                fail_with: Some(message),
                ..Self::new(deltas, Duration::ZERO)
            }
        }
    }

    impl ChatBackend for ScriptedChat {
        fn stream(&self, user_text: &str, history: &[ChatMessage]) -> Result<ChatStream, ChatError> {
            lock(&self.requests).push((user_text.to_owned(), history.to_vec()));
            let pause = self.pause;
            let deltas = self.deltas.clone().into_iter().map(move |d| {
                std::thread::sleep(pause);
                Ok(d.to_owned())
            });
            let failure = self
                .fail_with
                .map(|message| Err(ChatError::Stream(message.to_owned())));
            Ok(Box::new(deltas.chain(failure)))
        }
    }

    struct Harness {
        session: Session,
        capture: Arc<FakeCapture>,
        transcriber: Arc<MockTranscriber>,
        chat: Arc<ScriptedChat>,
        presenter: Arc<RecordingPresenter>,
        sink: Arc<RecordingSink>,
    }

    fn quick_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.session.min_cancel_dwell_secs = 0.0;
        config.session.response_hold_secs = 0.0;
        config.session.silence_hold_secs = 0.05;
        config.session.error_hold_secs = 0.05;
        config
    }

    fn harness(
        config: AppConfig,
        capture: FakeCapture,
        transcriber: MockTranscriber,
        chat: ScriptedChat,
    ) -> Harness {
        let capture = Arc::new(capture);
        let transcriber = Arc::new(transcriber);
        let chat = Arc::new(chat);
        let presenter = Arc::new(RecordingPresenter::default());
        let sink = Arc::new(RecordingSink::with_clip_len(Duration::from_millis(30)));
        let speech = SpeechPipeline::new(Arc::new(EchoSynth::default()), sink.clone(), &config.speech)
            .unwrap();

        let session = Session::new(
            &config,
            Collaborators {
                capture: capture.clone(),
                transcriber: transcriber.clone(),
                chat: chat.clone(),
                presenter: presenter.clone(),
                speech: Arc::new(speech),
                backlight: Arc::new(LogBacklight),
            },
        );
        Harness {
            session,
            capture,
            transcriber,
            chat,
            presenter,
            sink,
        }
    }

    fn wait_until(mut cond: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !cond() {
            assert!(Instant::now() < deadline, "condition not reached");
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    fn wait_for_worker(session: &Session) {
        wait_until(|| !session.worker_running());
    }

    fn talk(session: &Session) {
        session.handle_button(ButtonEvent::Pressed);
        session.handle_button(ButtonEvent::Released);
    }

    // -- tests --------------------------------------------------------------

    #[test]
    fn silent_recording_skips_transcription() {
        let h = harness(
            quick_config(),
            FakeCapture::with_level(50.0),
            MockTranscriber::ok("should not be used"),
            ScriptedChat::new(vec![], Duration::ZERO),
        );

        talk(&h.session);
        wait_for_worker(&h.session);

        assert_eq!(h.transcriber.calls(), 0);
        assert_eq!(h.presenter.count("status:No speech detected"), 1);
        assert!(lock(&h.chat.requests).is_empty());
        assert_eq!(h.session.state(), InteractionState::Idle);
    }

    #[test]
    fn chat_request_carries_prior_turns_in_order() {
        let h = harness(
            quick_config(),
            FakeCapture::with_level(900.0),
            MockTranscriber::ok("what time is it"),
            ScriptedChat::new(vec!["It is ", "noon."], Duration::ZERO),
        );
        {
            let mut history = lock(&h.session.inner.history);
            history.push_turn("hello", "hi there");
            history.push_turn("how are you", "fine");
        }

        talk(&h.session);
        wait_for_worker(&h.session);

        let requests = lock(&h.chat.requests).clone();
        assert_eq!(requests.len(), 1);
        let (text, history) = &requests[0];
        assert_eq!(text, "what time is it");
        assert_eq!(
            history,
            &vec![
                ChatMessage::user("hello"),
                ChatMessage::assistant("hi there"),
                ChatMessage::user("how are you"),
                ChatMessage::assistant("fine"),
            ]
        );

        let after = lock(&h.session.inner.history).messages();
        assert_eq!(after.len(), 6);
        assert_eq!(after[4], ChatMessage::user("what time is it"));
        assert_eq!(after[5], ChatMessage::assistant("It is noon."));

        assert_eq!(h.presenter.count("append:"), 2);
        assert_eq!(h.presenter.count("flush"), 1);
        assert_eq!(h.session.state(), InteractionState::Idle);
    }

    #[test]
    fn empty_transcript_returns_to_idle() {
        let h = harness(
            quick_config(),
            FakeCapture::with_level(900.0),
            MockTranscriber::ok(""),
            ScriptedChat::new(vec!["unused"], Duration::ZERO),
        );

        talk(&h.session);
        wait_for_worker(&h.session);

        assert_eq!(h.transcriber.calls(), 1);
        assert!(lock(&h.chat.requests).is_empty());
        assert_eq!(h.session.state(), InteractionState::Idle);
    }

    #[test]
    fn transcription_failure_shows_error_then_idles() {
        let h = harness(
            quick_config(),
            FakeCapture::with_level(900.0),
            MockTranscriber::err(SttError::Request("connection refused".into())),
            ScriptedChat::new(vec![], Duration::ZERO),
        );

        talk(&h.session);
        wait_for_worker(&h.session);

        let calls = h.presenter.calls();
        assert!(calls
            .iter()
            .any(|c| c.starts_with("status:transcription failed")));
        assert!(lock(&h.session.inner.history).is_empty());
        assert_eq!(h.session.state(), InteractionState::Idle);
    }

    #[test]
    fn cancel_mid_stream_leaves_no_trace() {
        let mut config = quick_config();
        config.speech = enabled_config();
        let deltas = vec!["One. ", "Two. ", "Three. ", "Four. ", "Five. ", "Six. "]
            .into_iter()
            .cycle()
            .take(60)
            .collect();
        let h = harness(
            config,
            FakeCapture::with_level(900.0),
            MockTranscriber::ok("count for me"),
            ScriptedChat::new(deltas, Duration::from_millis(40)),
        );

        talk(&h.session);
        wait_until(|| h.session.state() == InteractionState::Streaming);

        let outcome = h.session.inner.ptt.on_press(&h.session);
        assert_eq!(outcome, PressOutcome::Cancelled);
        assert_eq!(h.session.state(), InteractionState::Idle);

        let presenter_calls = h.presenter.calls().len();
        let played = h.sink.played().len();

        wait_for_worker(&h.session);
        std::thread::sleep(Duration::from_millis(100));

        assert_eq!(h.presenter.calls().len(), presenter_calls);
        assert!(h.sink.played().len() <= played + 1);
        assert!(lock(&h.session.inner.history).is_empty());
        assert_eq!(h.session.state(), InteractionState::Idle);
    }

    #[test]
    fn early_press_while_streaming_is_ignored() {
        let mut config = quick_config();
        config.session.min_cancel_dwell_secs = 2.0;
        let h = harness(
            config,
            FakeCapture::with_level(900.0),
            MockTranscriber::ok("tell me a story"),
            ScriptedChat::new(vec!["Once "; 100], Duration::from_millis(50)),
        );

        talk(&h.session);
        wait_until(|| h.session.state() == InteractionState::Streaming);
        let generation = h.session.context().generation();

        let outcome = h.session.inner.ptt.on_press(&h.session);
        assert_eq!(outcome, PressOutcome::Ignored);
        assert_eq!(h.session.state(), InteractionState::Streaming);
        assert_eq!(h.session.context().generation(), generation);
        assert_eq!(h.capture.starts.load(Ordering::SeqCst), 1);

        h.session.shutdown();
    }

    #[test]
    fn chat_error_mid_stream_shows_error_then_idles() {
        let h = harness(
            quick_config(),
            FakeCapture::with_level(900.0),
            MockTranscriber::ok("what time is it"),
            ScriptedChat::failing_after(vec!["It is ", "noon "], "quota exceeded"),
        );

        talk(&h.session);
        wait_for_worker(&h.session);

        assert_eq!(h.presenter.count("append:"), 2);
        assert_eq!(
            h.presenter.count("status:chat stream error: quota exceeded"),
            1
        );
        assert_eq!(h.presenter.count("flush"), 0);
        assert!(lock(&h.session.inner.history).is_empty());
        assert_eq!(h.session.state(), InteractionState::Idle);
    }

    #[test]
    fn stale_episode_cannot_enter_a_busy_state() {
        let h = harness(
            quick_config(),
            FakeCapture::with_level(900.0),
            MockTranscriber::ok("unused"),
            ScriptedChat::new(vec![], Duration::ZERO),
        );
        let old = h.session.context().generation();
        let current = h.session.context().advance();

        assert!(!h.session.enter(old, InteractionState::Transcribing));
        assert_eq!(h.session.state(), InteractionState::Idle);

        assert!(h.session.enter(current, InteractionState::Thinking));
        assert_eq!(h.session.state(), InteractionState::Thinking);
    }

    #[test]
    fn spoken_reply_ends_in_done_pose() {
        let mut config = quick_config();
        config.speech = enabled_config();
        let h = harness(
            config,
            FakeCapture::with_level(900.0),
            MockTranscriber::ok("hi"),
            ScriptedChat::new(vec!["Hello ", "there."], Duration::ZERO),
        );

        talk(&h.session);
        wait_for_worker(&h.session);

        assert_eq!(h.sink.played(), vec!["Hello there."]);
        let calls = h.presenter.calls();
        let done = calls.iter().position(|c| c == "pose:done");
        let shown = calls.iter().position(|c| c == "response:Hello there.");
        assert!(done.is_some() && done < shown);
        assert_eq!(h.presenter.count("pose:done"), 1);
        assert_eq!(h.session.state(), InteractionState::Idle);
    }

    #[test]
    fn press_during_hold_cancels_instead_of_listening() {
        let mut config = quick_config();
        config.session.response_hold_secs = 30.0;
        let h = harness(
            config,
            FakeCapture::with_level(900.0),
            MockTranscriber::ok("hi"),
            ScriptedChat::new(vec!["Hello."], Duration::ZERO),
        );

        talk(&h.session);
        wait_until(|| lock(&h.session.inner.history).len() == 2);

        h.session.handle_button(ButtonEvent::Pressed);
        wait_for_worker(&h.session);
        assert_eq!(h.session.state(), InteractionState::Idle);
        assert_eq!(h.capture.starts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn capture_start_failure_shows_error() {
        let h = harness(
            quick_config(),
            FakeCapture {
                fail_start: true,
                ..FakeCapture::with_level(900.0)
            },
            MockTranscriber::ok("unused"),
            ScriptedChat::new(vec![], Duration::ZERO),
        );

        h.session.handle_button(ButtonEvent::Pressed);
        assert_eq!(h.session.state(), InteractionState::Error);
        assert_eq!(h.presenter.count("status:no input device"), 1);

        wait_for_worker(&h.session);
        assert_eq!(h.session.state(), InteractionState::Idle);
    }

    #[test]
    fn abort_listening_cancels_capture() {
        let h = harness(
            quick_config(),
            FakeCapture::with_level(900.0),
            MockTranscriber::ok("unused"),
            ScriptedChat::new(vec![], Duration::ZERO),
        );

        h.session.handle_button(ButtonEvent::Pressed);
        assert_eq!(h.session.state(), InteractionState::Listening);
        h.session.handle_button(ButtonEvent::Pressed);
        assert_eq!(h.session.state(), InteractionState::Idle);
        assert_eq!(h.capture.cancels.load(Ordering::SeqCst), 1);

        h.session.handle_button(ButtonEvent::Released);
        assert!(!h.session.worker_running());
    }

    #[test]
    fn tick_sleeps_display_after_inactivity() {
        let mut config = quick_config();
        config.session.sleep_timeout_secs = 0;
        let h = harness(
            config,
            FakeCapture::with_level(900.0),
            MockTranscriber::ok("unused"),
            ScriptedChat::new(vec![], Duration::ZERO),
        );

        h.session.tick();
        assert!(h.presenter.is_sleeping());

        // Pressing wakes the display and starts listening.
        h.session.handle_button(ButtonEvent::Pressed);
        assert!(!h.presenter.is_sleeping());
        assert_eq!(h.session.state(), InteractionState::Listening);
    }

    #[test]
    fn tick_refreshes_idle_screen() {
        let mut config = quick_config();
        config.session.idle_refresh_secs = 0;
        let h = harness(
            config,
            FakeCapture::with_level(900.0),
            MockTranscriber::ok("unused"),
            ScriptedChat::new(vec![], Duration::ZERO),
        );

        h.session.tick();
        h.session.tick();
        assert_eq!(h.presenter.count("idle"), 2);
        assert!(!h.presenter.is_sleeping());
    }

    #[test]
    fn shutdown_stops_a_running_episode() {
        let h = harness(
            quick_config(),
            FakeCapture::with_level(900.0),
            MockTranscriber::ok("talk a lot"),
            ScriptedChat::new(vec!["word "; 200], Duration::from_millis(20)),
        );

        talk(&h.session);
        wait_until(|| h.session.state() == InteractionState::Streaming);

        h.session.shutdown();
        assert!(h.session.context().is_shutting_down());
        assert!(!h.session.worker_running());
        assert!(lock(&h.session.inner.history).is_empty());
        assert_eq!(h.presenter.count("cleanup"), 1);
    }
}
