//! Two-stage text-to-speech pipeline with gapless playback.
//!
//! # Architecture
//!
//! ```text
//! submit(text) ──unbounded──▶ [speech-fetch] ──bounded(2)──▶ [speech-play] ──▶ AudioSink
//!                              synthesize()                   mouth timeline
//!                                                             PlaybackState ◀── PlaybackMonitor
//! flush()  ── Barrier(ticket) follows the same path; the player marks the
//!             ticket finished and wakes the waiter
//! cancel() ── epoch += 1; both workers drop anything tagged with an older
//!             epoch, the sink stops at its next poll, pending flushes return
//! ```
//!
//! The fetcher synthesizes the next sentence while the player is still
//! speaking the current one, so consecutive sentences play back to back.
//! The bounded play queue keeps the fetcher at most `queue_depth` clips
//! ahead.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};

use crate::config::SpeechConfig;
use crate::speech::mouth::{caption_window, MouthShape, MouthThresholds, MouthTimeline};
use crate::speech::sink::AudioSink;
use crate::speech::synth::SpeechSynthesizer;
use crate::sync::lock;

/// How long `Drop` waits for the workers before detaching them.
const WORKER_EXIT_WAIT: Duration = Duration::from_secs(1);

// ---------------------------------------------------------------------------
// Queue items
// ---------------------------------------------------------------------------

enum Job {
    Speak { text: String, epoch: u64 },
    Barrier { ticket: Option<u64> },
}

enum Playable {
    Clip {
        text: String,
        audio: Vec<u8>,
        epoch: u64,
    },
    Barrier {
        ticket: Option<u64>,
    },
}

/// How a [`SpeechPipeline::flush`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Everything submitted before the flush has been played.
    Drained,
    /// `cancel` ran while waiting.
    Cancelled,
    /// The flush timeout expired first.
    TimedOut,
}

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct PlaybackState {
    text: String,
    timeline: MouthTimeline,
    started_at: Option<Instant>,
    speaking: bool,
}

#[derive(Debug, Default)]
struct Completion {
    issued: u64,
    finished: u64,
}

struct Shared {
    epoch: AtomicU64,
    shutdown: AtomicBool,
    completion: Mutex<Completion>,
    completed: Condvar,
    playback: Mutex<PlaybackState>,
}

impl Shared {
    fn is_stale(&self, epoch: u64) -> bool {
        self.shutdown.load(Ordering::SeqCst) || self.epoch.load(Ordering::SeqCst) != epoch
    }

    fn finish_ticket(&self, ticket: u64) {
        let mut c = lock(&self.completion);
        c.finished = c.finished.max(ticket);
        self.completed.notify_all();
    }

    fn wake_waiters(&self) {
        let _c = lock(&self.completion);
        self.completed.notify_all();
    }

    fn reset_playback(&self) {
        *lock(&self.playback) = PlaybackState::default();
    }
}

// ---------------------------------------------------------------------------
// SpeechPipeline
// ---------------------------------------------------------------------------

/// Speaks submitted sentences in order, one after another.
///
/// Construct with [`SpeechPipeline::new`]; the two worker threads live until
/// the pipeline is dropped.
pub struct SpeechPipeline {
    shared: Arc<Shared>,
    submit_tx: Option<Sender<Job>>,
    play_tx: Option<Sender<Playable>>,
    submit_rx: Receiver<Job>,
    play_rx: Receiver<Playable>,
    enabled: bool,
    flush_timeout: Duration,
    monitor: PlaybackMonitor,
    workers: Vec<JoinHandle<()>>,
}

impl SpeechPipeline {
    /// Start the fetch and play workers.
    pub fn new(
        synth: Arc<dyn SpeechSynthesizer>,
        sink: Arc<dyn AudioSink>,
        config: &SpeechConfig,
    ) -> std::io::Result<Self> {
        let shared = Arc::new(Shared {
            epoch: AtomicU64::new(0),
            shutdown: AtomicBool::new(false),
            completion: Mutex::new(Completion::default()),
            completed: Condvar::new(),
            playback: Mutex::new(PlaybackState::default()),
        });

        let (submit_tx, submit_rx) = unbounded::<Job>();
        let (play_tx, play_rx) = bounded::<Playable>(config.queue_depth.max(1));

        let window = Duration::from_millis(config.mouth_window_ms);
        let thresholds = MouthThresholds::from(config);

        let fetcher = {
            let shared = Arc::clone(&shared);
            let rx = submit_rx.clone();
            let tx = play_tx.clone();
            std::thread::Builder::new()
                .name("speech-fetch".into())
                .spawn(move || fetch_loop(&shared, synth.as_ref(), &rx, &tx))?
        };

        let player = {
            let shared = Arc::clone(&shared);
            let rx = play_rx.clone();
            std::thread::Builder::new()
                .name("speech-play".into())
                .spawn(move || play_loop(&shared, sink.as_ref(), &rx, window, &thresholds))?
        };

        let monitor = PlaybackMonitor {
            shared: Arc::clone(&shared),
            caption_lag: Duration::from_millis(config.caption_lag_ms),
            caption_words: config.caption_words,
        };

        Ok(Self {
            shared,
            submit_tx: Some(submit_tx),
            play_tx: Some(play_tx),
            submit_rx,
            play_rx,
            enabled: config.enabled,
            flush_timeout: config.flush_timeout(),
            monitor,
            workers: vec![fetcher, player],
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Queue a sentence.  Blank text, or a disabled pipeline, is a no-op.
    pub fn submit(&self, text: &str) {
        let text = text.trim();
        if text.is_empty() || !self.enabled {
            return;
        }
        if let Some(tx) = &self.submit_tx {
            let epoch = self.shared.epoch.load(Ordering::SeqCst);
            let _ = tx.send(Job::Speak {
                text: text.to_string(),
                epoch,
            });
        }
    }

    /// Block until every sentence submitted so far has been played, the
    /// pipeline is cancelled, or the flush timeout expires.
    pub fn flush(&self) -> FlushOutcome {
        self.flush_within(self.flush_timeout)
    }

    /// [`flush`](Self::flush) with an explicit timeout.
    pub fn flush_within(&self, timeout: Duration) -> FlushOutcome {
        if !self.enabled {
            return FlushOutcome::Drained;
        }
        let Some(tx) = &self.submit_tx else {
            return FlushOutcome::Cancelled;
        };

        let epoch = self.shared.epoch.load(Ordering::SeqCst);
        let ticket = {
            let mut c = lock(&self.shared.completion);
            c.issued += 1;
            c.issued
        };
        if tx.send(Job::Barrier { ticket: Some(ticket) }).is_err() {
            return FlushOutcome::Cancelled;
        }

        let deadline = Instant::now() + timeout;
        let mut c = lock(&self.shared.completion);
        loop {
            if c.finished >= ticket {
                return FlushOutcome::Drained;
            }
            if self.shared.is_stale(epoch) {
                return FlushOutcome::Cancelled;
            }
            let now = Instant::now();
            if now >= deadline {
                log::warn!("speech: flush timed out after {timeout:?}");
                return FlushOutcome::TimedOut;
            }
            c = self
                .shared
                .completed
                .wait_timeout(c, deadline - now)
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .0;
        }
    }

    /// Drop everything queued, stop the clip that is playing and reset the
    /// playback state.  Returns promptly; the sink notices within one poll.
    pub fn cancel(&self) {
        self.shared.epoch.fetch_add(1, Ordering::SeqCst);
        self.shared.wake_waiters();

        let dropped = self.submit_rx.try_iter().count() + self.play_rx.try_iter().count();
        if dropped > 0 {
            log::debug!("speech: cancel dropped {dropped} queued item(s)");
        }

        if let Some(tx) = &self.submit_tx {
            let _ = tx.send(Job::Barrier { ticket: None });
        }
        if let Some(tx) = &self.play_tx {
            let _ = tx.try_send(Playable::Barrier { ticket: None });
        }
        self.shared.reset_playback();
    }

    /// Read handle for the presenter.
    pub fn monitor(&self) -> PlaybackMonitor {
        self.monitor.clone()
    }
}

impl Drop for SpeechPipeline {
    fn drop(&mut self) {
        self.shared.shutdown.store(true, Ordering::SeqCst);
        self.cancel();
        self.submit_tx.take();
        self.play_tx.take();

        let deadline = Instant::now() + WORKER_EXIT_WAIT;
        while self.workers.iter().any(|w| !w.is_finished()) && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        for worker in self.workers.drain(..) {
            if worker.is_finished() {
                let _ = worker.join();
            } else {
                log::debug!("speech: detaching busy worker on shutdown");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Workers
// ---------------------------------------------------------------------------

fn fetch_loop(
    shared: &Shared,
    synth: &dyn SpeechSynthesizer,
    jobs: &Receiver<Job>,
    playable: &Sender<Playable>,
) {
    for job in jobs.iter() {
        match job {
            Job::Barrier { ticket } => {
                if playable.send(Playable::Barrier { ticket }).is_err() {
                    break;
                }
            }
            Job::Speak { text, epoch } => {
                if shared.is_stale(epoch) {
                    continue;
                }
                let audio = match synth.synthesize(&text) {
                    Ok(audio) => audio,
                    Err(e) => {
                        log::warn!("speech: skipping sentence ({e}): {:.40}", text);
                        continue;
                    }
                };
                if shared.is_stale(epoch) {
                    continue;
                }
                if playable.send(Playable::Clip { text, audio, epoch }).is_err() {
                    break;
                }
            }
        }
    }
    log::debug!("speech: fetch worker exiting");
}

fn play_loop(
    shared: &Shared,
    sink: &dyn AudioSink,
    items: &Receiver<Playable>,
    window: Duration,
    thresholds: &MouthThresholds,
) {
    for item in items.iter() {
        match item {
            Playable::Barrier { ticket } => {
                shared.reset_playback();
                if let Some(ticket) = ticket {
                    shared.finish_ticket(ticket);
                }
            }
            Playable::Clip { text, audio, epoch } => {
                if shared.is_stale(epoch) {
                    continue;
                }
                let timeline = MouthTimeline::from_wav(&audio, window, thresholds);
                {
                    let mut pb = lock(&shared.playback);
                    pb.text = text;
                    pb.timeline = timeline;
                    pb.started_at = None;
                    pb.speaking = false;
                }

                // The mouth clock starts when the device does, not when the
                // sink begins decoding and opening the stream.
                let started = || {
                    let mut pb = lock(&shared.playback);
                    if !shared.is_stale(epoch) {
                        pb.started_at = Some(Instant::now());
                        pb.speaking = true;
                    }
                };
                if let Err(e) = sink.play(&audio, &started, &|| shared.is_stale(epoch)) {
                    log::warn!("speech: playback failed: {e}");
                }

                let mut pb = lock(&shared.playback);
                pb.speaking = false;
                pb.timeline = MouthTimeline::empty(window);
            }
        }
    }
    shared.reset_playback();
    log::debug!("speech: play worker exiting");
}

// ---------------------------------------------------------------------------
// PlaybackMonitor
// ---------------------------------------------------------------------------

/// Cloneable read-only view of what is being spoken right now.
#[derive(Clone)]
pub struct PlaybackMonitor {
    shared: Arc<Shared>,
    caption_lag: Duration,
    caption_words: usize,
}

impl PlaybackMonitor {
    pub fn is_speaking(&self) -> bool {
        lock(&self.shared.playback).speaking
    }

    /// Mouth shape for this instant, `None` when nothing is playing.
    pub fn mouth_shape(&self) -> Option<MouthShape> {
        let pb = lock(&self.shared.playback);
        if !pb.speaking {
            return None;
        }
        pb.timeline.shape_at(pb.started_at?.elapsed())
    }

    /// The few words being spoken right now, or `""`.
    pub fn current_text(&self) -> String {
        let pb = lock(&self.shared.playback);
        let (true, Some(started)) = (pb.speaking, pb.started_at) else {
            return String::new();
        };
        caption_window(
            &pb.text,
            started.elapsed(),
            pb.timeline.duration(),
            self.caption_lag,
            self.caption_words,
        )
    }
}

impl std::fmt::Debug for PlaybackMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackMonitor")
            .field("speaking", &self.is_speaking())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Test doubles
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::speech::sink::PlaybackError;
    use crate::speech::synth::SynthError;

    /// Synthesizer whose "audio" is the UTF-8 text itself, with a per-text
    /// fetch delay and an optional failing input.
    #[derive(Default)]
    pub struct EchoSynth {
        pub delays: Vec<(&'static str, Duration)>,
        pub fail_on: Option<&'static str>,
    }

    impl SpeechSynthesizer for EchoSynth {
        fn synthesize(&self, text: &str) -> Result<Vec<u8>, SynthError> {
            if let Some((_, d)) = self.delays.iter().find(|(t, _)| *t == text) {
                std::thread::sleep(*d);
            }
            if self.fail_on == Some(text) {
                return Err(SynthError::Request("boom".into()));
            }
            Ok(text.as_bytes().to_vec())
        }
    }

    /// Sink that "plays" for a fixed time and records what it played.
    /// `setup` is spent before the output counts as started.
    #[derive(Default)]
    pub struct RecordingSink {
        pub setup: Duration,
        pub clip_len: Duration,
        pub played: Mutex<Vec<String>>,
        pub interrupted: AtomicU64,
    }

    impl RecordingSink {
        pub fn with_clip_len(clip_len: Duration) -> Self {
            Self {
                clip_len,
                ..Self::default()
            }
        }

        pub fn played(&self) -> Vec<String> {
            lock(&self.played).clone()
        }
    }

    impl AudioSink for RecordingSink {
        fn play(
            &self,
            wav: &[u8],
            started: &dyn Fn(),
            cancelled: &dyn Fn() -> bool,
        ) -> Result<(), PlaybackError> {
            lock(&self.played).push(String::from_utf8_lossy(wav).into_owned());
            std::thread::sleep(self.setup);
            started();
            let end = Instant::now() + self.clip_len;
            while Instant::now() < end {
                if cancelled() {
                    self.interrupted.fetch_add(1, Ordering::SeqCst);
                    return Ok(());
                }
                std::thread::sleep(Duration::from_millis(2));
            }
            Ok(())
        }
    }

    pub fn enabled_config() -> SpeechConfig {
        SpeechConfig {
            enabled: true,
            ..SpeechConfig::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
