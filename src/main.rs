//! Application entry point: talk-button.
//!
//! # Startup sequence
//!
//! 1. Initialise logging.
//! 2. Load [`AppConfig`] from disk (default on first run), overlay the
//!    environment.
//! 3. Build the collaborators: transcriber (API or typed dry run), chat
//!    client, speech pipeline, console presenter, microphone recorder.
//! 4. Create the [`Session`] and draw the idle screen.
//! 5. Spawn the button listener thread.
//! 6. Start the cpal capture stream feeding the recorder.
//! 7. Run a current-thread tokio runtime: a 1 Hz housekeeping tick until
//!    Ctrl-C or SIGTERM, then shut the session down.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use talk_button::{
    audio::{InputStream, MicRecorder, StreamHandle},
    button::{parse_key, ButtonListener, LogBacklight},
    config::AppConfig,
    display::ConsolePresenter,
    llm::ResponsesClient,
    pipeline::{Collaborators, Session},
    speech::{CpalSink, OpenAiSpeech, SpeechPipeline},
    stt::{ApiTranscriber, DryRunTranscriber, Transcriber},
};

const TICK_INTERVAL: Duration = Duration::from_secs(1);

fn main() -> anyhow::Result<()> {
    // 1. Logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("talk-button starting up");

    // 2. Configuration
    let mut config = AppConfig::load().unwrap_or_else(|e| {
        log::warn!("Failed to load config ({e}); using defaults");
        AppConfig::default()
    });
    config.apply_env();
    if config.dry_run() {
        log::warn!("No OpenAI API key: dry run, transcripts are typed on stdin");
        config.speech.enabled = false;
    }
    config.log_summary();

    // 3. Collaborators
    let transcriber: Arc<dyn Transcriber> = if config.dry_run() {
        Arc::new(DryRunTranscriber::stdin())
    } else {
        Arc::new(ApiTranscriber::from_config(&config.openai))
    };

    let speech = SpeechPipeline::new(
        Arc::new(OpenAiSpeech::from_config(&config.openai)),
        Arc::new(CpalSink::new(config.audio.output_device.clone())),
        &config.speech,
    )
    .context("failed to start speech workers")?;

    let recorder = MicRecorder::new(&config.audio);

    // 4. Session
    let session = Session::new(
        &config,
        Collaborators {
            capture: Arc::new(recorder.clone()),
            transcriber,
            chat: Arc::new(ResponsesClient::from_config(&config.chat)),
            presenter: Arc::new(ConsolePresenter::new(&config.display)),
            speech: Arc::new(speech),
            backlight: Arc::new(LogBacklight),
        },
    );
    session.go_idle();

    // 5. Button listener thread
    let key = parse_key(&config.button.push_to_talk_key).unwrap_or_else(|| {
        log::warn!(
            "Unknown button key {:?}; falling back to F9",
            config.button.push_to_talk_key
        );
        rdev::Key::F9
    });
    let _listener = {
        let session = session.clone();
        ButtonListener::start(key, move |event| session.handle_button(event))
            .context("failed to spawn button listener")?
    };
    log::info!("Button ready: {:?}", key);

    // 6. Microphone; the session keeps working (degraded) without one.
    let _stream: Option<StreamHandle> = match InputStream::open(config.audio.input_device.as_deref())
        .and_then(|input| {
            log::info!(
                "Audio capture: {} Hz, {} ch",
                input.sample_rate(),
                input.channels()
            );
            recorder.attach(&input)
        }) {
        Ok(handle) => Some(handle),
        Err(e) => {
            log::warn!("Audio capture unavailable: {e}");
            None
        }
    };

    // 7. Housekeeping loop until a termination signal
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    rt.block_on(async {
        let mut tick = tokio::time::interval(TICK_INTERVAL);
        let stop = terminate();
        tokio::pin!(stop);
        loop {
            tokio::select! {
                _ = tick.tick() => session.tick(),
                reason = &mut stop => {
                    log::info!("Received {reason}");
                    break;
                }
            }
        }
    });

    session.shutdown();
    log::info!("talk-button stopped");
    Ok(())
}

/// Resolves on Ctrl-C, or SIGTERM on Unix.
async fn terminate() -> &'static str {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => tokio::select! {
                _ = tokio::signal::ctrl_c() => "Ctrl-C",
                _ = sigterm.recv() => "SIGTERM",
            },
            Err(e) => {
                log::warn!("SIGTERM handler unavailable: {e}");
                let _ = tokio::signal::ctrl_c().await;
                "Ctrl-C"
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        "Ctrl-C"
    }
}
