//! Microphone capture via `cpal`, and push-to-talk recording on top of it.
//!
//! [`InputStream`] wraps the cpal host/device/stream lifecycle and delivers
//! raw [`AudioChunk`]s over a channel.  [`MicRecorder`] is the [`Capture`]
//! implementation the session uses: while a recording is active it keeps the
//! mono 16 kHz samples fed to it by the resample thread, and on `stop` writes
//! them out as a 16-bit WAV.
//!
//! ```text
//! cpal callback ─AudioChunk─▶ audio-resample thread ─▶ MicRecorder buffer
//!                              (downmix + resample)       │ stop()
//!                                                         ▼
//!                                                    utterance.wav
//! ```

use std::path::{Path, PathBuf};
use std::sync::{mpsc, Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use thiserror::Error;

use crate::audio::{resample, wav};
use crate::config::AudioConfig;
use crate::sync::lock;

/// Recordings smaller than this are considered missing.
pub const MIN_RECORDING_BYTES: u64 = 100;

// ---------------------------------------------------------------------------
// CaptureError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("a recording is already in progress")]
    AlreadyRecording,

    #[error("no input device found on the default audio host")]
    NoDevice,

    #[error("input device {0:?} not found")]
    DeviceNotFound(String),

    #[error("failed to enumerate input devices: {0}")]
    Devices(#[from] cpal::DevicesError),

    #[error("failed to query default input config: {0}")]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),

    #[error("failed to build input stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("failed to start audio stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),

    #[error("failed to spawn resample thread: {0}")]
    Thread(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Recording / Capture
// ---------------------------------------------------------------------------

/// Handle to a finished recording on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recording {
    pub path: PathBuf,
}

impl Recording {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `false` when the file is absent or too small to hold any audio.
    pub fn is_usable(&self) -> bool {
        std::fs::metadata(&self.path).is_ok_and(|m| m.len() >= MIN_RECORDING_BYTES)
    }
}

/// Start/stop/cancel a microphone recording.
pub trait Capture: Send + Sync {
    /// Begin recording.  Fails if a recording is already running.
    fn start(&self) -> Result<(), CaptureError>;

    /// End the recording and hand back whatever was written.  Never fails;
    /// a missing or undersized file is logged and returned as-is.
    fn stop(&self) -> Recording;

    /// Abandon the current recording, if any.
    fn cancel(&self);

    /// RMS energy of the recording over 16-bit samples.
    ///
    /// An unreadable recording scores `+∞` so it is never mistaken for
    /// silence.
    fn silence_score(&self, recording: &Recording) -> f32 {
        recording_rms(&recording.path)
    }
}

/// RMS of a 16-bit WAV file; `0.0` for an empty file, `+∞` when unreadable.
pub fn recording_rms(path: &Path) -> f32 {
    match wav::decode_file(path) {
        Ok(pcm) => wav::rms(&pcm.samples),
        Err(e) => {
            log::warn!("capture: level check failed for {}: {e}", path.display());
            f32::INFINITY
        }
    }
}

// ---------------------------------------------------------------------------
// MicRecorder
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct RecordBuffer {
    samples: Vec<f32>,
    recording: bool,
}

/// [`Capture`] backed by a shared sample buffer.
///
/// Cheap to clone; all clones share one buffer.  The resample thread feeds
/// it through [`MicRecorder::push_samples`].
#[derive(Debug, Clone)]
pub struct MicRecorder {
    buffer: Arc<Mutex<RecordBuffer>>,
    path: PathBuf,
    sample_rate: u32,
    max_samples: usize,
}

impl MicRecorder {
    pub fn new(config: &AudioConfig) -> Self {
        let max_samples = (config.max_recording_secs.max(0.0) * config.sample_rate as f32) as usize;
        Self {
            buffer: Arc::new(Mutex::new(RecordBuffer::default())),
            path: config.recording_path.clone(),
            sample_rate: config.sample_rate,
            max_samples,
        }
    }

    /// Append mono samples at the recorder's sample rate.  Ignored unless a
    /// recording is active; anything past the length cap is dropped.
    pub fn push_samples(&self, samples: &[f32]) {
        let mut buf = lock(&self.buffer);
        if !buf.recording {
            return;
        }
        let room = self.max_samples.saturating_sub(buf.samples.len());
        let take = room.min(samples.len());
        buf.samples.extend_from_slice(&samples[..take]);
    }

    pub fn is_recording(&self) -> bool {
        lock(&self.buffer).recording
    }

    /// Spawn the resample thread and start `input` streaming into this
    /// recorder.  Keep the returned handle alive for as long as capture is
    /// needed.
    pub fn attach(&self, input: &InputStream) -> Result<StreamHandle, CaptureError> {
        let (chunk_tx, chunk_rx) = mpsc::channel::<AudioChunk>();
        let recorder = self.clone();
        let target_rate = self.sample_rate;

        std::thread::Builder::new()
            .name("audio-resample".into())
            .spawn(move || {
                while let Ok(chunk) = chunk_rx.recv() {
                    if !recorder.is_recording() {
                        continue;
                    }
                    let mono = resample::stereo_to_mono(&chunk.samples, chunk.channels);
                    let resampled = resample::resample_linear(&mono, chunk.sample_rate, target_rate);
                    recorder.push_samples(&resampled);
                }
            })?;

        input.start(chunk_tx)
    }
}

impl Capture for MicRecorder {
    fn start(&self) -> Result<(), CaptureError> {
        let mut buf = lock(&self.buffer);
        if buf.recording {
            return Err(CaptureError::AlreadyRecording);
        }
        if self.path.exists() {
            if let Err(e) = std::fs::remove_file(&self.path) {
                log::warn!("capture: could not remove old {}: {e}", self.path.display());
            }
        }
        buf.samples.clear();
        buf.recording = true;
        log::info!("capture: recording started");
        Ok(())
    }

    fn stop(&self) -> Recording {
        let samples = {
            let mut buf = lock(&self.buffer);
            buf.recording = false;
            std::mem::take(&mut buf.samples)
        };

        let secs = samples.len() as f32 / self.sample_rate.max(1) as f32;
        log::info!("capture: recording stopped ({secs:.2} s)");

        if let Err(e) = wav::write_mono_file(&self.path, &samples, self.sample_rate) {
            log::error!("capture: failed to write {}: {e}", self.path.display());
        }

        let recording = Recording::new(&self.path);
        if !recording.is_usable() {
            log::warn!("capture: WAV file missing or too small");
        }
        recording
    }

    fn cancel(&self) {
        let mut buf = lock(&self.buffer);
        if buf.recording {
            log::info!("capture: recording cancelled");
        }
        buf.recording = false;
        buf.samples.clear();
    }
}

// ---------------------------------------------------------------------------
// AudioChunk / StreamHandle
// ---------------------------------------------------------------------------

/// A single buffer of raw audio as delivered by the cpal callback.
///
/// Samples are interleaved `f32` in the range `[-1.0, 1.0]`.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

/// RAII guard that keeps the cpal stream alive.  Dropping it stops capture.
pub struct StreamHandle {
    _stream: cpal::Stream,
}

// ---------------------------------------------------------------------------
// InputStream
// ---------------------------------------------------------------------------

/// Microphone device wrapper built on top of `cpal`.
pub struct InputStream {
    device: cpal::Device,
    config: cpal::StreamConfig,
    sample_rate: u32,
    channels: u16,
}

impl InputStream {
    /// Open the named input device, or the system default when `name` is
    /// `None`, using the device's preferred stream configuration.
    pub fn open(name: Option<&str>) -> Result<Self, CaptureError> {
        let host = cpal::default_host();
        let device = match name {
            Some(wanted) => host
                .input_devices()?
                .find(|d| d.name().is_ok_and(|n| n == wanted))
                .ok_or_else(|| CaptureError::DeviceNotFound(wanted.to_string()))?,
            None => host.default_input_device().ok_or(CaptureError::NoDevice)?,
        };

        let supported = device.default_input_config()?;
        let channels = supported.channels();
        let sample_rate = supported.sample_rate().0;

        Ok(Self {
            device,
            config: supported.into(),
            sample_rate,
            channels,
        })
    }

    /// Start streaming [`AudioChunk`]s to `tx`.  Send errors (receiver
    /// dropped) are ignored so the audio thread never panics.
    pub fn start(&self, tx: mpsc::Sender<AudioChunk>) -> Result<StreamHandle, CaptureError> {
        let sample_rate = self.sample_rate;
        let channels = self.channels;

        let stream = self.device.build_input_stream(
            &self.config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                let _ = tx.send(AudioChunk {
                    samples: data.to_vec(),
                    sample_rate,
                    channels,
                });
            },
            |err: cpal::StreamError| {
                log::error!("capture: cpal stream error: {err}");
            },
            None,
        )?;

        stream.play()?;
        Ok(StreamHandle { _stream: stream })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
