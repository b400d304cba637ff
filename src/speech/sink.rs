//! Audio output for synthesized speech.
//!
//! [`AudioSink::play`] blocks until the clip has finished or the supplied
//! `cancelled` predicate turns true, whichever comes first.  The predicate is
//! polled every [`POLL_INTERVAL`], so cancellation takes effect within a few
//! tens of milliseconds.  `started` is called once, when sound actually
//! begins; decoding, resampling and opening the device happen before it.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SizedSample};
use thiserror::Error;

use crate::audio::{mono_to_interleaved, resample_clip, stereo_to_mono, wav, ResampleError, WavError};

pub const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Slack on top of the clip length before playback is abandoned.
const DRAIN_GRACE: Duration = Duration::from_millis(500);

// ---------------------------------------------------------------------------
// PlaybackError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("cannot decode clip: {0}")]
    Decode(#[from] WavError),

    #[error("no output device available")]
    NoDevice,

    #[error("output device {0:?} not found")]
    DeviceNotFound(String),

    #[error("failed to enumerate output devices: {0}")]
    Devices(#[from] cpal::DevicesError),

    #[error("failed to query output config: {0}")]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),

    #[error("unsupported output sample format {0:?}")]
    SampleFormat(cpal::SampleFormat),

    #[error("failed to build output stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("failed to start output stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),

    #[error(transparent)]
    Resample(#[from] ResampleError),
}

// ---------------------------------------------------------------------------
// AudioSink
// ---------------------------------------------------------------------------

pub trait AudioSink: Send + Sync {
    /// Play a WAV clip to completion, or until `cancelled()` returns `true`.
    ///
    /// `started()` fires once the output is running. It is not called for
    /// clips that fail to open or have no samples.
    fn play(
        &self,
        wav: &[u8],
        started: &dyn Fn(),
        cancelled: &dyn Fn() -> bool,
    ) -> Result<(), PlaybackError>;
}

// ---------------------------------------------------------------------------
// CpalSink
// ---------------------------------------------------------------------------

/// Plays through a cpal output stream opened per clip.
///
/// The clip is mixed to mono, resampled to the device rate and copied to
/// every device channel.
#[derive(Debug, Clone, Default)]
pub struct CpalSink {
    device_name: Option<String>,
}

impl CpalSink {
    /// `device_name` of `None` uses the system default output.
    pub fn new(device_name: Option<String>) -> Self {
        Self { device_name }
    }

    fn device(&self) -> Result<cpal::Device, PlaybackError> {
        let host = cpal::default_host();
        match &self.device_name {
            Some(wanted) => host
                .output_devices()?
                .find(|d| d.name().is_ok_and(|n| &n == wanted))
                .ok_or_else(|| PlaybackError::DeviceNotFound(wanted.clone())),
            None => host.default_output_device().ok_or(PlaybackError::NoDevice),
        }
    }
}

impl AudioSink for CpalSink {
    fn play(
        &self,
        bytes: &[u8],
        started: &dyn Fn(),
        cancelled: &dyn Fn() -> bool,
    ) -> Result<(), PlaybackError> {
        let pcm = wav::decode(bytes)?;
        if pcm.samples.is_empty() {
            return Ok(());
        }

        let device = self.device()?;
        let supported = device.default_output_config()?;
        let format = supported.sample_format();
        let config: cpal::StreamConfig = supported.into();

        let mono = stereo_to_mono(&pcm.to_f32(), pcm.channels);
        let resampled = resample_clip(&mono, pcm.sample_rate, config.sample_rate.0)?;
        let frames = resampled.len();
        let samples = Arc::new(mono_to_interleaved(&resampled, config.channels));

        let finished = Arc::new(AtomicBool::new(false));
        let stream = match format {
            cpal::SampleFormat::F32 => build_stream::<f32>(&device, &config, &samples, &finished)?,
            cpal::SampleFormat::I16 => build_stream::<i16>(&device, &config, &samples, &finished)?,
            cpal::SampleFormat::U16 => build_stream::<u16>(&device, &config, &samples, &finished)?,
            other => return Err(PlaybackError::SampleFormat(other)),
        };
        stream.play()?;
        started();

        let clip_len = Duration::from_secs_f64(frames as f64 / config.sample_rate.0.max(1) as f64);
        let deadline = Instant::now() + clip_len + DRAIN_GRACE;

        while !finished.load(Ordering::Acquire) {
            if cancelled() {
                log::debug!("speech: playback interrupted");
                break;
            }
            if Instant::now() >= deadline {
                log::warn!("speech: playback did not drain in time");
                break;
            }
            std::thread::sleep(POLL_INTERVAL);
        }

        drop(stream);
        Ok(())
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    samples: &Arc<Vec<f32>>,
    finished: &Arc<AtomicBool>,
) -> Result<cpal::Stream, PlaybackError>
where
    T: SizedSample + FromSample<f32>,
{
    let samples = Arc::clone(samples);
    let finished = Arc::clone(finished);
    let position = AtomicUsize::new(0);

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            let start = position.load(Ordering::Relaxed);
            for (i, out) in data.iter_mut().enumerate() {
                let s = samples.get(start + i).copied().unwrap_or(0.0);
                *out = T::from_sample_(s);
            }
            let end = start + data.len();
            position.store(end, Ordering::Relaxed);
            if end >= samples.len() {
                finished.store(true, Ordering::Release);
            }
        },
        |err| log::error!("speech: output stream error: {err}"),
        None,
    )?;
    Ok(stream)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
