//! Sample-rate conversion and channel mixing.
//!
//! Two resamplers live here because the two directions have different needs:
//!
//! 1. [`resample_linear`]: cheap per-chunk linear interpolation used on the
//!    live microphone stream, where every cpal buffer is converted as it
//!    arrives and latency matters more than fidelity.
//! 2. [`resample_clip`]: whole-clip FFT resampling (`rubato`) used on
//!    synthesized speech before playback, where the clip is already complete
//!    and audible quality matters.

use rubato::{FftFixedIn, Resampler};
use thiserror::Error;

/// Frames handed to the FFT resampler per call.
const CLIP_CHUNK_FRAMES: usize = 1024;

#[derive(Debug, Error)]
pub enum ResampleError {
    #[error("sample rates must be non-zero (got {from} -> {to})")]
    ZeroRate { from: u32, to: u32 },

    #[error("failed to build resampler: {0}")]
    Construction(#[from] rubato::ResamplerConstructionError),

    #[error("resampling failed: {0}")]
    Process(#[from] rubato::ResampleError),
}

// ---------------------------------------------------------------------------
// stereo_to_mono
// ---------------------------------------------------------------------------

/// Mix interleaved multi-channel audio down to mono by averaging all channels.
///
/// ```rust
/// use talk_button::audio::stereo_to_mono;
///
/// let stereo = vec![0.5_f32, -0.5, 0.2, 0.4]; // L R L R
/// let mono = stereo_to_mono(&stereo, 2);
/// assert_eq!(mono.len(), 2);
/// assert!((mono[1] - 0.3).abs() < 1e-6);
/// ```
pub fn stereo_to_mono(samples: &[f32], channels: u16) -> Vec<f32> {
    match channels {
        0 => Vec::new(),
        1 => samples.to_vec(),
        n => {
            let n = n as usize;
            samples
                .chunks_exact(n)
                .map(|frame| frame.iter().sum::<f32>() / n as f32)
                .collect()
        }
    }
}

/// Duplicate a mono signal into `channels` interleaved channels.
pub fn mono_to_interleaved(samples: &[f32], channels: u16) -> Vec<f32> {
    let n = channels.max(1) as usize;
    if n == 1 {
        return samples.to_vec();
    }
    samples
        .iter()
        .flat_map(|&s| std::iter::repeat(s).take(n))
        .collect()
}

// ---------------------------------------------------------------------------
// resample_linear
// ---------------------------------------------------------------------------

/// Resample mono `samples` from `from` Hz to `to` Hz using linear
/// interpolation.  Equal rates (or empty input) are a copy.
///
/// ```rust
/// use talk_button::audio::resample_linear;
///
/// let hi = vec![0.5_f32; 480];
/// assert_eq!(resample_linear(&hi, 48_000, 16_000).len(), 160);
/// ```
pub fn resample_linear(samples: &[f32], from: u32, to: u32) -> Vec<f32> {
    if from == to || from == 0 || to == 0 || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = to as f64 / from as f64;
    let output_len = (samples.len() as f64 * ratio).ceil() as usize;
    let mut output = Vec::with_capacity(output_len);

    for i in 0..output_len {
        let src_pos = i as f64 / ratio;
        let idx = src_pos as usize;
        let frac = (src_pos - idx as f64) as f32;

        let sample = match (samples.get(idx), samples.get(idx + 1)) {
            (Some(&a), Some(&b)) => a * (1.0 - frac) + b * frac,
            (Some(&a), None) => a,
            _ => 0.0,
        };
        output.push(sample);
    }

    output
}

// ---------------------------------------------------------------------------
// resample_clip
// ---------------------------------------------------------------------------

/// Resample a complete mono clip with an FFT resampler.
///
/// The tail chunk is zero-padded to the resampler's fixed input size and the
/// padding's share of the output is dropped again.
pub fn resample_clip(samples: &[f32], from: u32, to: u32) -> Result<Vec<f32>, ResampleError> {
    if from == 0 || to == 0 {
        return Err(ResampleError::ZeroRate { from, to });
    }
    if from == to || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let mut resampler = FftFixedIn::<f32>::new(from as usize, to as usize, CLIP_CHUNK_FRAMES, 2, 1)?;
    let ratio = to as f64 / from as f64;
    let expected = (samples.len() as f64 * ratio).ceil() as usize;
    let mut output = Vec::with_capacity(expected + CLIP_CHUNK_FRAMES);

    let mut offset = 0;
    while offset < samples.len() {
        let need = resampler.input_frames_next();
        let take = need.min(samples.len() - offset);

        let mut chunk = vec![0.0_f32; need];
        chunk[..take].copy_from_slice(&samples[offset..offset + take]);

        let processed = resampler.process(&[chunk], None)?;
        if let Some(channel) = processed.into_iter().next() {
            output.extend(channel);
        }
        offset += take;
    }

    output.truncate(expected);
    Ok(output)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
