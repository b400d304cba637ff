//! 16-bit PCM WAV helpers shared by capture, the silence gate and speech.
//!
//! Streamed WAV bodies often carry a placeholder data-chunk length, so
//! decoding stops quietly at the first short read instead of failing.

use std::io::Cursor;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WavError {
    #[error("invalid WAV data: {0}")]
    Hound(#[from] hound::Error),

    #[error("unsupported WAV format: {bits}-bit {format:?} (need 16-bit integer PCM)")]
    Unsupported {
        bits: u16,
        format: hound::SampleFormat,
    },
}

/// Decoded 16-bit PCM.  `samples` are interleaved when `channels > 1`.
#[derive(Debug, Clone, PartialEq)]
pub struct Pcm16 {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl Pcm16 {
    /// Playback length.
    pub fn duration(&self) -> std::time::Duration {
        let frames = self.samples.len() / self.channels.max(1) as usize;
        std::time::Duration::from_secs_f64(frames as f64 / self.sample_rate.max(1) as f64)
    }

    /// Samples as `f32` in `[-1.0, 1.0]`.
    pub fn to_f32(&self) -> Vec<f32> {
        self.samples
            .iter()
            .map(|&s| f32::from(s) / 32768.0)
            .collect()
    }
}

/// Decode an in-memory WAV.  Only 16-bit integer PCM is accepted.
pub fn decode(bytes: &[u8]) -> Result<Pcm16, WavError> {
    read_pcm16(hound::WavReader::new(Cursor::new(bytes))?)
}

/// Decode a WAV file.  Only 16-bit integer PCM is accepted.
pub fn decode_file(path: &std::path::Path) -> Result<Pcm16, WavError> {
    read_pcm16(hound::WavReader::open(path)?)
}

fn read_pcm16<R: std::io::Read>(mut reader: hound::WavReader<R>) -> Result<Pcm16, WavError> {
    let spec = reader.spec();
    if spec.bits_per_sample != 16 || spec.sample_format != hound::SampleFormat::Int {
        return Err(WavError::Unsupported {
            bits: spec.bits_per_sample,
            format: spec.sample_format,
        });
    }

    let samples = reader.samples::<i16>().map_while(Result::ok).collect();
    Ok(Pcm16 {
        samples,
        sample_rate: spec.sample_rate,
        channels: spec.channels,
    })
}

/// Encode 16-bit PCM as a complete in-memory WAV.
pub fn encode(pcm: &Pcm16) -> Result<Vec<u8>, WavError> {
    let spec = hound::WavSpec {
        channels: pcm.channels,
        sample_rate: pcm.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
        for &s in &pcm.samples {
            writer.write_sample(s)?;
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}

/// Write mono `f32` samples to `path` as 16-bit PCM.
pub fn write_mono_file(
    path: &std::path::Path,
    samples: &[f32],
    sample_rate: u32,
) -> Result<(), WavError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(path, spec)?;
    for &s in samples {
        writer.write_sample((s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)?;
    }
    writer.finalize()?;
    Ok(())
}

/// Root-mean-square of 16-bit samples.  Empty input is `0.0`.
pub fn rms(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f64 = samples.iter().map(|&s| f64::from(s) * f64::from(s)).sum();
    (sum / samples.len() as f64).sqrt() as f32
}

/// Scale a 16-bit WAV by `gain_db`, clipping at full scale.
///
/// Returns the input unchanged for a zero (or negative) gain.
pub fn apply_gain_db(bytes: &[u8], gain_db: f32) -> Result<Vec<u8>, WavError> {
    if gain_db <= 0.0 {
        return Ok(bytes.to_vec());
    }

    let mut pcm = decode(bytes)?;
    let factor = 10f32.powf(gain_db / 20.0);
    for s in &mut pcm.samples {
        *s = (f32::from(*s) * factor)
            .round()
            .clamp(f32::from(i16::MIN), f32::from(i16::MAX)) as i16;
    }
    encode(&pcm)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn mono(samples: Vec<i16>) -> Pcm16 {
        Pcm16 {
            samples,
            sample_rate: 16_000,
            channels: 1,
        }
    }

    #[test]
    fn rms_of_constant_signal_is_its_magnitude() {
        assert_eq!(rms(&[50, -50, 50, -50]), 50.0);
        assert_eq!(rms(&[]), 0.0);
    }

    #[test]
    fn gain_of_6db_roughly_doubles_and_clips() {
        let bytes = encode(&mono(vec![1000, -1000, 30_000])).unwrap();
        let out = decode(&apply_gain_db(&bytes, 6.0).unwrap()).unwrap();

        assert!((1990..=2000).contains(&out.samples[0]), "{:?}", out.samples);
        assert!((-2000..=-1990).contains(&out.samples[1]));
        assert_eq!(out.samples[2], i16::MAX);
    }

    #[test]
    fn zero_gain_returns_input_bytes() {
        let bytes = encode(&mono(vec![1, 2, 3])).unwrap();
        assert_eq!(apply_gain_db(&bytes, 0.0).unwrap(), bytes);
    }

    #[test]
    fn rejects_8_bit_audio() {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 8_000,
            bits_per_sample: 8,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut w = hound::WavWriter::new(&mut cursor, spec).unwrap();
            w.write_sample(10i8).unwrap();
            w.finalize().unwrap();
        }
        assert!(matches!(
            decode(&cursor.into_inner()),
            Err(WavError::Unsupported { bits: 8, .. })
        ));
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(decode(b"definitely not a wav file").is_err());
    }

    #[test]
    fn duration_counts_frames_not_samples() {
        let pcm = Pcm16 {
            samples: vec![0; 48_000],
            sample_rate: 24_000,
            channels: 2,
        };
        assert_eq!(pcm.duration(), std::time::Duration::from_secs(1));
    }
}
