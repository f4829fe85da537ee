//! Audio codec adapter between the telephony leg and the speech services.
//!
//! The telephony gateway carries 8 kHz G.711 mu-law, one byte per sample.
//! The recognizer wants 16-bit signed little-endian PCM at its configured rate,
//! and the synthesizer returns 16-bit PCM at its own rate. Both conversions
//! operate on whole frames and keep no state between calls. Rate changes go
//! through rubato's FFT resampler; frames too short for it are interpolated
//! linearly.
//!
//! # Example
//!
//! ```rust
//! use voice_relay::core::codec::{to_recognizer_format, to_telephony_format};
//!
//! let silence = vec![0xFFu8; 160];
//! let pcm = to_recognizer_format(&silence, 8000).unwrap();
//! assert_eq!(pcm.len(), 320);
//!
//! let back = to_telephony_format(&pcm, 8000).unwrap();
//! assert_eq!(back.as_ref(), silence.as_slice());
//! ```

use bytes::Bytes;
use rubato::{FftFixedIn, Resampler};
use thiserror::Error;
use tracing::warn;

/// Sample rate of the telephony leg.
pub const TELEPHONY_SAMPLE_RATE: u32 = 8000;

/// Width in bytes of one linear PCM sample.
pub const PCM_SAMPLE_WIDTH: usize = 2;

const MULAW_BIAS: i32 = 0x84;
const MULAW_CLIP: i32 = 32635;

const MIN_SAMPLE_RATE: u32 = 8000;
const MAX_SAMPLE_RATE: u32 = 48000;

/// Inputs shorter than this skip the FFT resampler.
const MIN_FFT_INPUT: usize = 64;
/// Largest block handed to the FFT resampler at once.
const MAX_FFT_CHUNK: usize = 1024;
const FFT_SUB_CHUNKS: usize = 2;

const PCM_SCALE: f64 = 32768.0;

/// Errors raised while converting a single audio frame.
///
/// A codec error only ever concerns the frame that produced it; callers drop
/// that frame and keep the stream going.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// The frame length is not a whole number of samples.
    #[error("Malformed frame: {len} bytes is not a multiple of the {sample_width}-byte sample width")]
    MisalignedFrame { len: usize, sample_width: usize },

    /// The requested sample rate is outside what the adapter handles.
    #[error("Unsupported sample rate: {0} Hz")]
    UnsupportedSampleRate(u32),
}

// =============================================================================
// G.711 mu-law
// =============================================================================

/// Compand one linear sample into a mu-law byte.
#[inline]
pub fn encode_mulaw(sample: i16) -> u8 {
    let mut pcm = sample as i32;
    let sign = if pcm < 0 {
        pcm = -pcm;
        0x80
    } else {
        0x00
    };

    pcm = pcm.min(MULAW_CLIP) + MULAW_BIAS;

    let mut exponent = 7;
    let mut mask = 0x4000;
    while exponent > 0 && pcm & mask == 0 {
        exponent -= 1;
        mask >>= 1;
    }

    let mantissa = (pcm >> (exponent + 3)) & 0x0F;
    !(sign | (exponent << 4) | mantissa) as u8
}

/// Expand one mu-law byte into a linear sample.
#[inline]
pub fn decode_mulaw(byte: u8) -> i16 {
    let value = !byte;
    let sign = value & 0x80;
    let exponent = ((value >> 4) & 0x07) as i32;
    let mantissa = (value & 0x0F) as i32;

    let magnitude = (((mantissa << 3) + MULAW_BIAS) << exponent) - MULAW_BIAS;
    if sign != 0 {
        -magnitude as i16
    } else {
        magnitude as i16
    }
}

// =============================================================================
// Frame conversion
// =============================================================================

/// Convert a telephony frame (mu-law @ 8 kHz) into recognizer PCM.
///
/// Returns 16-bit little-endian mono PCM at `recognizer_rate`.
pub fn to_recognizer_format(frame: &[u8], recognizer_rate: u32) -> Result<Bytes, CodecError> {
    check_rate(recognizer_rate)?;

    let samples: Vec<i16> = frame.iter().map(|&b| decode_mulaw(b)).collect();
    let resampled = resample(&samples, TELEPHONY_SAMPLE_RATE, recognizer_rate);

    Ok(samples_to_bytes(&resampled))
}

/// Convert synthesized PCM (16-bit little-endian @ `source_rate`) into a
/// telephony frame (mu-law @ 8 kHz).
pub fn to_telephony_format(frame: &[u8], source_rate: u32) -> Result<Bytes, CodecError> {
    check_rate(source_rate)?;

    let samples = bytes_to_samples(frame)?;
    let resampled = resample(&samples, source_rate, TELEPHONY_SAMPLE_RATE);

    Ok(resampled.iter().map(|&s| encode_mulaw(s)).collect())
}

fn check_rate(rate: u32) -> Result<(), CodecError> {
    if (MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&rate) {
        Ok(())
    } else {
        Err(CodecError::UnsupportedSampleRate(rate))
    }
}

fn bytes_to_samples(frame: &[u8]) -> Result<Vec<i16>, CodecError> {
    if frame.len() % PCM_SAMPLE_WIDTH != 0 {
        return Err(CodecError::MisalignedFrame {
            len: frame.len(),
            sample_width: PCM_SAMPLE_WIDTH,
        });
    }

    Ok(frame
        .chunks_exact(PCM_SAMPLE_WIDTH)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect())
}

fn samples_to_bytes(samples: &[i16]) -> Bytes {
    let mut out = Vec::with_capacity(samples.len() * PCM_SAMPLE_WIDTH);
    for sample in samples {
        out.extend_from_slice(&sample.to_le_bytes());
    }
    Bytes::from(out)
}

/// Resample mono PCM.
fn resample(samples: &[i16], from: u32, to: u32) -> Vec<i16> {
    if from == to || samples.is_empty() {
        return samples.to_vec();
    }

    if samples.len() < MIN_FFT_INPUT {
        return resample_linear(samples, from, to);
    }

    match resample_fft(samples, from, to) {
        Ok(resampled) => resampled,
        Err(e) => {
            warn!(error = %e, from, to, "FFT resampling failed, falling back to linear");
            resample_linear(samples, from, to)
        }
    }
}

fn output_len(input_len: usize, from: u32, to: u32) -> usize {
    ((input_len as u64 * to as u64) / from as u64).max(1) as usize
}

/// Band-limited resampling. The resampler's output delay is trimmed and the
/// result cut to exactly `input_len * to / from` samples.
fn resample_fft(samples: &[i16], from: u32, to: u32) -> Result<Vec<i16>, String> {
    let chunk = samples.len().min(MAX_FFT_CHUNK);
    let mut resampler =
        FftFixedIn::<f64>::new(from as usize, to as usize, chunk, FFT_SUB_CHUNKS, 1)
            .map_err(|e| e.to_string())?;

    let wanted = output_len(samples.len(), from, to);
    let delay = resampler.output_delay();
    let input: Vec<f64> = samples.iter().map(|&s| s as f64 / PCM_SCALE).collect();
    let mut output: Vec<f64> = Vec::with_capacity(wanted + delay + chunk);

    let mut position = 0;
    while position < input.len() {
        let needed = resampler.input_frames_next();
        let end = (position + needed).min(input.len());
        let block = &input[position..end];
        let frames = if block.len() == needed {
            resampler.process(&[block], None)
        } else {
            resampler.process_partial(Some(&[block][..]), None)
        }
        .map_err(|e| e.to_string())?;
        output.extend_from_slice(&frames[0]);
        position = end;
    }

    // Push the tail still held in the filter.
    while output.len() < wanted + delay {
        let frames = resampler
            .process_partial::<&[f64]>(None, None)
            .map_err(|e| e.to_string())?;
        if frames[0].is_empty() {
            break;
        }
        output.extend_from_slice(&frames[0]);
    }

    let mut resampled: Vec<i16> = output
        .into_iter()
        .skip(delay)
        .take(wanted)
        .map(|s| (s * PCM_SCALE).round().clamp(i16::MIN as f64, i16::MAX as f64) as i16)
        .collect();
    resampled.resize(wanted, 0);
    Ok(resampled)
}

fn resample_linear(samples: &[i16], from: u32, to: u32) -> Vec<i16> {
    let out_len = output_len(samples.len(), from, to);
    let step = from as f64 / to as f64;
    let last = samples.len() - 1;

    (0..out_len)
        .map(|i| {
            let position = i as f64 * step;
            let index = position.floor() as usize;
            if index >= last {
                return samples[last];
            }
            let fraction = position - index as f64;
            let a = samples[index] as f64;
            let b = samples[index + 1] as f64;
            (a + (b - a) * fraction).round() as i16
        })
        .collect()
}
