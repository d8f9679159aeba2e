//! Audio data model and PCM processing.
//!
//! Chunks captured from the microphone are raw little-endian f32 mono PCM
//! tagged with a `audio/pcm;rate=<hz>;encoding=f32le` mime type. Decoding
//! recovers the sample rate from the tag; resampling brings the samples to
//! the 16kHz rate the transcription backends expect.

use std::time::Instant;

use crate::error::TranscribeError;

/// Target sample rate for speech recognition models.
pub const TARGET_SAMPLE_RATE: u32 = 16000;

/// Mime prefix for raw PCM chunk payloads.
const PCM_MIME_PREFIX: &str = "audio/pcm";

/// One timed slice of captured audio.
///
/// Immutable once captured. `sequence` is strictly increasing within a
/// capture run.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    pub sequence: u64,
    pub captured_at: Instant,
    pub mime_type: String,
    pub payload: Vec<u8>,
}

/// Decoded mono f32 samples at a known sample rate.
#[derive(Debug, Clone)]
pub struct DecodedSamples {
    pub sample_rate: u32,
    pub samples: Vec<f32>,
}

impl DecodedSamples {
    /// Duration of the samples in seconds.
    pub fn duration_secs(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / self.sample_rate as f32
    }
}

/// Build the mime type string for raw f32 PCM at the given rate.
pub fn pcm_mime(sample_rate: u32) -> String {
    format!("{PCM_MIME_PREFIX};rate={sample_rate};encoding=f32le")
}

/// Extract the sample rate from a PCM mime type.
/// Returns `None` if the type is not `audio/pcm` or carries no rate.
pub fn parse_pcm_rate(mime_type: &str) -> Option<u32> {
    let mut parts = mime_type.split(';').map(str::trim);
    if parts.next() != Some(PCM_MIME_PREFIX) {
        return None;
    }
    parts
        .find_map(|part| part.strip_prefix("rate="))
        .and_then(|rate| rate.parse().ok())
}

/// Decode a run of chunks into one contiguous sample buffer.
///
/// All chunks must carry the same PCM mime type; payloads are concatenated
/// in order.
pub fn decode_chunks(chunks: &[AudioChunk]) -> Result<DecodedSamples, TranscribeError> {
    let first = chunks
        .first()
        .ok_or_else(|| TranscribeError::Decode("no chunks to decode".to_string()))?;

    let sample_rate = parse_pcm_rate(&first.mime_type).ok_or_else(|| {
        TranscribeError::Decode(format!("unsupported mime type '{}'", first.mime_type))
    })?;

    let total_bytes: usize = chunks.iter().map(|c| c.payload.len()).sum();
    let mut samples = Vec::with_capacity(total_bytes / 4);

    for chunk in chunks {
        if chunk.mime_type != first.mime_type {
            return Err(TranscribeError::Decode(format!(
                "mixed mime types in window: '{}' vs '{}'",
                first.mime_type, chunk.mime_type
            )));
        }
        if chunk.payload.len() % 4 != 0 {
            return Err(TranscribeError::Decode(format!(
                "chunk {} payload of {} bytes is not f32-aligned",
                chunk.sequence,
                chunk.payload.len()
            )));
        }
        samples.extend(
            chunk
                .payload
                .chunks_exact(4)
                .map(|bytes| f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])),
        );
    }

    Ok(DecodedSamples {
        sample_rate,
        samples,
    })
}

/// Resample audio between sample rates by nearest-neighbor decimation.
///
/// When the rates match, the input is returned unchanged without copying.
/// Otherwise output index `i` takes `samples[floor(i * from_rate/to_rate)]`,
/// or `0.0` if that index falls out of bounds. Not band-limited; downstream
/// gating and inference tolerate the aliasing at the 16kHz target rate.
pub fn resample(
    samples: Vec<f32>,
    from_rate: u32,
    to_rate: u32,
) -> Result<Vec<f32>, TranscribeError> {
    if samples.is_empty() {
        return Err(TranscribeError::InvalidInput(
            "no samples to resample".to_string(),
        ));
    }
    if from_rate == 0 || to_rate == 0 {
        return Err(TranscribeError::InvalidInput(format!(
            "sample rates must be nonzero (from {from_rate}, to {to_rate})"
        )));
    }
    if from_rate == to_rate {
        return Ok(samples);
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let output_len = (samples.len() as f64 / ratio).floor() as usize;
    let mut output = Vec::with_capacity(output_len);

    for i in 0..output_len {
        let src = (i as f64 * ratio).floor() as usize;
        output.push(samples.get(src).copied().unwrap_or(0.0));
    }

    Ok(output)
}

/// Convert stereo interleaved samples to mono by averaging channels.
pub fn stereo_to_mono(stereo: &[f32]) -> Vec<f32> {
    stereo
        .chunks_exact(2)
        .map(|pair| (pair[0] + pair[1]) / 2.0)
        .collect()
}

/// Convert multi-channel interleaved samples to mono by averaging all channels.
pub fn to_mono(samples: &[f32], channels: u16) -> Vec<f32> {
    if channels == 1 {
        return samples.to_vec();
    }

    let channels = channels as usize;
    samples
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

#[cfg(test)]
#[path = "audio_test.rs"]
mod tests;
