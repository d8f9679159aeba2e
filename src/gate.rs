//! Loudness gate deciding whether audio is worth transcribing.
//!
//! Near-silent windows are dropped before they cost a local model call or a
//! billable remote job. A cheap byte-size check runs before decoding; the
//! numeric checks (RMS, dynamic range) run on decoded samples.

use tracing::trace;

use crate::audio::AudioChunk;

/// Default minimum payload bytes across a chunk window before decoding pays off.
pub const DEFAULT_MIN_WINDOW_BYTES: usize = 20 * 1024;

/// Default RMS below which a window counts as silence.
pub const DEFAULT_SILENCE_RMS: f32 = 0.01;

/// Default dynamic range below which a window counts as noise floor.
pub const DEFAULT_MIN_DYNAMIC_RANGE: f32 = 0.02;

/// Thresholds for the quality gate.
#[derive(Debug, Clone)]
pub struct GateConfig {
    /// Minimum total payload bytes across the candidate chunk window.
    pub min_window_bytes: usize,
    /// Minimum RMS amplitude for samples to count as speech-bearing.
    pub silence_rms: f32,
    /// Minimum `max(|x|) - min(|x|)` spread above the noise floor.
    pub min_dynamic_range: f32,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            min_window_bytes: DEFAULT_MIN_WINDOW_BYTES,
            silence_rms: DEFAULT_SILENCE_RMS,
            min_dynamic_range: DEFAULT_MIN_DYNAMIC_RANGE,
        }
    }
}

/// Pure classifier over chunk windows and decoded samples.
#[derive(Debug)]
pub struct QualityGate {
    config: GateConfig,
}

impl QualityGate {
    /// Create a gate with the given thresholds.
    pub fn new(config: GateConfig) -> Self {
        Self { config }
    }

    /// Cheap pre-decode check: is there enough raw audio in the window to
    /// bother decoding at all?
    pub fn should_process_window(&self, chunks: &[AudioChunk]) -> bool {
        let total_bytes: usize = chunks.iter().map(|c| c.payload.len()).sum();
        let enough = total_bytes > self.config.min_window_bytes;

        trace!(
            chunks = chunks.len(),
            total_bytes = total_bytes,
            min_bytes = self.config.min_window_bytes,
            enough = enough,
            "Window byte gate"
        );

        enough
    }

    /// Decide whether decoded samples carry enough signal to transcribe.
    /// Rejects silence (low RMS) and flat noise-floor audio (low spread).
    pub fn should_process(&self, samples: &[f32]) -> bool {
        if samples.is_empty() {
            return false;
        }

        let rms = (samples.iter().map(|x| x * x).sum::<f32>() / samples.len() as f32).sqrt();
        let max_abs = samples.iter().map(|x| x.abs()).fold(0.0f32, f32::max);
        let min_abs = samples.iter().map(|x| x.abs()).fold(f32::MAX, f32::min);
        let dynamic_range = max_abs - min_abs;

        let pass = rms >= self.config.silence_rms && dynamic_range >= self.config.min_dynamic_range;

        trace!(
            rms = rms,
            dynamic_range = dynamic_range,
            silence_rms = self.config.silence_rms,
            min_dynamic_range = self.config.min_dynamic_range,
            pass = pass,
            "Sample gate"
        );

        pass
    }
}

#[cfg(test)]
#[path = "gate_test.rs"]
mod tests;
