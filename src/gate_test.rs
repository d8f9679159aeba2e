use super::*;
use crate::audio::pcm_mime;
use std::time::Instant;

fn sine(amplitude: f32, len: usize) -> Vec<f32> {
    (0..len)
        .map(|i| amplitude * (2.0 * std::f32::consts::PI * 440.0 * i as f32 / 16000.0).sin())
        .collect()
}

fn chunk_of_bytes(sequence: u64, len: usize) -> AudioChunk {
    AudioChunk {
        sequence,
        captured_at: Instant::now(),
        mime_type: pcm_mime(16000),
        payload: vec![0u8; len],
    }
}

#[test]
fn test_rejects_all_zero_samples() {
    let gate = QualityGate::new(GateConfig::default());
    let samples = vec![0.0f32; 16000];

    assert!(!gate.should_process(&samples));
}

#[test]
fn test_rejects_empty_samples() {
    let gate = QualityGate::new(GateConfig::default());

    assert!(!gate.should_process(&[]));
}

#[test]
fn test_rejects_near_silence() {
    let gate = QualityGate::new(GateConfig::default());

    // Amplitude 0.005 puts RMS around 0.0035, under the default threshold
    assert!(!gate.should_process(&sine(0.005, 16000)));
}

#[test]
fn test_accepts_speech_level_signal() {
    let gate = QualityGate::new(GateConfig::default());

    assert!(gate.should_process(&sine(0.5, 16000)));
}

#[test]
fn test_rejects_flat_offset_signal() {
    let gate = QualityGate::new(GateConfig::default());

    // Loud but constant: RMS passes, dynamic range is zero
    let samples = vec![0.5f32; 16000];
    assert!(!gate.should_process(&samples));
}

#[test]
fn test_window_gate_needs_more_than_minimum_bytes() {
    let gate = QualityGate::new(GateConfig::default());

    let exactly = vec![chunk_of_bytes(0, DEFAULT_MIN_WINDOW_BYTES)];
    assert!(!gate.should_process_window(&exactly));

    let over = vec![chunk_of_bytes(0, DEFAULT_MIN_WINDOW_BYTES + 1)];
    assert!(gate.should_process_window(&over));
}

#[test]
fn test_window_gate_sums_across_chunks() {
    let gate = QualityGate::new(GateConfig::default());

    let chunks: Vec<AudioChunk> = (0..3).map(|i| chunk_of_bytes(i, 8 * 1024)).collect();
    assert!(gate.should_process_window(&chunks));

    let small: Vec<AudioChunk> = (0..2).map(|i| chunk_of_bytes(i, 8 * 1024)).collect();
    assert!(!gate.should_process_window(&small));
}

#[test]
fn test_window_gate_rejects_empty_window() {
    let gate = QualityGate::new(GateConfig::default());

    assert!(!gate.should_process_window(&[]));
}

#[test]
fn test_custom_thresholds() {
    let gate = QualityGate::new(GateConfig {
        min_window_bytes: 10,
        silence_rms: 0.2,
        min_dynamic_range: 0.02,
    });

    // RMS of a 0.25-amplitude sine is about 0.18, under the raised threshold
    assert!(!gate.should_process(&sine(0.25, 16000)));
    assert!(gate.should_process(&sine(0.5, 16000)));
}
