//! In-process Whisper backend.
//!
//! Uses whisper.cpp via whisper-rs. The model is acquired lazily on the
//! first call: a ranked list of candidate model files is tried in order
//! under one shared time budget, and the first successful load serves every
//! subsequent call until `reset()`.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use whisper_rs::{
    FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters, WhisperState,
};

use super::{Transcription, TranscriptionBackend, TranscriptionRequest};
use crate::audio::TARGET_SAMPLE_RATE;
use crate::error::TranscribeError;

/// Total budget for acquiring a model across the whole candidate list.
pub const MODEL_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(60);

// Primary decode thresholds (whisper.cpp defaults).
const PRIMARY_NO_SPEECH_THOLD: f32 = 0.6;
const PRIMARY_LOGPROB_THOLD: f32 = -1.0;

// Retry thresholds: half the encoder context (about 15s of audio) and more
// permissive acceptance, for clips the primary pass decodes to nothing.
const RETRY_AUDIO_CTX: i32 = 768;
const RETRY_NO_SPEECH_THOLD: f32 = 0.3;
const RETRY_LOGPROB_THOLD: f32 = -2.0;

enum DecodePass {
    Primary,
    Retry,
}

struct LoadedModel {
    state: WhisperState,
    path: PathBuf,
}

/// Whisper speech-to-text backend over a lazily loaded local model.
///
/// The underlying WhisperContext is leaked intentionally - once a model is
/// loaded it stays resident for the process lifetime. `reset()` only clears
/// the handle so the next call acquires afresh.
pub struct LocalModelBackend {
    candidates: Vec<PathBuf>,
    acquire_timeout: Duration,
    loaded: Mutex<Option<LoadedModel>>,
}

impl LocalModelBackend {
    /// Create a backend over a ranked list of candidate model paths.
    pub fn new(candidates: Vec<PathBuf>) -> Self {
        Self::with_timeout(candidates, MODEL_ACQUIRE_TIMEOUT)
    }

    /// Create a backend with a custom acquisition budget.
    pub fn with_timeout(candidates: Vec<PathBuf>, acquire_timeout: Duration) -> Self {
        Self {
            candidates,
            acquire_timeout,
            loaded: Mutex::new(None),
        }
    }

    /// Ensure a model is loaded, trying candidates in rank order.
    /// A no-op once a model is resident.
    pub async fn acquire(&self) -> Result<(), TranscribeError> {
        let mut guard = self.loaded.lock().await;
        self.acquire_locked(&mut guard).await
    }

    /// Drop the loaded model handle. The next call re-acquires.
    pub async fn reset(&self) {
        let mut guard = self.loaded.lock().await;
        if let Some(loaded) = guard.take() {
            info!(path = %loaded.path.display(), "Dropped loaded model handle");
        }
    }

    /// True once a model has been acquired.
    pub async fn is_loaded(&self) -> bool {
        self.loaded.lock().await.is_some()
    }

    async fn acquire_locked(
        &self,
        guard: &mut Option<LoadedModel>,
    ) -> Result<(), TranscribeError> {
        if guard.is_some() {
            return Ok(());
        }
        if self.candidates.is_empty() {
            return Err(TranscribeError::BackendUnavailable(
                "no candidate models configured".to_string(),
            ));
        }

        let deadline = Instant::now() + self.acquire_timeout;
        let mut last_failure = String::new();

        for path in &self.candidates {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                last_failure = "acquisition budget exhausted".to_string();
                break;
            }

            info!(
                path = %path.display(),
                remaining_ms = remaining.as_millis() as u64,
                "Trying candidate model"
            );

            let load_path = path.clone();
            let load = tokio::task::spawn_blocking(move || load_model(&load_path));

            match tokio::time::timeout(remaining, load).await {
                Ok(Ok(Ok(state))) => {
                    info!(path = %path.display(), "Model loaded");
                    *guard = Some(LoadedModel {
                        state,
                        path: path.clone(),
                    });
                    return Ok(());
                }
                Ok(Ok(Err(e))) => {
                    warn!(path = %path.display(), error = %e, "Candidate model failed to load");
                    last_failure = e.to_string();
                }
                Ok(Err(e)) => {
                    warn!(path = %path.display(), error = %e, "Model load task failed");
                    last_failure = format!("load task failed: {e}");
                }
                Err(_) => {
                    // The blocking load keeps running but its result is discarded.
                    warn!(path = %path.display(), "Candidate model load timed out");
                    last_failure = format!("load of {} timed out", path.display());
                }
            }
        }

        Err(TranscribeError::BackendUnavailable(format!(
            "no model acquired from {} candidates: {last_failure}",
            self.candidates.len()
        )))
    }
}

#[async_trait]
impl TranscriptionBackend for LocalModelBackend {
    async fn transcribe(
        &self,
        request: TranscriptionRequest,
    ) -> Result<Transcription, TranscribeError> {
        if request.sample_rate != TARGET_SAMPLE_RATE {
            return Err(TranscribeError::InvalidInput(format!(
                "local backend expects {TARGET_SAMPLE_RATE}Hz audio, got {}Hz",
                request.sample_rate
            )));
        }

        let mut guard = self.loaded.lock().await;
        self.acquire_locked(&mut guard).await?;
        let loaded = guard.as_mut().ok_or_else(|| {
            TranscribeError::BackendUnavailable("model handle missing after acquire".to_string())
        })?;

        let language = match request.language.as_str() {
            "" | "auto" => None,
            lang => Some(lang),
        };

        debug!(
            samples = request.samples.len(),
            duration_secs = request.samples.len() as f32 / TARGET_SAMPLE_RATE as f32,
            language = ?language,
            "Transcribing with local model"
        );

        let text = run_inference(
            &mut loaded.state,
            &request.samples,
            language,
            DecodePass::Primary,
        )?;
        if !text.is_empty() {
            return Ok(Transcription { text });
        }

        debug!("Primary decode produced no text, retrying with looser thresholds");
        let text = run_inference(
            &mut loaded.state,
            &request.samples,
            language,
            DecodePass::Retry,
        )?;
        if text.is_empty() {
            return Err(TranscribeError::EmptyResult);
        }
        Ok(Transcription { text })
    }
}

/// Load a model file and create an inference state for it.
fn load_model(path: &Path) -> Result<WhisperState, TranscribeError> {
    if !path.exists() {
        return Err(TranscribeError::BackendUnavailable(format!(
            "model file not found: {}",
            path.display()
        )));
    }

    let path_str = path.to_str().ok_or_else(|| {
        TranscribeError::BackendUnavailable(format!(
            "model path is not valid UTF-8: {}",
            path.display()
        ))
    })?;

    let ctx = WhisperContext::new_with_params(path_str, WhisperContextParameters::default())
        .map_err(|e| {
            TranscribeError::BackendUnavailable(format!(
                "failed to load model {}: {e}",
                path.display()
            ))
        })?;

    // Box and leak the context to get a 'static reference. The model stays
    // loaded for the process lifetime; only the handle is reset.
    let ctx: &'static WhisperContext = Box::leak(Box::new(ctx));

    let state = ctx.create_state().map_err(|e| {
        TranscribeError::BackendUnavailable(format!("failed to create model state: {e}"))
    })?;

    Ok(state)
}

fn run_inference(
    state: &mut WhisperState,
    audio: &[f32],
    language: Option<&str>,
    pass: DecodePass,
) -> Result<String, TranscribeError> {
    let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });

    params.set_language(language);

    // Disable printing to stdout
    params.set_print_special(false);
    params.set_print_progress(false);
    params.set_print_realtime(false);
    params.set_print_timestamps(false);

    // Single segment mode for lower latency
    params.set_single_segment(true);

    match pass {
        DecodePass::Primary => {
            params.set_no_speech_thold(PRIMARY_NO_SPEECH_THOLD);
            params.set_logprob_thold(PRIMARY_LOGPROB_THOLD);
        }
        DecodePass::Retry => {
            params.set_audio_ctx(RETRY_AUDIO_CTX);
            params.set_no_speech_thold(RETRY_NO_SPEECH_THOLD);
            params.set_logprob_thold(RETRY_LOGPROB_THOLD);
        }
    }

    state
        .full(params, audio)
        .map_err(|e| TranscribeError::BackendUnavailable(format!("inference failed: {e}")))?;

    let num_segments = state.full_n_segments();
    let mut result = String::new();

    for i in 0..num_segments {
        if let Some(segment) = state.get_segment(i) {
            if let Ok(text) = segment.to_str_lossy() {
                result.push_str(&text);
            }
        }
    }

    Ok(result.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_acquire_fails_without_candidates() {
        let backend = LocalModelBackend::new(Vec::new());

        let err = backend.acquire().await.unwrap_err();
        assert!(matches!(err, TranscribeError::BackendUnavailable(_)));
    }

    #[tokio::test]
    async fn test_acquire_reports_missing_files() {
        let backend = LocalModelBackend::new(vec![
            PathBuf::from("/nonexistent/ggml-base.bin"),
            PathBuf::from("/nonexistent/ggml-tiny.bin"),
        ]);

        let err = backend.acquire().await.unwrap_err();
        let message = err.to_string();
        assert!(message.contains("2 candidates"));
        assert!(message.contains("not found"));
        assert!(!backend.is_loaded().await);
    }

    #[tokio::test]
    async fn test_acquire_respects_exhausted_budget() {
        let backend = LocalModelBackend::with_timeout(
            vec![PathBuf::from("/nonexistent/ggml-base.bin")],
            Duration::ZERO,
        );

        let err = backend.acquire().await.unwrap_err();
        assert!(err.to_string().contains("budget exhausted"));
    }

    #[tokio::test]
    async fn test_transcribe_rejects_wrong_sample_rate() {
        let backend = LocalModelBackend::new(vec![PathBuf::from("/nonexistent/ggml-base.bin")]);

        let err = backend
            .transcribe(TranscriptionRequest {
                samples: vec![0.0; 48000],
                sample_rate: 48000,
                language: "auto".to_string(),
            })
            .await
            .unwrap_err();

        assert!(matches!(err, TranscribeError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_reset_without_model_is_noop() {
        let backend = LocalModelBackend::new(Vec::new());
        backend.reset().await;
        assert!(!backend.is_loaded().await);
    }
}
