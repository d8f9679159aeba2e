//! Speech-to-text transcription backends.
//!
//! This module provides a trait abstraction over interchangeable
//! transcription strategies and the two concrete implementations: an
//! in-process Whisper model and a remote asynchronous job API.

use async_trait::async_trait;

use crate::error::TranscribeError;

mod local;
mod remote;

pub use local::{LocalModelBackend, MODEL_ACQUIRE_TIMEOUT};
pub use remote::{RemoteConfig, RemoteJobBackend};

/// One transcription call's input.
#[derive(Debug, Clone)]
pub struct TranscriptionRequest {
    /// Mono f32 samples, expected at 16kHz.
    pub samples: Vec<f32>,
    /// Sample rate of `samples` in Hz.
    pub sample_rate: u32,
    /// Language code (e.g. "en"), or "auto" for detection.
    pub language: String,
}

/// Successful transcription output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transcription {
    pub text: String,
}

/// A transcription execution strategy.
///
/// Implementations may suspend for the duration of model inference or
/// network I/O. Calls take `&self` so one backend instance can be shared
/// by reference across spawned calls; implementations guard their own
/// mutable state.
#[async_trait]
pub trait TranscriptionBackend: Send + Sync {
    /// Transcribe audio samples to text.
    async fn transcribe(
        &self,
        request: TranscriptionRequest,
    ) -> Result<Transcription, TranscribeError>;
}
