//! Error taxonomy for the transcription pipeline.
//!
//! Per-tick failures (`Decode`, `InvalidInput`, backend errors) are surfaced
//! as events and the session keeps running; `Resource` failures abort
//! `start()` before the session leaves `Idle`.

use thiserror::Error;

/// Errors produced by capture, decoding, and transcription backends.
#[derive(Debug, Error)]
pub enum TranscribeError {
    /// Device, thread, or task resource failure. Fatal to `start()`.
    #[error("resource unavailable: {0}")]
    Resource(String),

    /// A chunk or chunk window failed to decode. The tick is skipped.
    #[error("failed to decode audio: {0}")]
    Decode(String),

    /// Resampler contract violation (empty input or zero sample rate).
    #[error("invalid resampler input: {0}")]
    InvalidInput(String),

    /// Payload exceeds the remote size cap. Rejected before any network call.
    #[error("payload of {size} bytes exceeds the {limit} byte cap")]
    OversizeInput { size: usize, limit: usize },

    /// No backend could serve the call: local model acquisition exhausted its
    /// candidates, remote credentials missing, or the submit request failed.
    #[error("transcription backend unavailable: {0}")]
    BackendUnavailable(String),

    /// The remote job reached FAILED. Terminal, never retried.
    #[error("remote job failed: {0}")]
    JobFailed(String),

    /// The poll budget ran out without a terminal job status.
    #[error("remote job did not finish within {attempts} status checks")]
    JobTimeout { attempts: u32 },

    /// The backend finished successfully but produced no usable text.
    /// Distinct from silence, which the quality gate filters out earlier.
    #[error("transcription produced no text")]
    EmptyResult,
}

impl TranscribeError {
    /// Stable kind tag carried in error events.
    pub fn kind(&self) -> ErrorKind {
        match self {
            TranscribeError::Resource(_) => ErrorKind::Resource,
            TranscribeError::Decode(_) => ErrorKind::Decode,
            TranscribeError::InvalidInput(_) => ErrorKind::InvalidInput,
            TranscribeError::OversizeInput { .. } => ErrorKind::OversizeInput,
            TranscribeError::BackendUnavailable(_) => ErrorKind::BackendUnavailable,
            TranscribeError::JobFailed(_) => ErrorKind::JobFailed,
            TranscribeError::JobTimeout { .. } => ErrorKind::JobTimeout,
            TranscribeError::EmptyResult => ErrorKind::EmptyResult,
        }
    }
}

/// Flat error classification for event consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Resource,
    Decode,
    InvalidInput,
    OversizeInput,
    BackendUnavailable,
    JobFailed,
    JobTimeout,
    EmptyResult,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::Resource => "resource",
            ErrorKind::Decode => "decode",
            ErrorKind::InvalidInput => "invalid-input",
            ErrorKind::OversizeInput => "oversize-input",
            ErrorKind::BackendUnavailable => "backend-unavailable",
            ErrorKind::JobFailed => "job-failed",
            ErrorKind::JobTimeout => "job-timeout",
            ErrorKind::EmptyResult => "empty-result",
        };
        f.write_str(name)
    }
}
