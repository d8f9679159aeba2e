//! Live microphone transcription.
//!
//! scriva captures microphone audio in timed chunks, gates out silence,
//! ships speech windows to a Whisper backend (in-process or a remote job
//! API), and merges the overlapping fragments into one growing transcript,
//! emitting only the newly committed text.
//!
//! Everything composes around [`RecordingSession`]: a
//! [`capture::ChunkSource`] produces audio, a
//! [`backend::TranscriptionBackend`] turns windows of it into text, and
//! subscribers follow progress through [`SessionEvent`]s.

pub mod audio;
pub mod backend;
pub mod capture;
pub mod config;
pub mod dirs;
pub mod error;
pub mod gate;
pub mod merge;
pub mod session;

pub use audio::TARGET_SAMPLE_RATE;
pub use error::{ErrorKind, TranscribeError};
pub use session::{RecordingSession, SessionConfig, SessionEvent, SessionState};
