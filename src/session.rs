//! Recording session lifecycle and the periodic transcription loop.
//!
//! A session owns the pipeline for one microphone recording at a time:
//! capture buffer, quality gate, backend calls, and the transcript merger.
//! Callers drive it with `start()`/`stop()` and observe progress through
//! a broadcast event channel.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, RwLock, broadcast};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::audio::{AudioChunk, TARGET_SAMPLE_RATE, decode_chunks, resample};
use crate::backend::{Transcription, TranscriptionBackend, TranscriptionRequest};
use crate::capture::{CaptureBuffer, ChunkSource, DEFAULT_WINDOW_CHUNKS};
use crate::error::{ErrorKind, TranscribeError};
use crate::gate::{GateConfig, QualityGate};
use crate::merge::{DEFAULT_PAUSE_BREAK, StreamMerger};

/// Session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Recording,
    Finalizing,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Recording => "recording",
            SessionState::Finalizing => "finalizing",
        };
        f.write_str(name)
    }
}

/// Events published to session subscribers.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Newly committed transcript text, ready to append as-is.
    Delta(String),
    /// A pipeline error. The session keeps running; `state` says where
    /// it happened.
    Error {
        kind: ErrorKind,
        message: String,
        state: SessionState,
    },
    StateChange(SessionState),
}

/// Event sender type.
pub type EventSender = broadcast::Sender<SessionEvent>;

/// Events buffered per subscriber before the channel starts lagging.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Knobs for the periodic transcription loop.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How often the loop wakes to look at captured audio.
    pub tick_interval: Duration,
    /// Sliding window size, in chunks, for interim passes.
    pub window_chunks: usize,
    /// Language hint forwarded to the backend ("auto" detects).
    pub language: String,
    /// Silence longer than this starts a new line in the transcript.
    pub pause_break: Duration,
    pub gate: GateConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(800),
            window_chunks: DEFAULT_WINDOW_CHUNKS,
            language: "auto".to_string(),
            pause_break: DEFAULT_PAUSE_BREAK,
            gate: GateConfig::default(),
        }
    }
}

struct RunningRecording {
    cancel: CancellationToken,
    handle: JoinHandle<String>,
}

/// One microphone-to-transcript session.
pub struct RecordingSession {
    config: SessionConfig,
    backend: Arc<dyn TranscriptionBackend>,
    source: Box<dyn ChunkSource>,
    state: Arc<RwLock<SessionState>>,
    event_tx: EventSender,
    running: Mutex<Option<RunningRecording>>,
}

impl RecordingSession {
    pub fn new(
        config: SessionConfig,
        backend: Arc<dyn TranscriptionBackend>,
        source: Box<dyn ChunkSource>,
        event_tx: EventSender,
    ) -> Self {
        Self {
            config,
            backend,
            source,
            state: Arc::new(RwLock::new(SessionState::Idle)),
            event_tx,
            running: Mutex::new(None),
        }
    }

    /// Get the current state.
    pub async fn state(&self) -> SessionState {
        *self.state.read().await
    }

    /// Get the event sender for creating subscribers.
    pub fn event_sender(&self) -> EventSender {
        self.event_tx.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_tx.subscribe()
    }

    /// Begin capturing and transcribing.
    ///
    /// A no-op while already recording. Fails synchronously, leaving the
    /// session idle, when the source cannot be opened or a previous stop
    /// is still settling.
    pub async fn start(&self) -> Result<(), TranscribeError> {
        let mut state = self.state.write().await;
        match *state {
            SessionState::Recording => return Ok(()), // Already recording
            SessionState::Finalizing => {
                return Err(TranscribeError::Resource(
                    "previous recording is still finalizing".to_string(),
                ));
            }
            SessionState::Idle => {}
        }

        // Open the device before committing the state change so a failure
        // leaves the session idle.
        let capture = self.source.open()?;

        let runner = Runner {
            buffer: CaptureBuffer::new(capture, self.config.window_chunks),
            merger: StreamMerger::new(self.config.pause_break),
            gate: QualityGate::new(self.config.gate.clone()),
            backend: self.backend.clone(),
            language: self.config.language.clone(),
            tick_interval: self.config.tick_interval,
            state: self.state.clone(),
            event_tx: self.event_tx.clone(),
        };

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(runner.run(cancel.clone()));
        *self.running.lock().await = Some(RunningRecording { cancel, handle });

        *state = SessionState::Recording;
        self.broadcast_state(SessionState::Recording);
        info!("Recording started");
        Ok(())
    }

    /// Stop recording and return the full transcript.
    ///
    /// Settles any in-flight backend call, runs one final pass over the
    /// whole recording, and leaves the session idle. A no-op returning an
    /// empty transcript when nothing is recording.
    pub async fn stop(&self) -> Result<String, TranscribeError> {
        {
            let mut state = self.state.write().await;
            match *state {
                SessionState::Recording => {
                    *state = SessionState::Finalizing;
                    self.broadcast_state(SessionState::Finalizing);
                }
                SessionState::Idle | SessionState::Finalizing => return Ok(String::new()),
            }
        }

        let running = self.running.lock().await.take();
        let transcript = match running {
            Some(running) => {
                // Cancel the tick loop first so no new backend call starts,
                // then let the runner settle in-flight work and finalize.
                running.cancel.cancel();
                match running.handle.await {
                    Ok(text) => text,
                    Err(e) => {
                        warn!(error = %e, "Recording task failed");
                        String::new()
                    }
                }
            }
            None => String::new(),
        };

        {
            let mut state = self.state.write().await;
            *state = SessionState::Idle;
            self.broadcast_state(SessionState::Idle);
        }
        info!(chars = transcript.len(), "Recording stopped");
        Ok(transcript)
    }

    /// Broadcast a state change event.
    fn broadcast_state(&self, state: SessionState) {
        // Ignore send errors (no subscribers)
        let _ = self.event_tx.send(SessionEvent::StateChange(state));
    }
}

type InFlight = JoinHandle<Result<Transcription, TranscribeError>>;

/// Per-recording pipeline state, owned by the spawned loop task.
struct Runner {
    buffer: CaptureBuffer,
    merger: StreamMerger,
    gate: QualityGate,
    backend: Arc<dyn TranscriptionBackend>,
    language: String,
    tick_interval: Duration,
    state: Arc<RwLock<SessionState>>,
    event_tx: EventSender,
}

impl Runner {
    /// Drive the tick loop until cancelled, then finalize and return the
    /// committed transcript.
    async fn run(mut self, cancel: CancellationToken) -> String {
        let mut interval = tokio::time::interval(self.tick_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut in_flight: Option<InFlight> = None;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Recording cancelled, finalizing");
                    break;
                }
                result = async {
                    match in_flight.as_mut() {
                        Some(handle) => handle.await,
                        None => std::future::pending().await,
                    }
                } => {
                    in_flight = None;
                    self.settle(result).await;
                }
                _ = interval.tick() => {
                    self.buffer.drain();
                    if in_flight.is_some() {
                        // One outstanding backend call at a time.
                        continue;
                    }
                    match build_request(&self.gate, self.buffer.window(), &self.language) {
                        Ok(Some(request)) => {
                            debug!(samples = request.samples.len(), "Dispatching window to backend");
                            let backend = self.backend.clone();
                            in_flight = Some(tokio::spawn(async move {
                                backend.transcribe(request).await
                            }));
                        }
                        Ok(None) => {}
                        Err(e) => self.emit_error(&e).await,
                    }
                }
            }
        }

        self.finalize(in_flight).await
    }

    /// Stop capture, settle outstanding work, run the final full pass.
    async fn finalize(&mut self, in_flight: Option<InFlight>) -> String {
        self.buffer.stop();
        self.buffer.drain();

        // The outstanding window lands before the final text.
        if let Some(handle) = in_flight {
            let result = handle.await;
            self.settle(result).await;
        }

        match build_request(&self.gate, self.buffer.all(), &self.language) {
            Ok(Some(request)) => {
                debug!(
                    samples = request.samples.len(),
                    chunks = self.buffer.len(),
                    "Final transcription pass"
                );
                match self.backend.transcribe(request).await {
                    Ok(transcription) => {
                        self.commit(&transcription.text);
                        self.buffer.clear();
                    }
                    Err(e) => self.emit_error(&e).await,
                }
            }
            Ok(None) => {
                // Nothing passed the gates; the recording is settled.
                self.buffer.clear();
            }
            Err(e) => self.emit_error(&e).await,
        }

        self.merger.committed_text().to_string()
    }

    async fn settle(
        &mut self,
        result: Result<Result<Transcription, TranscribeError>, tokio::task::JoinError>,
    ) {
        match result {
            Ok(Ok(transcription)) => self.commit(&transcription.text),
            Ok(Err(e)) => self.emit_error(&e).await,
            Err(e) => {
                let error = TranscribeError::Resource(format!("backend task failed: {e}"));
                self.emit_error(&error).await;
            }
        }
    }

    fn commit(&mut self, fragment: &str) {
        let delta = self.merger.merge(fragment, Instant::now());
        if !delta.is_empty() {
            debug!(delta = %delta, "Transcript advanced");
            // Ignore send errors (no subscribers)
            let _ = self.event_tx.send(SessionEvent::Delta(delta));
        }
    }

    async fn emit_error(&self, error: &TranscribeError) {
        let state = *self.state.read().await;
        warn!(error = %error, state = %state, "Pipeline error");
        // Ignore send errors (no subscribers)
        let _ = self.event_tx.send(SessionEvent::Error {
            kind: error.kind(),
            message: error.to_string(),
            state,
        });
    }
}

/// Gate, decode, and resample a span of chunks into a backend request.
///
/// `Ok(None)` means the span did not pass the quality gates and no call
/// should be made.
fn build_request(
    gate: &QualityGate,
    chunks: &[AudioChunk],
    language: &str,
) -> Result<Option<TranscriptionRequest>, TranscribeError> {
    if chunks.is_empty() || !gate.should_process_window(chunks) {
        return Ok(None);
    }

    let decoded = decode_chunks(chunks)?;
    let samples = resample(decoded.samples, decoded.sample_rate, TARGET_SAMPLE_RATE)?;
    if !gate.should_process(&samples) {
        return Ok(None);
    }

    Ok(Some(TranscriptionRequest {
        samples,
        sample_rate: TARGET_SAMPLE_RATE,
        language: language.to_string(),
    }))
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
