//! Microphone capture and chunk buffering.
//!
//! A `ChunkSource` yields an `ActiveCapture` for one recording: a stream of
//! timed `AudioChunk`s plus ownership of the device. The production source
//! runs cpal on a dedicated thread (cpal streams must stay on the thread
//! that built them) and slices the callback feed into fixed-duration mono
//! chunks. `CaptureBuffer` collects chunks into the bounded trailing window
//! used by partial ticks and the full list used by the final pass.

use std::collections::VecDeque;
use std::sync::{Mutex, mpsc};
use std::thread;
use std::time::Instant;

use tracing::{debug, error, info, warn};

use crate::audio::{AudioChunk, pcm_mime, to_mono};
use crate::error::TranscribeError;

/// Default duration of one captured chunk.
pub const DEFAULT_CHUNK_MS: u32 = 1000;

/// Default capacity of the trailing chunk window.
pub const DEFAULT_WINDOW_CHUNKS: usize = 16;

/// Capability to acquire a live chunk stream from a capture device.
pub trait ChunkSource: Send + Sync {
    /// Open the device and start producing chunks.
    fn open(&self) -> Result<ActiveCapture, TranscribeError>;
}

/// A live capture for one recording: chunk receiver plus device ownership.
///
/// Dropping the handle releases the device; `stop()` does the same
/// explicitly and is idempotent. Chunks already queued remain readable
/// after stopping.
pub struct ActiveCapture {
    // Mutex only to make the handle Sync; there is a single consumer.
    receiver: Mutex<mpsc::Receiver<AudioChunk>>,
    stop_tx: Option<mpsc::Sender<()>>,
    worker: Option<thread::JoinHandle<()>>,
}

impl ActiveCapture {
    /// Capture handle fed by an external channel rather than a device.
    /// Useful for replaying pre-recorded chunks through the pipeline.
    pub fn from_channel(receiver: mpsc::Receiver<AudioChunk>) -> Self {
        Self {
            receiver: Mutex::new(receiver),
            stop_tx: None,
            worker: None,
        }
    }

    fn with_worker(
        receiver: mpsc::Receiver<AudioChunk>,
        stop_tx: mpsc::Sender<()>,
        worker: thread::JoinHandle<()>,
    ) -> Self {
        Self {
            receiver: Mutex::new(receiver),
            stop_tx: Some(stop_tx),
            worker: Some(worker),
        }
    }

    /// Try to receive one pending chunk (non-blocking).
    pub fn try_recv(&self) -> Option<AudioChunk> {
        self.receiver.lock().ok()?.try_recv().ok()
    }

    /// Release the capture device. Idempotent.
    pub fn stop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            // Worker exits its recv() on signal or on sender drop
            let _ = stop_tx.send(());
        }
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("Capture worker thread panicked during shutdown");
            }
        }
    }
}

impl Drop for ActiveCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Microphone chunk source on the default cpal input device.
pub struct CpalSource {
    chunk_ms: u32,
}

impl CpalSource {
    /// Create a source producing chunks of the given duration.
    pub fn new(chunk_ms: u32) -> Self {
        Self { chunk_ms }
    }
}

impl Default for CpalSource {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_MS)
    }
}

impl ChunkSource for CpalSource {
    fn open(&self) -> Result<ActiveCapture, TranscribeError> {
        let (chunk_tx, chunk_rx) = mpsc::channel();
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let (ready_tx, ready_rx) = mpsc::channel();
        let chunk_ms = self.chunk_ms;

        let worker = thread::Builder::new()
            .name("scriva-capture".to_string())
            .spawn(move || {
                // The stream must be built and dropped on this thread.
                let stream = match open_input_stream(chunk_ms, chunk_tx) {
                    Ok(stream) => {
                        let _ = ready_tx.send(Ok(()));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                let _ = stop_rx.recv();

                use cpal::traits::StreamTrait;
                let _ = stream.pause();
                drop(stream);
                debug!("Capture stream released");
            })
            .map_err(|e| TranscribeError::Resource(format!("failed to spawn capture thread: {e}")))?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(ActiveCapture::with_worker(chunk_rx, stop_tx, worker)),
            Ok(Err(e)) => {
                let _ = worker.join();
                Err(e)
            }
            Err(_) => {
                let _ = worker.join();
                Err(TranscribeError::Resource(
                    "capture thread exited before the device opened".to_string(),
                ))
            }
        }
    }
}

/// Open the default input device and start a stream that feeds the sender.
fn open_input_stream(
    chunk_ms: u32,
    sender: mpsc::Sender<AudioChunk>,
) -> Result<cpal::Stream, TranscribeError> {
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| TranscribeError::Resource("no input device available".to_string()))?;

    let config = device.default_input_config().map_err(|e| {
        TranscribeError::Resource(format!("failed to get default input config: {e}"))
    })?;

    let sample_rate = config.sample_rate();
    let channels = config.channels();
    let samples_per_chunk = (sample_rate as usize * chunk_ms as usize) / 1000;
    let mut assembler = ChunkAssembler::new(samples_per_chunk, pcm_mime(sample_rate), sender);

    let err_fn = |err| error!(error = %err, "Audio stream error");

    let stream = match config.sample_format() {
        cpal::SampleFormat::F32 => device.build_input_stream(
            &config.into(),
            move |data: &[f32], _| {
                assembler.push(&to_mono(data, channels));
            },
            err_fn,
            None,
        ),
        cpal::SampleFormat::I16 => device.build_input_stream(
            &config.into(),
            move |data: &[i16], _| {
                let samples: Vec<f32> = data.iter().map(|&s| s as f32 / 32768.0).collect();
                assembler.push(&to_mono(&samples, channels));
            },
            err_fn,
            None,
        ),
        cpal::SampleFormat::U16 => device.build_input_stream(
            &config.into(),
            move |data: &[u16], _| {
                let samples: Vec<f32> = data
                    .iter()
                    .map(|&s| (s as f32 - 32768.0) / 32768.0)
                    .collect();
                assembler.push(&to_mono(&samples, channels));
            },
            err_fn,
            None,
        ),
        format => {
            return Err(TranscribeError::Resource(format!(
                "unsupported sample format: {format:?}"
            )));
        }
    }
    .map_err(|e| TranscribeError::Resource(format!("failed to build input stream: {e}")))?;

    stream
        .play()
        .map_err(|e| TranscribeError::Resource(format!("failed to start audio stream: {e}")))?;

    info!(
        sample_rate = sample_rate,
        channels = channels,
        samples_per_chunk = samples_per_chunk,
        "Audio capture started"
    );

    Ok(stream)
}

/// Slices a mono sample feed into fixed-size chunks with increasing
/// sequence numbers.
struct ChunkAssembler {
    sender: mpsc::Sender<AudioChunk>,
    pending: Vec<f32>,
    samples_per_chunk: usize,
    mime_type: String,
    sequence: u64,
}

impl ChunkAssembler {
    fn new(samples_per_chunk: usize, mime_type: String, sender: mpsc::Sender<AudioChunk>) -> Self {
        Self {
            sender,
            pending: Vec::with_capacity(samples_per_chunk),
            samples_per_chunk,
            mime_type,
            sequence: 0,
        }
    }

    fn push(&mut self, mono: &[f32]) {
        self.pending.extend_from_slice(mono);

        while self.pending.len() >= self.samples_per_chunk {
            let rest = self.pending.split_off(self.samples_per_chunk);
            let samples = std::mem::replace(&mut self.pending, rest);

            let mut payload = Vec::with_capacity(samples.len() * 4);
            for s in &samples {
                payload.extend_from_slice(&s.to_le_bytes());
            }

            let chunk = AudioChunk {
                sequence: self.sequence,
                captured_at: Instant::now(),
                mime_type: self.mime_type.clone(),
                payload,
            };
            self.sequence += 1;

            // Receiver may already be gone during shutdown
            let _ = self.sender.send(chunk);
        }
    }
}

/// Chunk store for one recording: a bounded trailing window for partial
/// ticks and the full list for the final pass.
pub struct CaptureBuffer {
    capture: ActiveCapture,
    window: VecDeque<AudioChunk>,
    chunks: Vec<AudioChunk>,
    window_capacity: usize,
    last_sequence: Option<u64>,
}

impl CaptureBuffer {
    /// Wrap an active capture with the given window capacity.
    pub fn new(capture: ActiveCapture, window_capacity: usize) -> Self {
        Self {
            capture,
            window: VecDeque::with_capacity(window_capacity),
            chunks: Vec::new(),
            window_capacity,
            last_sequence: None,
        }
    }

    /// Pull every pending chunk off the capture channel.
    /// Returns the number of chunks received.
    pub fn drain(&mut self) -> usize {
        let mut received = 0;

        while let Some(chunk) = self.capture.try_recv() {
            if let Some(last) = self.last_sequence {
                if chunk.sequence <= last {
                    warn!(
                        sequence = chunk.sequence,
                        last_sequence = last,
                        "Out-of-order chunk from capture"
                    );
                }
            }
            self.last_sequence = Some(chunk.sequence);

            if self.window.len() == self.window_capacity {
                self.window.pop_front();
            }
            self.window.push_back(chunk.clone());
            self.chunks.push(chunk);
            received += 1;
        }

        received
    }

    /// The trailing window of recent chunks, oldest first.
    pub fn window(&mut self) -> &[AudioChunk] {
        self.window.make_contiguous();
        self.window.as_slices().0
    }

    /// Every chunk captured since the last clear, oldest first.
    pub fn all(&self) -> &[AudioChunk] {
        &self.chunks
    }

    /// Total chunks retained for the final pass.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// True when no chunks are retained.
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Drop the window and the retained list.
    /// Called only after a successful final transcription.
    pub fn clear(&mut self) {
        self.window.clear();
        self.chunks.clear();
    }

    /// Release the capture device. Chunks already queued stay readable.
    pub fn stop(&mut self) {
        self.capture.stop();
    }
}

#[cfg(test)]
#[path = "capture_test.rs"]
mod tests;
