//! Remote transcription over an asynchronous job API.
//!
//! Audio is packaged as a mono 16-bit WAV, base64-encoded, and submitted
//! with `POST /run`. The job is then polled with `GET /status/{id}` until
//! it completes, fails, or the attempt budget runs out.

use std::io::Cursor;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{Transcription, TranscriptionBackend, TranscriptionRequest};
use crate::error::TranscribeError;

const TASK: &str = "transcribe";
const AUDIO_FORMAT: &str = "wav";

/// Connection settings for a job-style transcription endpoint.
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    /// Endpoint root, e.g. `https://api.example.com/v2/whisper`.
    pub base_url: String,
    pub api_key: String,
    /// Timeout for the submit request.
    pub submit_timeout: Duration,
    /// Timeout for each status poll.
    pub status_timeout: Duration,
    /// Delay between status polls.
    pub poll_interval: Duration,
    pub max_poll_attempts: u32,
    /// Upper bound on the WAV payload before base64 encoding.
    pub max_payload_bytes: usize,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_key: String::new(),
            submit_timeout: Duration::from_secs(30),
            status_timeout: Duration::from_secs(5),
            poll_interval: Duration::from_secs(1),
            max_poll_attempts: 120,
            max_payload_bytes: 10 * 1024 * 1024,
        }
    }
}

#[derive(Serialize)]
struct SubmitRequest<'a> {
    input: SubmitInput<'a>,
}

#[derive(Serialize)]
struct SubmitInput<'a> {
    audio: String,
    audio_format: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    language: Option<&'a str>,
    task: &'a str,
}

#[derive(Deserialize)]
struct SubmitResponse {
    id: Option<String>,
    status: Option<String>,
    output: Option<JobOutput>,
    error: Option<String>,
}

#[derive(Deserialize)]
struct StatusResponse {
    status: String,
    output: Option<JobOutput>,
    error: Option<String>,
}

#[derive(Deserialize)]
struct JobOutput {
    text: Option<String>,
    segments: Option<Vec<JobSegment>>,
}

#[derive(Deserialize)]
struct JobSegment {
    text: String,
}

/// Transcription backend that delegates to a hosted Whisper job queue.
pub struct RemoteJobBackend {
    config: RemoteConfig,
    client: reqwest::Client,
}

impl RemoteJobBackend {
    pub fn new(config: RemoteConfig) -> Result<Self, TranscribeError> {
        let client = reqwest::Client::builder().build().map_err(|e| {
            TranscribeError::BackendUnavailable(format!("failed to build HTTP client: {e}"))
        })?;
        Ok(Self { config, client })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.config.base_url.trim_end_matches('/'))
    }

    async fn poll(&self, job_id: &str) -> Result<Transcription, TranscribeError> {
        let attempts = self.config.max_poll_attempts;
        let url = self.endpoint(&format!("status/{job_id}"));

        for attempt in 1..=attempts {
            tokio::time::sleep(self.config.poll_interval).await;

            let response = match self
                .client
                .get(&url)
                .bearer_auth(&self.config.api_key)
                .timeout(self.config.status_timeout)
                .send()
                .await
            {
                Ok(response) => response,
                Err(e) => {
                    warn!(job_id, attempt, error = %e, "Status poll failed");
                    continue;
                }
            };

            if response.status() == reqwest::StatusCode::NOT_FOUND {
                // Queue registration can lag the submit, so a 404 is
                // transient until the attempt budget runs out.
                debug!(job_id, attempt, "Job not visible yet");
                continue;
            }
            if !response.status().is_success() {
                warn!(job_id, attempt, status = %response.status(), "Status poll rejected");
                continue;
            }

            let status: StatusResponse = match response.json().await {
                Ok(status) => status,
                Err(e) => {
                    warn!(job_id, attempt, error = %e, "Malformed status response");
                    continue;
                }
            };

            match status.status.as_str() {
                "COMPLETED" => {
                    info!(job_id, attempt, "Job completed");
                    let output = status.output.ok_or(TranscribeError::EmptyResult)?;
                    return output_text(output);
                }
                "FAILED" => {
                    let reason = status
                        .error
                        .unwrap_or_else(|| "job failed without detail".to_string());
                    return Err(TranscribeError::JobFailed(reason));
                }
                "IN_QUEUE" | "IN_PROGRESS" => {
                    debug!(job_id, attempt, status = %status.status, "Job still running");
                }
                other => {
                    warn!(job_id, attempt, status = other, "Unknown job status");
                }
            }
        }

        Err(TranscribeError::JobTimeout { attempts })
    }
}

#[async_trait]
impl TranscriptionBackend for RemoteJobBackend {
    async fn transcribe(
        &self,
        request: TranscriptionRequest,
    ) -> Result<Transcription, TranscribeError> {
        if self.config.base_url.is_empty() {
            return Err(TranscribeError::BackendUnavailable(
                "remote base URL is not configured".to_string(),
            ));
        }
        if self.config.api_key.is_empty() {
            return Err(TranscribeError::BackendUnavailable(
                "remote API key is not configured".to_string(),
            ));
        }
        if request.samples.is_empty() {
            return Err(TranscribeError::InvalidInput(
                "no samples to transcribe".to_string(),
            ));
        }

        let wav = encode_wav(&request.samples, request.sample_rate)?;
        if wav.len() > self.config.max_payload_bytes {
            return Err(TranscribeError::OversizeInput {
                size: wav.len(),
                limit: self.config.max_payload_bytes,
            });
        }

        let audio = STANDARD.encode(&wav);
        debug!(
            wav_bytes = wav.len(),
            encoded_bytes = audio.len(),
            "Submitting transcription job"
        );

        let language = match request.language.as_str() {
            "" | "auto" => None,
            lang => Some(lang),
        };

        let submit = SubmitRequest {
            input: SubmitInput {
                audio,
                audio_format: AUDIO_FORMAT,
                language,
                task: TASK,
            },
        };

        let response = self
            .client
            .post(self.endpoint("run"))
            .bearer_auth(&self.config.api_key)
            .json(&submit)
            .timeout(self.config.submit_timeout)
            .send()
            .await
            .map_err(|e| {
                TranscribeError::BackendUnavailable(format!("job submission failed: {e}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(TranscribeError::BackendUnavailable(format!(
                "job submission returned {status}"
            )));
        }

        let submitted: SubmitResponse = response.json().await.map_err(|e| {
            TranscribeError::JobFailed(format!("malformed submit response: {e}"))
        })?;

        if let Some(error) = submitted.error {
            return Err(TranscribeError::JobFailed(error));
        }

        // Sync-mode endpoints return the output inline.
        if let Some(output) = submitted.output {
            info!("Job completed synchronously");
            return output_text(output);
        }

        let Some(job_id) = submitted.id else {
            return Err(TranscribeError::JobFailed(format!(
                "submit response carried no job id (status {:?})",
                submitted.status
            )));
        };

        info!(job_id = %job_id, "Job submitted, polling for result");
        self.poll(&job_id).await
    }
}

/// Package f32 samples as a mono 16-bit PCM WAV in memory.
fn encode_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>, TranscribeError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    let mut writer = hound::WavWriter::new(&mut cursor, spec)
        .map_err(|e| TranscribeError::Decode(format!("WAV encode failed: {e}")))?;

    for &sample in samples {
        let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        writer
            .write_sample(value)
            .map_err(|e| TranscribeError::Decode(format!("WAV encode failed: {e}")))?;
    }

    writer
        .finalize()
        .map_err(|e| TranscribeError::Decode(format!("WAV encode failed: {e}")))?;

    Ok(cursor.into_inner())
}

fn output_text(output: JobOutput) -> Result<Transcription, TranscribeError> {
    if let Some(text) = output.text {
        let text = text.trim().to_string();
        if !text.is_empty() {
            return Ok(Transcription { text });
        }
    }

    if let Some(segments) = output.segments {
        let text = segments
            .iter()
            .map(|segment| segment.text.trim())
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        if !text.is_empty() {
            return Ok(Transcription { text });
        }
    }

    Err(TranscribeError::EmptyResult)
}

#[cfg(test)]
#[path = "remote_test.rs"]
mod tests;
