//! Configuration management for scriva.
//!
//! Handles loading, saving, and providing defaults for the configuration.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::backend::{MODEL_ACQUIRE_TIMEOUT, RemoteConfig};
use crate::capture::DEFAULT_CHUNK_MS;
use crate::gate::GateConfig;
use crate::session::SessionConfig;

/// Environment variable that overrides `[remote] api_key`.
pub const API_KEY_ENV: &str = "SCRIVA_API_KEY";

/// Model files tried when none are configured, best first.
const DEFAULT_MODEL_FILES: [&str; 2] = ["ggml-base.bin", "ggml-tiny.bin"];

/// Main configuration struct.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub logging: LoggingConfig,
    pub audio: AudioConfig,
    pub gate: GateSettings,
    pub session: SessionSettings,
    pub backend: BackendConfig,
    pub local: LocalSettings,
    pub remote: RemoteSettings,
}

/// Logging configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub level: LogLevel,
}

/// Log verbosity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Convert to a tracing filter directive string for this crate.
    pub fn as_directive(&self) -> &'static str {
        match self {
            LogLevel::Error => "scriva=error",
            LogLevel::Warn => "scriva=warn",
            LogLevel::Info => "scriva=info",
            LogLevel::Debug => "scriva=debug",
            LogLevel::Trace => "scriva=trace",
        }
    }
}

/// Audio capture configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Capture chunk length in milliseconds.
    pub chunk_ms: u32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            chunk_ms: DEFAULT_CHUNK_MS,
        }
    }
}

/// Quality gate thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateSettings {
    /// Minimum buffered audio, in KiB, before a window is transcribed.
    pub min_window_kib: usize,
    /// RMS below this is treated as silence.
    pub silence_rms: f32,
    /// Minimum peak-to-peak spread; rejects constant-level noise.
    pub min_dynamic_range: f32,
}

impl Default for GateSettings {
    fn default() -> Self {
        let gate = GateConfig::default();
        Self {
            min_window_kib: gate.min_window_bytes / 1024,
            silence_rms: gate.silence_rms,
            min_dynamic_range: gate.min_dynamic_range,
        }
    }
}

impl GateSettings {
    pub fn to_gate_config(&self) -> GateConfig {
        GateConfig {
            min_window_bytes: self.min_window_kib * 1024,
            silence_rms: self.silence_rms,
            min_dynamic_range: self.min_dynamic_range,
        }
    }
}

/// Transcription loop settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Loop tick interval in milliseconds.
    pub tick_ms: u64,
    /// Sliding window size in chunks for interim passes.
    pub window_chunks: usize,
    /// Pause length, in milliseconds, that starts a new transcript line.
    pub pause_break_ms: u64,
    /// Language to recognize. Use "auto" for automatic detection.
    pub language: String,
}

impl Default for SessionSettings {
    fn default() -> Self {
        let session = SessionConfig::default();
        Self {
            tick_ms: session.tick_interval.as_millis() as u64,
            window_chunks: session.window_chunks,
            pause_break_ms: session.pause_break.as_millis() as u64,
            language: session.language,
        }
    }
}

/// Backend selection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub kind: BackendKind,
}

/// Which transcription backend serves the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Local,
    Remote,
}

/// Local model settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalSettings {
    /// Candidate model files, tried in order. Empty means the defaults
    /// under the models directory.
    pub model_paths: Vec<PathBuf>,
    /// Budget in seconds for acquiring a model across all candidates.
    pub acquire_timeout_secs: u64,
}

impl Default for LocalSettings {
    fn default() -> Self {
        Self {
            model_paths: Vec::new(),
            acquire_timeout_secs: MODEL_ACQUIRE_TIMEOUT.as_secs(),
        }
    }
}

/// Remote backend settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteSettings {
    /// Endpoint root, e.g. `https://api.example.com/v2/whisper`.
    pub base_url: String,
    /// API key. The SCRIVA_API_KEY environment variable overrides this.
    pub api_key: String,
}

impl RemoteSettings {
    /// Build connection settings, letting the environment override the
    /// configured API key.
    pub fn to_remote_config(&self) -> RemoteConfig {
        let api_key = std::env::var(API_KEY_ENV).unwrap_or_else(|_| self.api_key.clone());
        RemoteConfig {
            base_url: self.base_url.clone(),
            api_key,
            ..RemoteConfig::default()
        }
    }
}

impl Config {
    /// Returns the default config directory path.
    /// `~/.config/scriva/` (or `$XDG_CONFIG_HOME/scriva/`)
    pub fn config_dir() -> Result<PathBuf> {
        crate::dirs::config_dir()
    }

    /// Returns the default config file path.
    /// `~/.config/scriva/config.toml`
    pub fn config_path() -> Result<PathBuf> {
        Self::config_dir().map(|p| p.join("config.toml"))
    }

    /// Returns the default data directory path.
    /// `~/.local/share/scriva/` (or `$XDG_DATA_HOME/scriva/`)
    pub fn data_dir() -> Result<PathBuf> {
        crate::dirs::data_dir()
    }

    /// Returns the default models directory path.
    /// `~/.local/share/scriva/models/`
    pub fn models_dir() -> Result<PathBuf> {
        Self::data_dir().map(|p| p.join("models"))
    }

    /// Candidate model files in rank order, falling back to the default
    /// files under the models directory when none are configured.
    pub fn model_candidates(&self) -> Result<Vec<PathBuf>> {
        if !self.local.model_paths.is_empty() {
            return Ok(self.local.model_paths.clone());
        }
        let dir = Self::models_dir()?;
        Ok(DEFAULT_MODEL_FILES
            .iter()
            .map(|name| dir.join(name))
            .collect())
    }

    /// Build the runtime session settings from this configuration.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            tick_interval: Duration::from_millis(self.session.tick_ms),
            window_chunks: self.session.window_chunks,
            language: self.session.language.clone(),
            pause_break: Duration::from_millis(self.session.pause_break_ms),
            gate: self.gate.to_gate_config(),
        }
    }

    /// Load configuration from the default path.
    /// Returns defaults if the file doesn't exist.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    /// Returns defaults if the file doesn't exist.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse config file as TOML")
    }

    /// Save configuration to the default path.
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        self.save_to(&path)
    }

    /// Save configuration to a specific path.
    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
