use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::broadcast;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use scriva::backend::{LocalModelBackend, RemoteJobBackend, TranscriptionBackend};
use scriva::capture::CpalSource;
use scriva::config::{BackendKind, Config};
use scriva::session::{EVENT_CHANNEL_CAPACITY, RecordingSession, SessionEvent};

/// Application-specific environment variable for log filtering (overrides config).
const LOG_ENV_VAR: &str = "SCRIVA_LOG";

#[derive(Parser)]
#[command(name = "scriva")]
#[command(about = "Live microphone transcription")]
#[command(version)]
struct Cli {
    /// Path to the config file (defaults to ~/.config/scriva/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the configured backend ("local" or "remote")
    #[arg(long)]
    backend: Option<String>,

    /// List audio input devices and exit
    #[arg(long)]
    list_inputs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.list_inputs {
        return list_inputs();
    }

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::load().unwrap_or_default(),
    };

    if let Some(backend) = cli.backend.as_deref() {
        config.backend.kind = match backend {
            "local" => BackendKind::Local,
            "remote" => BackendKind::Remote,
            other => anyhow::bail!("unknown backend '{other}' (expected 'local' or 'remote')"),
        };
    }

    let _guard = init_logging(&config)?;

    let backend = build_backend(&config)?;
    let source = Box::new(CpalSource::new(config.audio.chunk_ms));
    let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
    let session = RecordingSession::new(config.session_config(), backend, source, event_tx);

    // Print committed transcript deltas as they arrive.
    let mut events = session.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(SessionEvent::Delta(delta)) => {
                    print!("{delta}");
                    let _ = std::io::stdout().flush();
                }
                Ok(SessionEvent::Error { kind, message, .. }) => {
                    eprintln!("error ({kind}): {message}");
                }
                Ok(SessionEvent::StateChange(_)) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    session.start().await.context("Failed to start recording")?;
    eprintln!("Recording... press Ctrl-C to stop.");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    let transcript = session.stop().await?;
    if !transcript.is_empty() {
        println!();
    }

    // Dropping the session closes the event channel and ends the printer.
    drop(session);
    let _ = printer.await;

    Ok(())
}

/// Configure tracing to the XDG state-dir log file and hook up whisper.cpp.
fn init_logging(config: &Config) -> Result<tracing_appender::non_blocking::WorkerGuard> {
    let log_path = scriva::dirs::log_path().context("Failed to determine log path")?;
    let log_dir = log_path.parent().context("log path has no parent")?;
    let log_filename = log_path.file_name().context("log path has no filename")?;

    let file_appender = tracing_appender::rolling::never(log_dir, log_filename);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    // SCRIVA_LOG env var overrides config file level
    let filter = EnvFilter::builder()
        .with_env_var(LOG_ENV_VAR)
        .with_default_directive(config.logging.level.as_directive().parse()?)
        .from_env()?;

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .with(filter)
        .init();

    // Route whisper.cpp and GGML logs through tracing
    whisper_rs::install_logging_hooks();

    Ok(guard)
}

fn build_backend(config: &Config) -> Result<Arc<dyn TranscriptionBackend>> {
    match config.backend.kind {
        BackendKind::Local => {
            let candidates = config.model_candidates()?;
            let timeout = Duration::from_secs(config.local.acquire_timeout_secs);
            Ok(Arc::new(LocalModelBackend::with_timeout(
                candidates, timeout,
            )))
        }
        BackendKind::Remote => Ok(Arc::new(RemoteJobBackend::new(
            config.remote.to_remote_config(),
        )?)),
    }
}

fn list_inputs() -> Result<()> {
    use cpal::traits::{DeviceTrait, HostTrait};

    let host = cpal::default_host();
    let default_name = host
        .default_input_device()
        .and_then(|device| device.name().ok());

    for device in host
        .input_devices()
        .context("Failed to enumerate input devices")?
    {
        let name = device.name().unwrap_or_else(|_| "<unknown>".to_string());
        if Some(&name) == default_name.as_ref() {
            println!("* {name}");
        } else {
            println!("  {name}");
        }
    }

    Ok(())
}
