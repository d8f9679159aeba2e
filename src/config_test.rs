use super::*;
use tempfile::TempDir;

#[test]
fn test_default_config_values() {
    let config = Config::default();

    // Logging defaults
    assert_eq!(config.logging.level, LogLevel::Info);

    // Audio defaults
    assert_eq!(config.audio.chunk_ms, 1000);

    // Gate defaults
    assert_eq!(config.gate.min_window_kib, 20);
    assert!((config.gate.silence_rms - 0.01).abs() < f32::EPSILON);
    assert!((config.gate.min_dynamic_range - 0.02).abs() < f32::EPSILON);

    // Session defaults
    assert_eq!(config.session.tick_ms, 800);
    assert_eq!(config.session.window_chunks, 16);
    assert_eq!(config.session.pause_break_ms, 3000);
    assert_eq!(config.session.language, "auto");

    // Backend defaults
    assert_eq!(config.backend.kind, BackendKind::Local);
    assert!(config.local.model_paths.is_empty());
    assert_eq!(config.local.acquire_timeout_secs, 60);
    assert!(config.remote.base_url.is_empty());
}

#[test]
fn test_load_valid_config_from_file() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.toml");

    let toml_content = r#"
[logging]
level = "debug"

[audio]
chunk_ms = 500

[gate]
min_window_kib = 10
silence_rms = 0.02

[session]
tick_ms = 400
language = "en"

[backend]
kind = "remote"

[remote]
base_url = "https://api.example.com/v2/whisper"
api_key = "secret"
"#;

    std::fs::write(&config_path, toml_content).unwrap();

    let config = Config::load_from(&config_path).unwrap();

    assert_eq!(config.logging.level, LogLevel::Debug);
    assert_eq!(config.audio.chunk_ms, 500);
    assert_eq!(config.gate.min_window_kib, 10);
    assert!((config.gate.silence_rms - 0.02).abs() < f32::EPSILON);
    assert_eq!(config.session.tick_ms, 400);
    assert_eq!(config.session.language, "en");
    assert_eq!(config.backend.kind, BackendKind::Remote);
    assert_eq!(config.remote.base_url, "https://api.example.com/v2/whisper");
    assert_eq!(config.remote.api_key, "secret");
}

#[test]
fn test_missing_config_file_returns_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("nonexistent.toml");

    let config = Config::load_from(&config_path).unwrap();

    assert_eq!(config, Config::default());
}

#[test]
fn test_invalid_toml_returns_error() {
    let invalid_toml = "this is not valid { toml [";

    let result = Config::parse(invalid_toml);

    assert!(result.is_err());
    let err = result.unwrap_err();
    assert!(err.to_string().contains("TOML"));
}

#[test]
fn test_invalid_backend_kind_returns_error() {
    let toml_content = r#"
[backend]
kind = "cloud"
"#;

    let result = Config::parse(toml_content);
    assert!(result.is_err());
}

#[test]
fn test_partial_config_uses_defaults_for_missing() {
    let partial_toml = r#"
[session]
language = "cs"
"#;

    let config = Config::parse(partial_toml).unwrap();

    // Specified value
    assert_eq!(config.session.language, "cs");
    // Default values for unspecified fields
    assert_eq!(config.session.tick_ms, 800);
    assert_eq!(config.backend.kind, BackendKind::Local);
    assert_eq!(config.gate.min_window_kib, 20);
}

#[test]
fn test_config_paths() {
    // These should return valid paths on any system
    let config_dir = Config::config_dir().unwrap();
    let config_path = Config::config_path().unwrap();
    let data_dir = Config::data_dir().unwrap();
    let models_dir = Config::models_dir().unwrap();

    assert!(config_dir.ends_with("scriva"));
    assert!(config_path.ends_with("config.toml"));
    assert!(data_dir.ends_with("scriva"));
    assert!(models_dir.ends_with("models"));

    // Verify parent relationships
    assert_eq!(config_path.parent().unwrap(), config_dir);
    assert_eq!(models_dir.parent().unwrap(), data_dir);
}

#[test]
fn test_model_candidates_prefer_configured_paths() {
    let mut config = Config::default();
    config.local.model_paths = vec![PathBuf::from("/models/custom.bin")];

    let candidates = config.model_candidates().unwrap();
    assert_eq!(candidates, vec![PathBuf::from("/models/custom.bin")]);
}

#[test]
fn test_model_candidates_default_to_models_dir() {
    let config = Config::default();

    let candidates = config.model_candidates().unwrap();
    let models_dir = Config::models_dir().unwrap();

    assert_eq!(candidates.len(), 2);
    assert_eq!(candidates[0], models_dir.join("ggml-base.bin"));
    assert_eq!(candidates[1], models_dir.join("ggml-tiny.bin"));
}

#[test]
fn test_save_and_load_roundtrip() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.toml");

    let original = Config {
        logging: LoggingConfig {
            level: LogLevel::Debug,
        },
        audio: AudioConfig { chunk_ms: 250 },
        gate: GateSettings {
            min_window_kib: 40,
            silence_rms: 0.05,
            min_dynamic_range: 0.1,
        },
        session: SessionSettings {
            tick_ms: 500,
            window_chunks: 8,
            pause_break_ms: 2000,
            language: "cs".to_string(),
        },
        backend: BackendConfig {
            kind: BackendKind::Remote,
        },
        local: LocalSettings {
            model_paths: vec![PathBuf::from("/models/ggml-small.bin")],
            acquire_timeout_secs: 30,
        },
        remote: RemoteSettings {
            base_url: "https://api.example.com/v2/whisper".to_string(),
            api_key: "secret".to_string(),
        },
    };

    original.save_to(&config_path).unwrap();
    let loaded = Config::load_from(&config_path).unwrap();

    assert_eq!(original, loaded);
}

#[test]
fn test_save_creates_parent_directories() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("nested/dir/config.toml");

    let config = Config::default();
    config.save_to(&config_path).unwrap();

    assert!(config_path.exists());
}

#[test]
fn test_backend_kind_serialization() {
    // Kinds serialize to lowercase
    let config = Config::default();

    let toml_str = toml::to_string(&config).unwrap();
    assert!(toml_str.contains("kind = \"local\""));
}

#[test]
fn test_session_config_mapping() {
    let mut config = Config::default();
    config.session.tick_ms = 400;
    config.session.pause_break_ms = 1500;
    config.session.window_chunks = 4;
    config.gate.min_window_kib = 10;

    let session = config.session_config();

    assert_eq!(session.tick_interval, Duration::from_millis(400));
    assert_eq!(session.pause_break, Duration::from_millis(1500));
    assert_eq!(session.window_chunks, 4);
    assert_eq!(session.gate.min_window_bytes, 10 * 1024);
}

#[test]
fn test_remote_api_key_env_override() {
    unsafe { std::env::remove_var(API_KEY_ENV) };

    let settings = RemoteSettings {
        base_url: "https://api.example.com/v2/whisper".to_string(),
        api_key: "from-config".to_string(),
    };

    let resolved = settings.to_remote_config();
    assert_eq!(resolved.api_key, "from-config");
    assert_eq!(resolved.base_url, "https://api.example.com/v2/whisper");

    unsafe { std::env::set_var(API_KEY_ENV, "from-env") };
    let resolved = settings.to_remote_config();
    assert_eq!(resolved.api_key, "from-env");
    unsafe { std::env::remove_var(API_KEY_ENV) };
}
