use assistant_gateway::classifier::VocabularyPreset;
use assistant_gateway::config::{AppConfig, AssistantIdError};
use serial_test::serial;
use std::env;
use std::fs;
use std::time::Duration;

const MANAGED_VARS: &[&str] = &[
    "CONFIG_FILE",
    "PORT",
    "ASSISTANT_ID",
    "CLASSIFIER_ENABLED",
    "OPENAI_API_KEY",
    "CHAT_SERVICE",
    "GATEWAY_SERVER__PORT",
    "GATEWAY_OPENAI__API_KEY",
    "GATEWAY_OPENAI__CHAT_URL",
    "GATEWAY_POLL__MAX_ATTEMPTS",
    "GATEWAY_POLL__INTERVAL_MS",
    "GATEWAY_ASSISTANT__ID",
    "GATEWAY_ASSISTANT__ID_FILE",
    "GATEWAY_CLASSIFIER__VOCABULARY",
];

// Helper to clear environment variables that might interfere with tests
fn clear_env_vars() {
    unsafe {
        for var in MANAGED_VARS {
            env::remove_var(var);
        }
    }
}

fn with_api_key() {
    clear_env_vars();
    unsafe {
        env::set_var("OPENAI_API_KEY", "sk-test");
    }
}

fn load(args: &[&str]) -> Result<AppConfig, config::ConfigError> {
    AppConfig::load_from_args(std::iter::once("assistant-gateway").chain(args.iter().copied()))
}

#[test]
#[serial]
fn test_default_config() {
    with_api_key();

    let config = load(&[]).expect("Failed to load config");
    assert_eq!(config.server.port, 8080);
    assert_eq!(config.server.host, "0.0.0.0");
    assert_eq!(config.openai.base_url, "https://api.openai.com");
    assert_eq!(config.openai.beta_header, "assistants=v1");
    assert!(config.openai.chat_url.is_none());
    assert_eq!(config.classifier.vocabulary, VocabularyPreset::Topics);
    assert!(config.classifier.enabled);

    let poll = config.poll_config().unwrap();
    assert_eq!(poll.max_attempts(), 12);
    assert_eq!(poll.interval(), Duration::from_millis(2500));
    assert_eq!(config.classify_timeout(), Duration::from_secs(10));

    clear_env_vars();
}

#[test]
#[serial]
fn test_missing_api_key_is_rejected() {
    clear_env_vars();

    let err = load(&[]).unwrap_err();
    assert!(err.to_string().contains("openai.api_key"), "{err}");
}

#[test]
#[serial]
fn test_env_override() {
    with_api_key();
    unsafe {
        env::set_var("GATEWAY_SERVER__PORT", "9090");
        env::set_var("GATEWAY_POLL__MAX_ATTEMPTS", "20");
        env::set_var("GATEWAY_CLASSIFIER__VOCABULARY", "colors");
    }

    let config = load(&[]).expect("Failed to load config");
    assert_eq!(config.server.port, 9090);
    assert_eq!(config.poll.max_attempts, 20);
    assert_eq!(config.classifier.vocabulary, VocabularyPreset::Colors);

    clear_env_vars();
}

#[test]
#[serial]
fn test_prefixed_key_beats_legacy_key() {
    with_api_key();
    unsafe {
        env::set_var("GATEWAY_OPENAI__API_KEY", "sk-prefixed");
        env::set_var("CHAT_SERVICE", "http://localhost:9000/v1/chat/completions");
    }

    let config = load(&[]).expect("Failed to load config");
    assert_eq!(config.openai.api_key, "sk-prefixed");
    assert_eq!(
        config.openai_settings().chat_url.as_deref(),
        Some("http://localhost:9000/v1/chat/completions")
    );

    clear_env_vars();
}

#[test]
#[serial]
fn test_cli_beats_env() {
    with_api_key();
    unsafe {
        env::set_var("GATEWAY_POLL__MAX_ATTEMPTS", "20");
    }

    let config = load(&["--max-attempts", "3", "--poll-interval-ms", "100", "--port", "7000"])
        .expect("Failed to load config");
    assert_eq!(config.poll.max_attempts, 3);
    assert_eq!(config.poll.interval_ms, 100);
    assert_eq!(config.server.port, 7000);

    clear_env_vars();
}

#[test]
#[serial]
fn test_zero_attempts_rejected() {
    with_api_key();

    let err = load(&["--max-attempts", "0"]).unwrap_err();
    assert!(err.to_string().contains("max_attempts"), "{err}");

    clear_env_vars();
}

#[test]
#[serial]
fn test_file_load() {
    with_api_key();

    let dir = tempfile::tempdir().unwrap();
    let file_path = dir.path().join("gateway.yaml");
    fs::write(
        &file_path,
        r"
server:
  port: 7070
poll:
  interval_ms: 500
classifier:
  vocabulary: colors
  enabled: false
",
    )
    .expect("Failed to write temp config");

    let config = load(&["--config", file_path.to_str().unwrap()])
        .expect("Failed to load config from file");
    assert_eq!(config.server.port, 7070);
    assert_eq!(config.poll.interval_ms, 500);
    assert_eq!(config.poll.max_attempts, 12);
    assert_eq!(config.classifier.vocabulary, VocabularyPreset::Colors);
    assert!(!config.classifier.enabled);

    clear_env_vars();
}

#[test]
#[serial]
fn test_missing_explicit_file_fails() {
    with_api_key();

    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("absent.yaml");
    assert!(load(&["--config", missing.to_str().unwrap()]).is_err());

    clear_env_vars();
}

#[test]
#[serial]
fn test_cwd_config_fallback() {
    with_api_key();

    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("config.toml"), "[server]\nport = 6060\n")
        .expect("Failed to write ./config.toml");

    let previous = env::current_dir().unwrap();
    env::set_current_dir(dir.path()).unwrap();
    let config = load(&[]);
    env::set_current_dir(previous).unwrap();

    assert_eq!(config.expect("Failed to load config").server.port, 6060);

    clear_env_vars();
}

#[test]
#[serial]
fn test_assistant_id_from_file() {
    with_api_key();

    let dir = tempfile::tempdir().unwrap();
    let id_file = dir.path().join("assistant.json");
    fs::write(&id_file, r#"{"assistant_id": "asst_from_file"}"#).unwrap();
    unsafe {
        env::set_var("GATEWAY_ASSISTANT__ID_FILE", &id_file);
    }

    let config = load(&[]).expect("Failed to load config");
    assert_eq!(config.resolve_assistant_id().unwrap().as_str(), "asst_from_file");

    let config = load(&["--assistant-id", "asst_from_cli"]).expect("Failed to load config");
    assert_eq!(config.resolve_assistant_id().unwrap().as_str(), "asst_from_cli");

    clear_env_vars();
}

#[test]
#[serial]
fn test_assistant_id_errors() {
    with_api_key();

    let dir = tempfile::tempdir().unwrap();
    let id_file = dir.path().join("assistant.json");
    unsafe {
        env::set_var("GATEWAY_ASSISTANT__ID_FILE", &id_file);
    }

    let config = load(&[]).expect("Failed to load config");
    assert!(matches!(
        config.resolve_assistant_id(),
        Err(AssistantIdError::Unreadable { .. })
    ));

    fs::write(&id_file, "not json").unwrap();
    assert!(matches!(
        config.resolve_assistant_id(),
        Err(AssistantIdError::Malformed { .. })
    ));

    fs::write(&id_file, r#"{"assistant_id": "  "}"#).unwrap();
    assert!(matches!(
        config.resolve_assistant_id(),
        Err(AssistantIdError::Empty)
    ));

    clear_env_vars();
}
