use crate::assistant::{AssistantId, OpenAiSettings};
use crate::classifier::{Vocabulary, VocabularyPreset};
use crate::poller::{InvalidPollConfig, PollConfig};
use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file path
    #[arg(short, long, env = "CONFIG_FILE")]
    pub config: Option<String>,

    /// Port to listen on
    #[arg(long, env = "PORT")]
    pub port: Option<u16>,

    /// Assistant that executes runs
    #[arg(long, env = "ASSISTANT_ID")]
    pub assistant_id: Option<String>,

    /// Maximum status checks per run
    #[arg(long)]
    pub max_attempts: Option<u32>,

    /// Milliseconds between status checks
    #[arg(long)]
    pub poll_interval_ms: Option<u64>,

    /// Enable message classification
    #[arg(long, env = "CLASSIFIER_ENABLED")]
    pub classifier_enabled: Option<bool>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub openai: OpenAiConfig,
    pub assistant: AssistantConfig,
    pub poll: PollSettings,
    pub classifier: ClassifierConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    pub request_timeout_secs: u64,
}

#[derive(Deserialize, Clone)]
pub struct OpenAiConfig {
    pub base_url: String,
    pub api_key: String,
    pub chat_url: Option<String>,
    pub beta_header: String,
    pub request_timeout_secs: u64,
}

impl fmt::Debug for OpenAiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("chat_url", &self.chat_url)
            .field("beta_header", &self.beta_header)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AssistantConfig {
    pub id: Option<String>,
    pub id_file: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PollSettings {
    pub max_attempts: u32,
    pub interval_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ClassifierConfig {
    pub enabled: bool,
    pub vocabulary: VocabularyPreset,
    pub model: String,
    pub timeout_ms: u64,
}

/// The assistant id could not be resolved at startup.
#[derive(Debug, thiserror::Error)]
pub enum AssistantIdError {
    #[error("no assistant id configured and {path} could not be read: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{path} is not a valid assistant id file: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("assistant id is empty")]
    Empty,
}

/// On-disk shape of the assistant id file.
#[derive(Deserialize)]
struct AssistantIdFile {
    assistant_id: String,
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_from_args(std::env::args())
    }

    pub fn load_from_args<I, T>(args: I) -> Result<Self, config::ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let cli =
            Cli::try_parse_from(args).map_err(|e| config::ConfigError::Message(e.to_string()))?;

        let mut builder = Config::builder();

        // 1. Defaults
        builder = builder
            .set_default("server.port", 8080)?
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.request_timeout_secs", 60)?
            .set_default("openai.base_url", "https://api.openai.com")?
            .set_default("openai.api_key", "")?
            .set_default("openai.beta_header", "assistants=v1")?
            .set_default("openai.request_timeout_secs", 30)?
            .set_default("assistant.id_file", "assistant.json")?
            .set_default("poll.max_attempts", u64::from(PollConfig::DEFAULT_MAX_ATTEMPTS))?
            .set_default(
                "poll.interval_ms",
                u64::try_from(PollConfig::DEFAULT_INTERVAL.as_millis()).unwrap_or(2500),
            )?
            .set_default("classifier.enabled", true)?
            .set_default("classifier.vocabulary", "topics")?
            .set_default("classifier.model", "gpt-3.5-turbo")?
            .set_default("classifier.timeout_ms", 10_000)?;

        // 2. Legacy unprefixed variables sit just above the defaults
        if let Ok(key) = env::var("OPENAI_API_KEY") {
            builder = builder.set_default("openai.api_key", key)?;
        }
        if let Ok(url) = env::var("CHAT_SERVICE") {
            builder = builder.set_default("openai.chat_url", url)?;
        }

        // 3. Config file: explicit path must exist, ./config.* is optional
        builder = match &cli.config {
            Some(path) => builder.add_source(File::with_name(path).required(true)),
            None => builder.add_source(File::with_name("config").required(false)),
        };

        // 4. Environment variables, e.g. GATEWAY_POLL__MAX_ATTEMPTS=20
        builder = builder.add_source(
            Environment::with_prefix("GATEWAY")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        // 5. CLI flags (and their clap-level env vars) win
        if let Some(port) = cli.port {
            builder = builder.set_override("server.port", u64::from(port))?;
        }
        if let Some(id) = cli.assistant_id {
            builder = builder.set_override("assistant.id", id)?;
        }
        if let Some(attempts) = cli.max_attempts {
            builder = builder.set_override("poll.max_attempts", u64::from(attempts))?;
        }
        if let Some(interval) = cli.poll_interval_ms {
            builder = builder.set_override("poll.interval_ms", interval)?;
        }
        if let Some(enabled) = cli.classifier_enabled {
            builder = builder.set_override("classifier.enabled", enabled)?;
        }

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), config::ConfigError> {
        if self.openai.api_key.trim().is_empty() {
            return Err(config::ConfigError::Message(
                "openai.api_key is required (set OPENAI_API_KEY or GATEWAY_OPENAI__API_KEY)"
                    .to_string(),
            ));
        }
        self.poll_config()
            .map_err(|e| config::ConfigError::Message(format!("poll: {e}")))?;
        Ok(())
    }

    pub fn openai_settings(&self) -> OpenAiSettings {
        OpenAiSettings {
            base_url: self.openai.base_url.clone(),
            api_key: self.openai.api_key.clone(),
            chat_url: self.openai.chat_url.clone(),
            beta_header: self.openai.beta_header.clone(),
            request_timeout: Duration::from_secs(self.openai.request_timeout_secs),
        }
    }

    pub fn poll_config(&self) -> Result<PollConfig, InvalidPollConfig> {
        PollConfig::new(
            self.poll.max_attempts,
            Duration::from_millis(self.poll.interval_ms),
        )
    }

    pub fn vocabulary(&self) -> Vocabulary {
        self.classifier.vocabulary.into()
    }

    pub fn classify_timeout(&self) -> Duration {
        Duration::from_millis(self.classifier.timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }

    /// The configured assistant id, or the one stored in `assistant.id_file`.
    pub fn resolve_assistant_id(&self) -> Result<AssistantId, AssistantIdError> {
        let id = match &self.assistant.id {
            Some(id) => id.clone(),
            None => read_assistant_id(&self.assistant.id_file)?,
        };
        if id.trim().is_empty() {
            return Err(AssistantIdError::Empty);
        }
        Ok(AssistantId::new(id.trim()))
    }
}

fn read_assistant_id(path: &Path) -> Result<String, AssistantIdError> {
    let raw = std::fs::read_to_string(path).map_err(|source| AssistantIdError::Unreadable {
        path: path.to_path_buf(),
        source,
    })?;
    let file: AssistantIdFile =
        serde_json::from_str(&raw).map_err(|source| AssistantIdError::Malformed {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(file.assistant_id)
}
