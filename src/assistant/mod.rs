//! Remote assistant service capabilities.
//!
//! This module defines the narrow interfaces the core consumes from the
//! remote "assistant run" service, together with the identifiers and
//! payloads that flow through them.
//!
//! # Capabilities
//!
//! - [`RunStatusSource`]: fetch the status of a run
//! - [`MessageSource`]: fetch the message list of a thread
//! - [`RunLauncher`]: post a user message and start a run
//! - [`ChatCompleter`]: single-shot chat completion
//!
//! [`OpenAiClient`] implements all four against the `OpenAI` REST API.
//!
//! # Example
//!
//! ```rust,ignore
//! use assistant_gateway::assistant::{OpenAiClient, OpenAiSettings};
//!
//! let settings = OpenAiSettings::new("https://api.openai.com", "sk-...");
//! let client = OpenAiClient::new(&settings)?;
//! let status = client.fetch_run_status(&thread_id, &run_id).await?;
//! ```

pub mod client;

pub use client::OpenAiClient;

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::TransportError;

/// `OpenAI` connection settings.
#[derive(Clone)]
pub struct OpenAiSettings {
    /// Base URL for the REST API (e.g., `https://api.openai.com`).
    pub base_url: String,
    /// API key sent as a bearer token.
    pub api_key: String,
    /// Full chat completions URL; derived from `base_url` when unset.
    pub chat_url: Option<String>,
    /// Value of the `OpenAI-Beta` header (e.g., `assistants=v1`).
    pub beta_header: String,
    /// Per-request timeout.
    pub request_timeout: Duration,
}

impl OpenAiSettings {
    /// Settings with the default beta header and a 30 second timeout.
    #[must_use]
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            chat_url: None,
            beta_header: "assistants=v1".to_string(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl fmt::Debug for OpenAiSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiSettings")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("chat_url", &self.chat_url)
            .field("beta_header", &self.beta_header)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

macro_rules! opaque_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap a service-assigned identifier.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// The identifier as the service issued it.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

opaque_id!(
    /// Handle of a remote conversation thread.
    ThreadId
);
opaque_id!(
    /// Handle of one run of the assistant against a thread.
    RunId
);
opaque_id!(
    /// Handle of the registered assistant that executes runs.
    AssistantId
);

/// Run state as reported by the service.
///
/// Only [`RunStatus::Completed`] is terminal success. Values the service
/// adds later deserialize to [`RunStatus::Unknown`] and count as pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    InProgress,
    RequiresAction,
    Cancelling,
    Cancelled,
    Failed,
    Completed,
    Expired,
    #[serde(other)]
    Unknown,
}

impl RunStatus {
    /// Whether the run finished and its messages are final.
    #[must_use]
    pub fn is_completed(self) -> bool {
        self == Self::Completed
    }

    /// Whether the run ended without producing a result.
    #[must_use]
    pub fn is_terminal_failure(self) -> bool {
        matches!(self, Self::Cancelled | Self::Failed | Self::Expired)
    }

    /// Wire name of the status.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::InProgress => "in_progress",
            Self::RequiresAction => "requires_action",
            Self::Cancelling => "cancelling",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
            Self::Completed => "completed",
            Self::Expired => "expired",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Messages attached to a thread, exactly as the service returned them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageList(serde_json::Value);

impl MessageList {
    #[must_use]
    pub fn new(payload: serde_json::Value) -> Self {
        Self(payload)
    }

    #[must_use]
    pub fn as_json(&self) -> &serde_json::Value {
        &self.0
    }

    #[must_use]
    pub fn into_json(self) -> serde_json::Value {
        self.0
    }
}

/// Role of a chat prompt message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// System instruction.
    System,
    /// End-user message.
    User,
    /// Model answer.
    Assistant,
}

/// One message of a chat completion prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }
}

/// A complete chat completion prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatPrompt {
    /// Model identifier (e.g., `gpt-3.5-turbo`).
    pub model: String,
    /// Ordered prompt messages.
    pub messages: Vec<ChatMessage>,
}

/// Reads the current status of a run.
#[async_trait::async_trait]
pub trait RunStatusSource: Send + Sync {
    /// Fetch the status of `run_id` on `thread_id`.
    async fn fetch_run_status(
        &self,
        thread_id: &ThreadId,
        run_id: &RunId,
    ) -> Result<RunStatus, TransportError>;
}

/// Reads the accumulated messages of a thread.
#[async_trait::async_trait]
pub trait MessageSource: Send + Sync {
    /// Fetch the full message list of `thread_id`.
    async fn fetch_messages(&self, thread_id: &ThreadId) -> Result<MessageList, TransportError>;
}

/// Appends user input to a thread and starts runs on it.
#[async_trait::async_trait]
pub trait RunLauncher: Send + Sync {
    /// Append a user message to `thread_id`.
    async fn post_user_message(
        &self,
        thread_id: &ThreadId,
        content: &str,
    ) -> Result<(), TransportError>;

    /// Start a run of `assistant_id` on `thread_id`.
    async fn start_run(
        &self,
        thread_id: &ThreadId,
        assistant_id: &AssistantId,
    ) -> Result<RunId, TransportError>;
}

/// Issues single-shot chat completions.
#[async_trait::async_trait]
pub trait ChatCompleter: Send + Sync {
    /// Complete `prompt` and return the text of the first choice.
    async fn complete_chat(
        &self,
        prompt: &ChatPrompt,
        temperature: f32,
    ) -> Result<String, TransportError>;
}
