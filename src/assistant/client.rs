//! `OpenAI` REST client for the assistant capabilities.
//!
//! Talks to the Assistants v1 endpoints (`/v1/threads/...`) for runs and
//! messages, and to `/v1/chat/completions` (or an override URL) for
//! single-shot completions.

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::error::TransportError;

use super::{
    AssistantId, ChatCompleter, ChatPrompt, MessageList, MessageSource, OpenAiSettings, RunId,
    RunLauncher, RunStatus, RunStatusSource, ThreadId,
};

/// Client for the `OpenAI` Assistants and Chat Completions APIs.
#[derive(Clone)]
pub struct OpenAiClient {
    http: reqwest::Client,
    base_url: Url,
    chat_url: Url,
}

impl std::fmt::Debug for OpenAiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiClient")
            .field("base_url", &self.base_url.as_str())
            .field("chat_url", &self.chat_url.as_str())
            .finish()
    }
}

#[derive(Deserialize)]
struct RunStatusBody {
    status: RunStatus,
}

#[derive(Deserialize)]
struct RunCreatedBody {
    id: String,
}

#[derive(Deserialize)]
struct CompletionBody {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiClient {
    /// Create a client with authentication and beta headers preset.
    pub fn new(settings: &OpenAiSettings) -> Result<Self, TransportError> {
        let mut headers = HeaderMap::new();

        let mut auth = HeaderValue::from_str(&format!("Bearer {}", settings.api_key))
            .map_err(|e| TransportError::Config(format!("invalid API key header value: {e}")))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        headers.insert(
            HeaderName::from_static("openai-beta"),
            HeaderValue::from_str(&settings.beta_header)
                .map_err(|e| TransportError::Config(format!("invalid beta header value: {e}")))?,
        );

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(settings.request_timeout)
            .build()?;

        let base_url = Url::parse(&settings.base_url)?;
        let chat_url = match &settings.chat_url {
            Some(url) => Url::parse(url)?,
            None => endpoint(&base_url, &["v1", "chat", "completions"])?,
        };

        Ok(Self {
            http,
            base_url,
            chat_url,
        })
    }

    /// The chat completions URL in use.
    #[must_use]
    pub fn chat_url(&self) -> &Url {
        &self.chat_url
    }

    fn thread_url(&self, thread_id: &ThreadId, rest: &[&str]) -> Result<Url, TransportError> {
        let mut segments = vec!["v1", "threads", thread_id.as_str()];
        segments.extend_from_slice(rest);
        endpoint(&self.base_url, &segments)
    }
}

/// Append `segments` to `base`, percent-encoding each one.
fn endpoint(base: &Url, segments: &[&str]) -> Result<Url, TransportError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|()| TransportError::Config(format!("base URL cannot carry a path: {base}")))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, TransportError> {
    let status = response.status();
    if status.is_success() {
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| TransportError::Decode(e.to_string()))
    } else {
        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".into());
        Err(TransportError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait::async_trait]
impl RunStatusSource for OpenAiClient {
    async fn fetch_run_status(
        &self,
        thread_id: &ThreadId,
        run_id: &RunId,
    ) -> Result<RunStatus, TransportError> {
        let url = self.thread_url(thread_id, &["runs", run_id.as_str()])?;
        let response = self.http.get(url).send().await?;
        let body: RunStatusBody = read_json(response).await?;
        debug!(%thread_id, %run_id, status = %body.status, "run status fetched");
        Ok(body.status)
    }
}

#[async_trait::async_trait]
impl MessageSource for OpenAiClient {
    async fn fetch_messages(&self, thread_id: &ThreadId) -> Result<MessageList, TransportError> {
        let url = self.thread_url(thread_id, &["messages"])?;
        let response = self.http.get(url).send().await?;
        Ok(MessageList::new(read_json(response).await?))
    }
}

#[async_trait::async_trait]
impl RunLauncher for OpenAiClient {
    async fn post_user_message(
        &self,
        thread_id: &ThreadId,
        content: &str,
    ) -> Result<(), TransportError> {
        let url = self.thread_url(thread_id, &["messages"])?;
        let body = serde_json::json!({ "role": "user", "content": content });
        let response = self.http.post(url).json(&body).send().await?;
        let _: serde_json::Value = read_json(response).await?;
        Ok(())
    }

    async fn start_run(
        &self,
        thread_id: &ThreadId,
        assistant_id: &AssistantId,
    ) -> Result<RunId, TransportError> {
        let url = self.thread_url(thread_id, &["runs"])?;
        let body = serde_json::json!({ "assistant_id": assistant_id });
        let response = self.http.post(url).json(&body).send().await?;
        let created: RunCreatedBody = read_json(response).await?;
        debug!(%thread_id, run_id = %created.id, "run started");
        Ok(RunId::new(created.id))
    }
}

#[async_trait::async_trait]
impl ChatCompleter for OpenAiClient {
    async fn complete_chat(
        &self,
        prompt: &ChatPrompt,
        temperature: f32,
    ) -> Result<String, TransportError> {
        let body = serde_json::json!({
            "model": prompt.model,
            "messages": prompt.messages,
            "temperature": temperature,
        });
        let response = self.http.post(self.chat_url.clone()).json(&body).send().await?;
        let completion: CompletionBody = read_json(response).await?;

        completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| TransportError::Decode("completion has no message content".to_string()))
    }
}
