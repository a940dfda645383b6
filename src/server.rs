use axum::{
    Json, Router,
    extract::{Request, State, rejection::JsonRejection},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    routing::post,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::AppState;
use crate::assistant::{
    ChatCompleter, MessageSource, OpenAiClient, RunLauncher, RunStatusSource, ThreadId,
};
use crate::classifier::{Category, Classifier};
use crate::config::AppConfig;
use crate::conversation::ChatService;
use crate::poller::{PollOutcome, RunPoller};
use crate::shutdown;

/// Body returned when the assistant does not finish within the attempt budget.
pub const TIMEOUT_MESSAGE: &str = "Timeout: La respuesta del asistente tardó demasiado.";

/// Wire the OpenAI client, poller and classifier into shared state.
pub fn build_state(config: &AppConfig, shutdown: CancellationToken) -> anyhow::Result<AppState> {
    let client = Arc::new(OpenAiClient::new(&config.openai_settings())?);
    let assistant_id = config.resolve_assistant_id()?;
    let poll = config.poll_config()?;

    info!(
        name: "assistant.config.loaded",
        assistant_id = %assistant_id,
        base_url = %config.openai.base_url,
        chat_url = %client.chat_url(),
        max_attempts = poll.max_attempts(),
        interval_ms = config.poll.interval_ms,
        "Assistant configuration loaded"
    );

    let poller = RunPoller::new(
        Arc::clone(&client) as Arc<dyn RunStatusSource>,
        Arc::clone(&client) as Arc<dyn MessageSource>,
    );
    let mut chat = ChatService::new(
        Arc::clone(&client) as Arc<dyn RunLauncher>,
        poller,
        assistant_id,
        poll,
    )
    .with_call_timeout(Duration::from_secs(config.openai.request_timeout_secs));

    if config.classifier.enabled {
        let classifier = Classifier::new(
            client as Arc<dyn ChatCompleter>,
            config.classifier.model.clone(),
            config.vocabulary(),
        );
        info!(
            name: "classifier.enabled",
            model = %config.classifier.model,
            vocabulary = ?config.classifier.vocabulary,
            "Message classification enabled"
        );
        chat = chat.with_classifier(classifier, config.classify_timeout());
    }

    Ok(AppState {
        chat: Arc::new(chat),
        shutdown,
    })
}

/// Build the HTTP router.
///
/// Requests that take longer than `request_timeout` are answered with
/// `408 Request Timeout`. The timeout is raised to the longest a chat turn
/// can take, so a poll that runs out of attempts is still reported as such.
pub fn build_router(state: AppState, request_timeout: Duration) -> Router {
    let request_timeout = request_timeout.max(state.chat.max_turn_duration());
    debug!(
        request_timeout_ms = u64::try_from(request_timeout.as_millis()).unwrap_or(u64::MAX),
        "request timeout configured"
    );

    Router::new()
        .route("/chat", post(chat))
        .layer(axum::middleware::from_fn(
            move |req: Request, next: Next| async move {
                match tokio::time::timeout(request_timeout, next.run(req)).await {
                    Ok(res) => res,
                    Err(_) => (StatusCode::REQUEST_TIMEOUT, "Request timed out").into_response(),
                }
            },
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the Axum server with the provided configuration.
pub async fn start_server(config: Arc<AppConfig>) -> anyhow::Result<()> {
    let shutdown = shutdown::install_signal_handler();
    let state = build_state(&config, shutdown.clone())?;
    let app = build_router(state, config.request_timeout());

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!(
        name: "server.started",
        address = %addr,
        "Server started"
    );

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;

    info!(name: "server.stopped", "Server stopped");
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// API Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// Request body for the chat API.
#[derive(Debug, Default, Deserialize)]
struct ChatRequest {
    /// Thread the message belongs to.
    #[serde(default)]
    thread_id: Option<String>,
    /// User message content.
    #[serde(default)]
    message: String,
}

/// Response from the chat API.
#[derive(Debug, Serialize)]
struct ChatResponse {
    /// Thread messages as the service returned them.
    messages: serde_json::Value,
    /// Category of the user's message, or `null`.
    category: Option<Category>,
}

/// POST /chat - Post a message, run the assistant and wait for its reply.
///
/// A body that is not a JSON object is treated like one without a thread.
async fn chat(
    State(state): State<AppState>,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> Response {
    let req = match body {
        Ok(Json(req)) => req,
        Err(rejection) => {
            debug!(error = %rejection, "unreadable chat request body");
            ChatRequest::default()
        }
    };
    let Some(thread_id) = req.thread_id.filter(|id| !id.trim().is_empty()) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": "Missing thread_id" })),
        )
            .into_response();
    };
    let thread_id = ThreadId::new(thread_id);

    let request_id = Uuid::new_v4();
    let span = info_span!("chat", %request_id, thread_id = %thread_id);
    let cancel = state.shutdown.child_token();

    async move {
        info!(message_len = req.message.len(), "Received chat request");

        let reply = match state.chat.respond(&thread_id, &req.message, &cancel).await {
            Ok(reply) => reply,
            Err(e) => {
                error!(error = %e, "failed to start assistant run");
                return (StatusCode::INTERNAL_SERVER_ERROR, "Error in chat").into_response();
            }
        };

        match reply.outcome {
            PollOutcome::Success(messages) => Json(ChatResponse {
                messages: messages.into_json(),
                category: reply.category,
            })
            .into_response(),
            PollOutcome::FetchError(e) => {
                error!(error = %e, "failed to retrieve assistant response");
                (StatusCode::INTERNAL_SERVER_ERROR, "Error retrieving response").into_response()
            }
            PollOutcome::Timeout { attempts } => {
                warn!(attempts, "assistant did not answer in time");
                (StatusCode::SERVICE_UNAVAILABLE, TIMEOUT_MESSAGE).into_response()
            }
            PollOutcome::RunTerminated { status } => (
                StatusCode::BAD_GATEWAY,
                format!("Assistant run ended with status {status}"),
            )
                .into_response(),
            PollOutcome::Cancelled => {
                (StatusCode::SERVICE_UNAVAILABLE, "Server is shutting down").into_response()
            }
        }
    }
    .instrument(span)
    .await
}
