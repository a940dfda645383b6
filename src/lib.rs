//! Assistant Gateway
//!
//! An HTTP gateway in front of a remote "assistant run" service. Each chat
//! turn appends the user's message to a thread, starts a run, waits for it
//! with bounded polling and, alongside, sorts the message into a closed set
//! of categories with a single-shot completion.
//!
//! # Architecture
//!
//! - **Server**: Axum router exposing `POST /chat`
//! - **Poller**: bounded completion wait with joined status/messages fetches
//! - **Classifier**: temperature-0 classification with a sentinel fallback
//! - **Assistant client**: `OpenAI` REST client behind narrow capability traits
//!
//! # Modules
//!
//! - [`assistant`]: capability traits, identifiers and the `OpenAI` client
//! - [`poller`]: [`poller::RunPoller`] and its outcomes
//! - [`classifier`]: vocabularies, categories and [`classifier::Classifier`]
//! - [`conversation`]: one chat turn end to end
//! - [`config`]: layered configuration (defaults, file, env, CLI)

// Allow pedantic clippy warnings that don't add value for this codebase
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::missing_fields_in_debug)]
#![allow(clippy::cargo_common_metadata)]
#![allow(clippy::multiple_crate_versions)]

pub mod assistant;
pub mod classifier;
pub mod config;
pub mod conversation;
pub mod error;
pub mod poller;
pub mod server;
pub mod shutdown;
pub mod telemetry;

use conversation::ChatService;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Application state shared across all handlers.
#[derive(Clone, Debug)]
pub struct AppState {
    /// Chat turn driver.
    pub chat: Arc<ChatService>,
    /// Root cancellation token; cancelled on shutdown.
    pub shutdown: CancellationToken,
}
