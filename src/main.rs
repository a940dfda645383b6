//! Assistant Gateway server
//!
//! Entry point: loads configuration and serves `POST /chat`.

use std::sync::Arc;

use assistant_gateway::{config::AppConfig, server, telemetry};
use mimalloc::MiMalloc;
use tracing::error;

/// Global allocator for improved performance (M-MIMALLOC-APPS).
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() {
    // Load .env (if present) before anything reads the environment
    let _ = dotenvy::dotenv();

    telemetry::init();

    let config = match AppConfig::load() {
        Ok(config) => Arc::new(config),
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = server::start_server(config).await {
        error!(name: "server.failed", error = ?e, "Server error");
        std::process::exit(1);
    }
}
