//! # teacherdesk-server
//!
//! HTTP backend for the teacherdesk assistant.
//!
//! This binary provides:
//! - **Chat proxy** forwarding validated conversations to an OpenAI-compatible API
//! - **Image generation** with optional saving to the teacher's library in InstantDB
//! - **Health checks** for the process and its upstream services
//! - **Per-IP fixed-window rate limiting**
//!
//! `teacherdesk-server permissions` and `teacherdesk-server schema` print the
//! InstantDB configuration as JSON instead of serving.

mod api;
mod config;
mod error;
mod instant;
mod openai;
mod rate_limit;

use std::time::Duration;

use tracing::info;
use tracing_subscriber::EnvFilter;

use teacherdesk_shared::constants::APP_NAME;
use teacherdesk_shared::permissions::PermissionSet;
use teacherdesk_shared::schema::Schema;

use crate::api::AppState;
use crate::config::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Declarative database config: print and exit
    // -----------------------------------------------------------------------
    match std::env::args().nth(1).as_deref() {
        Some("permissions") => {
            println!(
                "{}",
                serde_json::to_string_pretty(&PermissionSet::teacher_defaults().to_instant_json())?
            );
            return Ok(());
        }
        Some("schema") => {
            println!(
                "{}",
                serde_json::to_string_pretty(&Schema::teacherdesk().to_instant_json())?
            );
            return Ok(());
        }
        Some(other) => anyhow::bail!("unknown command '{other}' (expected 'permissions' or 'schema')"),
        None => {}
    }

    // -----------------------------------------------------------------------
    // 2. Initialize tracing (respects RUST_LOG env var, .env included)
    // -----------------------------------------------------------------------
    let dotenv_path = dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,teacherdesk_server=debug")),
        )
        .init();

    info!("Starting {} server v{}", APP_NAME, env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 3. Load configuration
    // -----------------------------------------------------------------------
    if let Some(path) = dotenv_path {
        info!(path = %path.display(), "Loaded .env file");
    }
    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");
    for missing in config.missing_credentials() {
        tracing::warn!(variable = missing, "Credential not set, dependent endpoints will answer 503");
    }

    // -----------------------------------------------------------------------
    // 4. Initialize shared state and background tasks
    // -----------------------------------------------------------------------
    let http_addr = config.http_addr;
    let purge_every = config.rate_limit_window.max(Duration::from_secs(60));
    let app_state = AppState::new(config);

    // Periodic rate limiter cleanup: drop windows idle for a full extra period
    let rl = app_state.rate_limiter.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(purge_every);
        loop {
            interval.tick().await;
            rl.purge_stale(purge_every).await;
        }
    });

    // -----------------------------------------------------------------------
    // 5. Run the HTTP API server (blocks until shutdown)
    // -----------------------------------------------------------------------
    tokio::select! {
        result = api::serve(app_state, http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
