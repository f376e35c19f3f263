//! pdfedit Server
//!
//! Serves the text replacement workflow over HTTP:
//!
//! - Upload a PDF and receive the styled text runs of its first page
//! - Queue replacements keyed by run bounding box
//! - Commit them into a new document that is returned as a download
//!
//! Sessions live in memory and expire after a configurable idle time; their
//! files on disk are removed together with them.

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod api;
mod config;
mod error;
mod state;
mod storage;

use config::Config;
use state::AppState;

const DEFAULT_FILTER: &str = "pdfedit_api=info,pdfedit_core=info,tower_http=debug";
const VERBOSE_FILTER: &str = "pdfedit_api=debug,pdfedit_core=debug,tower_http=debug";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();
    let config = Config::parse();

    // Initialize logging
    let default_filter = if config.verbose {
        VERBOSE_FILTER
    } else {
        DEFAULT_FILTER
    };
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(default_filter))?;

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting pdfedit server on {}:{}", config.host, config.port);

    let state = Arc::new(AppState::new(&config)?);
    state::spawn_sweeper(Arc::clone(&state), config.sweep_interval());

    let app = api::router(state, config.max_upload_bytes);

    // Start server
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("Server listening on http://{}", addr);
    info!(
        "Sessions: ttl {}s, capacity {}",
        config.session_ttl_secs, config.max_sessions
    );

    axum::serve(listener, app).await?;

    Ok(())
}
