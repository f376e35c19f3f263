//! Server configuration

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use pdfedit_core::SessionConfig;

/// Command-line arguments, each with a `PDFEDIT_*` environment fallback
#[derive(Parser, Debug, Clone)]
#[command(name = "pdfedit-api")]
#[command(about = "HTTP server for replacing text in PDF documents")]
pub struct Config {
    /// Host address to bind to
    #[arg(long, env = "PDFEDIT_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, env = "PDFEDIT_PORT", default_value = "5000")]
    pub port: u16,

    /// Directory for uploaded source documents
    #[arg(long, env = "PDFEDIT_UPLOAD_DIR", default_value = "tmp/uploads")]
    pub upload_dir: PathBuf,

    /// Directory for committed documents
    #[arg(long, env = "PDFEDIT_EDITED_DIR", default_value = "tmp/edited")]
    pub edited_dir: PathBuf,

    /// Idle seconds before a session expires
    #[arg(long, env = "PDFEDIT_SESSION_TTL_SECS", default_value = "3600")]
    pub session_ttl_secs: u64,

    /// Maximum number of live sessions
    #[arg(long, env = "PDFEDIT_MAX_SESSIONS", default_value = "1000")]
    pub max_sessions: usize,

    /// Seconds between expired-session sweeps
    #[arg(long, env = "PDFEDIT_SWEEP_INTERVAL_SECS", default_value = "60")]
    pub sweep_interval_secs: u64,

    /// Largest accepted upload, in bytes
    #[arg(long, env = "PDFEDIT_MAX_UPLOAD_BYTES", default_value = "52428800")]
    pub max_upload_bytes: usize,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Config {
    pub fn session(&self) -> SessionConfig {
        SessionConfig {
            ttl: Duration::from_secs(self.session_ttl_secs),
            capacity: self.max_sessions,
        }
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}
